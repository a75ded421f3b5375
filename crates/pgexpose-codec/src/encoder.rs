//! Streaming JSON encoder for resolved values
//!
//! Writes tokens straight into any `io::Write` (a response chunk buffer in
//! the gateway) without building an intermediate JSON document. Strings go
//! through `serde_json`, which escapes quotes, backslashes and control
//! characters and leaves every other code point as-is.

use std::io::Write;

use crate::error::EncodeError;
use crate::naming::NameConverter;
use crate::value::ResolvedValue;

/// Encode `value` as JSON, converting object keys with `names`
pub fn encode<W>(value: &ResolvedValue<'_>, names: &dyn NameConverter, out: &mut W) -> Result<(), EncodeError>
where
    W: Write + ?Sized,
{
    match value {
        ResolvedValue::Null => out.write_all(b"null")?,
        ResolvedValue::Bool(true) => out.write_all(b"true")?,
        ResolvedValue::Bool(false) => out.write_all(b"false")?,
        // validated as a JSON number by the scalar converter
        ResolvedValue::Number(text) => out.write_all(text.as_bytes())?,
        ResolvedValue::String(text) => write_string(text, out)?,
        ResolvedValue::Object(fields) => {
            out.write_all(b"{")?;
            for (i, (name, field)) in fields.iter().enumerate() {
                if i > 0 {
                    out.write_all(b",")?;
                }
                write_key(name, names, out)?;
                encode(field, names, out)?;
            }
            out.write_all(b"}")?;
        }
        ResolvedValue::Array(items) => {
            out.write_all(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_all(b",")?;
                }
                encode(item, names, out)?;
            }
            out.write_all(b"]")?;
        }
    }
    Ok(())
}

/// Write a JSON string literal
#[inline]
pub(crate) fn write_string<W>(text: &str, out: &mut W) -> Result<(), EncodeError>
where
    W: Write + ?Sized,
{
    serde_json::to_writer(&mut *out, text)?;
    Ok(())
}

/// Write a converted object key followed by `:`
#[inline]
pub(crate) fn write_key<W>(name: &str, names: &dyn NameConverter, out: &mut W) -> Result<(), EncodeError>
where
    W: Write + ?Sized,
{
    write_string(&names.convert(name), out)?;
    out.write_all(b":")?;
    Ok(())
}

/// Encode into a fresh `String`
pub fn to_json_string(value: &ResolvedValue<'_>, names: &dyn NameConverter) -> Result<String, EncodeError> {
    let mut buf = Vec::new();
    encode(value, names, &mut buf)?;
    // only valid UTF-8 is ever written
    String::from_utf8(buf).map_err(|e| EncodeError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{TypeCatalogBuilder, TypeId};
    use crate::naming::{CamelCase, Identity};
    use crate::resolver::{ResolveOptions, Resolver};
    use crate::scalar::ScalarRegistry;
    use crate::TypeCatalog;
    use serde_json::json;

    struct Types {
        catalog: TypeCatalog,
        inner: TypeId,
        inner_array: TypeId,
        inner_grid: TypeId,
        outer: TypeId,
        text_array: TypeId,
    }

    fn types() -> Types {
        let mut b = TypeCatalogBuilder::new();
        let int4 = b.scalar("int4");
        let text = b.scalar("text");
        let inner = b.composite("nc_inner_type", [("id", int4), ("name", text)]).unwrap();
        let inner_array = b.array(inner, 1).unwrap();
        let inner_grid = b.array(inner, 2).unwrap();
        let outer = b
            .composite("outer_type", [("label", text), ("nested_val", inner)])
            .unwrap();
        let text_array = b.array(text, 1).unwrap();
        Types {
            catalog: b.build(),
            inner,
            inner_array,
            inner_grid,
            outer,
            text_array,
        }
    }

    fn resolve_to_json(t: &Types, raw: Option<&str>, ty: TypeId) -> String {
        let scalars = ScalarRegistry::new();
        let resolver = Resolver::new(&t.catalog, &scalars, ResolveOptions::default());
        let value = resolver.resolve_column(raw, ty).unwrap();
        to_json_string(&value, &CamelCase).unwrap()
    }

    #[test]
    fn test_nested_composite_with_camel_case() {
        let t = types();
        let json = resolve_to_json(&t, Some(r#"(a,"(1,x)")"#), t.outer);
        assert_eq!(json, r#"{"label":"a","nestedVal":{"id":1,"name":"x"}}"#);
    }

    #[test]
    fn test_identity_names() {
        let value = ResolvedValue::Object(vec![("nested_val", ResolvedValue::Null)]);
        assert_eq!(to_json_string(&value, &Identity).unwrap(), r#"{"nested_val":null}"#);
    }

    #[test]
    fn test_all_null_composite() {
        let t = types();
        assert_eq!(resolve_to_json(&t, Some("(,)"), t.inner), r#"{"id":null,"name":null}"#);
        assert_eq!(resolve_to_json(&t, None, t.inner), "null");
    }

    #[test]
    fn test_null_and_empty_arrays() {
        let t = types();
        assert_eq!(resolve_to_json(&t, None, t.inner_array), "null");
        assert_eq!(resolve_to_json(&t, Some("{}"), t.inner_array), "[]");
    }

    #[test]
    fn test_mixed_null_elements() {
        let t = types();
        let json = resolve_to_json(&t, Some(r#"{"(1,first)",NULL,"(,third)"}"#), t.inner_array);
        assert_eq!(
            json,
            r#"[{"id":1,"name":"first"},null,{"id":null,"name":"third"}]"#
        );
    }

    #[test]
    fn test_empty_string_and_null_are_distinct() {
        let t = types();
        let json = resolve_to_json(&t, Some(r#"{"(1,\"\")","(2,)"}"#), t.inner_array);
        assert_eq!(json, r#"[{"id":1,"name":""},{"id":2,"name":null}]"#);
    }

    #[test]
    fn test_special_characters_round_trip() {
        let t = types();
        // array_out of {'q"b', 'back\slash', E'nl\nx', E'tab\tx', 'a,b', '(p)'}
        let raw = "{\"q\\\"b\",\"back\\\\slash\",\"nl\nx\",\"tab\tx\",\"a,b\",\"(p)\"}";
        let json = resolve_to_json(&t, Some(raw), t.text_array);

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed,
            json!(["q\"b", "back\\slash", "nl\nx", "tab\tx", "a,b", "(p)"])
        );
        assert!(!json.contains('\n'));
        assert!(!json.contains('\t'));
    }

    #[test]
    fn test_special_characters_in_nested_composite() {
        let t = types();
        let raw = "(\"x\"\"y\",\"(1,\"\"a\\\\\\\\b\nc\"\")\")";
        let json = resolve_to_json(&t, Some(raw), t.outer);

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed,
            json!({"label": "x\"y", "nestedVal": {"id": 1, "name": "a\\b\nc"}})
        );
    }

    #[test]
    fn test_control_characters_escaped() {
        let value = ResolvedValue::string("bell\u{7}end\r");
        assert_eq!(to_json_string(&value, &Identity).unwrap(), r#""bell\u0007end\r""#);
    }

    #[test]
    fn test_unicode_not_transcoded() {
        let t = types();
        let json = resolve_to_json(&t, Some("{🎉,漢字,\"שלום עולם\"}"), t.text_array);
        assert_eq!(json, r#"["🎉","漢字","שלום עולם"]"#);
    }

    #[test]
    fn test_numeric_extremes_preserved() {
        let mut b = TypeCatalogBuilder::new();
        let numeric = b.scalar("numeric");
        let numbers = b.array(numeric, 1).unwrap();
        let catalog = b.build();
        let scalars = ScalarRegistry::new();
        let resolver = Resolver::new(&catalog, &scalars, ResolveOptions::default());

        let value = resolver
            .resolve("{99999999999999999999999999999.999999999,-0.000000000001,NaN}", numbers, false)
            .unwrap();
        assert_eq!(
            to_json_string(&value, &Identity).unwrap(),
            r#"[99999999999999999999999999999.999999999,-0.000000000001,"NaN"]"#
        );
    }

    #[test]
    fn test_top_level_grid_limitation() {
        let t = types();
        let json = resolve_to_json(&t, Some(r#"{{"(1,a)","(2,b)"},{"(3,c)","(4,d)"}}"#), t.inner_grid);
        assert_eq!(json, r#"[["(1,a)","(2,b)"],["(3,c)","(4,d)"]]"#);
    }

    #[test]
    fn test_booleans() {
        let value = ResolvedValue::Array(vec![ResolvedValue::Bool(true), ResolvedValue::Bool(false)]);
        assert_eq!(to_json_string(&value, &Identity).unwrap(), "[true,false]");
    }
}
