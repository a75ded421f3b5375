//! Scalar converter registry
//!
//! Converts leaf text to a native JSON scalar, keyed by PostgreSQL type name.
//! Numbers and booleans become JSON numbers and booleans; every other type
//! (timestamps, UUIDs, json/jsonb, bytea, ...) passes through as a string.

use std::collections::HashMap;

use crate::error::ScalarError;
use crate::value::ResolvedValue;

/// Leaf conversion capability injected into the resolver
pub trait ScalarConverter: Send + Sync {
    fn convert<'c>(&self, pg_type: &str, text: &str) -> Result<ResolvedValue<'c>, ScalarError>;
}

/// JSON representation chosen for a scalar type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Boolean,
    Number,
    Text,
}

/// Built-in mapping for PostgreSQL type names (already normalized)
fn default_kind(type_name: &str) -> ScalarKind {
    match type_name {
        // === BOOLEAN ===
        "bool" | "boolean" => ScalarKind::Boolean,

        // === INTEGERS ===
        "int2" | "smallint" | "smallserial" => ScalarKind::Number,
        "int4" | "integer" | "int" | "serial" => ScalarKind::Number,
        "int8" | "bigint" | "bigserial" => ScalarKind::Number,
        "oid" => ScalarKind::Number,

        // === FLOATING POINT ===
        "float4" | "real" => ScalarKind::Number,
        "float8" | "double precision" | "float" => ScalarKind::Number,

        // === DECIMAL/NUMERIC ===
        "numeric" | "decimal" => ScalarKind::Number,

        // Default: string passthrough (money, dates, uuid, json, ...)
        _ => ScalarKind::Text,
    }
}

/// Lower-case a type name and drop modifiers and schema qualification:
/// `pg_catalog."numeric"(10,2)` → `numeric`,
/// `timestamp(3) with time zone` → `timestamp with time zone`
pub fn normalize_type_name(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len());
    let mut depth = 0usize;
    for c in type_name.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '"' => {}
            _ if depth > 0 => {}
            c => out.extend(c.to_lowercase()),
        }
    }
    let trimmed = out.trim();
    let unqualified = trimmed.strip_prefix("pg_catalog.").unwrap_or(trimmed);
    unqualified.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?`
fn is_json_number(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;

    if bytes.get(i) == Some(&b'-') {
        i += 1;
    }
    match bytes.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => {
            while matches!(bytes.get(i), Some(b'0'..=b'9')) {
                i += 1;
            }
        }
        _ => return false,
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        let digits = i;
        while matches!(bytes.get(i), Some(b'0'..=b'9')) {
            i += 1;
        }
        if i == digits {
            return false;
        }
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let digits = i;
        while matches!(bytes.get(i), Some(b'0'..=b'9')) {
            i += 1;
        }
        if i == digits {
            return false;
        }
    }
    i == bytes.len()
}

/// Default [`ScalarConverter`] with per-type overrides
#[derive(Debug, Clone, Default)]
pub struct ScalarRegistry {
    overrides: HashMap<String, ScalarKind>,
}

impl ScalarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a type name (e.g. a domain or extension type) to a JSON kind
    pub fn register(&mut self, type_name: &str, kind: ScalarKind) -> &mut Self {
        self.overrides.insert(normalize_type_name(type_name), kind);
        self
    }

    pub fn kind_of(&self, type_name: &str) -> ScalarKind {
        let normalized = normalize_type_name(type_name);
        self.overrides
            .get(&normalized)
            .copied()
            .unwrap_or_else(|| default_kind(&normalized))
    }
}

impl ScalarConverter for ScalarRegistry {
    fn convert<'c>(&self, pg_type: &str, text: &str) -> Result<ResolvedValue<'c>, ScalarError> {
        let invalid = |reason: &str| ScalarError {
            pg_type: pg_type.to_string(),
            text: text.to_string(),
            reason: reason.to_string(),
        };

        match self.kind_of(pg_type) {
            ScalarKind::Boolean => {
                if text.eq_ignore_ascii_case("t") || text.eq_ignore_ascii_case("true") {
                    Ok(ResolvedValue::Bool(true))
                } else if text.eq_ignore_ascii_case("f") || text.eq_ignore_ascii_case("false") {
                    Ok(ResolvedValue::Bool(false))
                } else {
                    Err(invalid("not a boolean"))
                }
            }
            ScalarKind::Number => {
                if is_json_number(text) {
                    Ok(ResolvedValue::Number(text.to_string()))
                } else if matches!(text, "NaN" | "Infinity" | "-Infinity") {
                    // JSON has no literal for these
                    Ok(ResolvedValue::String(text.to_string()))
                } else {
                    Err(invalid("not a number"))
                }
            }
            ScalarKind::Text => Ok(ResolvedValue::String(text.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(pg_type: &str, text: &str) -> Result<ResolvedValue<'static>, ScalarError> {
        ScalarRegistry::new().convert(pg_type, text)
    }

    #[test]
    fn test_booleans() {
        assert_eq!(convert("bool", "t").unwrap(), ResolvedValue::Bool(true));
        assert_eq!(convert("boolean", "f").unwrap(), ResolvedValue::Bool(false));
        assert!(convert("bool", "maybe").is_err());
    }

    #[test]
    fn test_numbers_keep_text() {
        assert_eq!(convert("int4", "42").unwrap(), ResolvedValue::number("42"));
        assert_eq!(convert("int8", "-9223372036854775808").unwrap(), ResolvedValue::number("-9223372036854775808"));
        assert_eq!(
            convert("numeric(30,10)", "12345678901234567890.1234567890").unwrap(),
            ResolvedValue::number("12345678901234567890.1234567890")
        );
        assert_eq!(convert("double precision", "1e+308").unwrap(), ResolvedValue::number("1e+308"));
        assert_eq!(convert("float4", "-1.5e-07").unwrap(), ResolvedValue::number("-1.5e-07"));
    }

    #[test]
    fn test_non_finite_numbers_become_strings() {
        assert_eq!(convert("float8", "NaN").unwrap(), ResolvedValue::string("NaN"));
        assert_eq!(convert("numeric", "-Infinity").unwrap(), ResolvedValue::string("-Infinity"));
    }

    #[test]
    fn test_invalid_numbers() {
        for bad in ["", "abc", "01", "1.", ".5", "1e", "+1", "1 "] {
            assert!(convert("int4", bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_passthrough_types() {
        assert_eq!(
            convert("timestamp with time zone", "2024-01-02 03:04:05+00").unwrap(),
            ResolvedValue::string("2024-01-02 03:04:05+00")
        );
        assert_eq!(
            convert("uuid", "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").unwrap(),
            ResolvedValue::string("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11")
        );
        assert_eq!(convert("jsonb", "{\"a\": 1}").unwrap(), ResolvedValue::string("{\"a\": 1}"));
        assert_eq!(convert("money", "$1.00").unwrap(), ResolvedValue::string("$1.00"));
    }

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(normalize_type_name("pg_catalog.\"numeric\"(10,2)"), "numeric");
        assert_eq!(normalize_type_name("character varying(20)"), "character varying");
        assert_eq!(normalize_type_name("timestamp(3) with time zone"), "timestamp with time zone");
        assert_eq!(normalize_type_name("INTEGER"), "integer");
    }

    #[test]
    fn test_register_override() {
        let mut registry = ScalarRegistry::new();
        registry.register("positive_int", ScalarKind::Number);
        assert_eq!(registry.convert("positive_int", "7").unwrap(), ResolvedValue::number("7"));
        assert_eq!(registry.kind_of("money"), ScalarKind::Text);
    }
}
