//! JSON-shaped intermediate value tree

/// Result of resolving one slot
///
/// Object keys borrow the declared field names from the type catalog, so a
/// resolved tree lives no longer than the catalog snapshot it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedValue<'c> {
    Null,
    Bool(bool),
    /// Numeric literal kept exactly as PostgreSQL printed it
    Number(String),
    String(String),
    /// Fields in declaration order
    Object(Vec<(&'c str, ResolvedValue<'c>)>),
    Array(Vec<ResolvedValue<'c>>),
}

impl<'c> ResolvedValue<'c> {
    pub fn is_null(&self) -> bool {
        matches!(self, ResolvedValue::Null)
    }

    pub fn string(text: impl Into<String>) -> Self {
        ResolvedValue::String(text.into())
    }

    pub fn number(text: impl Into<String>) -> Self {
        ResolvedValue::Number(text.into())
    }

    /// Look up an object field by declared name
    pub fn get(&self, name: &str) -> Option<&ResolvedValue<'c>> {
        match self {
            ResolvedValue::Object(fields) => fields
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ResolvedValue<'c>]> {
        match self {
            ResolvedValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_lookup() {
        let value = ResolvedValue::Object(vec![
            ("id", ResolvedValue::number("1")),
            ("name", ResolvedValue::Null),
        ]);
        assert_eq!(value.get("id"), Some(&ResolvedValue::Number("1".into())));
        assert!(value.get("name").unwrap().is_null());
        assert_eq!(value.get("missing"), None);
        assert_eq!(ResolvedValue::Null.get("id"), None);
    }

    #[test]
    fn test_accessors() {
        let value = ResolvedValue::Array(vec![ResolvedValue::string("a")]);
        assert_eq!(value.as_array().unwrap()[0].as_str(), Some("a"));
        assert_eq!(ResolvedValue::Bool(true).as_str(), None);
    }
}
