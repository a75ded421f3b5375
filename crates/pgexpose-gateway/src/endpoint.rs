//! Exposed endpoints
//!
//! An endpoint is a relation (`GET /api/{schema}/{name}`) or a routine
//! (`POST /api/rpc/{schema}/{name}`) together with the row layout its
//! results are encoded with.

use pgexpose_codec::RowLayout;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Table, view, materialized view or foreign table
    Relation,
    /// Function
    Routine,
}

/// JSON shape of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// `[{...}, ...]`
    Rows,
    /// `{...}` or `null` when no row came back
    SingleRow,
    /// The bare value of a one-column result
    SingleValue,
    /// No body
    Void,
}

/// Named routine input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Declared type, used to cast the text argument
    pub pg_type: String,
    pub variadic: bool,
}

impl Parameter {
    pub fn is_array(&self) -> bool {
        self.pg_type.ends_with("[]")
    }
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub schema: String,
    pub name: String,
    pub kind: EndpointKind,
    pub shape: ResultShape,
    pub params: Vec<Parameter>,
    pub layout: RowLayout,
}

impl Endpoint {
    pub fn key(&self) -> String {
        endpoint_key(&self.schema, &self.name)
    }

    pub fn path(&self) -> String {
        match self.kind {
            EndpointKind::Relation => format!("/api/{}/{}", self.schema, self.name),
            EndpointKind::Routine => format!("/api/rpc/{}/{}", self.schema, self.name),
        }
    }

    pub fn method(&self) -> &'static str {
        match self.kind {
            EndpointKind::Relation => "GET",
            EndpointKind::Routine => "POST",
        }
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }
}

pub fn endpoint_key(schema: &str, name: &str) -> String {
    format!("{}.{}", schema, name)
}

/// A routine comment containing a line `nested` keeps composite result
/// columns as objects instead of flattening them into the row.
pub fn has_nested_annotation(comment: Option<&str>) -> bool {
    comment
        .map(|c| c.lines().any(|line| line.trim().eq_ignore_ascii_case("nested")))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_annotation() {
        assert!(has_nested_annotation(Some("Returns people\n  NESTED \n")));
        assert!(has_nested_annotation(Some("nested")));
        assert!(!has_nested_annotation(Some("not nested here")));
        assert!(!has_nested_annotation(None));
    }

    #[test]
    fn test_paths() {
        let endpoint = Endpoint {
            schema: "public".into(),
            name: "get_people".into(),
            kind: EndpointKind::Routine,
            shape: ResultShape::Rows,
            params: vec![],
            layout: RowLayout::default(),
        };
        assert_eq!(endpoint.path(), "/api/rpc/public/get_people");
        assert_eq!(endpoint.method(), "POST");
        assert_eq!(endpoint.key(), "public.get_people");
    }
}
