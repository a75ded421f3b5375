//! Property-based tests for resolve + encode
//!
//! Generates random type shapes (scalars, composites, one-dimensional
//! arrays nested inside each other) together with a matching value, prints
//! the value the way PostgreSQL's `record_out`/`array_out` do, and checks
//! that decoding and encoding yields the same JSON as building the value
//! directly with serde_json.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use crate::descriptor::{TypeCatalogBuilder, TypeId};
use crate::encoder::to_json_string;
use crate::naming::Identity;
use crate::resolver::{ResolveOptions, Resolver};
use crate::scalar::ScalarRegistry;

#[derive(Debug, Clone)]
enum Shape {
    Int,
    Bool,
    Text,
    Composite(Vec<Shape>),
    Array(Box<Shape>),
}

#[derive(Debug, Clone)]
enum Sample {
    Null,
    Int(i32),
    Bool(bool),
    Text(String),
    Row(Vec<Sample>),
    List(Vec<Sample>),
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![Just(Shape::Int), Just(Shape::Bool), Just(Shape::Text)];
    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Shape::Composite),
            inner.prop_map(|element| match element {
                // an array of arrays is a second dimension, not a new type
                Shape::Array(_) => Shape::Array(Box::new(Shape::Composite(vec![element]))),
                other => Shape::Array(Box::new(other)),
            }),
        ]
    })
}

fn arb_sample(shape: &Shape) -> BoxedStrategy<Sample> {
    let present = match shape {
        Shape::Int => any::<i32>().prop_map(Sample::Int).boxed(),
        Shape::Bool => any::<bool>().prop_map(Sample::Bool).boxed(),
        Shape::Text => prop_oneof![
            Just("NULL".to_string()),
            Just(String::new()),
            r#"[a-zA-Z0-9 ,(){}"\\\n\t'é漢🎉]{0,10}"#,
        ]
        .prop_map(Sample::Text)
        .boxed(),
        Shape::Composite(fields) => fields
            .iter()
            .map(arb_sample)
            .collect::<Vec<_>>()
            .prop_map(Sample::Row)
            .boxed(),
        Shape::Array(element) => prop::collection::vec(arb_sample(element), 0..4)
            .prop_map(Sample::List)
            .boxed(),
    };
    prop_oneof![1 => Just(Sample::Null), 4 => present].boxed()
}

fn arb_case() -> impl Strategy<Value = (Shape, Sample)> {
    arb_shape().prop_flat_map(|shape| {
        let sample = arb_sample(&shape);
        (Just(shape), sample)
    })
}

fn declare(b: &mut TypeCatalogBuilder, shape: &Shape, next: &mut usize) -> TypeId {
    match shape {
        Shape::Int => b.scalar("int4"),
        Shape::Bool => b.scalar("bool"),
        Shape::Text => b.scalar("text"),
        Shape::Composite(fields) => {
            let declared: Vec<(String, TypeId)> = fields
                .iter()
                .enumerate()
                .map(|(i, field)| (format!("f{i}"), declare(b, field, next)))
                .collect();
            *next += 1;
            b.composite(format!("row_{next}"), declared).unwrap()
        }
        Shape::Array(element) => {
            let element = declare(b, element, next);
            b.array(element, 1).unwrap()
        }
    }
}

/// `record_out` quoting
fn record_field(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text
            .chars()
            .any(|c| matches!(c, '"' | '\\' | '(' | ')' | ',') || c.is_ascii_whitespace());
    if !needs_quotes {
        return text.to_string();
    }
    let mut out = String::from("\"");
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push(c);
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// `array_out` quoting
fn array_element(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text.eq_ignore_ascii_case("NULL")
        || text
            .chars()
            .any(|c| matches!(c, '"' | '\\' | '{' | '}' | ',') || c.is_ascii_whitespace());
    if !needs_quotes {
        return text.to_string();
    }
    let mut out = String::from("\"");
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn pg_text(sample: &Sample) -> Option<String> {
    match sample {
        Sample::Null => None,
        Sample::Int(i) => Some(i.to_string()),
        Sample::Bool(b) => Some(if *b { "t" } else { "f" }.to_string()),
        Sample::Text(t) => Some(t.clone()),
        Sample::Row(fields) => {
            let parts: Vec<String> = fields
                .iter()
                .map(|f| pg_text(f).map(|t| record_field(&t)).unwrap_or_default())
                .collect();
            Some(format!("({})", parts.join(",")))
        }
        Sample::List(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| pg_text(item).map_or_else(|| "NULL".to_string(), |t| array_element(&t)))
                .collect();
            Some(format!("{{{}}}", parts.join(",")))
        }
    }
}

fn expected(sample: &Sample) -> Value {
    match sample {
        Sample::Null => Value::Null,
        Sample::Int(i) => json!(i),
        Sample::Bool(b) => json!(b),
        Sample::Text(t) => json!(t),
        Sample::Row(fields) => Value::Object(
            fields
                .iter()
                .enumerate()
                .map(|(i, f)| (format!("f{i}"), expected(f)))
                .collect::<Map<String, Value>>(),
        ),
        Sample::List(items) => Value::Array(items.iter().map(expected).collect()),
    }
}

proptest! {
    /// Decoding PostgreSQL text and encoding it gives the value's own JSON
    #[test]
    fn test_resolve_then_encode_matches_value((shape, sample) in arb_case()) {
        let mut builder = TypeCatalogBuilder::new();
        let ty = declare(&mut builder, &shape, &mut 0);
        let catalog = builder.build();
        let scalars = ScalarRegistry::new();
        let resolver = Resolver::new(&catalog, &scalars, ResolveOptions::default());

        let text = pg_text(&sample);
        let resolved = resolver.resolve_column(text.as_deref(), ty);
        prop_assert!(resolved.is_ok(), "{:?} failed on {:?}", resolved, text);

        let json = to_json_string(&resolved.unwrap(), &Identity).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, expected(&sample), "text: {:?}", text);
    }
}
