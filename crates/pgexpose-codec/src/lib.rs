//! pgexpose Codec
//!
//! Turns PostgreSQL's text encoding of composite (row) values and arrays
//! into JSON:
//!
//! - [`descriptor`]: immutable type arena built once at schema discovery
//! - [`scanner`]: one-level lexer for `(...)` records and `{...}` arrays
//! - [`resolver`]: recursive decoder producing a [`ResolvedValue`] tree
//! - [`encoder`]: streams a [`ResolvedValue`] as JSON to any `io::Write`
//! - [`row`]: per-row column layout (flattened vs nested composites)
//!
//! Scalar conversion and key naming are injected through the
//! [`ScalarConverter`] and [`NameConverter`] traits.

pub mod descriptor;
pub mod encoder;
pub mod error;
pub mod naming;
pub mod resolver;
pub mod row;
pub mod scalar;
pub mod scanner;
pub mod value;

#[cfg(test)]
mod roundtrip_proptest;

pub use descriptor::{Field, TypeCatalog, TypeCatalogBuilder, TypeDescriptor, TypeId, TypeKind};
pub use encoder::encode;
pub use error::{DecodeError, EncodeError, ScalarError, ScanError, ScanErrorKind};
pub use naming::{CamelCase, Identity, NameConverter};
pub use resolver::{ResolveOptions, Resolver};
pub use row::{Column, RowEncoder, RowLayout};
pub use scalar::{ScalarConverter, ScalarKind, ScalarRegistry};
pub use scanner::{scan, RawSlot, ScanMode};
pub use value::ResolvedValue;
