//! Row-level JSON encoding
//!
//! Applies the endpoint's presentation policy on top of the resolver: a
//! composite result column is either flattened into the row object (its
//! fields become row keys) or, when the endpoint is marked `nested`, kept as
//! an object under the column name.
//!
//! A row is fully resolved before its first byte is written, so a decode
//! failure never leaves a half-written row in the output.

use std::io::Write;

use crate::descriptor::TypeId;
use crate::encoder::{encode, write_key};
use crate::error::{DecodeError, EncodeError};
use crate::naming::NameConverter;
use crate::resolver::Resolver;
use crate::value::ResolvedValue;

/// One result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: TypeId,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Result columns of an endpoint plus its nesting policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowLayout {
    pub columns: Vec<Column>,
    /// Keep composite columns as objects keyed by column name
    pub nested: bool,
}

/// Encodes driver rows for one layout
pub struct RowEncoder<'a> {
    resolver: Resolver<'a>,
    names: &'a dyn NameConverter,
    layout: &'a RowLayout,
}

impl<'a> RowEncoder<'a> {
    pub fn new(resolver: Resolver<'a>, names: &'a dyn NameConverter, layout: &'a RowLayout) -> Self {
        Self {
            resolver,
            names,
            layout,
        }
    }

    fn resolve_row(&self, raw: &[Option<&str>]) -> Result<Vec<ResolvedValue<'a>>, DecodeError> {
        if raw.len() != self.layout.columns.len() {
            return Err(DecodeError::TypeMismatch {
                type_name: "result row".to_string(),
                expected: self.layout.columns.len(),
                found: raw.len(),
            });
        }
        self.layout
            .columns
            .iter()
            .zip(raw)
            .map(|(column, text)| self.resolver.resolve_column(*text, column.ty))
            .collect()
    }

    /// Write one row as a JSON object
    pub fn encode_row<W>(&self, raw: &[Option<&str>], out: &mut W) -> Result<(), EncodeError>
    where
        W: Write + ?Sized,
    {
        let values = self.resolve_row(raw)?;
        let catalog = self.resolver.catalog();

        out.write_all(b"{")?;
        let mut first = true;
        let mut separator = |out: &mut W| -> std::io::Result<()> {
            if first {
                first = false;
                Ok(())
            } else {
                out.write_all(b",")
            }
        };

        for (column, value) in self.layout.columns.iter().zip(&values) {
            let descriptor = catalog.get(column.ty);
            if self.layout.nested || !descriptor.is_composite() {
                separator(out)?;
                write_key(&column.name, self.names, out)?;
                encode(value, self.names, out)?;
                continue;
            }

            match value {
                ResolvedValue::Object(fields) => {
                    for (name, field) in fields {
                        separator(out)?;
                        write_key(name, self.names, out)?;
                        encode(field, self.names, out)?;
                    }
                }
                // a NULL composite flattens to all-null fields
                ResolvedValue::Null => {
                    for field in descriptor.fields() {
                        separator(out)?;
                        write_key(&field.name, self.names, out)?;
                        out.write_all(b"null")?;
                    }
                }
                other => {
                    separator(out)?;
                    write_key(&column.name, self.names, out)?;
                    encode(other, self.names, out)?;
                }
            }
        }

        out.write_all(b"}")?;
        Ok(())
    }

    /// Write the single column of a scalar-returning routine.
    ///
    /// The value is written bare unless the layout is nested, in which case
    /// it is wrapped in an object keyed by the column name.
    pub fn encode_value<W>(&self, raw: Option<&str>, out: &mut W) -> Result<(), EncodeError>
    where
        W: Write + ?Sized,
    {
        let values = self.resolve_row(&[raw])?;
        let column = &self.layout.columns[0];

        if self.layout.nested {
            out.write_all(b"{")?;
            write_key(&column.name, self.names, out)?;
            encode(&values[0], self.names, out)?;
            out.write_all(b"}")?;
        } else {
            encode(&values[0], self.names, out)?;
        }
        Ok(())
    }
}
