//! Composite/array value resolver
//!
//! Recursively decodes PostgreSQL's text encoding of a value against its
//! [`TypeDescriptor`](crate::TypeDescriptor) into a [`ResolvedValue`] tree.
//!
//! ## Null disambiguation
//!
//! Nullness of a slot is read exactly once, from the driver (for a column)
//! or from the scanner (for a field or element), before recursing. It is
//! never inferred from decoded children, so `(,)` resolves to an object
//! whose fields are all `null`, while a NULL composite slot resolves to
//! `null`.
//!
//! ## Top-level multi-dimensional composite arrays
//!
//! When a result column is an array of composites with two or more
//! dimensions, the innermost composites are kept as PostgreSQL tuple text
//! (`"(1,a)"`) instead of objects. The same array appearing as a field of
//! a composite is fully expanded. Clients depend on this asymmetry.

use tracing::debug;

use crate::descriptor::{Field, TypeCatalog, TypeDescriptor, TypeId, TypeKind};
use crate::error::{DecodeError, ScanError, ScanErrorKind};
use crate::scalar::ScalarConverter;
use crate::scanner::{scan, RawSlot, ScanMode};
use crate::value::ResolvedValue;
use pgexpose_common::SerializationSettings;

/// Resolver behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// When false, composites below the result column are emitted as tuple
    /// text instead of objects.
    pub resolve_nested_composites: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            resolve_nested_composites: true,
        }
    }
}

impl From<&SerializationSettings> for ResolveOptions {
    fn from(settings: &SerializationSettings) -> Self {
        Self {
            resolve_nested_composites: settings.resolve_nested_composite_types,
        }
    }
}

/// Where a value sits relative to the result row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// The result column itself
    Column,
    /// A field or element somewhere below the column
    Nested,
}

/// Source value of one slot
#[derive(Debug, Clone, Copy)]
enum Slot<'t> {
    SqlNull,
    Present(&'t str),
}

impl<'t> Slot<'t> {
    fn from_raw(raw: &'t RawSlot<'_>) -> Self {
        if raw.is_sql_null {
            Slot::SqlNull
        } else {
            Slot::Present(raw.text.as_ref())
        }
    }
}

/// Decodes column text against a shared catalog
#[derive(Clone, Copy)]
pub struct Resolver<'c> {
    catalog: &'c TypeCatalog,
    scalars: &'c dyn ScalarConverter,
    options: ResolveOptions,
}

impl<'c> Resolver<'c> {
    pub fn new(catalog: &'c TypeCatalog, scalars: &'c dyn ScalarConverter, options: ResolveOptions) -> Self {
        Self {
            catalog,
            scalars,
            options,
        }
    }

    pub fn catalog(&self) -> &'c TypeCatalog {
        self.catalog
    }

    /// Resolve one result column
    pub fn resolve(&self, text: &str, ty: TypeId, is_sql_null: bool) -> Result<ResolvedValue<'c>, DecodeError> {
        let slot = if is_sql_null {
            Slot::SqlNull
        } else {
            Slot::Present(text)
        };
        self.resolve_slot(slot, ty, Position::Column).inspect_err(|err| {
            debug!(
                type_name = %self.catalog.display_name(ty),
                error = %err,
                "Failed to resolve column value"
            );
        })
    }

    /// Resolve a driver value where `None` is SQL NULL
    pub fn resolve_column(&self, raw: Option<&str>, ty: TypeId) -> Result<ResolvedValue<'c>, DecodeError> {
        match raw {
            Some(text) => self.resolve(text, ty, false),
            None => self.resolve("", ty, true),
        }
    }

    fn resolve_slot(&self, slot: Slot<'_>, ty: TypeId, position: Position) -> Result<ResolvedValue<'c>, DecodeError> {
        let text = match slot {
            Slot::SqlNull => return Ok(ResolvedValue::Null),
            Slot::Present(text) => text,
        };

        let catalog = self.catalog;
        let descriptor = catalog.get(ty);
        match &descriptor.kind {
            TypeKind::Scalar => Ok(self.scalars.convert(&descriptor.pg_type_name, text)?),
            TypeKind::Composite { fields } => {
                if position == Position::Nested && !self.options.resolve_nested_composites {
                    return Ok(ResolvedValue::String(text.to_string()));
                }
                self.resolve_composite(text, descriptor, fields)
            }
            TypeKind::Array { element, .. } => self.resolve_array(text, ty, *element, position),
        }
    }

    fn resolve_composite(
        &self,
        text: &str,
        descriptor: &'c TypeDescriptor,
        fields: &'c [Field],
    ) -> Result<ResolvedValue<'c>, DecodeError> {
        let slots = scan(text, ScanMode::Record).map_err(|source| DecodeError::Scan {
            type_name: descriptor.pg_type_name.clone(),
            source,
        })?;

        // `()` is how PostgreSQL prints a composite with no columns
        if fields.is_empty() && slots.len() == 1 && slots[0].is_sql_null {
            return Ok(ResolvedValue::Object(Vec::new()));
        }

        if slots.len() != fields.len() {
            return Err(DecodeError::TypeMismatch {
                type_name: descriptor.pg_type_name.clone(),
                expected: fields.len(),
                found: slots.len(),
            });
        }

        let mut object = Vec::with_capacity(fields.len());
        for (field, raw) in fields.iter().zip(&slots) {
            let value = self.resolve_slot(Slot::from_raw(raw), field.ty, Position::Nested)?;
            object.push((field.name.as_str(), value));
        }
        Ok(ResolvedValue::Object(object))
    }

    fn resolve_array(
        &self,
        text: &str,
        array_ty: TypeId,
        element: TypeId,
        position: Position,
    ) -> Result<ResolvedValue<'c>, DecodeError> {
        self.resolve_level(text, array_ty, element, position, false)
            .map(|(value, _)| value)
    }

    /// Resolve one dimension; `inner` is true below the outermost braces.
    ///
    /// Also returns the extent of each dimension from this level down, so
    /// sibling sub-arrays of different shapes are rejected.
    fn resolve_level(
        &self,
        text: &str,
        array_ty: TypeId,
        element: TypeId,
        position: Position,
        inner: bool,
    ) -> Result<(ResolvedValue<'c>, Vec<usize>), DecodeError> {
        let slots = scan(text, ScanMode::Array).map_err(|source| DecodeError::Scan {
            type_name: self.catalog.display_name(array_ty),
            source,
        })?;

        let opaque_composites =
            position == Position::Column && inner && self.catalog.get(element).is_composite();

        let mut items = Vec::with_capacity(slots.len());
        let mut sub_shape: Option<Vec<usize>> = None;
        for raw in &slots {
            let item = if raw.is_sql_null {
                ResolvedValue::Null
            } else if raw.is_group {
                let (value, shape) = self.resolve_level(&raw.text, array_ty, element, position, true)?;
                match &sub_shape {
                    Some(expected) if *expected != shape => {
                        return Err(DecodeError::Scan {
                            type_name: self.catalog.display_name(array_ty),
                            source: ScanError {
                                position: raw.offset,
                                kind: ScanErrorKind::MismatchedDimensions,
                                context: "array",
                            },
                        });
                    }
                    Some(_) => {}
                    None => sub_shape = Some(shape),
                }
                value
            } else if opaque_composites {
                ResolvedValue::String(raw.text.to_string())
            } else {
                self.resolve_slot(Slot::Present(raw.text.as_ref()), element, Position::Nested)?
            };
            items.push(item);
        }

        let mut shape = vec![slots.len()];
        shape.extend(sub_shape.unwrap_or_default());
        Ok((ResolvedValue::Array(items), shape))
    }
}
