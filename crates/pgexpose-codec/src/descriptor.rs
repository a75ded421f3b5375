//! Type descriptors for PostgreSQL result values
//!
//! A [`TypeCatalog`] is an arena of immutable [`TypeDescriptor`] nodes built
//! once at schema discovery time. Nodes refer to each other by [`TypeId`],
//! so the whole catalog can be shared behind an `Arc` by any number of
//! concurrent requests without cloning or locking. A schema refresh builds a
//! new catalog; an existing one is never mutated.

use std::collections::HashMap;
use std::fmt;

use crate::error::DescriptorError;

/// Index of a node inside a [`TypeCatalog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One declared field of a composite type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
}

/// Shape of a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Leaf value handed to the scalar converter
    Scalar,
    /// Row type; field order is declaration order and is preserved in output
    Composite { fields: Vec<Field> },
    /// Array of `element`; `dimensions` is the declared dimensionality (≥ 1)
    Array { element: TypeId, dimensions: u32 },
}

/// Description of one PostgreSQL type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// PostgreSQL type name, used for diagnostics and scalar dispatch
    pub pg_type_name: String,
    /// Type OID when the descriptor came from the catalog
    pub oid: Option<u32>,
    pub kind: TypeKind,
}

impl TypeDescriptor {
    pub fn is_composite(&self) -> bool {
        matches!(self.kind, TypeKind::Composite { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }

    /// Declared fields, empty unless this is a composite
    pub fn fields(&self) -> &[Field] {
        match &self.kind {
            TypeKind::Composite { fields } => fields,
            _ => &[],
        }
    }
}

/// Immutable arena of type descriptors
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    nodes: Vec<TypeDescriptor>,
    by_name: HashMap<String, TypeId>,
    by_oid: HashMap<u32, TypeId>,
}

impl TypeCatalog {
    /// Get a descriptor by id.
    ///
    /// Ids are only handed out by the builder of this catalog, so an id from
    /// a different catalog is a programming error and panics.
    #[inline]
    pub fn get(&self, id: TypeId) -> &TypeDescriptor {
        &self.nodes[id.index()]
    }

    pub fn try_get(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.nodes.get(id.index())
    }

    /// Look up a type by its PostgreSQL name
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Look up a type by OID
    pub fn lookup_oid(&self, oid: u32) -> Option<TypeId> {
        self.by_oid.get(&oid).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Human readable name, e.g. `inner[][]` for a two-dimensional array
    pub fn display_name(&self, id: TypeId) -> String {
        let descriptor = self.get(id);
        match descriptor.kind {
            TypeKind::Array { element, dimensions } => {
                let mut name = self.display_name(element);
                for _ in 0..dimensions.max(1) {
                    name.push_str("[]");
                }
                name
            }
            _ => descriptor.pg_type_name.clone(),
        }
    }
}

/// Builder for a [`TypeCatalog`]
///
/// Children must be added before the composites and arrays that use them,
/// which is always possible because PostgreSQL forbids a composite type from
/// containing itself.
#[derive(Debug, Default)]
pub struct TypeCatalogBuilder {
    catalog: TypeCatalog,
}

impl TypeCatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node; a name stays mapped to the first node added under it
    fn push(&mut self, descriptor: TypeDescriptor) -> TypeId {
        let id = TypeId(self.catalog.nodes.len() as u32);
        if let Some(oid) = descriptor.oid {
            self.catalog.by_oid.insert(oid, id);
        }
        self.catalog
            .by_name
            .entry(descriptor.pg_type_name.clone())
            .or_insert(id);
        self.catalog.nodes.push(descriptor);
        id
    }

    /// Add a scalar type, reusing an existing scalar of the same name
    pub fn scalar(&mut self, name: impl Into<String>) -> TypeId {
        let name = name.into();
        if let Some(id) = self.catalog.by_name.get(&name) {
            if matches!(self.catalog.get(*id).kind, TypeKind::Scalar) {
                return *id;
            }
        }
        self.push(TypeDescriptor {
            pg_type_name: name,
            oid: None,
            kind: TypeKind::Scalar,
        })
    }

    /// Add a scalar type known by OID
    pub fn scalar_with_oid(&mut self, name: impl Into<String>, oid: u32) -> TypeId {
        if let Some(id) = self.catalog.by_oid.get(&oid) {
            return *id;
        }
        self.push(TypeDescriptor {
            pg_type_name: name.into(),
            oid: Some(oid),
            kind: TypeKind::Scalar,
        })
    }

    /// Add a composite type with fields in declaration order
    pub fn composite<N, I>(&mut self, name: impl Into<String>, fields: I) -> Result<TypeId, DescriptorError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, TypeId)>,
    {
        self.composite_inner(name.into(), None, fields)
    }

    /// Add a composite type known by OID, reusing one already added
    pub fn composite_with_oid<N, I>(
        &mut self,
        name: impl Into<String>,
        oid: u32,
        fields: I,
    ) -> Result<TypeId, DescriptorError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, TypeId)>,
    {
        if let Some(id) = self.catalog.by_oid.get(&oid) {
            return Ok(*id);
        }
        self.composite_inner(name.into(), Some(oid), fields)
    }

    fn composite_inner<N, I>(
        &mut self,
        name: String,
        oid: Option<u32>,
        fields: I,
    ) -> Result<TypeId, DescriptorError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, TypeId)>,
    {
        let mut declared: Vec<Field> = Vec::new();
        for (field_name, ty) in fields {
            self.check(ty)?;
            let field_name = field_name.into();
            if declared.iter().any(|f| f.name == field_name) {
                return Err(DescriptorError::DuplicateField {
                    type_name: name,
                    field: field_name,
                });
            }
            declared.push(Field { name: field_name, ty });
        }

        Ok(self.push(TypeDescriptor {
            pg_type_name: name,
            oid,
            kind: TypeKind::Composite { fields: declared },
        }))
    }

    /// Add an array of `element`
    pub fn array(&mut self, element: TypeId, dimensions: u32) -> Result<TypeId, DescriptorError> {
        self.array_inner(element, dimensions, None)
    }

    /// Add an array type known by OID
    pub fn array_with_oid(
        &mut self,
        element: TypeId,
        dimensions: u32,
        oid: u32,
    ) -> Result<TypeId, DescriptorError> {
        if let Some(id) = self.catalog.by_oid.get(&oid) {
            return Ok(*id);
        }
        self.array_inner(element, dimensions, Some(oid))
    }

    fn array_inner(
        &mut self,
        element: TypeId,
        dimensions: u32,
        oid: Option<u32>,
    ) -> Result<TypeId, DescriptorError> {
        self.check(element)?;
        if dimensions == 0 {
            return Err(DescriptorError::ZeroDimensions {
                element: self.catalog.get(element).pg_type_name.clone(),
            });
        }
        let pg_type_name = format!("{}[]", self.catalog.get(element).pg_type_name);
        Ok(self.push(TypeDescriptor {
            pg_type_name,
            oid,
            kind: TypeKind::Array { element, dimensions },
        }))
    }

    fn check(&self, id: TypeId) -> Result<(), DescriptorError> {
        if id.index() < self.catalog.nodes.len() {
            Ok(())
        } else {
            Err(DescriptorError::UnknownType(id))
        }
    }

    /// Descriptor added so far
    pub fn get(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.catalog.try_get(id)
    }

    /// Look up a type added so far
    pub fn lookup_oid(&self, oid: u32) -> Option<TypeId> {
        self.catalog.lookup_oid(oid)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.catalog.lookup(name)
    }

    /// Freeze the catalog
    pub fn build(self) -> TypeCatalog {
        self.catalog
    }
}
