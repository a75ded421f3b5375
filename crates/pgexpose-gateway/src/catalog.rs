//! Schema introspection
//!
//! Reads `pg_type`, `pg_attribute`, `pg_class` and `pg_proc` in four
//! queries, then builds the type arena and endpoint set without touching
//! the database again:
//!
//! | Source                   | Becomes                                   |
//! |--------------------------|-------------------------------------------|
//! | base / enum / range type | scalar descriptor                         |
//! | domain                   | descriptor of its base type               |
//! | composite type           | composite descriptor, fields in order     |
//! | array type (`elem[]`)    | array descriptor                          |
//! | table / view             | `GET` endpoint, nested composite columns  |
//! | function                 | `POST` endpoint, shape from its outputs   |

use std::collections::HashMap;
use std::sync::Arc;

use pgexpose_codec::{Column, RowLayout, TypeCatalog, TypeCatalogBuilder, TypeId, TypeKind};
use pgexpose_common::{PgExposeError, Result};
use sqlx::postgres::types::Oid;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use crate::endpoint::{has_nested_annotation, Endpoint, EndpointKind, Parameter, ResultShape};
use crate::state::SchemaSnapshot;

pub const RECORD_OID: u32 = 2249;
pub const VOID_OID: u32 = 2278;

/// Composite types nest at most this deep
const MAX_TYPE_DEPTH: usize = 32;

/// One `pg_type` row
#[derive(Debug, Clone)]
pub struct PgTypeRow {
    pub oid: u32,
    /// `format_type` rendering, e.g. `integer[]`, `myschema.point3d`
    pub name: String,
    pub typtype: char,
    pub category: char,
    pub elem: u32,
    pub base: u32,
    pub relid: u32,
}

/// One column of a relation or composite type
#[derive(Debug, Clone)]
pub struct AttributeRow {
    pub name: String,
    pub type_oid: u32,
    pub dims: u32,
}

#[derive(Debug, Clone)]
pub struct RelationRow {
    pub schema: String,
    pub name: String,
    pub relid: u32,
}

#[derive(Debug, Clone)]
pub struct RoutineRow {
    pub schema: String,
    pub name: String,
    pub returns_set: bool,
    pub return_type: u32,
    /// All argument types, including OUT and TABLE columns
    pub arg_types: Vec<u32>,
    /// `i`, `o`, `b`, `v`, `t`; empty when every argument is IN
    pub arg_modes: Vec<String>,
    pub arg_names: Vec<String>,
    pub comment: Option<String>,
}

/// Catalog rows as read from the database
#[derive(Debug, Default)]
pub struct RawCatalog {
    pub types: HashMap<u32, PgTypeRow>,
    /// Keyed by `pg_class` oid, in `attnum` order
    pub attributes: HashMap<u32, Vec<AttributeRow>>,
    pub relations: Vec<RelationRow>,
    pub routines: Vec<RoutineRow>,
}

impl RawCatalog {
    fn type_name(&self, oid: u32) -> Option<&str> {
        self.types.get(&oid).map(|t| t.name.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOADING
// ═══════════════════════════════════════════════════════════════════════════

const TYPES_SQL: &str = r#"
    SELECT t.oid,
           format_type(t.oid, NULL) AS name,
           t.typtype::text AS typtype,
           t.typcategory::text AS category,
           t.typelem AS elem,
           t.typbasetype AS base,
           t.typrelid AS relid
    FROM pg_catalog.pg_type t
"#;

const ATTRIBUTES_SQL: &str = r#"
    SELECT a.attrelid AS relid,
           a.attname::text AS name,
           a.atttypid AS type_oid,
           a.attndims::int4 AS dims
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    WHERE a.attnum > 0
      AND NOT a.attisdropped
      AND c.relkind IN ('r', 'v', 'm', 'f', 'p', 'c')
    ORDER BY a.attrelid, a.attnum
"#;

const RELATIONS_SQL: &str = r#"
    SELECT n.nspname::text AS schema,
           c.relname::text AS name,
           c.oid AS relid
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = ANY($1)
      AND c.relkind IN ('r', 'v', 'm', 'f', 'p')
    ORDER BY n.nspname, c.relname
"#;

const ROUTINES_SQL: &str = r#"
    SELECT n.nspname::text AS schema,
           p.proname::text AS name,
           p.proretset AS returns_set,
           p.prorettype AS return_type,
           COALESCE(p.proallargtypes, p.proargtypes::oid[]) AS arg_types,
           COALESCE(p.proargmodes::text[], ARRAY[]::text[]) AS arg_modes,
           COALESCE(p.proargnames, ARRAY[]::text[]) AS arg_names,
           obj_description(p.oid, 'pg_proc') AS comment
    FROM pg_catalog.pg_proc p
    JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
    WHERE n.nspname = ANY($1)
      AND p.prokind = 'f'
    ORDER BY n.nspname, p.proname, p.oid
"#;

fn first_char(text: &str) -> char {
    text.chars().next().unwrap_or('\0')
}

/// Read the catalog rows for `schemas`
pub async fn load(pool: &PgPool, schemas: &[String]) -> std::result::Result<RawCatalog, sqlx::Error> {
    let mut raw = RawCatalog::default();

    for row in sqlx::query(TYPES_SQL).fetch_all(pool).await? {
        let typtype: String = row.try_get("typtype")?;
        let category: String = row.try_get("category")?;
        let entry = PgTypeRow {
            oid: row.try_get::<Oid, _>("oid")?.0,
            name: row.try_get("name")?,
            typtype: first_char(&typtype),
            category: first_char(&category),
            elem: row.try_get::<Oid, _>("elem")?.0,
            base: row.try_get::<Oid, _>("base")?.0,
            relid: row.try_get::<Oid, _>("relid")?.0,
        };
        raw.types.insert(entry.oid, entry);
    }

    for row in sqlx::query(ATTRIBUTES_SQL).fetch_all(pool).await? {
        let relid = row.try_get::<Oid, _>("relid")?.0;
        let dims: i32 = row.try_get("dims")?;
        raw.attributes.entry(relid).or_default().push(AttributeRow {
            name: row.try_get("name")?,
            type_oid: row.try_get::<Oid, _>("type_oid")?.0,
            dims: dims.max(0) as u32,
        });
    }

    for row in sqlx::query(RELATIONS_SQL).bind(schemas.to_vec()).fetch_all(pool).await? {
        raw.relations.push(RelationRow {
            schema: row.try_get("schema")?,
            name: row.try_get("name")?,
            relid: row.try_get::<Oid, _>("relid")?.0,
        });
    }

    for row in sqlx::query(ROUTINES_SQL).bind(schemas.to_vec()).fetch_all(pool).await? {
        let arg_types: Vec<Oid> = row.try_get("arg_types")?;
        raw.routines.push(RoutineRow {
            schema: row.try_get("schema")?,
            name: row.try_get("name")?,
            returns_set: row.try_get("returns_set")?,
            return_type: row.try_get::<Oid, _>("return_type")?.0,
            arg_types: arg_types.into_iter().map(|oid| oid.0).collect(),
            arg_modes: row.try_get("arg_modes")?,
            arg_names: row.try_get("arg_names")?,
            comment: row.try_get("comment")?,
        });
    }

    debug!(
        types = raw.types.len(),
        relations = raw.relations.len(),
        routines = raw.routines.len(),
        "Catalog rows loaded"
    );
    Ok(raw)
}

/// Load the catalog and build a snapshot from it
pub async fn introspect(pool: &PgPool, schemas: &[String]) -> Result<SchemaSnapshot> {
    let raw = load(pool, schemas)
        .await
        .map_err(|e| PgExposeError::DatabaseError(format!("catalog introspection failed: {}", e)))?;
    build_snapshot(&raw)
}

// ═══════════════════════════════════════════════════════════════════════════
// TYPE RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════

/// Turns `pg_type` oids into arena ids, adding each type once
struct TypeLoader<'r> {
    raw: &'r RawCatalog,
    builder: TypeCatalogBuilder,
    by_oid: HashMap<u32, TypeId>,
    multi_dim: HashMap<(u32, u32), TypeId>,
}

impl<'r> TypeLoader<'r> {
    fn new(raw: &'r RawCatalog) -> Self {
        Self {
            raw,
            builder: TypeCatalogBuilder::new(),
            by_oid: HashMap::new(),
            multi_dim: HashMap::new(),
        }
    }

    fn resolve(&mut self, oid: u32) -> Result<TypeId> {
        self.resolve_at(oid, 0)
    }

    fn resolve_at(&mut self, oid: u32, depth: usize) -> Result<TypeId> {
        if let Some(id) = self.by_oid.get(&oid) {
            return Ok(*id);
        }
        if depth > MAX_TYPE_DEPTH {
            return Err(PgExposeError::CatalogError(format!(
                "type {} nests deeper than {} levels",
                oid, MAX_TYPE_DEPTH
            )));
        }

        let raw = self.raw;
        let row = raw
            .types
            .get(&oid)
            .ok_or_else(|| PgExposeError::CatalogError(format!("unknown type oid {}", oid)))?;

        let id = match row.typtype {
            'd' => self.resolve_at(row.base, depth + 1)?,
            'c' => {
                let attributes = raw.attributes.get(&row.relid).map(Vec::as_slice).unwrap_or_default();
                let mut fields = Vec::with_capacity(attributes.len());
                for attribute in attributes {
                    fields.push((attribute.name.clone(), self.resolve_at(attribute.type_oid, depth + 1)?));
                }
                self.builder.composite_with_oid(row.name.clone(), oid, fields)?
            }
            _ if row.category == 'A' && row.elem != 0 && row.name.ends_with("[]") => {
                let element = self.resolve_at(row.elem, depth + 1)?;
                self.builder.array_with_oid(element, 1, oid)?
            }
            _ => self.builder.scalar_with_oid(row.name.clone(), oid),
        };

        self.by_oid.insert(oid, id);
        Ok(id)
    }

    /// Column type honoring a declared dimensionality above one
    fn resolve_column(&mut self, oid: u32, dims: u32) -> Result<TypeId> {
        let id = self.resolve(oid)?;
        if dims <= 1 {
            return Ok(id);
        }
        let element = match self.builder.get(id).map(|d| &d.kind) {
            Some(TypeKind::Array { element, .. }) => *element,
            _ => return Ok(id),
        };
        if let Some(existing) = self.multi_dim.get(&(oid, dims)) {
            return Ok(*existing);
        }
        let array = self.builder.array(element, dims)?;
        self.multi_dim.insert((oid, dims), array);
        Ok(array)
    }

    fn finish(self) -> TypeCatalog {
        self.builder.build()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENDPOINTS
// ═══════════════════════════════════════════════════════════════════════════

/// Build the type arena and endpoints from catalog rows.
///
/// Objects whose types cannot be described are skipped with a warning
/// rather than failing the whole snapshot.
pub fn build_snapshot(raw: &RawCatalog) -> Result<SchemaSnapshot> {
    let mut loader = TypeLoader::new(raw);
    let mut relations = HashMap::new();
    let mut routines = HashMap::new();

    for relation in &raw.relations {
        match relation_endpoint(&mut loader, relation) {
            Ok(endpoint) => {
                relations.insert(endpoint.key(), Arc::new(endpoint));
            }
            Err(e) => warn!(
                schema = %relation.schema,
                relation = %relation.name,
                "Skipping relation: {}", e
            ),
        }
    }

    for routine in &raw.routines {
        let endpoint = match routine_endpoint(&mut loader, routine) {
            Ok(Some(endpoint)) => endpoint,
            Ok(None) => continue,
            Err(e) => {
                warn!(schema = %routine.schema, routine = %routine.name, "Skipping routine: {}", e);
                continue;
            }
        };
        let key = endpoint.key();
        if routines.contains_key(&key) {
            warn!(routine = %key, "Skipping overload; only the first definition is exposed");
            continue;
        }
        routines.insert(key, Arc::new(endpoint));
    }

    let mut snapshot = SchemaSnapshot::new(loader.finish());
    snapshot.relations = relations;
    snapshot.routines = routines;
    Ok(snapshot)
}

fn relation_endpoint(loader: &mut TypeLoader<'_>, relation: &RelationRow) -> Result<Endpoint> {
    let attributes = loader
        .raw
        .attributes
        .get(&relation.relid)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut columns = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        columns.push(Column::new(
            attribute.name.clone(),
            loader.resolve_column(attribute.type_oid, attribute.dims)?,
        ));
    }

    Ok(Endpoint {
        schema: relation.schema.clone(),
        name: relation.name.clone(),
        kind: EndpointKind::Relation,
        shape: ResultShape::Rows,
        params: Vec::new(),
        layout: RowLayout {
            columns,
            nested: true,
        },
    })
}

fn routine_endpoint(loader: &mut TypeLoader<'_>, routine: &RoutineRow) -> Result<Option<Endpoint>> {
    let raw = loader.raw;
    let mut params = Vec::new();
    let mut outputs = Vec::new();
    let mut has_table_columns = false;

    for (i, &type_oid) in routine.arg_types.iter().enumerate() {
        let mode = routine.arg_modes.get(i).map(String::as_str).unwrap_or("i");
        let name = routine.arg_names.get(i).map(String::as_str).unwrap_or("");

        if matches!(mode, "i" | "b" | "v") {
            if name.is_empty() {
                warn!(
                    schema = %routine.schema,
                    routine = %routine.name,
                    position = i + 1,
                    "Skipping routine with unnamed input argument"
                );
                return Ok(None);
            }
            let pg_type = raw
                .type_name(type_oid)
                .ok_or_else(|| PgExposeError::CatalogError(format!("unknown argument type oid {}", type_oid)))?;
            params.push(Parameter {
                name: name.to_string(),
                pg_type: pg_type.to_string(),
                variadic: mode == "v",
            });
        }
        if matches!(mode, "o" | "b" | "t") {
            has_table_columns |= mode == "t";
            let column_name = if name.is_empty() {
                format!("column{}", i + 1)
            } else {
                name.to_string()
            };
            outputs.push(Column::new(column_name, loader.resolve(type_oid)?));
        }
    }

    let nested = has_nested_annotation(routine.comment.as_deref());
    let (shape, columns) = if outputs.len() == 1 && !has_table_columns && !routine.returns_set {
        (ResultShape::SingleValue, outputs)
    } else if !outputs.is_empty() {
        let shape = if routine.returns_set { ResultShape::Rows } else { ResultShape::SingleRow };
        (shape, outputs)
    } else if routine.return_type == VOID_OID {
        (ResultShape::Void, Vec::new())
    } else if routine.return_type == RECORD_OID {
        warn!(
            schema = %routine.schema,
            routine = %routine.name,
            "Skipping routine returning an undescribed record"
        );
        return Ok(None);
    } else {
        let ty = loader.resolve(routine.return_type)?;
        let fields = loader.builder.get(ty).filter(|d| d.is_composite()).map(|d| {
            d.fields()
                .iter()
                .map(|f| (f.name.clone(), f.ty))
                .collect::<Vec<_>>()
        });
        match (fields, routine.returns_set) {
            // composite results are expanded into their fields
            (Some(fields), set) => {
                let columns = fields.into_iter().map(|(name, ty)| Column::new(name, ty)).collect();
                (if set { ResultShape::Rows } else { ResultShape::SingleRow }, columns)
            }
            (None, true) => (ResultShape::Rows, vec![Column::new(routine.name.clone(), ty)]),
            (None, false) => (ResultShape::SingleValue, vec![Column::new(routine.name.clone(), ty)]),
        }
    };

    Ok(Some(Endpoint {
        schema: routine.schema.clone(),
        name: routine.name.clone(),
        kind: EndpointKind::Routine,
        shape,
        params,
        layout: RowLayout { columns, nested },
    }))
}
