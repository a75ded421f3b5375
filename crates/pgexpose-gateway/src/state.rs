//! Shared gateway state
//!
//! The current [`SchemaSnapshot`] lives behind a `RwLock<Arc<_>>`. Requests
//! clone the `Arc` and keep using that snapshot until they finish; a refresh
//! introspects into a brand-new snapshot and swaps the pointer, so no
//! request ever observes a half-built catalog.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use pgexpose_codec::{NameConverter, ResolveOptions, ScalarRegistry, TypeCatalog};
use pgexpose_common::{PgExposeError, Result};
use sqlx::PgPool;
use tracing::{error, info};

use crate::catalog;
use crate::endpoint::{endpoint_key, Endpoint};
use crate::metrics;

/// Type catalog plus the endpoints built against it
#[derive(Debug)]
pub struct SchemaSnapshot {
    pub catalog: TypeCatalog,
    pub relations: HashMap<String, Arc<Endpoint>>,
    pub routines: HashMap<String, Arc<Endpoint>>,
    pub loaded_at: SystemTime,
}

impl SchemaSnapshot {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            catalog,
            relations: HashMap::new(),
            routines: HashMap::new(),
            loaded_at: SystemTime::now(),
        }
    }

    pub fn relation(&self, schema: &str, name: &str) -> Option<Arc<Endpoint>> {
        self.relations.get(&endpoint_key(schema, name)).cloned()
    }

    pub fn routine(&self, schema: &str, name: &str) -> Option<Arc<Endpoint>> {
        self.routines.get(&endpoint_key(schema, name)).cloned()
    }

    pub fn endpoint_count(&self) -> usize {
        self.relations.len() + self.routines.len()
    }

    /// All endpoints, sorted by path
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        let mut all: Vec<_> = self
            .relations
            .values()
            .chain(self.routines.values())
            .cloned()
            .collect();
        all.sort_by_key(|e| e.path());
        all
    }
}

/// Holder of the current snapshot
#[derive(Debug, Default)]
pub struct Registry {
    current: RwLock<Option<Arc<SchemaSnapshot>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot in effect, or `None` before the first successful load
    pub fn snapshot(&self) -> Option<Arc<SchemaSnapshot>> {
        self.current.read().clone()
    }

    pub fn install(&self, snapshot: SchemaSnapshot) -> Arc<SchemaSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Some(snapshot.clone());
        snapshot
    }

    /// Introspect the database and swap in the new snapshot.
    ///
    /// On failure the previous snapshot stays in effect.
    pub async fn refresh(&self, pool: &PgPool, schemas: &[String]) -> Result<Arc<SchemaSnapshot>> {
        let started = std::time::Instant::now();
        match catalog::introspect(pool, schemas).await {
            Ok(snapshot) => {
                let count = snapshot.endpoint_count();
                metrics::record_schema_refresh(true, count);
                info!(
                    endpoints = count,
                    types = snapshot.catalog.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Schema snapshot loaded"
                );
                Ok(self.install(snapshot))
            }
            Err(e) => {
                metrics::record_schema_refresh(false, 0);
                error!("Schema refresh failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub registry: Arc<Registry>,
    pub schemas: Arc<Vec<String>>,
    pub scalars: Arc<ScalarRegistry>,
    pub names: Arc<dyn NameConverter>,
    pub options: ResolveOptions,
}

impl AppState {
    /// Current snapshot or 503 when none has been loaded yet
    pub fn snapshot(&self) -> Result<Arc<SchemaSnapshot>> {
        self.registry
            .snapshot()
            .ok_or_else(|| PgExposeError::ServiceUnavailable("schema not loaded yet".into()))
    }
}
