//! Query execution and streamed JSON output
//!
//! Every output column is cast to `::text` so the driver hands back
//! PostgreSQL's own text encoding, which the codec then decodes against the
//! snapshot's type catalog.
//!
//! A spawned producer fetches rows, encodes each one completely into a row
//! buffer and appends it to the current chunk. Full chunks go through a
//! bounded channel, so a slow client slows the database cursor down rather
//! than growing memory. The handler waits for the first chunk before
//! choosing the HTTP status:
//!
//! - error before any output: a normal error response
//! - error after output started: the body stream is aborted, the client
//!   never sees a truncated but well-formed document

use std::mem;
use std::sync::Arc;

use axum::body::Body;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use pgexpose_codec::{Column, NameConverter, ResolveOptions, Resolver, RowEncoder, ScalarRegistry};
use pgexpose_common::PgExposeError;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::endpoint::{Endpoint, Parameter, ResultShape};
use crate::errors::ApiError;
use crate::metrics;
use crate::state::{AppState, SchemaSnapshot};

/// Chunk size at which buffered rows are handed to the response body
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Chunks buffered between the producer and the client
const CHANNEL_CAPACITY: usize = 8;

// ═══════════════════════════════════════════════════════════════════════════
// SQL BUILDING
// ═══════════════════════════════════════════════════════════════════════════

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Value bound to a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Text(Option<String>),
    Int(Option<i64>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl PreparedQuery {
    fn bound(&self) -> Query<'_, Postgres, PgArguments> {
        let mut query = sqlx::query(&self.sql);
        for bind in &self.binds {
            query = match bind {
                BindValue::Text(v) => query.bind(v.clone()),
                BindValue::Int(v) => query.bind(*v),
            };
        }
        query
    }
}

fn text_columns(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| format!("t.{}::text", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT ... FROM relation` with optional paging
pub fn relation_query(endpoint: &Endpoint, limit: Option<i64>, offset: Option<i64>) -> PreparedQuery {
    let sql = format!(
        "SELECT {} FROM {}.{} AS t LIMIT $1 OFFSET $2",
        text_columns(&endpoint.layout.columns),
        quote_ident(&endpoint.schema),
        quote_ident(&endpoint.name),
    );
    PreparedQuery {
        sql,
        binds: vec![BindValue::Int(limit), BindValue::Int(Some(offset.unwrap_or(0)))],
    }
}

/// Call a routine with named arguments taken from a JSON object.
///
/// Arguments missing from `args` are left out so the routine's defaults
/// apply; unknown names are rejected.
pub fn routine_query(endpoint: &Endpoint, args: &Map<String, Value>) -> Result<PreparedQuery, PgExposeError> {
    if let Some(unknown) = args.keys().find(|k| endpoint.param(k).is_none()) {
        return Err(PgExposeError::InvalidArgument(format!(
            "unknown argument '{}' for {}",
            unknown,
            endpoint.key()
        )));
    }

    let mut binds = Vec::new();
    let mut call_args = Vec::new();
    for param in &endpoint.params {
        let Some(value) = args.get(&param.name) else {
            continue;
        };
        binds.push(BindValue::Text(argument_text(param, value)));
        call_args.push(format!(
            "{}{} => ${}::{}",
            if param.variadic { "VARIADIC " } else { "" },
            quote_ident(&param.name),
            binds.len(),
            param.pg_type
        ));
    }

    let call = format!(
        "{}.{}({})",
        quote_ident(&endpoint.schema),
        quote_ident(&endpoint.name),
        call_args.join(", ")
    );

    let columns = &endpoint.layout.columns;
    let sql = match endpoint.shape {
        ResultShape::Rows | ResultShape::SingleRow => format!(
            "SELECT {} FROM {} AS t({})",
            text_columns(columns),
            call,
            columns.iter().map(|c| quote_ident(&c.name)).collect::<Vec<_>>().join(", ")
        ),
        // a NULL composite result stays a single NULL
        ResultShape::SingleValue => format!("SELECT ({})::text", call),
        ResultShape::Void => format!("SELECT {}", call),
    };

    Ok(PreparedQuery { sql, binds })
}

/// Text form of a JSON argument, cast server-side to the declared type
pub fn argument_text(param: &Parameter, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if param.is_array() => Some(pg_array_literal(items)),
        other => Some(other.to_string()),
    }
}

/// Render a JSON array as a PostgreSQL array literal
pub fn pg_array_literal(items: &[Value]) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match item {
            Value::Null => out.push_str("NULL"),
            Value::Array(inner) => out.push_str(&pg_array_literal(inner)),
            Value::String(s) => push_quoted(&mut out, s),
            other => push_quoted(&mut out, &other.to_string()),
        }
    }
    out.push('}');
    out
}

fn push_quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

// ═══════════════════════════════════════════════════════════════════════════
// STREAMING
// ═══════════════════════════════════════════════════════════════════════════

type Chunk = Result<Bytes, ApiError>;

/// Everything the producer task owns
pub struct Execution {
    pub pool: PgPool,
    pub snapshot: Arc<SchemaSnapshot>,
    pub endpoint: Arc<Endpoint>,
    pub scalars: Arc<ScalarRegistry>,
    pub names: Arc<dyn NameConverter>,
    pub options: ResolveOptions,
}

impl Execution {
    pub fn new(state: &AppState, snapshot: Arc<SchemaSnapshot>, endpoint: Arc<Endpoint>) -> Self {
        Self {
            pool: state.pool.clone(),
            snapshot,
            endpoint,
            scalars: state.scalars.clone(),
            names: state.names.clone(),
            options: state.options,
        }
    }
}

/// Run `query` and return the response body once its first chunk is ready
pub async fn stream(execution: Execution, query: PreparedQuery) -> Result<Body, ApiError> {
    let (tx, mut rx) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);
    tokio::spawn(produce(execution, query, tx));

    match rx.recv().await {
        Some(Ok(first)) => {
            let rest = ReceiverStream::new(rx);
            let body = futures::stream::once(async move { Ok::<Bytes, ApiError>(first) }).chain(rest);
            Ok(Body::from_stream(body))
        }
        Some(Err(e)) => Err(e),
        None => Err(PgExposeError::Internal("result producer exited without output".into()).into()),
    }
}

/// Run a routine that returns nothing
pub async fn execute_void(pool: &PgPool, query: &PreparedQuery) -> Result<(), ApiError> {
    query.bound().execute(pool).await?;
    Ok(())
}

fn row_texts(row: &PgRow, texts: &mut Vec<Option<String>>) -> Result<(), sqlx::Error> {
    texts.clear();
    for i in 0..row.len() {
        texts.push(row.try_get::<Option<String>, _>(i)?);
    }
    Ok(())
}

async fn produce(execution: Execution, query: PreparedQuery, tx: mpsc::Sender<Chunk>) {
    let endpoint = &execution.endpoint;
    let key = endpoint.key();
    let shape = endpoint.shape;

    let resolver = Resolver::new(&execution.snapshot.catalog, execution.scalars.as_ref(), execution.options);
    let encoder = RowEncoder::new(resolver, execution.names.as_ref(), &endpoint.layout);
    let mut writer = ChunkWriter::new(tx, shape);

    let mut rows = query.bound().fetch(&execution.pool);
    let mut texts = Vec::with_capacity(endpoint.layout.columns.len());
    let mut row_buf = Vec::new();

    loop {
        let row = match rows.try_next().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => return writer.fail(e.into()).await,
        };
        if let Err(e) = row_texts(&row, &mut texts) {
            return writer.fail(e.into()).await;
        }

        row_buf.clear();
        let raw: Vec<Option<&str>> = texts.iter().map(|t| t.as_deref()).collect();
        let encoded = match shape {
            ResultShape::SingleValue => encoder.encode_value(raw.first().copied().flatten(), &mut row_buf),
            _ => encoder.encode_row(&raw, &mut row_buf),
        };
        drop(raw);

        if let Err(e) = encoded {
            metrics::record_decode_failure(&key);
            warn!(endpoint = %key, row = writer.rows, "Row could not be serialized: {}", e);
            return writer.fail(PgExposeError::from(e).into()).await;
        }

        if !writer.push_row(&row_buf).await {
            debug!(endpoint = %key, "Client went away, stopping result stream");
            return;
        }
        if shape != ResultShape::Rows {
            break;
        }
    }

    let rows = writer.rows;
    if writer.finish().await {
        metrics::record_rows_serialized(&key, rows);
    }
}

/// Frames encoded rows into the response shape and batches them into chunks
struct ChunkWriter {
    tx: mpsc::Sender<Chunk>,
    shape: ResultShape,
    chunk: Vec<u8>,
    rows: u64,
}

impl ChunkWriter {
    fn new(tx: mpsc::Sender<Chunk>, shape: ResultShape) -> Self {
        Self {
            tx,
            shape,
            chunk: Vec::with_capacity(CHUNK_SIZE),
            rows: 0,
        }
    }

    /// Append one encoded row; false once the receiver is gone
    async fn push_row(&mut self, row: &[u8]) -> bool {
        if self.shape == ResultShape::Rows {
            self.chunk.push(if self.rows == 0 { b'[' } else { b',' });
        }
        self.chunk.extend_from_slice(row);
        self.rows += 1;

        if self.chunk.len() >= CHUNK_SIZE {
            return self.flush().await;
        }
        true
    }

    async fn flush(&mut self) -> bool {
        if self.chunk.is_empty() {
            return true;
        }
        let bytes = Bytes::from(mem::replace(&mut self.chunk, Vec::with_capacity(CHUNK_SIZE)));
        self.tx.send(Ok(bytes)).await.is_ok()
    }

    /// Close the document and send what is left
    async fn finish(mut self) -> bool {
        match (self.shape, self.rows) {
            (ResultShape::Rows, 0) => self.chunk.extend_from_slice(b"[]"),
            (ResultShape::Rows, _) => self.chunk.push(b']'),
            (ResultShape::SingleRow | ResultShape::SingleValue, 0) => self.chunk.extend_from_slice(b"null"),
            _ => {}
        }
        self.flush().await
    }

    async fn fail(self, err: ApiError) {
        let _ = self.tx.send(Err(err)).await;
    }
}
