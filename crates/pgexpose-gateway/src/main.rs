//! pgexpose Gateway Service
//!
//! Exposes PostgreSQL relations and routines over HTTP:
//! - `GET /api/{schema}/{name}` reads a table or view
//! - `POST /api/rpc/{schema}/{name}` calls a function
//! - Composite and array results are decoded from PostgreSQL's text
//!   encoding into nested JSON and streamed to the client
//! - Prometheus metrics (/metrics)

mod catalog;
mod endpoint;
mod errors;
mod executor;
mod http_api;
mod metrics;
mod state;
mod telemetry;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pgexpose_codec::naming::converter_for;
use pgexpose_codec::{ResolveOptions, ScalarRegistry};
use pgexpose_common::config::{load_from_env, DatabaseConfig};
use pgexpose_common::{NameConversion, SerializationSettings};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::{AppState, Registry};

#[derive(Parser, Debug)]
#[command(name = "pgexpose-gateway")]
#[command(about = "pgexpose Gateway - PostgreSQL relations and routines as streamed JSON")]
struct Args {
    /// REST API port
    #[arg(long, env = "HTTP_PORT", default_value = "8080")]
    http_port: u16,

    /// PostgreSQL connection URL (overrides PGEXPOSE_DATABASE_URL)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Schemas to expose, comma separated
    #[arg(long, env = "PGEXPOSE_SCHEMAS", value_delimiter = ',', default_value = "public")]
    schemas: Vec<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Maximum database connections
    #[arg(long, env = "MAX_CONNECTIONS")]
    max_connections: Option<u32>,

    /// Object key conversion (camel_case, identity)
    #[arg(long, env = "NAME_CONVERSION")]
    name_conversion: Option<NameConversion>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    telemetry::init(&telemetry::settings_from_env(&args.log_level))?;

    let mut database: DatabaseConfig = load_from_env("PGEXPOSE_DATABASE")?;
    if let Some(url) = args.database_url.clone() {
        database.url = url;
    }
    if let Some(max) = args.max_connections {
        database.max_connections = max;
    }

    let mut serialization: SerializationSettings = load_from_env("PGEXPOSE_SERIALIZATION")?;
    if let Some(conversion) = args.name_conversion {
        serialization.name_conversion = conversion;
    }

    info!("Starting pgexpose Gateway");
    info!("  HTTP port: {}", args.http_port);
    info!("  Schemas: {}", args.schemas.join(", "));
    info!("  Max connections: {}", database.max_connections);
    info!(
        "  Serialization: nested composites={}, names={:?}",
        serialization.resolve_nested_composite_types, serialization.name_conversion
    );

    metrics::init_metrics();

    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .min_connections(database.min_connections)
        .acquire_timeout(Duration::from_secs(database.connect_timeout_secs))
        .connect(&database.url)
        .await?;
    info!("Database connection established");

    let registry = Arc::new(Registry::new());
    let schemas = Arc::new(args.schemas.clone());
    if let Err(e) = registry.refresh(&pool, &schemas).await {
        // stays not-ready until POST /api/refresh succeeds
        warn!("Initial schema load failed: {}", e);
    }

    let state = AppState {
        pool,
        registry,
        schemas,
        scalars: Arc::new(ScalarRegistry::new()),
        names: Arc::from(converter_for(serialization.name_conversion)),
        options: ResolveOptions::from(&serialization),
    };

    // CORS layer for browser clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let http_addr: SocketAddr = format!("0.0.0.0:{}", args.http_port).parse()?;
    let app = http_api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("HTTP server listening on {}", http_addr);
    info!("  /api/endpoints - Exposed relations and routines");
    info!("  /metrics - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("pgexpose Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down pgexpose Gateway");
}
