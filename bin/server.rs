// Address Registry - Search Server
// REST API over the canonical registry with Axum

use addr_registry::search::DEFAULT_LIMIT;
use addr_registry::{count_object_sources, count_rows, setup_database, AddressSearchEngine, ObjectKind, Table};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const AUTOCOMPLETE_LIMIT: usize = 10;

#[derive(Debug, Parser)]
#[command(name = "addr-server", version, about = "Address search API over the canonical registry")]
struct Cli {
    /// SQLite registry file
    #[arg(long, env = "ADDR_DB_PATH")]
    db: PathBuf,

    /// Listen address
    #[arg(long, env = "ADDR_SERVER_ADDR", default_value = "0.0.0.0:3000")]
    addr: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    engine: Arc<AddressSearchEngine>,
}

impl AppState {
    fn conn(&self) -> std::result::Result<MutexGuard<'_, Connection>, Response> {
        self.db.lock().map_err(|_| {
            error!("registry connection lock poisoned");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "registry unavailable".to_string())
        })
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

fn failure(status: StatusCode, message: String) -> Response {
    let body = ApiResponse {
        success: false,
        data: (),
        error: Some(message),
    };
    (status, Json(body)).into_response()
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct AutocompleteParams {
    partial: String,
    object_type: Option<String>,
}

#[derive(Serialize)]
struct AddressResponse {
    building_id: i64,
    full_address: String,
}

#[derive(Serialize)]
struct StatsResponse {
    tables: BTreeMap<&'static str, i64>,
    object_sources: i64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/search?query=&limit= - Free-text address search
async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    if params.query.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "query must not be empty".to_string());
    }
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    match state.engine.search_by_free_text(&conn, &params.query, limit) {
        Ok(results) => (StatusCode::OK, Json(ApiResponse::ok(results))).into_response(),
        Err(e) => {
            error!(query = %params.query, error = %e, "search failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/autocomplete?partial=&object_type= - Name completions
async fn autocomplete(State(state): State<AppState>, Query(params): Query<AutocompleteParams>) -> Response {
    let kind = match params.object_type.as_deref() {
        None => ObjectKind::Street,
        Some(value) => match ObjectKind::parse(value) {
            Some(kind) => kind,
            None => return failure(StatusCode::BAD_REQUEST, format!("unknown object_type: {}", value)),
        },
    };
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    match state.engine.autocomplete(&conn, &params.partial, kind, AUTOCOMPLETE_LIMIT) {
        Ok(names) => (StatusCode::OK, Json(ApiResponse::ok(names))).into_response(),
        Err(e) => {
            error!(partial = %params.partial, error = %e, "autocomplete failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/address/:building_id - Rendered address of a building
async fn get_address(State(state): State<AppState>, Path(building_id): Path<i64>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    match state.engine.full_address(&conn, building_id) {
        Ok(Some(full_address)) => {
            let body = AddressResponse {
                building_id,
                full_address,
            };
            (StatusCode::OK, Json(ApiResponse::ok(body))).into_response()
        }
        Ok(None) => failure(StatusCode::NOT_FOUND, format!("building {} not found", building_id)),
        Err(e) => {
            error!(building_id, error = %e, "address lookup failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/stats - Row counts per canonical table
async fn get_stats(State(state): State<AppState>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    let mut tables = BTreeMap::new();
    for table in Table::ALL {
        match count_rows(&conn, table) {
            Ok(count) => {
                tables.insert(table.name(), count);
            }
            Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    match count_object_sources(&conn) {
        Ok(object_sources) => {
            let body = StatsResponse { tables, object_sources };
            (StatusCode::OK, Json(ApiResponse::ok(body))).into_response()
        }
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/search", get(search))
        .route("/autocomplete", get(autocomplete))
        .route("/address/:building_id", get(get_address))
        .route("/stats", get(get_stats))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();

    println!("🌐 Address Registry - Search Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if !cli.db.exists() {
        anyhow::bail!("database not found at {} (run addr-migrate first)", cli.db.display());
    }

    let conn = Connection::open(&cli.db).with_context(|| format!("opening {}", cli.db.display()))?;
    setup_database(&conn)?;
    info!(path = %cli.db.display(), "registry opened");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        engine: Arc::new(AddressSearchEngine::new()),
    };

    let listener = tokio::net::TcpListener::bind(&cli.addr)
        .await
        .with_context(|| format!("binding {}", cli.addr))?;

    println!("\n🚀 Server running on http://{}", cli.addr);
    println!("   API: http://{}/api/search?query=...", cli.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state)).await.context("server stopped")?;
    Ok(())
}
