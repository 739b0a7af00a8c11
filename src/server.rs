//! Contributor Ledger Server
//!
//! HTTP API over the ledger. Callers are authenticated upstream; the gateway
//! passes the caller's identity in `X-Actor-Id` and `X-Actor-Role`.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::claim::{Claim, ClaimRequest, ClaimStatus, ClaimStatusStats, ResolveClaimRequest};
use crate::config::Config;
use crate::contributor::{
    ContentAction, ContentEvent, ContentKind, Contributor, PointsEvent, PointsSummary,
    RegisterContributor, Role,
};
use crate::error::{LedgerError, Result};
use crate::ledger::{Ledger, LedgerStore, PointsChange};
use crate::milestone::{milestone_table, MilestoneInfo};
use crate::pg_storage::PgStorage;
use crate::policy::{Actor, RolePolicy};
use crate::storage::SqliteStorage;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

pub struct AppState {
    pub ledger: Ledger,
    pub config: Config,
    /// Name of the active store, reported by /health
    pub backend: &'static str,
    pub started_at: std::time::Instant,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config", get(config_handler))
        .route("/api/claims", post(request_claim_handler).get(list_claims_handler))
        .route("/api/claims/me", get(my_claims_handler))
        .route("/api/claims/stats", get(claim_stats_handler))
        .route("/api/claims/:id", get(get_claim_handler).patch(resolve_claim_handler))
        .route("/api/points/me", get(points_summary_handler))
        .route("/api/points/me/events", get(points_history_handler))
        .route("/api/contributors", post(register_contributor_handler))
        .route("/api/content/events", post(content_event_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// IDENTITY & ERRORS
// ============================================================================

/// Rejection for requests that arrive without a usable identity
#[derive(Debug)]
pub struct MissingIdentity(String);

impl IntoResponse for MissingIdentity {
    fn into_response(self) -> Response {
        error_response(StatusCode::UNAUTHORIZED, self.0, "UNAUTHENTICATED")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = MissingIdentity;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| MissingIdentity("missing X-Actor-Id header".to_string()))?;
        let role = header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| MissingIdentity("missing X-Actor-Role header".to_string()))?
            .parse::<Role>()
            .map_err(|e| MissingIdentity(e.to_string()))?;

        Ok(Actor::new(id, role))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: String,
}

fn error_response(status: StatusCode, message: String, code: &str) -> Response {
    let body = ErrorBody {
        success: false,
        error: message,
        code: code.to_string(),
    };
    (status, Json(body)).into_response()
}

impl LedgerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::InvalidMilestone(_)
            | LedgerError::InvalidRequest(_)
            | LedgerError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            LedgerError::Unauthorized(_) => StatusCode::FORBIDDEN,
            LedgerError::ClaimNotFound(_) | LedgerError::ContributorNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            LedgerError::AlreadyClaimed(_)
            | LedgerError::ClaimAlreadyPending
            | LedgerError::InvalidTransition { .. } => StatusCode::CONFLICT,
            LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let message = match &self {
            LedgerError::Internal(detail) => {
                error!("Ledger store failure: {}", detail);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        error_response(self.status_code(), message, self.code())
    }
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| LedgerError::InvalidRequest(e.body_text()))
}

fn claim_id(path: std::result::Result<Path<Uuid>, PathRejection>) -> Result<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|_| LedgerError::InvalidRequest("claim id must be a UUID".to_string()))
}

// ============================================================================
// SERVICE INFO
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub backend: String,
    pub uptime_secs: u64,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.backend.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub version: String,
    pub milestones: Vec<MilestoneInfo>,
    pub processor_roles: Vec<Role>,
    pub earning_content: Vec<String>,
}

async fn config_handler(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        milestones: milestone_table(),
        processor_roles: state.config.ledger.processor_roles.clone(),
        earning_content: ContentKind::ALL
            .into_iter()
            .filter(|k| k.earns_points())
            .map(|k| k.as_str().to_string())
            .collect(),
    })
}

// ============================================================================
// CLAIMS
// ============================================================================

async fn request_claim_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: std::result::Result<Json<ClaimRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Claim>)> {
    let request = body(payload)?;
    let claim = state.ledger.request_claim(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListClaimsQuery {
    pub status: Option<String>,
    pub contributor: Option<String>,
}

async fn list_claims_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<ListClaimsQuery>,
) -> Result<Json<Vec<Claim>>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<ClaimStatus>)
        .transpose()?;

    if let Some(contributor) = query.contributor.as_deref().filter(|c| !c.is_empty()) {
        let mut claims = state.ledger.list_claims_for(&actor, contributor).await?;
        if let Some(status) = status {
            claims.retain(|c| c.status == status);
        }
        return Ok(Json(claims));
    }

    Ok(Json(state.ledger.list_all_claims(&actor, status).await?))
}

async fn my_claims_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Claim>>> {
    Ok(Json(state.ledger.list_my_claims(&actor).await?))
}

async fn claim_stats_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<ClaimStatusStats>>> {
    Ok(Json(state.ledger.claim_stats(&actor).await?))
}

async fn get_claim_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Claim>> {
    let id = claim_id(path)?;
    Ok(Json(state.ledger.get_claim(&actor, id).await?))
}

async fn resolve_claim_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    path: std::result::Result<Path<Uuid>, PathRejection>,
    payload: std::result::Result<Json<ResolveClaimRequest>, JsonRejection>,
) -> Result<Json<Claim>> {
    let id = claim_id(path)?;
    let request = body(payload)?;
    Ok(Json(state.ledger.resolve_claim(&actor, id, request).await?))
}

// ============================================================================
// POINTS & CONTRIBUTORS
// ============================================================================

async fn points_summary_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<PointsSummary>> {
    Ok(Json(state.ledger.points_summary(&actor).await?))
}

async fn points_history_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<PointsEvent>>> {
    Ok(Json(state.ledger.points_history(&actor).await?))
}

async fn register_contributor_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: std::result::Result<Json<RegisterContributor>, JsonRejection>,
) -> Result<Json<Contributor>> {
    let request = body(payload)?;
    Ok(Json(
        state
            .ledger
            .register_contributor(&actor, &request.id, request.role)
            .await?,
    ))
}

async fn content_event_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: std::result::Result<Json<ContentEvent>, JsonRejection>,
) -> Result<Json<PointsChange>> {
    let event = body(payload)?;

    let change = match event.action {
        ContentAction::Created => {
            if event.author_id.as_deref().is_some_and(|a| a != actor.id) {
                return Err(LedgerError::InvalidRequest(
                    "created content is credited to the acting user".to_string(),
                ));
            }
            state.ledger.record_content_created(&actor, event.kind).await?
        }
        ContentAction::Deleted => {
            let author = event.author_id.unwrap_or_else(|| actor.id.clone());
            state
                .ledger
                .record_content_deleted(&actor, &author, event.kind)
                .await?
        }
    };
    Ok(Json(change))
}

/// Pick the store: PostgreSQL when configured, SQLite otherwise
pub async fn open_store(config: &Config) -> anyhow::Result<(Arc<dyn LedgerStore>, &'static str)> {
    match config.database_url() {
        Some(url) => {
            let store: Arc<dyn LedgerStore> = Arc::new(PgStorage::new(&url, &config.database).await?);
            info!("PostgreSQL storage initialized");
            Ok((store, "postgres"))
        }
        None => {
            warn!(
                "DATABASE_URL not set, using SQLite at {}",
                config.database.sqlite_path
            );
            let store: Arc<dyn LedgerStore> = Arc::new(SqliteStorage::new(&config.database.sqlite_path)?);
            Ok((store, "sqlite"))
        }
    }
}

/// Open the configured store and serve the ledger until the process exits
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let (store, backend) = open_store(&config).await?;
    let policy = Arc::new(RolePolicy::new(config.ledger.processor_roles.clone()));
    run_server(config, Ledger::new(store, policy), backend).await
}

/// Run the server
pub async fn run_server(config: Config, ledger: Ledger, backend: &'static str) -> anyhow::Result<()> {
    let addr = config.bind_address();
    let state = Arc::new(AppState {
        ledger,
        config,
        backend,
        started_at: std::time::Instant::now(),
    });

    let app = create_router(state);

    info!("Starting Contributor Ledger server on {} ({} store)", addr, backend);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
