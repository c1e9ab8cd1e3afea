//! HTTP routes of the explorer
//!
//! The front page and the default block listing are answered from the
//! refresher's cache; everything else is a pass-through call to the node.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::data::{IndexData, IndexProvider};
use crate::refresh::{RefreshStatus, Refresher};
use crate::rpc::{KernelSignature, RpcError};

/// Largest `limit` accepted by `/blocks`
pub const MAX_PAGE_LIMIT: u64 = 100;

const CACHE_HEADER: &str = "x-cache";

/// Shared state handed to every route
#[derive(Debug, Clone)]
pub struct AppState {
    refresher: Arc<Refresher<IndexData>>,
    provider: IndexProvider,
}

impl AppState {
    pub fn new(refresher: Arc<Refresher<IndexData>>, provider: IndexProvider) -> Self {
        Self {
            refresher,
            provider,
        }
    }
}

/// Errors returned by route handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no data yet")]
    NoData,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("base node request failed: {0}")]
    Node(#[from] RpcError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NoData => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Node(err) => {
                warn!(error = %err, "Base node request failed");
                StatusCode::BAD_GATEWAY
            }
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Builds the explorer router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/blocks", get(list_blocks))
        .route("/blocks/:height", get(block_at_height))
        .route("/tip", get(tip))
        .route("/mempool", get(mempool))
        .route("/version", get(version))
        .route("/validator-nodes", get(validator_nodes))
        .route("/search/utxos", get(search_utxos))
        .route("/search/kernels", get(search_kernels))
        .route("/search/payrefs", get(search_payment_references))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Serialize)]
struct CachedIndex<'a> {
    #[serde(flatten)]
    index: &'a IndexData,
    cached_at: Option<DateTime<Utc>>,
}

/// GET / - cached front page data
async fn index(State(state): State<AppState>) -> Result<Response, ApiError> {
    let snapshot = state.refresher.peek();
    let index = snapshot.payload.ok_or(ApiError::NoData)?;
    let body = CachedIndex {
        index: &index,
        cached_at: snapshot.last_success_at,
    };
    Ok(Json(body).into_response())
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    offset: Option<u64>,
    limit: Option<u64>,
}

/// GET /blocks - recent blocks, cached only for the configured query shape
async fn list_blocks(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let config = state.refresher.config();
    let offset = query.offset.unwrap_or(config.query_offset);
    let limit = query.limit.unwrap_or(config.query_limit);

    // The configured shape is always accepted, whatever its limit
    let cached_shape = state.refresher.serves(offset, limit);
    if cached_shape {
        if let Some(index) = state.refresher.peek().payload {
            return Ok(([(CACHE_HEADER, "hit")], Json(index.blocks.clone())).into_response());
        }
    } else if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_LIMIT
        )));
    }

    let index = state
        .provider
        .fetch_index(offset, limit)
        .await?
        .ok_or(ApiError::NoData)?;
    Ok(([(CACHE_HEADER, "miss")], Json(index.blocks)).into_response())
}

/// GET /blocks/:height
async fn block_at_height(
    State(state): State<AppState>,
    Path(height): Path<u64>,
) -> Result<Response, ApiError> {
    let block = state
        .provider
        .client()
        .get_blocks(vec![height])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound(format!("no block at height {}", height)))?;
    Ok(Json(block).into_response())
}

/// GET /tip
async fn tip(State(state): State<AppState>) -> Result<Response, ApiError> {
    let tip = state.provider.client().get_tip_info().await?;
    Ok(Json(tip).into_response())
}

/// GET /mempool
async fn mempool(State(state): State<AppState>) -> Result<Response, ApiError> {
    let transactions = state.provider.client().get_mempool_transactions().await?;
    Ok(Json(transactions).into_response())
}

/// GET /version
async fn version(State(state): State<AppState>) -> Result<Response, ApiError> {
    let version = state.provider.client().get_version().await?;
    Ok(Json(version).into_response())
}

#[derive(Debug, Deserialize)]
struct HeightQuery {
    height: Option<u64>,
}

/// GET /validator-nodes - active set at `height`, or at the tip when omitted
async fn validator_nodes(
    State(state): State<AppState>,
    Query(query): Query<HeightQuery>,
) -> Result<Response, ApiError> {
    let client = state.provider.client();
    let height = match query.height {
        Some(height) => height,
        None => client
            .get_tip_info()
            .await?
            .metadata
            .map(|metadata| metadata.best_block_height)
            .ok_or(ApiError::NoData)?,
    };
    let nodes = client.get_active_validator_nodes(height).await?;
    Ok(Json(nodes).into_response())
}

#[derive(Debug, Deserialize)]
struct CommitmentQuery {
    commitment: String,
}

/// GET /search/utxos?commitment=
async fn search_utxos(
    State(state): State<AppState>,
    Query(query): Query<CommitmentQuery>,
) -> Result<Response, ApiError> {
    let blocks = state
        .provider
        .client()
        .search_utxos(vec![query.commitment])
        .await?;
    Ok(Json(blocks).into_response())
}

#[derive(Debug, Deserialize)]
struct KernelQuery {
    nonce: String,
    signature: String,
}

/// GET /search/kernels?nonce=&signature=
async fn search_kernels(
    State(state): State<AppState>,
    Query(query): Query<KernelQuery>,
) -> Result<Response, ApiError> {
    let signature = KernelSignature {
        public_nonce: query.nonce,
        signature: query.signature,
    };
    let blocks = state
        .provider
        .client()
        .search_kernels(vec![signature])
        .await?;
    Ok(Json(blocks).into_response())
}

#[derive(Debug, Deserialize)]
struct PayrefQuery {
    payref: String,
}

/// GET /search/payrefs?payref=
async fn search_payment_references(
    State(state): State<AppState>,
    Query(query): Query<PayrefQuery>,
) -> Result<Response, ApiError> {
    let matches = state
        .provider
        .client()
        .search_payment_references(vec![query.payref])
        .await?;
    Ok(Json(matches).into_response())
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    #[serde(flatten)]
    refresh: RefreshStatus,
}

/// GET /healthz - 200 while the cached index for the default shape is fresh
async fn healthz(State(state): State<AppState>) -> Response {
    let config = state.refresher.config();
    let fresh = state
        .refresher
        .is_fresh(config.query_offset, config.query_limit);
    let (code, status) = if fresh {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "stale")
    };
    let body = HealthBody {
        status,
        refresh: state.refresher.status(),
    };
    (code, Json(body)).into_response()
}
