use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use domain::{CachedPortfolio, HistoryEntry, RefreshOutcome, SnapshotRow};

use crate::{services::RefreshError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/portfolio/cached", get(get_cached))
        .route("/portfolio/refresh", post(refresh_portfolio))
        .route("/portfolio/history", get(get_history))
        .route("/portfolio/snapshots", get(get_snapshots))
}

/// Serves the last committed cycle straight from memory; never touches the
/// oracles or the database.
async fn get_cached(State(state): State<AppState>) -> Json<CachedPortfolio> {
    Json(state.cache.snapshot().await)
}

async fn refresh_portfolio(
    State(state): State<AppState>,
) -> Result<Json<RefreshOutcome>, StatusCode> {
    match state.coordinator.refresh().await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(RefreshError::AlreadyRefreshing) => Err(StatusCode::CONFLICT),
    }
}

#[derive(Debug, serde::Deserialize)]
struct HistoryQuery {
    since: Option<DateTime<Utc>>,
}

async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Json<Vec<HistoryEntry>> {
    let since = params.since.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    Json(state.history.query(since).await)
}

#[derive(Debug, serde::Deserialize)]
struct SnapshotsQuery {
    wallet_id: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// Durable range query against the snapshot log, unlike `/history` which is
/// served from the bounded in-memory buffer.
async fn get_snapshots(
    State(state): State<AppState>,
    Query(params): Query<SnapshotsQuery>,
) -> Result<Json<Vec<SnapshotRow>>, StatusCode> {
    let proxy_address = match params.wallet_id.as_deref() {
        Some(id) => {
            let Some(wallet) = state.registry.get(id) else {
                return Err(StatusCode::NOT_FOUND);
            };
            Some(wallet.proxy_address.clone())
        }
        None => None,
    };

    let from = params.from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let to = params.to.unwrap_or_else(Utc::now);
    let rows = state
        .snapshot_repo
        .query_range(proxy_address.as_deref(), from, to)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(rows))
}
