//! REST surface for operators and seated agents.
//!
//! Everything here is read-only except action submission and the forced
//! session end. Snapshots never include the deck or anyone's hole cards;
//! those only ever reach agents over their own notify URLs.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::chain::{parse_u128_value, ActionKind};
use crate::engine;
use crate::session::TableSnapshot;
use crate::DealerState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub tables: usize,
}

#[derive(Deserialize)]
pub struct ActionRequest {
    pub seat: u32,
    pub action: String,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub status: &'static str,
}

/// GET /health
pub async fn health(State(state): State<DealerState>) -> Json<HealthResponse> {
    let tables = state.tables.read().await.len();
    Json(HealthResponse {
        status: "ok",
        tables,
    })
}

/// GET /tables
///
/// Every table currently under management.
pub async fn list_tables(State(state): State<DealerState>) -> Json<Vec<TableSnapshot>> {
    let tables = state.tables.read().await;
    let mut snapshots: Vec<TableSnapshot> = tables.values().map(|s| s.snapshot()).collect();
    snapshots.sort_by_key(|s| s.table_id);
    Json(snapshots)
}

/// GET /tables/:table_id
pub async fn get_table(
    State(state): State<DealerState>,
    Path(table_id): Path<u32>,
) -> Result<Json<TableSnapshot>, StatusCode> {
    let tables = state.tables.read().await;
    match tables.get(&table_id) {
        Some(session) => Ok(Json(session.snapshot())),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// POST /tables/:table_id/action
///
/// Submit a betting action for the seat whose turn it is. Amounts arrive
/// as decimal strings since chip counts can exceed what a JSON number
/// holds; only call and raise carry one.
pub async fn submit_action(
    State(state): State<DealerState>,
    Path(table_id): Path<u32>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<OkResponse>, StatusCode> {
    let action = ActionKind::parse(&req.action).ok_or_else(|| {
        tracing::warn!("table {}: unknown action {:?}", table_id, req.action);
        StatusCode::BAD_REQUEST
    })?;
    let amount = match &req.amount {
        Some(value) => parse_u128_value(value).ok_or_else(|| {
            tracing::warn!("table {}: unparseable amount {}", table_id, value);
            StatusCode::BAD_REQUEST
        })?,
        None => 0,
    };

    engine::submit_agent_action(&state, table_id, req.seat, action, amount)
        .await
        .map_err(|e| {
            tracing::warn!("table {}: action rejected: {}", table_id, e);
            e.status_code()
        })?;

    Ok(Json(OkResponse { status: "ok" }))
}

/// POST /tables/:table_id/end
///
/// Settle and end the session now, whatever state it is in.
pub async fn end_table(
    State(state): State<DealerState>,
    Path(table_id): Path<u32>,
) -> Result<Json<OkResponse>, StatusCode> {
    engine::force_end(&state, table_id).await.map_err(|e| {
        tracing::error!("table {}: forced end failed: {}", table_id, e);
        e.status_code()
    })?;
    Ok(Json(OkResponse { status: "ok" }))
}
