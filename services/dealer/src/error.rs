//! Error taxonomy for table operations.

use axum::http::StatusCode;
use thiserror::Error;

use crate::chain::ChainError;

/// Failures surfaced by table operations. Chain rejections keep their own
/// type so transport problems stay distinguishable from rule violations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("table {0} is not registered with this dealer")]
    UnknownTable(u32),

    #[error("table {table_id}: seat {seat} acted out of turn (expected seat {expected})")]
    OutOfTurn { table_id: u32, seat: u32, expected: u32 },

    #[error("table {0} is not awaiting an action")]
    NotAwaitingAction(u32),

    #[error("table {0} session is already over")]
    SessionOver(u32),

    #[error("table {table_id}: chain reports {chain} agents but {listed} were listed")]
    SeatCountMismatch { table_id: u32, chain: u32, listed: u32 },
}

impl EngineError {
    /// HTTP status for the admin API.
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Chain(_) => StatusCode::BAD_GATEWAY,
            EngineError::UnknownTable(_) => StatusCode::NOT_FOUND,
            EngineError::OutOfTurn { .. } => StatusCode::CONFLICT,
            EngineError::NotAwaitingAction(_) => StatusCode::CONFLICT,
            EngineError::SessionOver(_) => StatusCode::GONE,
            EngineError::SeatCountMismatch { .. } => StatusCode::CONFLICT,
        }
    }
}
