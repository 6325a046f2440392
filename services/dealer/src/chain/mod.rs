//! On-chain escrow contract access.
//!
//! The dealer never holds funds. Buy-ins, chip movement, kicks and payouts
//! all live in the escrow contract; this module is the dealer's view of it:
//! typed reads, transaction submission and the event feed.

pub mod events;
pub mod rpc;

pub use events::{ChainEventFeed, EventFeedConfig};
pub use rpc::RpcGateway;

use async_trait::async_trait;
use thiserror::Error;

/// Hard cap on seats per table, mirrored from the contract.
pub const MAX_AGENTS: u32 = 8;

/// Table lifecycle states as stored by the contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainTableState {
    Open,
    Playing,
    Ended,
    Cancelled,
}

impl ChainTableState {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(ChainTableState::Open),
            1 => Some(ChainTableState::Playing),
            2 => Some(ChainTableState::Ended),
            3 => Some(ChainTableState::Cancelled),
            _ => None,
        }
    }
}

/// Betting actions accepted by the contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Raise,
}

impl ActionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fold" => Some(ActionKind::Fold),
            "check" => Some(ActionKind::Check),
            "call" => Some(ActionKind::Call),
            "raise" => Some(ActionKind::Raise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Fold => "fold",
            ActionKind::Check => "check",
            ActionKind::Call => "call",
            ActionKind::Raise => "raise",
        }
    }
}

/// Contract-side table snapshot.
#[derive(Clone, Debug)]
pub struct TableInfo {
    pub state: ChainTableState,
    pub agent_count: u32,
    pub session_length: u32,
    pub current_hand: u32,
    pub prize_pool: u128,
}

/// Contract-side per-seat record.
#[derive(Clone, Debug)]
pub struct AgentInfo {
    pub identity: String,
    pub chips: u128,
    pub missed_turns: u32,
    pub kicked: bool,
}

/// Events emitted by the contract that the dealer reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    SessionEnded { table_id: u32 },
    AgentKicked { table_id: u32, seat: u32 },
    HandResolved { table_id: u32, winning_seat: u32 },
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chain rejected {op}: {message}")]
    Rejected { op: &'static str, message: String },

    #[error("malformed chain response for {op}: {detail}")]
    Malformed { op: &'static str, detail: String },
}

/// Everything the dealer does against the contract goes through this trait,
/// so tests can drive the engine without a node.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn read_table_info(&self, table_id: u32) -> Result<TableInfo, ChainError>;

    async fn read_agent_info(&self, table_id: u32, seat: u32) -> Result<AgentInfo, ChainError>;

    /// Record a deck commitment and start the next hand.
    async fn deal_hand(&self, table_id: u32, commitment: &str) -> Result<(), ChainError>;

    /// Submit a betting action on behalf of a seat.
    async fn submit_action(
        &self,
        table_id: u32,
        seat: u32,
        action: ActionKind,
        amount: u128,
    ) -> Result<(), ChainError>;

    /// Report the showdown winner so the contract moves the pot.
    async fn resolve_hand(&self, table_id: u32, winning_seat: u32) -> Result<(), ChainError>;

    /// Ask the contract to close the session and release escrow.
    async fn end_session(&self, table_id: u32) -> Result<(), ChainError>;
}

pub(crate) fn parse_u128_value(value: &serde_json::Value) -> Option<u128> {
    match value {
        serde_json::Value::String(s) => s.parse::<u128>().ok(),
        serde_json::Value::Number(n) => n.as_u64().map(|v| v as u128),
        _ => None,
    }
}

pub(crate) fn parse_u32_value(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::String(s) => s.parse::<u32>().ok(),
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        _ => None,
    }
}
