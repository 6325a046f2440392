//! In-memory state for one managed table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::deck::{format_card, DeckState};

/// Live sessions keyed by table id. Owned by the discovery loop, shared
/// with the state machine and the admin API.
pub type TableRegistry = Arc<RwLock<HashMap<u32, TableSession>>>;

/// One seat's participant, fixed for the life of the session.
#[derive(Clone, Debug)]
pub struct SeatAgent {
    pub identity: String,
    /// Agent endpoint for hole/community card pushes, if it supplied one.
    pub notify_url: Option<String>,
}

/// Dealer-side lifecycle of one table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    Initializing,
    DealingHand,
    AwaitingAction,
    AdvancingRound,
    Showdown,
    SettlingSession,
    Ended,
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct TableSession {
    pub table_id: u32,
    /// Off-chain record this session settles against.
    pub external_ref: String,
    /// Seat order fixed at discovery; index = seat number.
    pub seat_agents: Vec<SeatAgent>,
    /// Seats eligible to act, ascending. Recomputed from chain state at the
    /// start of every hand; never shrunk locally mid-hand.
    pub active_seats: Vec<u32>,
    /// Current hand's shuffled deck. Never exposed outside the process.
    pub deck: DeckState,
    /// Hole cards per active seat. Leaves the process only over the
    /// best-effort agent notification channel.
    pub hole_cards: HashMap<u32, [u32; 2]>,
    pub community_cards: Vec<u32>,
    /// 0=preflop, 1=flop, 2=turn, 3=river.
    pub betting_round: u8,
    /// Seats that have acted in the current betting round.
    pub acted_seats: HashSet<u32>,
    pub current_turn_seat: u32,
    pub current_hand: u32,
    pub session_length: u32,
    pub state: TableState,
    /// Serializes state-changing operations for this table. Held across an
    /// entire operation including its chain calls.
    pub op_lock: Arc<Mutex<()>>,
}

impl TableSession {
    pub fn new(
        table_id: u32,
        external_ref: String,
        seat_agents: Vec<SeatAgent>,
        session_length: u32,
        current_hand: u32,
    ) -> Self {
        Self {
            table_id,
            external_ref,
            seat_agents,
            active_seats: Vec::new(),
            deck: DeckState::default(),
            hole_cards: HashMap::new(),
            community_cards: Vec::new(),
            betting_round: 0,
            acted_seats: HashSet::new(),
            current_turn_seat: 0,
            current_hand,
            session_length,
            state: TableState::Initializing,
            op_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn first_active_seat(&self) -> Option<u32> {
        self.active_seats.first().copied()
    }

    /// Next seat after `seat` in cyclic active order.
    pub fn next_active_seat(&self, seat: u32) -> Option<u32> {
        match self.active_seats.iter().find(|&&s| s > seat) {
            Some(&s) => Some(s),
            None => self.active_seats.first().copied(),
        }
    }

    /// Public view of the table. Carries no deck or hole cards.
    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            table_id: self.table_id,
            external_ref: self.external_ref.clone(),
            state: self.state,
            current_hand: self.current_hand,
            session_length: self.session_length,
            betting_round: self.betting_round,
            active_seats: self.active_seats.clone(),
            current_turn_seat: self.current_turn_seat,
            community_cards: self
                .community_cards
                .iter()
                .map(|&c| format_card(c))
                .collect(),
            seats: self
                .seat_agents
                .iter()
                .enumerate()
                .map(|(seat, agent)| SeatView {
                    seat: seat as u32,
                    identity: agent.identity.clone(),
                    active: self.active_seats.contains(&(seat as u32)),
                    acted: self.acted_seats.contains(&(seat as u32)),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TableSnapshot {
    pub table_id: u32,
    pub external_ref: String,
    pub state: TableState,
    pub current_hand: u32,
    pub session_length: u32,
    pub betting_round: u8,
    pub active_seats: Vec<u32>,
    pub current_turn_seat: u32,
    pub community_cards: Vec<String>,
    pub seats: Vec<SeatView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SeatView {
    pub seat: u32,
    pub identity: String,
    pub active: bool,
    pub acted: bool,
}
