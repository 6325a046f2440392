//! Shared test doubles for the engine and settlement tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::chain::{
    ActionKind, AgentInfo, ChainError, ChainGateway, ChainTableState, TableInfo,
};
use crate::config::DealerConfig;
use crate::deck::{DeckState, DECK_SIZE};
use crate::notify::AgentNotifier;
use crate::scheduler::TurnScheduler;
use crate::settlement::{SettlementError, SettlementReport, SettlementSink};
use crate::DealerState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    Deal {
        table_id: u32,
        commitment: String,
    },
    Action {
        table_id: u32,
        seat: u32,
        action: ActionKind,
        amount: u128,
    },
    Resolve {
        table_id: u32,
        winning_seat: u32,
    },
    End {
        table_id: u32,
    },
}

/// In-memory stand-in for the escrow contract node.
pub struct MockGateway {
    table_info: Mutex<TableInfo>,
    agent_infos: Mutex<HashMap<u32, AgentInfo>>,
    calls: Mutex<Vec<GatewayCall>>,
    fail_submits: Mutex<bool>,
    fail_reads: Mutex<bool>,
    end_on_resolve: Mutex<bool>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            table_info: Mutex::new(TableInfo {
                state: ChainTableState::Playing,
                agent_count: 0,
                session_length: 5,
                current_hand: 0,
                prize_pool: 0,
            }),
            agent_infos: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_submits: Mutex::new(false),
            fail_reads: Mutex::new(false),
            end_on_resolve: Mutex::new(false),
        }
    }

    pub fn set_table_state(&self, state: ChainTableState) {
        self.table_info.lock().unwrap().state = state;
    }

    pub fn set_agent_count(&self, count: u32) {
        self.table_info.lock().unwrap().agent_count = count;
    }

    pub fn set_session_length(&self, hands: u32) {
        self.table_info.lock().unwrap().session_length = hands;
    }

    pub fn set_agent_chips(&self, seat: u32, chips: u128) {
        self.agent_infos.lock().unwrap().insert(
            seat,
            AgentInfo {
                identity: format!("agent-{}", seat),
                chips,
                missed_turns: 0,
                kicked: false,
            },
        );
    }

    pub fn set_agent_kicked(&self, seat: u32, kicked: bool) {
        if let Some(info) = self.agent_infos.lock().unwrap().get_mut(&seat) {
            info.kicked = kicked;
        }
    }

    pub fn set_fail_submits(&self, fail: bool) {
        *self.fail_submits.lock().unwrap() = fail;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    /// When set, `resolve_hand` flips the chain table state to `Ended`, the
    /// way the contract does once the configured hand count is played out.
    pub fn set_end_on_resolve(&self, end: bool) {
        *self.end_on_resolve.lock().unwrap() = end;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn action_calls(&self) -> Vec<(u32, ActionKind)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Action { seat, action, .. } => Some((seat, action)),
                _ => None,
            })
            .collect()
    }

    fn check_submit(&self, op: &'static str) -> Result<(), ChainError> {
        if *self.fail_submits.lock().unwrap() {
            return Err(ChainError::Rejected {
                op,
                message: "mock gateway set to fail submissions".to_string(),
            });
        }
        Ok(())
    }
}

// Every method yields once before answering, the way a network call
// suspends, so timer and cancellation paths behave as they do in production.
#[async_trait]
impl ChainGateway for MockGateway {
    async fn read_table_info(&self, _table_id: u32) -> Result<TableInfo, ChainError> {
        tokio::task::yield_now().await;
        if *self.fail_reads.lock().unwrap() {
            return Err(ChainError::Rejected {
                op: "read_table_info",
                message: "mock gateway set to fail reads".to_string(),
            });
        }
        Ok(self.table_info.lock().unwrap().clone())
    }

    async fn read_agent_info(&self, _table_id: u32, seat: u32) -> Result<AgentInfo, ChainError> {
        tokio::task::yield_now().await;
        if *self.fail_reads.lock().unwrap() {
            return Err(ChainError::Rejected {
                op: "read_agent_info",
                message: "mock gateway set to fail reads".to_string(),
            });
        }
        self.agent_infos
            .lock()
            .unwrap()
            .get(&seat)
            .cloned()
            .ok_or(ChainError::Rejected {
                op: "read_agent_info",
                message: format!("no agent at seat {}", seat),
            })
    }

    async fn deal_hand(&self, table_id: u32, commitment: &str) -> Result<(), ChainError> {
        tokio::task::yield_now().await;
        self.check_submit("deal_hand")?;
        self.calls.lock().unwrap().push(GatewayCall::Deal {
            table_id,
            commitment: commitment.to_string(),
        });
        Ok(())
    }

    async fn submit_action(
        &self,
        table_id: u32,
        seat: u32,
        action: ActionKind,
        amount: u128,
    ) -> Result<(), ChainError> {
        tokio::task::yield_now().await;
        self.check_submit("submit_action")?;
        self.calls.lock().unwrap().push(GatewayCall::Action {
            table_id,
            seat,
            action,
            amount,
        });
        Ok(())
    }

    async fn resolve_hand(&self, table_id: u32, winning_seat: u32) -> Result<(), ChainError> {
        tokio::task::yield_now().await;
        self.check_submit("resolve_hand")?;
        self.calls.lock().unwrap().push(GatewayCall::Resolve {
            table_id,
            winning_seat,
        });
        if *self.end_on_resolve.lock().unwrap() {
            self.table_info.lock().unwrap().state = ChainTableState::Ended;
        }
        Ok(())
    }

    async fn end_session(&self, table_id: u32) -> Result<(), ChainError> {
        tokio::task::yield_now().await;
        self.check_submit("end_session")?;
        self.calls
            .lock()
            .unwrap()
            .push(GatewayCall::End { table_id });
        self.table_info.lock().unwrap().state = ChainTableState::Ended;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSink {
    reports: Mutex<Vec<SettlementReport>>,
    fail: Mutex<bool>,
}

impl MockSink {
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn reports(&self) -> Vec<SettlementReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettlementSink for MockSink {
    async fn report(&self, report: &SettlementReport) -> Result<(), SettlementError> {
        if *self.fail.lock().unwrap() {
            return Err(SettlementError::Rejected(
                "mock sink set to fail".to_string(),
            ));
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

pub fn test_config() -> DealerConfig {
    DealerConfig {
        chain_rpc_url: "http://chain.test".to_string(),
        matchmaking_url: "http://matchmaking.test".to_string(),
        settlement_url: "http://settlement.test".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        turn_timeout: Duration::from_secs(30),
        inter_hand_delay: Duration::from_secs(3),
        discovery_interval: Duration::from_secs(10),
        notify_timeout: Duration::from_secs(3),
        event_poll_timeout: Duration::from_secs(25),
        event_reconnect_delay: Duration::from_secs(5),
    }
}

pub fn test_state() -> (DealerState, Arc<MockGateway>, Arc<MockSink>) {
    let gateway = Arc::new(MockGateway::new());
    let sink = Arc::new(MockSink::default());
    let state = DealerState {
        tables: Arc::new(RwLock::new(HashMap::new())),
        gateway: gateway.clone(),
        scheduler: Arc::new(TurnScheduler::new()),
        notifier: AgentNotifier::new(Duration::from_millis(100)),
        sink: sink.clone(),
        config: test_config(),
        shutdown: CancellationToken::new(),
        tasks: TaskTracker::new(),
    };
    (state, gateway, sink)
}

/// Deck whose first slots are exactly `prefix`, padded with the unused
/// cards in ascending order.
pub fn deck_with_prefix(prefix: &[u32]) -> DeckState {
    let mut cards: Vec<u32> = prefix.to_vec();
    for card in 0..DECK_SIZE as u32 {
        if !prefix.contains(&card) {
            cards.push(card);
        }
    }
    assert_eq!(cards.len(), DECK_SIZE);
    DeckState { cards }
}
