//! Long-poll subscription to the contract's event log.
//!
//! The node exposes `GET /events?cursor=N&wait=S`, holding the request open
//! until events past `N` exist or the wait expires. Decoded events fan out
//! over a broadcast channel; the dispatcher owns all registry access, so a
//! dropped connection here never disturbs running tables. The cursor only
//! advances on a successful batch, so nothing is skipped across reconnects.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::{ChainError, ChainEvent};

const LOG_TARGET: &str = "chain::events";

#[derive(Debug, Clone)]
pub struct EventFeedConfig {
    pub events_url: String,
    pub poll_timeout: Duration,
    pub reconnect_delay: Duration,
    pub broadcast_capacity: usize,
}

pub struct ChainEventFeed {
    cfg: EventFeedConfig,
    client: reqwest::Client,
    tx: broadcast::Sender<ChainEvent>,
    stop: CancellationToken,
}

#[derive(Deserialize)]
struct EventBatch {
    events: Vec<WireEvent>,
    next_cursor: u64,
}

#[derive(Deserialize)]
struct WireEvent {
    kind: String,
    table_id: u32,
    #[serde(default)]
    seat: Option<u32>,
    #[serde(default)]
    winning_seat: Option<u32>,
}

impl WireEvent {
    fn to_event(&self) -> Option<ChainEvent> {
        match self.kind.as_str() {
            "session_ended" => Some(ChainEvent::SessionEnded {
                table_id: self.table_id,
            }),
            "agent_kicked" => self.seat.map(|seat| ChainEvent::AgentKicked {
                table_id: self.table_id,
                seat,
            }),
            "hand_resolved" => self.winning_seat.map(|winning_seat| ChainEvent::HandResolved {
                table_id: self.table_id,
                winning_seat,
            }),
            _ => None,
        }
    }
}

impl ChainEventFeed {
    pub fn new(
        cfg: EventFeedConfig,
        stop: CancellationToken,
    ) -> (Self, broadcast::Receiver<ChainEvent>) {
        let capacity = cfg.broadcast_capacity;
        let (tx, rx) = broadcast::channel(capacity);
        (
            Self {
                cfg,
                client: reqwest::Client::new(),
                tx,
                stop,
            },
            rx,
        )
    }

    pub async fn run(self) {
        info!(target = LOG_TARGET, url = %self.cfg.events_url, "starting chain event feed");
        let mut cursor: u64 = 0;

        while !self.stop.is_cancelled() {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                result = self.poll_once(cursor) => match result {
                    Ok(next_cursor) => {
                        cursor = next_cursor;
                        continue;
                    }
                    Err(err) => {
                        warn!(target = LOG_TARGET, error = %err, "event poll failed");
                    }
                },
            }

            if self.stop.is_cancelled() {
                break;
            }

            debug!(
                target = LOG_TARGET,
                delay_secs = self.cfg.reconnect_delay.as_secs_f32(),
                "waiting before reconnect attempt"
            );
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = sleep(self.cfg.reconnect_delay) => {}
            }
        }

        info!(target = LOG_TARGET, "chain event feed stopped");
    }

    async fn poll_once(&self, cursor: u64) -> Result<u64, ChainError> {
        let op = "poll_events";
        let url = format!(
            "{}?cursor={}&wait={}",
            self.cfg.events_url,
            cursor,
            self.cfg.poll_timeout.as_secs()
        );

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(ChainError::Rejected {
                op,
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let batch: EventBatch = resp.json().await.map_err(|e| ChainError::Malformed {
            op,
            detail: e.to_string(),
        })?;

        for wire in batch.events {
            match wire.to_event() {
                Some(event) => {
                    // Send fails only when no receiver is alive, i.e. during shutdown.
                    let _ = self.tx.send(event);
                }
                None => {
                    debug!(target = LOG_TARGET, kind = %wire.kind, "ignoring unrecognized chain event");
                }
            }
        }

        Ok(batch.next_cursor)
    }
}
