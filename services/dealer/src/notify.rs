//! Best-effort pushes to agent-supplied endpoints.
//!
//! Strictly one-way: hole cards after a deal, community cards on each
//! reveal, and kick notices. Sends run detached with a short per-request
//! timeout; failures are logged at debug and dropped. Game progress never
//! waits on an agent's webhook.

use std::time::Duration;

use crate::deck::format_card;

#[derive(Clone)]
pub struct AgentNotifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl AgentNotifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Push each seat's hole cards to its endpoint.
    pub fn push_hole_cards(&self, table_id: u32, hand: u32, targets: Vec<(u32, String, [u32; 2])>) {
        let notifier = self.clone();
        tokio::spawn(async move {
            let sends = targets.into_iter().map(|(seat, url, cards)| {
                let body = serde_json::json!({
                    "event": "hole_cards",
                    "table_id": table_id,
                    "hand": hand,
                    "seat": seat,
                    "cards": [format_card(cards[0]), format_card(cards[1])],
                });
                notifier.send_one(url, body)
            });
            futures::future::join_all(sends).await;
        });
    }

    /// Push a community reveal to every listed endpoint.
    pub fn push_community(&self, table_id: u32, betting_round: u8, cards: Vec<u32>, urls: Vec<String>) {
        let formatted: Vec<String> = cards.iter().map(|&c| format_card(c)).collect();
        let notifier = self.clone();
        tokio::spawn(async move {
            let sends = urls.into_iter().map(|url| {
                let body = serde_json::json!({
                    "event": "community_cards",
                    "table_id": table_id,
                    "betting_round": betting_round,
                    "cards": formatted,
                });
                notifier.send_one(url, body)
            });
            futures::future::join_all(sends).await;
        });
    }

    /// Tell a kicked seat's agent it is out of the session.
    pub fn push_kick(&self, table_id: u32, seat: u32, url: String) {
        let notifier = self.clone();
        tokio::spawn(async move {
            let body = serde_json::json!({
                "event": "kicked",
                "table_id": table_id,
                "seat": seat,
            });
            notifier.send_one(url, body).await;
        });
    }

    async fn send_one(&self, url: String, body: serde_json::Value) {
        let result = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if !resp.status().is_success() => {
                tracing::debug!(
                    "agent notification to {} answered HTTP {}",
                    url,
                    resp.status()
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("agent notification to {} failed: {}", url, e);
            }
        }
    }
}
