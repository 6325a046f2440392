//! JSON-RPC style HTTP gateway to the escrow contract node.
//!
//! Every transaction endpoint answers with `{"status": "ok", "tx_hash": ...}`
//! or `{"status": "error", "message": ...}`; reads answer with plain JSON
//! objects. Amounts travel as decimal strings since u128 does not survive
//! JSON numbers.

use async_trait::async_trait;
use serde::Deserialize;

use crate::chain::{
    parse_u128_value, parse_u32_value, ActionKind, AgentInfo, ChainError, ChainGateway,
    ChainTableState, TableInfo,
};

pub struct RpcGateway {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct TxResponse {
    status: String,
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RpcGateway {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    async fn post_tx(
        &self,
        op: &'static str,
        url: String,
        body: serde_json::Value,
    ) -> Result<(), ChainError> {
        let resp = self.client.post(&url).json(&body).send().await?;

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

        let tx: TxResponse = resp.json().await.map_err(|e| ChainError::Malformed {
            op,
            detail: e.to_string(),
        })?;

        if tx.status != "ok" {
            return Err(ChainError::Rejected {
                op,
                message: tx.message.unwrap_or(tx.status),
            });
        }

        if let Some(hash) = tx.tx_hash {
            tracing::debug!("{} accepted by chain (tx {})", op, hash);
        }
        Ok(())
    }

    async fn get_json(
        &self,
        op: &'static str,
        url: String,
    ) -> Result<serde_json::Value, ChainError> {
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

        resp.json().await.map_err(|e| ChainError::Malformed {
            op,
            detail: e.to_string(),
        })
    }
}

fn missing(op: &'static str, field: &str) -> ChainError {
    ChainError::Malformed {
        op,
        detail: format!("missing or invalid field `{}`", field),
    }
}

#[async_trait]
impl ChainGateway for RpcGateway {
    async fn read_table_info(&self, table_id: u32) -> Result<TableInfo, ChainError> {
        let op = "read_table_info";
        let url = format!("{}/tables/{}", self.base_url, table_id);
        let value = self.get_json(op, url).await?;

        let state = value
            .get("state")
            .and_then(parse_u32_value)
            .and_then(ChainTableState::from_u32)
            .ok_or_else(|| missing(op, "state"))?;
        let agent_count = value
            .get("agent_count")
            .and_then(parse_u32_value)
            .ok_or_else(|| missing(op, "agent_count"))?;
        let session_length = value
            .get("session_length")
            .and_then(parse_u32_value)
            .ok_or_else(|| missing(op, "session_length"))?;
        let current_hand = value
            .get("current_hand")
            .and_then(parse_u32_value)
            .ok_or_else(|| missing(op, "current_hand"))?;
        let prize_pool = value
            .get("prize_pool")
            .and_then(parse_u128_value)
            .ok_or_else(|| missing(op, "prize_pool"))?;

        Ok(TableInfo {
            state,
            agent_count,
            session_length,
            current_hand,
            prize_pool,
        })
    }

    async fn read_agent_info(&self, table_id: u32, seat: u32) -> Result<AgentInfo, ChainError> {
        let op = "read_agent_info";
        let url = format!("{}/tables/{}/agents/{}", self.base_url, table_id, seat);
        let value = self.get_json(op, url).await?;

        let identity = value
            .get("identity")
            .and_then(|v| v.as_str())
            .ok_or_else(|| missing(op, "identity"))?
            .to_string();
        let chips = value
            .get("chips")
            .and_then(parse_u128_value)
            .ok_or_else(|| missing(op, "chips"))?;
        let missed_turns = value
            .get("missed_turns")
            .and_then(parse_u32_value)
            .ok_or_else(|| missing(op, "missed_turns"))?;
        let kicked = value
            .get("kicked")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| missing(op, "kicked"))?;

        Ok(AgentInfo {
            identity,
            chips,
            missed_turns,
            kicked,
        })
    }

    async fn deal_hand(&self, table_id: u32, commitment: &str) -> Result<(), ChainError> {
        let url = format!("{}/tables/{}/deal", self.base_url, table_id);
        self.post_tx(
            "deal_hand",
            url,
            serde_json::json!({ "commitment": commitment }),
        )
        .await
    }

    async fn submit_action(
        &self,
        table_id: u32,
        seat: u32,
        action: ActionKind,
        amount: u128,
    ) -> Result<(), ChainError> {
        let url = format!("{}/tables/{}/action", self.base_url, table_id);
        self.post_tx(
            "submit_action",
            url,
            serde_json::json!({
                "seat": seat,
                "action": action.as_str(),
                "amount": amount.to_string(),
            }),
        )
        .await
    }

    async fn resolve_hand(&self, table_id: u32, winning_seat: u32) -> Result<(), ChainError> {
        let url = format!("{}/tables/{}/resolve", self.base_url, table_id);
        self.post_tx(
            "resolve_hand",
            url,
            serde_json::json!({ "winning_seat": winning_seat }),
        )
        .await
    }

    async fn end_session(&self, table_id: u32) -> Result<(), ChainError> {
        let url = format!("{}/tables/{}/end", self.base_url, table_id);
        self.post_tx("end_session", url, serde_json::json!({})).await
    }
}
