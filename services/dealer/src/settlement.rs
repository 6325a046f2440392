//! Session settlement reporting.
//!
//! When a session ends the dealer reads final chip counts from the chain,
//! picks the chip leader, and posts exactly one settlement request to the
//! external payout service. Payout and fee math live entirely in that
//! service; this module only names the winner.

use async_trait::async_trait;
use thiserror::Error;

use crate::chain::ChainGateway;
use crate::session::SeatAgent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatStanding {
    pub seat: u32,
    pub identity: String,
    pub chips: u128,
}

#[derive(Clone, Debug)]
pub struct SettlementReport {
    pub table_id: u32,
    pub external_ref: String,
    pub winner: SeatStanding,
    pub standings: Vec<SeatStanding>,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("settlement transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("settlement service rejected report: {0}")]
    Rejected(String),

    #[error("no seat standings could be read for table {0}")]
    NoStandings(u32),
}

#[async_trait]
pub trait SettlementSink: Send + Sync {
    async fn report(&self, report: &SettlementReport) -> Result<(), SettlementError>;
}

/// Read final standings from the chain and pick the chip leader.
///
/// A seat whose read fails is logged and left out of the standings rather
/// than failing the whole report; only when no seat at all can be read does
/// the caller get `NoStandings`.
pub async fn build_report(
    gateway: &dyn ChainGateway,
    table_id: u32,
    external_ref: &str,
    seat_agents: &[SeatAgent],
) -> Result<SettlementReport, SettlementError> {
    let mut standings = Vec::new();
    for (seat, agent) in seat_agents.iter().enumerate() {
        let seat = seat as u32;
        match gateway.read_agent_info(table_id, seat).await {
            Ok(info) => standings.push(SeatStanding {
                seat,
                identity: agent.identity.clone(),
                chips: info.chips,
            }),
            Err(e) => {
                tracing::warn!(
                    "table {}: could not read final chips for seat {}: {}",
                    table_id,
                    seat,
                    e
                );
            }
        }
    }

    let winner = chip_leader(&standings)
        .ok_or(SettlementError::NoStandings(table_id))?
        .clone();

    Ok(SettlementReport {
        table_id,
        external_ref: external_ref.to_string(),
        winner,
        standings,
    })
}

/// The standing with the most chips; a tie resolves to the earliest listed
/// standing, which is the lowest seat when built by `build_report`.
pub fn chip_leader(standings: &[SeatStanding]) -> Option<&SeatStanding> {
    let mut best: Option<&SeatStanding> = None;
    for standing in standings {
        match best {
            Some(current) if standing.chips <= current.chips => {}
            _ => best = Some(standing),
        }
    }
    best
}

pub struct HttpSettlementSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSettlementSink {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl SettlementSink for HttpSettlementSink {
    async fn report(&self, report: &SettlementReport) -> Result<(), SettlementError> {
        let url = format!("{}/settlements", self.base_url);
        let standings: Vec<serde_json::Value> = report
            .standings
            .iter()
            .map(|s| {
                serde_json::json!({
                    "seat": s.seat,
                    "identity": s.identity,
                    "chips": s.chips.to_string(),
                })
            })
            .collect();

        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "table_id": report.table_id,
                "external_ref": report.external_ref,
                "winner": {
                    "seat": report.winner.seat,
                    "identity": report.winner.identity,
                    "chips": report.winner.chips.to_string(),
                },
                "standings": standings,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(SettlementError::Rejected(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
