//! Table discovery.
//!
//! The matchmaking service pairs agents and opens tables in the escrow
//! contract; the dealer never creates tables itself. This poller asks
//! matchmaking for tables that are ready to play and registers each one
//! with the engine exactly once. A table that fails to start is forgotten
//! so the next tick can retry it.

use std::collections::HashSet;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::MAX_AGENTS;
use crate::engine;
use crate::session::SeatAgent;
use crate::DealerState;

const LOG_TARGET: &str = "dealer::discovery";

/// A table the matchmaking service considers ready to play.
#[derive(Debug, Deserialize)]
struct CandidateTable {
    table_id: u32,
    external_ref: String,
    participants: Vec<CandidateParticipant>,
}

/// Listing order defines seat order: the first participant is seat 0.
#[derive(Debug, Deserialize)]
struct CandidateParticipant {
    identity: String,
    #[serde(default)]
    notify_url: Option<String>,
}

pub(crate) async fn run(state: DealerState, stop: CancellationToken) {
    let url = format!("{}/tables/ready", state.config.matchmaking_url);
    info!(target = LOG_TARGET, url = %url, "starting table discovery");

    let client = reqwest::Client::new();
    let mut known: HashSet<u32> = HashSet::new();
    let mut ticker = tokio::time::interval(state.config.discovery_interval);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match fetch_candidates(&client, &url).await {
            Ok(candidates) => process_candidates(&state, &mut known, candidates).await,
            Err(err) => {
                warn!(target = LOG_TARGET, error = %err, "matchmaking poll failed");
            }
        }
    }

    info!(target = LOG_TARGET, "table discovery stopped");
}

async fn fetch_candidates(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<CandidateTable>, reqwest::Error> {
    client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<Vec<CandidateTable>>()
        .await
}

async fn process_candidates(
    state: &DealerState,
    known: &mut HashSet<u32>,
    candidates: Vec<CandidateTable>,
) {
    // Forget tables whose sessions have since been torn down.
    {
        let tables = state.tables.read().await;
        known.retain(|id| tables.contains_key(id));
    }

    for candidate in candidates {
        let table_id = candidate.table_id;
        if known.contains(&table_id) {
            continue;
        }
        let seats = candidate.participants.len() as u32;
        if seats < 2 || seats > MAX_AGENTS {
            debug!(
                target = LOG_TARGET,
                table_id, seats, "skipping candidate with unplayable seat count"
            );
            continue;
        }

        let agents: Vec<SeatAgent> = candidate
            .participants
            .into_iter()
            .map(|p| SeatAgent {
                identity: p.identity,
                notify_url: p.notify_url,
            })
            .collect();

        info!(
            target = LOG_TARGET,
            table_id,
            external_ref = %candidate.external_ref,
            seats,
            "starting session for discovered table"
        );
        known.insert(table_id);
        if let Err(err) =
            engine::start_session(state, table_id, candidate.external_ref, agents).await
        {
            warn!(
                target = LOG_TARGET,
                table_id,
                error = %err,
                "table failed to start, will retry on the next tick"
            );
            known.remove(&table_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TableState;
    use crate::testutil::test_state;

    fn candidate(table_id: u32, seats: u32) -> CandidateTable {
        CandidateTable {
            table_id,
            external_ref: format!("match-{}", table_id),
            participants: (0..seats)
                .map(|i| CandidateParticipant {
                    identity: format!("agent-{}", i),
                    notify_url: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_candidate_listing_decodes() {
        let listing: Vec<CandidateTable> = serde_json::from_str(
            r#"[{
                "table_id": 4,
                "external_ref": "match-9",
                "participants": [
                    {"identity": "alice", "notify_url": "http://localhost:7001/hooks"},
                    {"identity": "bob"}
                ]
            }]"#,
        )
        .unwrap();

        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].table_id, 4);
        assert_eq!(listing[0].participants.len(), 2);
        assert_eq!(listing[0].participants[1].identity, "bob");
        assert_eq!(listing[0].participants[1].notify_url, None);
        assert_eq!(
            listing[0].participants[0].notify_url.as_deref(),
            Some("http://localhost:7001/hooks")
        );
    }

    #[tokio::test]
    async fn test_ready_tables_get_sessions_once() {
        let (state, gateway, _sink) = test_state();
        gateway.set_agent_count(2);
        gateway.set_agent_chips(0, 1_000);
        gateway.set_agent_chips(1, 1_000);

        let mut known = HashSet::new();
        process_candidates(&state, &mut known, vec![candidate(1, 2)]).await;

        assert!(known.contains(&1));
        {
            let tables = state.tables.read().await;
            assert_eq!(tables.get(&1).unwrap().state, TableState::AwaitingAction);
        }
        let calls_after_start = gateway.calls().len();

        // The same listing on the next tick starts nothing new.
        process_candidates(&state, &mut known, vec![candidate(1, 2)]).await;
        assert_eq!(gateway.calls().len(), calls_after_start);
    }

    #[tokio::test]
    async fn test_unplayable_seat_counts_are_skipped() {
        let (state, _gateway, _sink) = test_state();
        let mut known = HashSet::new();

        process_candidates(
            &state,
            &mut known,
            vec![candidate(1, 1), candidate(2, MAX_AGENTS + 1)],
        )
        .await;

        assert!(known.is_empty());
        assert!(state.tables.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_retries_next_tick() {
        let (state, gateway, _sink) = test_state();
        gateway.set_agent_count(2);
        gateway.set_agent_chips(0, 1_000);
        gateway.set_agent_chips(1, 1_000);
        gateway.set_fail_submits(true);

        let mut known = HashSet::new();
        process_candidates(&state, &mut known, vec![candidate(1, 2)]).await;

        // The deal failed, so the table stays unknown and gets retried.
        assert!(!known.contains(&1));

        gateway.set_fail_submits(false);
        process_candidates(&state, &mut known, vec![candidate(1, 2)]).await;
        assert!(known.contains(&1));
        let tables = state.tables.read().await;
        assert_eq!(tables.get(&1).unwrap().state, TableState::AwaitingAction);
    }

    #[tokio::test]
    async fn test_gone_tables_are_pruned_from_known() {
        let (state, _gateway, _sink) = test_state();
        let mut known = HashSet::from([5]);

        process_candidates(&state, &mut known, Vec::new()).await;
        assert!(known.is_empty());
    }
}
