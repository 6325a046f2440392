//! Poker table dealer service.
//!
//! The dealer drives Texas Hold'em sessions against the on-chain escrow
//! contract:
//! 1. Discovery picks up tables the matchmaking service has filled
//! 2. The engine runs each hand from deal through showdown
//! 3. Turn deadlines fold for unresponsive agents
//! 4. Final standings go to the settlement service exactly once
//!
//! The contract holds the money and the authoritative table state; this
//! process holds the cards. The shuffled deck never leaves dealer memory,
//! only its SHA-256 commitment is published before each hand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;

mod api;
mod chain;
mod config;
mod deck;
mod discovery;
mod engine;
mod error;
mod hand_eval;
mod notify;
mod scheduler;
mod session;
mod settlement;
#[cfg(test)]
mod testutil;

use chain::{ChainEventFeed, ChainGateway, EventFeedConfig, RpcGateway};
use config::DealerConfig;
use notify::AgentNotifier;
use scheduler::TurnScheduler;
use session::TableRegistry;
use settlement::{HttpSettlementSink, SettlementSink};

/// Shared handle cloned into every task and request handler.
#[derive(Clone)]
struct DealerState {
    tables: TableRegistry,
    gateway: Arc<dyn ChainGateway>,
    scheduler: Arc<TurnScheduler>,
    notifier: AgentNotifier,
    sink: Arc<dyn SettlementSink>,
    config: DealerConfig,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = DealerConfig::from_env();
    tracing::info!(
        "dealer starting: chain={} matchmaking={} settlement={}",
        config.chain_rpc_url,
        config.matchmaking_url,
        config.settlement_url
    );

    let shutdown = CancellationToken::new();
    let state = DealerState {
        tables: Arc::new(RwLock::new(HashMap::new())),
        gateway: Arc::new(RpcGateway::new(config.chain_rpc_url.clone())),
        scheduler: Arc::new(TurnScheduler::new()),
        notifier: AgentNotifier::new(config.notify_timeout),
        sink: Arc::new(HttpSettlementSink::new(config.settlement_url.clone())),
        config: config.clone(),
        shutdown: shutdown.clone(),
        tasks: TaskTracker::new(),
    };

    let (feed, mut events) = ChainEventFeed::new(
        EventFeedConfig {
            events_url: format!("{}/events", config.chain_rpc_url),
            poll_timeout: config.event_poll_timeout,
            reconnect_delay: config.event_reconnect_delay,
            broadcast_capacity: 64,
        },
        shutdown.clone(),
    );
    tokio::spawn(feed.run());

    {
        let state = state.clone();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => engine::apply_chain_event(&state, event).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!("event dispatcher lagged, {} events dropped", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    tokio::spawn(discovery::run(state.clone(), shutdown.clone()));

    {
        let stop = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                stop.cancel();
            }
        });
    }

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/tables", get(api::list_tables))
        .route("/tables/:table_id", get(api::get_table))
        .route("/tables/:table_id/action", post(api::submit_action))
        .route("/tables/:table_id/end", post(api::end_table))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.unwrap();
    tracing::info!("dealer listening on {}", config.bind_addr);

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await
        .unwrap();

    // Let in-flight table operations finish before the process exits.
    state.tasks.close();
    if tokio::time::timeout(Duration::from_secs(10), state.tasks.wait())
        .await
        .is_err()
    {
        tracing::warn!("shutdown timed out waiting for background tasks");
    }
}
