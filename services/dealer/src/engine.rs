//! The per-table game state machine.
//!
//! Every operation on a table runs under that table's operation lock, held
//! across the whole operation including its chain calls, so exactly one
//! state-changing operation is in flight per table at any time. The registry
//! locks are only ever taken for short synchronous reads or writes and are
//! never held across an await.
//!
//! A chain call that fails is logged and aborts the operation without
//! touching session state: the table stops progressing and waits for the
//! admin surface or the next discovery tick to re-drive it. There is no
//! automatic retry.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use crate::chain::{ActionKind, ChainEvent, ChainTableState};
use crate::deck::shuffle_deck;
use crate::error::EngineError;
use crate::hand_eval::find_winners;
use crate::session::{SeatAgent, TableSession, TableState};
use crate::settlement;
use crate::DealerState;

/// Clone a table's operation lock out of the registry.
async fn table_op_lock(
    state: &DealerState,
    table_id: u32,
) -> Result<Arc<Mutex<()>>, EngineError> {
    let tables = state.tables.read().await;
    tables
        .get(&table_id)
        .map(|s| s.op_lock.clone())
        .ok_or(EngineError::UnknownTable(table_id))
}

async fn with_session<T>(
    state: &DealerState,
    table_id: u32,
    f: impl FnOnce(&TableSession) -> T,
) -> Result<T, EngineError> {
    let tables = state.tables.read().await;
    let session = tables
        .get(&table_id)
        .ok_or(EngineError::UnknownTable(table_id))?;
    Ok(f(session))
}

async fn with_session_mut<T>(
    state: &DealerState,
    table_id: u32,
    f: impl FnOnce(&mut TableSession) -> T,
) -> Result<T, EngineError> {
    let mut tables = state.tables.write().await;
    let session = tables
        .get_mut(&table_id)
        .ok_or(EngineError::UnknownTable(table_id))?;
    Ok(f(session))
}

/// Register a discovered table and deal its first hand.
///
/// Agent count and session length are taken from the chain, not from the
/// discovery listing; the listing only supplies identities and seat order.
pub(crate) async fn start_session(
    state: &DealerState,
    table_id: u32,
    external_ref: String,
    mut agents: Vec<SeatAgent>,
) -> Result<(), EngineError> {
    let info = state.gateway.read_table_info(table_id).await?;
    match info.state {
        ChainTableState::Ended | ChainTableState::Cancelled => {
            return Err(EngineError::SessionOver(table_id));
        }
        ChainTableState::Open | ChainTableState::Playing => {}
    }

    let listed = agents.len() as u32;
    if info.agent_count < listed {
        tracing::warn!(
            "table {}: chain reports {} agents but {} were listed, trusting the chain",
            table_id,
            info.agent_count,
            listed
        );
        agents.truncate(info.agent_count as usize);
    } else if info.agent_count > listed {
        return Err(EngineError::SeatCountMismatch {
            table_id,
            chain: info.agent_count,
            listed,
        });
    }

    let session = TableSession::new(
        table_id,
        external_ref,
        agents,
        info.session_length,
        info.current_hand,
    );
    {
        let mut tables = state.tables.write().await;
        tables.entry(table_id).or_insert(session);
    }

    tracing::info!(
        "table {}: session registered at hand {} of {}, prize pool {}",
        table_id,
        info.current_hand,
        info.session_length,
        info.prize_pool
    );

    deal_hand(state, table_id).await
}

/// Deal the table's next hand. No-op unless the table is waiting to deal.
pub(crate) async fn deal_hand(state: &DealerState, table_id: u32) -> Result<(), EngineError> {
    let op_lock = table_op_lock(state, table_id).await?;
    let _guard = op_lock.lock().await;
    deal_hand_locked(state, table_id).await
}

async fn deal_hand_locked(state: &DealerState, table_id: u32) -> Result<(), EngineError> {
    if state.shutdown.is_cancelled() {
        tracing::info!("table {}: shutting down, not dealing a new hand", table_id);
        return Ok(());
    }

    let (session_state, seat_agents, current_hand) = with_session(state, table_id, |s| {
        (s.state, s.seat_agents.clone(), s.current_hand)
    })
    .await?;

    match session_state {
        TableState::Initializing | TableState::DealingHand => {}
        other => {
            tracing::debug!("table {}: not dealing in state {:?}", table_id, other);
            return Ok(());
        }
    }
    with_session_mut(state, table_id, |s| s.state = TableState::DealingHand).await?;

    // Seat eligibility comes from the chain at the start of every hand. A
    // seat whose read fails counts as inactive for this hand, which can
    // drop a healthy seat on a transient failure; hence the loud log.
    let mut active: Vec<u32> = Vec::new();
    for seat in 0..seat_agents.len() as u32 {
        match state.gateway.read_agent_info(table_id, seat).await {
            Ok(info) if !info.kicked => {
                let listed = &seat_agents[seat as usize].identity;
                if info.identity != *listed {
                    tracing::warn!(
                        "table {}: seat {} is {} on chain but {} in the listing",
                        table_id,
                        seat,
                        info.identity,
                        listed
                    );
                }
                if info.missed_turns > 0 {
                    tracing::debug!(
                        "table {}: seat {} carries {} missed turns",
                        table_id,
                        seat,
                        info.missed_turns
                    );
                }
                active.push(seat);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    "table {}: seat {} eligibility read failed, treating as inactive: {}",
                    table_id,
                    seat,
                    e
                );
            }
        }
    }

    if active.len() < 2 {
        tracing::info!(
            "table {}: only {} active seat(s) left, settling session",
            table_id,
            active.len()
        );
        return settle_locked(state, table_id, true).await;
    }

    let deck = shuffle_deck();
    let commitment = deck.commitment();
    let mut hole_cards = HashMap::new();
    for (i, &seat) in active.iter().enumerate() {
        hole_cards.insert(seat, deck.hole_pair(i));
    }

    state.gateway.deal_hand(table_id, &commitment).await?;

    let first_seat = active[0];
    let active_count = active.len();
    let targets = with_session_mut(state, table_id, |s| {
        s.active_seats = active;
        s.deck = deck;
        s.hole_cards = hole_cards;
        s.community_cards.clear();
        s.betting_round = 0;
        s.acted_seats.clear();
        s.current_turn_seat = first_seat;
        s.state = TableState::AwaitingAction;

        s.hole_cards
            .iter()
            .filter_map(|(&seat, &cards)| {
                s.seat_agents
                    .get(seat as usize)
                    .and_then(|a| a.notify_url.clone())
                    .map(|url| (seat, url, cards))
            })
            .collect::<Vec<_>>()
    })
    .await?;

    tracing::info!(
        "table {}: hand {} dealt to {} seats, commitment {}",
        table_id,
        current_hand,
        active_count,
        &commitment[..8]
    );

    state.notifier.push_hole_cards(table_id, current_hand, targets);
    arm_turn_timer(state, table_id, first_seat).await;
    Ok(())
}

/// An action arriving over the admin API on behalf of a seated agent.
pub(crate) async fn submit_agent_action(
    state: &DealerState,
    table_id: u32,
    seat: u32,
    action: ActionKind,
    amount: u128,
) -> Result<(), EngineError> {
    let op_lock = table_op_lock(state, table_id).await?;
    let _guard = op_lock.lock().await;

    let (session_state, expected) =
        with_session(state, table_id, |s| (s.state, s.current_turn_seat)).await?;
    if session_state != TableState::AwaitingAction {
        return Err(EngineError::NotAwaitingAction(table_id));
    }
    if seat != expected {
        return Err(EngineError::OutOfTurn {
            table_id,
            seat,
            expected,
        });
    }

    on_action_locked(state, table_id, seat, action, amount).await
}

/// Core action handling; caller holds the table's operation lock and has
/// validated that `seat` is the one whose turn it is.
async fn on_action_locked(
    state: &DealerState,
    table_id: u32,
    seat: u32,
    action: ActionKind,
    amount: u128,
) -> Result<(), EngineError> {
    // Void the pending deadline before anything else so a late timer fire
    // can never race this action.
    state.scheduler.cancel(table_id).await;

    state
        .gateway
        .submit_action(table_id, seat, action, amount)
        .await?;

    let round_complete = with_session_mut(state, table_id, |s| {
        s.acted_seats.insert(seat);
        s.active_seats.iter().all(|a| s.acted_seats.contains(a))
    })
    .await?;

    tracing::debug!(
        "table {}: seat {} submitted {} ({})",
        table_id,
        seat,
        action.as_str(),
        amount
    );

    if round_complete {
        return advance_round_locked(state, table_id).await;
    }

    let next = with_session_mut(state, table_id, |s| {
        if let Some(next) = s.next_active_seat(seat) {
            s.current_turn_seat = next;
        }
        s.current_turn_seat
    })
    .await?;
    arm_turn_timer(state, table_id, next).await;
    Ok(())
}

async fn arm_turn_timer(state: &DealerState, table_id: u32, seat: u32) {
    let timer_state = state.clone();
    state
        .scheduler
        .arm(table_id, state.config.turn_timeout, move |epoch| {
            auto_fold_boxed(timer_state, table_id, seat, epoch)
        })
        .await;
}

/// The timeout handler re-enters the action path that arms the next timer,
/// so its future is boxed to keep the recursive type finite.
fn auto_fold_boxed(
    state: DealerState,
    table_id: u32,
    seat: u32,
    epoch: u64,
) -> BoxFuture<'static, ()> {
    Box::pin(auto_fold(state, table_id, seat, epoch))
}

/// Turn deadline expired: fold on the seat's behalf. The epoch check under
/// the operation lock discards fires that lost a race with a real action.
async fn auto_fold(state: DealerState, table_id: u32, seat: u32, epoch: u64) {
    let op_lock = match table_op_lock(&state, table_id).await {
        Ok(lock) => lock,
        Err(_) => return,
    };
    let _guard = op_lock.lock().await;

    if !state.scheduler.is_current(table_id, epoch).await {
        return;
    }
    let still_waiting = with_session(&state, table_id, |s| {
        s.state == TableState::AwaitingAction && s.current_turn_seat == seat
    })
    .await
    .unwrap_or(false);
    if !still_waiting {
        return;
    }

    tracing::warn!(
        "table {}: seat {} timed out, folding on its behalf",
        table_id,
        seat
    );
    if let Err(e) = on_action_locked(&state, table_id, seat, ActionKind::Fold, 0).await {
        tracing::error!("table {}: auto-fold for seat {} failed: {}", table_id, seat, e);
    }
}

/// Betting round finished: reveal the next street, or go to showdown after
/// the river round.
async fn advance_round_locked(state: &DealerState, table_id: u32) -> Result<(), EngineError> {
    let round = with_session(state, table_id, |s| s.betting_round).await?;
    if round >= 3 {
        return showdown_locked(state, table_id).await;
    }

    with_session_mut(state, table_id, |s| s.state = TableState::AdvancingRound).await?;

    let (new_round, revealed, first_seat, community_len, urls) =
        with_session_mut(state, table_id, |s| {
            s.betting_round += 1;
            let dealt = s.hole_cards.len();
            let revealed: Vec<u32> = match s.betting_round {
                1 => s.deck.flop(dealt).to_vec(),
                2 => vec![s.deck.turn(dealt)],
                _ => vec![s.deck.river(dealt)],
            };
            s.community_cards.extend(&revealed);
            s.acted_seats.clear();
            if let Some(first) = s.first_active_seat() {
                s.current_turn_seat = first;
            }
            s.state = TableState::AwaitingAction;

            let urls: Vec<String> = s
                .active_seats
                .iter()
                .filter_map(|&seat| {
                    s.seat_agents
                        .get(seat as usize)
                        .and_then(|a| a.notify_url.clone())
                })
                .collect();
            (
                s.betting_round,
                revealed,
                s.current_turn_seat,
                s.community_cards.len(),
                urls,
            )
        })
        .await?;

    tracing::info!(
        "table {}: betting round {} open, {} community cards showing",
        table_id,
        new_round,
        community_len
    );

    state
        .notifier
        .push_community(table_id, new_round, revealed, urls);
    arm_turn_timer(state, table_id, first_seat).await;
    Ok(())
}

async fn showdown_locked(state: &DealerState, table_id: u32) -> Result<(), EngineError> {
    with_session_mut(state, table_id, |s| s.state = TableState::Showdown).await?;

    let hands = with_session(state, table_id, |s| {
        let mut hands: HashMap<u32, Vec<u32>> = HashMap::new();
        for &seat in &s.active_seats {
            if let Some(hole) = s.hole_cards.get(&seat) {
                let mut cards = hole.to_vec();
                cards.extend(&s.community_cards);
                hands.insert(seat, cards);
            }
        }
        hands
    })
    .await?;

    let winners = find_winners(&hands);
    let winner = match winners.first() {
        Some(&seat) => seat,
        None => {
            tracing::error!("table {}: no hands to score at showdown, settling", table_id);
            return settle_locked(state, table_id, true).await;
        }
    };
    if winners.len() > 1 {
        tracing::warn!(
            "table {}: seats {:?} tied at showdown, split pots are not supported, awarding seat {}",
            table_id,
            winners,
            winner
        );
    }

    state.gateway.resolve_hand(table_id, winner).await?;
    tracing::info!("table {}: hand resolved to seat {}", table_id, winner);

    let info = state.gateway.read_table_info(table_id).await?;
    match info.state {
        ChainTableState::Ended => settle_locked(state, table_id, false).await,
        ChainTableState::Cancelled => cancel_locked(state, table_id).await,
        ChainTableState::Open | ChainTableState::Playing => {
            let next_hand = with_session_mut(state, table_id, |s| {
                s.current_hand += 1;
                s.state = TableState::DealingHand;
                s.current_hand
            })
            .await?;
            tracing::info!("table {}: scheduling hand {}", table_id, next_hand);
            schedule_next_hand(state, table_id);
            Ok(())
        }
    }
}

/// Deal the next hand after a short delay so chain state can settle.
fn schedule_next_hand(state: &DealerState, table_id: u32) {
    let delay = state.config.inter_hand_delay;
    let tasks = state.tasks.clone();
    let state = state.clone();
    tasks.spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = deal_hand(&state, table_id).await {
            tracing::error!("table {}: next hand could not be dealt: {}", table_id, e);
        }
    });
}

/// End the session and report settlement. Runs at most once per table: the
/// transition into `SettlingSession` is made under the operation lock, and
/// any later call sees a terminal state and returns without effect.
///
/// `locally_initiated` marks ends the chain does not know about yet (too few
/// active seats, admin force end); those submit `end_session` first. Failures
/// up to that point restore the previous state so the table can be re-driven;
/// once settlement reporting starts the session always comes down, since
/// retrying a settlement could pay out twice.
async fn settle_locked(
    state: &DealerState,
    table_id: u32,
    locally_initiated: bool,
) -> Result<(), EngineError> {
    let (prev_state, external_ref, seat_agents) = with_session(state, table_id, |s| {
        (s.state, s.external_ref.clone(), s.seat_agents.clone())
    })
    .await?;

    match prev_state {
        TableState::SettlingSession | TableState::Ended | TableState::Cancelled => {
            tracing::debug!(
                "table {}: settlement already handled in state {:?}",
                table_id,
                prev_state
            );
            return Ok(());
        }
        _ => {}
    }

    with_session_mut(state, table_id, |s| s.state = TableState::SettlingSession).await?;
    state.scheduler.cancel(table_id).await;

    if locally_initiated {
        match state.gateway.read_table_info(table_id).await {
            Ok(info) if matches!(info.state, ChainTableState::Open | ChainTableState::Playing) => {
                if let Err(e) = state.gateway.end_session(table_id).await {
                    tracing::error!("table {}: end_session failed: {}", table_id, e);
                    with_session_mut(state, table_id, |s| s.state = prev_state).await?;
                    return Err(e.into());
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    "table {}: could not confirm chain state before ending: {}",
                    table_id,
                    e
                );
                with_session_mut(state, table_id, |s| s.state = prev_state).await?;
                return Err(e.into());
            }
        }
    }

    match settlement::build_report(
        state.gateway.as_ref(),
        table_id,
        &external_ref,
        &seat_agents,
    )
    .await
    {
        Ok(report) => {
            tracing::info!(
                "table {}: session settled, winner seat {} ({})",
                table_id,
                report.winner.seat,
                report.winner.identity
            );
            if let Err(e) = state.sink.report(&report).await {
                tracing::error!(
                    "table {}: settlement report failed and is not retried: {}",
                    table_id,
                    e
                );
            }
        }
        Err(e) => {
            tracing::error!(
                "table {}: could not build settlement report: {}",
                table_id,
                e
            );
        }
    }

    finish_table(state, table_id, TableState::Ended).await;
    Ok(())
}

/// Chain-side cancellation: discard the session without settlement. The
/// escrow refunds buy-ins itself; reporting a winner here would be wrong.
async fn cancel_locked(state: &DealerState, table_id: u32) -> Result<(), EngineError> {
    let prev_state = with_session(state, table_id, |s| s.state).await?;
    if matches!(
        prev_state,
        TableState::SettlingSession | TableState::Ended | TableState::Cancelled
    ) {
        return Ok(());
    }

    tracing::warn!(
        "table {}: chain reports cancellation, discarding session without settlement",
        table_id
    );
    finish_table(state, table_id, TableState::Cancelled).await;
    Ok(())
}

async fn finish_table(state: &DealerState, table_id: u32, final_state: TableState) {
    state.scheduler.remove(table_id).await;
    let mut tables = state.tables.write().await;
    if let Some(mut session) = tables.remove(&table_id) {
        session.state = final_state;
        tracing::debug!(
            "table {}: session removed in state {:?}",
            table_id,
            session.state
        );
    }
}

/// Admin surface: end a stuck or abandoned session now.
pub(crate) async fn force_end(state: &DealerState, table_id: u32) -> Result<(), EngineError> {
    let op_lock = table_op_lock(state, table_id).await?;
    let _guard = op_lock.lock().await;

    tracing::warn!("table {}: session end forced via admin surface", table_id);
    settle_locked(state, table_id, true).await
}

/// React to an event from the chain's feed.
pub(crate) async fn apply_chain_event(state: &DealerState, event: ChainEvent) {
    match event {
        ChainEvent::SessionEnded { table_id } => {
            let op_lock = match table_op_lock(state, table_id).await {
                Ok(lock) => lock,
                Err(_) => {
                    tracing::debug!(
                        "table {}: session-ended event for a table not under management",
                        table_id
                    );
                    return;
                }
            };
            let _guard = op_lock.lock().await;

            let result = match state.gateway.read_table_info(table_id).await {
                Ok(info) if info.state == ChainTableState::Cancelled => {
                    cancel_locked(state, table_id).await
                }
                Ok(_) => settle_locked(state, table_id, false).await,
                Err(e) => {
                    tracing::error!(
                        "table {}: could not read chain state after session-ended event: {}",
                        table_id,
                        e
                    );
                    return;
                }
            };
            if let Err(e) = result {
                tracing::error!(
                    "table {}: session-ended event handling failed: {}",
                    table_id,
                    e
                );
            }
        }
        ChainEvent::AgentKicked { table_id, seat } => {
            tracing::info!(
                "table {}: chain kicked seat {}, it leaves the rotation at the next deal",
                table_id,
                seat
            );
            let url = {
                let tables = state.tables.read().await;
                tables.get(&table_id).and_then(|s| {
                    s.seat_agents
                        .get(seat as usize)
                        .and_then(|a| a.notify_url.clone())
                })
            };
            if let Some(url) = url {
                state.notifier.push_kick(table_id, seat, url);
            }
        }
        ChainEvent::HandResolved {
            table_id,
            winning_seat,
        } => {
            tracing::debug!(
                "table {}: chain confirmed hand resolution to seat {}",
                table_id,
                winning_seat
            );
        }
    }
}
