//! Turn deadline scheduling.
//!
//! One pending deadline per table. Every arm or cancel bumps the table's
//! epoch and aborts the previous timer task; a timer that fires carries the
//! epoch it was armed with, and the timeout handler must re-check
//! `is_current` under the table's operation lock before acting. A stale
//! epoch means a real action won the race and the timeout is void.
//!
//! Aborts only ever hit a timer that is still sleeping: a timer that
//! reaches its deadline drops its own handle from the slot before running
//! the handler, so the handler may cancel or re-arm the table's deadline
//! without killing itself mid-flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

struct TimerSlot {
    epoch: u64,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct TurnScheduler {
    slots: Arc<Mutex<HashMap<u32, TimerSlot>>>,
}

impl TurnScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the deadline for a table. `on_timeout` builds the
    /// boxed handler future for the new epoch; it runs once the deadline
    /// expires. Returns the epoch.
    pub async fn arm<F>(&self, table_id: u32, timeout: Duration, on_timeout: F) -> u64
    where
        F: FnOnce(u64) -> BoxFuture<'static, ()>,
    {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(table_id).or_insert(TimerSlot {
            epoch: 0,
            handle: None,
        });

        slot.epoch += 1;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }

        let epoch = slot.epoch;
        let fired = on_timeout(epoch);
        let shared = self.slots.clone();
        slot.handle = Some(tokio::spawn(async move {
            sleep(timeout).await;
            // Drop our own handle before the handler runs. A cancel or
            // re-arm from here on has nothing to abort; it invalidates the
            // epoch instead.
            {
                let mut slots = shared.lock().await;
                if let Some(slot) = slots.get_mut(&table_id) {
                    if slot.epoch == epoch {
                        slot.handle = None;
                    }
                }
            }
            fired.await;
        }));

        epoch
    }

    /// Void any pending deadline for the table. Safe when none is armed.
    pub async fn cancel(&self, table_id: u32) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(&table_id) {
            slot.epoch += 1;
            if let Some(handle) = slot.handle.take() {
                handle.abort();
            }
        }
    }

    /// True while `epoch` is still the latest armed deadline for the table.
    pub async fn is_current(&self, table_id: u32, epoch: u64) -> bool {
        let slots = self.slots.lock().await;
        slots
            .get(&table_id)
            .map(|slot| slot.epoch == epoch)
            .unwrap_or(false)
    }

    /// Drop all deadline state for a table that is being torn down.
    pub async fn remove(&self, table_id: u32) {
        let mut slots = self.slots.lock().await;
        if let Some(mut slot) = slots.remove(&table_id) {
            if let Some(handle) = slot.handle.take() {
                handle.abort();
            }
        }
    }
}
