//! Bounded-parallelism admission for outbound requests.
//!
//! The gate counts active slots and keeps two FIFO lanes of waiters. `Normal` waiters are
//! always served before `Low` ones, and within a lane strictly in arrival order. The limit is
//! passed on every acquire so that it can follow the current network profile; a lower limit
//! never pre-empts running work, it only delays the next dispatch.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::core::{ClassifiedError, NetworkBucket, NetworkProfile};
use crate::handle::RequestHandle;

/// Which queue a waiter joins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Priority {
    #[default]
    Normal,
    /// Only dispatched when no `Normal` waiter is queued. Used for prefetching.
    Low,
}

/// A point-in-time view of the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub active: usize,
    pub queued: usize,
    pub queued_low: usize,
    pub limit: usize,
    pub peak_active: usize,
}

#[derive(Debug)]
struct Waiter {
    tx: oneshot::Sender<()>,
    enqueued_at: Instant,
}

#[derive(Debug)]
struct GateState {
    active: usize,
    limit: usize,
    peak_active: usize,
    normal: VecDeque<Waiter>,
    low: VecDeque<Waiter>,
}

impl GateState {
    /// Hands free slots to queued waiters, oldest `Normal` first.
    fn dispatch(&mut self) {
        while self.active < self.limit {
            let Some(waiter) = self.normal.pop_front().or_else(|| self.low.pop_front()) else {
                break;
            };
            // a closed receiver means the waiter gave up; skip it
            if waiter.tx.send(()).is_ok() {
                self.take_slot();
                tracing::trace!(
                    waited_ms = waiter.enqueued_at.elapsed().as_millis() as u64,
                    active = self.active,
                    "dispatched queued request"
                );
            }
        }
    }

    fn take_slot(&mut self) {
        self.active += 1;
        self.peak_active = self.peak_active.max(self.active);
    }
}

/// A fair, bounded admission queue. Clones share the same slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    state: Arc<Mutex<GateState>>,
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(NetworkProfile::for_bucket(NetworkBucket::Fast).max_concurrent)
    }
}

/// An occupied slot. Dropping it frees the slot and dispatches the next waiter.
#[derive(Debug)]
#[must_use = "dropping the permit releases the slot immediately"]
pub struct GatePermit {
    gate: ConcurrencyGate,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// Cleans up after a waiter whose future is dropped while queued.
struct Waiting<'a> {
    gate: &'a ConcurrencyGate,
    rx: Option<oneshot::Receiver<()>>,
}

impl Waiting<'_> {
    /// Resolves to true once a slot has been handed over.
    async fn granted(&mut self) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            return false;
        };
        let granted = rx.await.is_ok();
        self.rx = None;
        granted
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            // the slot was handed over after we stopped listening
            if rx.try_recv().is_ok() {
                self.gate.release();
            }
        }
    }
}

impl ConcurrencyGate {
    /// Creates a gate with an initial limit; every acquire may change it.
    #[must_use]
    pub fn new(initial_limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                active: 0,
                limit: initial_limit.max(1),
                peak_active: 0,
                normal: VecDeque::new(),
                low: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for a free slot under `max_concurrent`.
    pub async fn acquire(&self, max_concurrent: usize, priority: Priority) -> GatePermit {
        loop {
            let rx = {
                let mut state = self.lock();
                state.limit = max_concurrent.max(1);
                state.dispatch();

                let lane_clear = match priority {
                    Priority::Normal => state.normal.is_empty(),
                    Priority::Low => state.normal.is_empty() && state.low.is_empty(),
                };
                if lane_clear && state.active < state.limit {
                    state.take_slot();
                    return GatePermit { gate: self.clone() };
                }

                let (tx, rx) = oneshot::channel();
                let waiter = Waiter {
                    tx,
                    enqueued_at: Instant::now(),
                };
                match priority {
                    Priority::Normal => state.normal.push_back(waiter),
                    Priority::Low => state.low.push_back(waiter),
                }
                tracing::trace!(
                    active = state.active,
                    limit = state.limit,
                    ?priority,
                    "gate full, queued"
                );
                rx
            };

            let mut waiting = Waiting {
                gate: self,
                rx: Some(rx),
            };
            if waiting.granted().await {
                return GatePermit { gate: self.clone() };
            }
        }
    }

    /// Runs `task` once a slot is free, releasing the slot when it settles.
    pub async fn run<F, Fut, T>(&self, max_concurrent: usize, priority: Priority, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire(max_concurrent, priority).await;
        task().await
    }

    /// Spawns `task` behind the gate and returns a cancellable handle. Cancelling a queued
    /// task gives up its place in line without consuming a slot.
    pub fn submit<F, Fut, T>(&self, max_concurrent: usize, priority: Priority, task: F) -> RequestHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'static,
        T: Send + 'static,
    {
        let gate = self.clone();
        RequestHandle::spawn(async move { gate.run(max_concurrent, priority, task).await })
    }

    fn release(&self) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        state.dispatch();
    }

    #[must_use]
    pub fn stats(&self) -> GateStats {
        let state = self.lock();
        GateStats {
            active: state.active,
            queued: state.normal.len() + state.low.len(),
            queued_low: state.low.len(),
            limit: state.limit,
            peak_active: state.peak_active,
        }
    }
}
