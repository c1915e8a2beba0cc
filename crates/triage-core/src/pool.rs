//! Per-model AIMD admission control.
//!
//! One [`AdaptiveModelPool`] exists per backend model identity. It bounds
//! how many calls may be in flight against that model at once, queues the
//! excess in FIFO order, and tunes the bound from observed outcomes the
//! way TCP tunes its congestion window:
//!
//! - **Additive increase**: after `success_threshold + 1` consecutive
//!   successes, grow the bound by one (capped at `max_concurrency`).
//! - **Multiplicative decrease**: on a throttle signal, shrink the bound to
//!   `floor(current × decrease_factor)` (floored at `min_concurrency`),
//!   then ignore further throttle signals for `decrease_cooldown` so one
//!   burst of rejections cannot collapse the window repeatedly.
//! - **Idle reset**: a pool idle longer than `idle_timeout` resumes at
//!   `initial_concurrency`; server-side throttling state is assumed gone
//!   and resuming at a ramped-up bound risks an immediate burst of
//!   rejections.
//!
//! Generic failures reset the success streak but never shrink the bound;
//! they are not evidence of backend saturation.
//!
//! The pool never retries: a task's result or error propagates unchanged.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::ProviderError;

/// Mutable pool state. Guarded by a std mutex that is never held across an
/// await; waiters park on oneshot channels outside the lock.
struct PoolState {
    current_concurrency: u32,
    active_requests: u32,
    success_count: u32,
    total_successes: u64,
    total_errors: u64,
    total_rate_limits: u64,
    last_decrease: Option<Instant>,
    last_request: Option<Instant>,
    queue: VecDeque<oneshot::Sender<()>>,
}

/// Consistent point-in-time view of one pool, for monitoring and tests.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub model_id: String,
    pub current_concurrency: u32,
    pub active_requests: u32,
    pub queued_requests: usize,
    pub success_count: u32,
    pub total_successes: u64,
    pub total_errors: u64,
    pub total_rate_limits: u64,
    pub taken_at: DateTime<Utc>,
}

enum Outcome {
    Success,
    RateLimited,
    Error,
}

/// AIMD admission controller for one backend model identity.
pub struct AdaptiveModelPool {
    model_id: String,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl AdaptiveModelPool {
    pub fn new(model_id: impl Into<String>, config: PoolConfig) -> Self {
        let initial = config.initial_concurrency;
        Self {
            model_id: model_id.into(),
            config,
            state: Mutex::new(PoolState {
                current_concurrency: initial,
                active_requests: 0,
                success_count: 0,
                total_successes: 0,
                total_errors: 0,
                total_rate_limits: 0,
                last_decrease: None,
                last_request: None,
                queue: VecDeque::new(),
            }),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Run `task` under this pool's concurrency bound.
    ///
    /// Admits immediately when a slot is free, otherwise suspends the
    /// caller in FIFO submission order. The task's result is inspected to
    /// drive AIMD tuning and then propagated unchanged.
    ///
    /// Cancellation-safe: if the returned future is dropped at any point,
    /// whether still queued or already admitted, its slot is given back
    /// and the AIMD counters are left untouched.
    pub async fn execute<F, Fut, T>(&self, task: F) -> Result<T, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let slot = self.admit().await;
        let result = task().await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(err) if err.is_rate_limit() => Outcome::RateLimited,
            Err(_) => Outcome::Error,
        };
        slot.finish(outcome);
        result
    }

    /// Read all counters atomically.
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock_state();
        PoolSnapshot {
            model_id: self.model_id.clone(),
            current_concurrency: state.current_concurrency,
            active_requests: state.active_requests,
            queued_requests: state.queue.len(),
            success_count: state.success_count,
            total_successes: state.total_successes,
            total_errors: state.total_errors,
            total_rate_limits: state.total_rate_limits,
            taken_at: Utc::now(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        // Poisoning only happens if a holder panicked; counters are still
        // coherent, so keep going.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn admit(&self) -> SlotGuard<'_> {
        let waiter = {
            let mut state = self.lock_state();
            let now = Instant::now();
            if let Some(last) = state.last_request {
                if now.duration_since(last) > self.config.idle_timeout {
                    if state.current_concurrency != self.config.initial_concurrency {
                        debug!(
                            model = %self.model_id,
                            from = state.current_concurrency,
                            to = self.config.initial_concurrency,
                            "idle timeout elapsed, resetting concurrency"
                        );
                    }
                    state.current_concurrency = self.config.initial_concurrency;
                    state.success_count = 0;
                }
            }
            state.last_request = Some(now);

            if state.active_requests < state.current_concurrency {
                state.active_requests += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = waiter {
            let mut queued = QueuedWaiter {
                pool: self,
                rx: Some(rx),
            };
            queued.granted().await;
            queued.disarm();
        }
        SlotGuard {
            pool: self,
            armed: true,
        }
    }

    fn record_outcome(&self, state: &mut PoolState, outcome: Outcome) {
        match outcome {
            Outcome::Success => {
                state.success_count += 1;
                state.total_successes += 1;
                if state.success_count > self.config.success_threshold {
                    let next = (state.current_concurrency + 1).min(self.config.max_concurrency);
                    if next != state.current_concurrency {
                        debug!(
                            model = %self.model_id,
                            concurrency = next,
                            "additive increase"
                        );
                    }
                    state.current_concurrency = next;
                    state.success_count = 0;
                }
            }
            Outcome::RateLimited => {
                state.total_rate_limits += 1;
                let now = Instant::now();
                let in_cooldown = state
                    .last_decrease
                    .is_some_and(|at| now.duration_since(at) < self.config.decrease_cooldown);
                if in_cooldown {
                    debug!(
                        model = %self.model_id,
                        "throttle signal inside cooldown window, counted only"
                    );
                } else {
                    let shrunk =
                        (state.current_concurrency as f64 * self.config.decrease_factor).floor();
                    let next = (shrunk as u32).max(self.config.min_concurrency);
                    warn!(
                        model = %self.model_id,
                        from = state.current_concurrency,
                        to = next,
                        "rate limited, multiplicative decrease"
                    );
                    state.current_concurrency = next;
                    state.success_count = 0;
                    state.last_decrease = Some(now);
                }
            }
            Outcome::Error => {
                state.total_errors += 1;
                state.success_count = 0;
            }
        }
    }

    /// Release one slot, recording the call outcome first when there is
    /// one (a dropped in-flight call has none), then hand freed capacity
    /// to queued waiters in submission order. A waiter whose receiver was
    /// dropped is skipped without consuming the slot.
    fn release_slot(&self, outcome: Option<Outcome>) {
        let mut state = self.lock_state();
        if let Some(outcome) = outcome {
            self.record_outcome(&mut state, outcome);
        }
        state.active_requests -= 1;
        while state.active_requests < state.current_concurrency {
            match state.queue.pop_front() {
                Some(tx) => {
                    if tx.send(()).is_ok() {
                        state.active_requests += 1;
                    }
                }
                None => break,
            }
        }
    }
}

/// A granted concurrency slot. Normal completion goes through `finish`;
/// dropping an armed guard (the call future was cancelled mid-flight)
/// releases the slot without touching the AIMD counters.
struct SlotGuard<'a> {
    pool: &'a AdaptiveModelPool,
    armed: bool,
}

impl SlotGuard<'_> {
    fn finish(mut self, outcome: Outcome) {
        self.armed = false;
        self.pool.release_slot(Some(outcome));
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot(None);
        }
    }
}

/// A caller parked in the FIFO queue. Covers the race where the caller is
/// cancelled just as the completer grants it a slot: the grant is detected
/// in `Drop` and given back.
struct QueuedWaiter<'a> {
    pool: &'a AdaptiveModelPool,
    rx: Option<oneshot::Receiver<()>>,
}

impl QueuedWaiter<'_> {
    async fn granted(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            // The completer increments active_requests before signalling,
            // so a wake is a granted slot. An Err means the pool was
            // dropped mid-wait, which cannot outlive this borrow.
            let _ = rx.await;
        }
    }

    fn disarm(mut self) {
        self.rx = None;
    }
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if rx.try_recv().is_ok() {
                // A grant raced with cancellation; give the slot back.
                self.pool.release_slot(None);
            }
        }
    }
}

/// Lazily creates and owns one pool per model identity for the process
/// lifetime. Injected into the chain/classifier rather than held as a
/// global.
pub struct PoolRegistry {
    config: PoolConfig,
    pools: Mutex<HashMap<String, Arc<AdaptiveModelPool>>>,
}

impl PoolRegistry {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// The pool for `model_id`, created on first use.
    pub fn pool(&self, model_id: &str) -> Arc<AdaptiveModelPool> {
        let mut pools = match self.pools.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(pools.entry(model_id.to_string()).or_insert_with(|| {
            debug!(model = model_id, "creating admission pool");
            Arc::new(AdaptiveModelPool::new(model_id, self.config.clone()))
        }))
    }

    /// Snapshots of every pool created so far.
    pub fn snapshots(&self) -> Vec<PoolSnapshot> {
        let pools = match self.pools.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out: Vec<PoolSnapshot> = pools.values().map(|p| p.snapshot()).collect();
        out.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        out
    }
}
