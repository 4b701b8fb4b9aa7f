//! Worker pool coordination
//!
//! The upload pool shares one [`PoolGate`]: it records whether the pool is
//! still accepting work, how many workers are alive, and wakes the waiting
//! orchestrator whenever a worker finishes a part or exits.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle phase of a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    /// Workers keep reading new chunks.
    Running,
    /// End of input seen: in-flight parts finish, nothing new starts.
    Draining,
    /// Fatal failure: nothing new starts and retry pauses are cut short.
    Aborting,
}

impl fmt::Display for PoolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolPhase::Running => "running",
            PoolPhase::Draining => "draining",
            PoolPhase::Aborting => "aborting",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct GateState {
    phase: PoolPhase,
    active: usize,
    abort_reason: Option<String>,
}

/// Shared shutdown flag, live worker count and wake-up condition.
#[derive(Debug)]
pub struct PoolGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl PoolGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                phase: PoolPhase::Running,
                active: 0,
                abort_reason: None,
            }),
            changed: Condvar::new(),
        }
    }

    /// Register a worker. The worker is counted until the guard drops.
    ///
    /// Register before spawning so a waiter never sees an empty pool while
    /// workers are still starting.
    pub fn enter(&self) -> WorkerGuard<'_> {
        self.state.lock().active += 1;
        WorkerGuard { gate: self }
    }

    pub fn phase(&self) -> PoolPhase {
        self.state.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == PoolPhase::Running
    }

    pub fn is_aborting(&self) -> bool {
        self.phase() == PoolPhase::Aborting
    }

    pub fn active_workers(&self) -> usize {
        self.state.lock().active
    }

    /// Stop handing out work because the input is exhausted.
    ///
    /// Returns true if this call moved the pool out of `Running`.
    pub fn finish(&self) -> bool {
        let mut state = self.state.lock();
        let transitioned = state.phase == PoolPhase::Running;
        if transitioned {
            state.phase = PoolPhase::Draining;
        }
        drop(state);
        self.changed.notify_all();
        transitioned
    }

    /// Abort the pool. Only the first caller's reason is kept.
    ///
    /// Returns true for the call that initiated the abort.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        let first = state.phase != PoolPhase::Aborting;
        if first {
            state.phase = PoolPhase::Aborting;
            state.abort_reason = Some(reason.into());
        }
        drop(state);
        self.changed.notify_all();
        first
    }

    pub fn abort_reason(&self) -> Option<String> {
        self.state.lock().abort_reason.clone()
    }

    /// Wake the waiting orchestrator, e.g. after a part completes.
    pub fn notify(&self) {
        self.changed.notify_all();
    }

    /// Sleep for `duration` unless the pool aborts first.
    ///
    /// Returns true if the full pause elapsed, false if it was cut short.
    pub fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        while state.phase != PoolPhase::Aborting {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.phase != PoolPhase::Aborting;
            }
        }
        false
    }

    /// Wait up to `timeout` for every worker to exit.
    ///
    /// Returns true once the pool is empty. Wakes early on any notification,
    /// so callers loop with their own backoff.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.active == 0 {
            return true;
        }
        let _ = self.changed.wait_for(&mut state, timeout);
        state.active == 0
    }
}

impl Default for PoolGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a worker counted as active while alive.
#[derive(Debug)]
pub struct WorkerGuard<'a> {
    gate: &'a PoolGate,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.gate.changed.notify_all();
    }
}

/// Capped exponential backoff for polling waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// Current wait, then grow it by half for next time.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.current;
        self.current = (self.current + self.current / 2).min(self.max);
        wait
    }
}
