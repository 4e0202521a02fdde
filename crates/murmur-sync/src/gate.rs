//! Single-flight guard for periodic sync rounds.
//!
//! The gate is a two-state machine, `Idle → Running → Idle`. A timer tick
//! calls [`RoundGate::try_begin`]; while a round is outstanding further
//! ticks are coalesced into no-ops. The returned [`RoundPermit`] moves back
//! to `Idle` when dropped, so a round that panics or is cancelled cannot
//! wedge the gate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Running,
}

#[derive(Debug, Default)]
pub struct RoundGate {
    running: AtomicBool,
    started: AtomicU64,
    coalesced: AtomicU64,
}

impl RoundGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Move to `Running` if currently `Idle`.
    pub fn try_begin(self: &Arc<Self>) -> Option<RoundPermit> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let round = self.started.fetch_add(1, Ordering::Relaxed) + 1;
        Some(RoundPermit {
            gate: Arc::clone(self),
            round,
        })
    }

    pub fn state(&self) -> GateState {
        if self.running.load(Ordering::Acquire) {
            GateState::Running
        } else {
            GateState::Idle
        }
    }

    /// Rounds started so far.
    pub fn rounds_started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Ticks dropped because a round was still running.
    pub fn ticks_coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

/// Proof that the holder owns the current round.
#[derive(Debug)]
pub struct RoundPermit {
    gate: Arc<RoundGate>,
    round: u64,
}

impl RoundPermit {
    /// 1-based sequence number of this round.
    pub fn round(&self) -> u64 {
        self.round
    }
}

impl Drop for RoundPermit {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}
