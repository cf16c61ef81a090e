//! Readiness state machine.
//!
//! The state only moves forward: `NotStarted → Connecting → Ready`. The first
//! transition is a compare-and-set, so exactly one caller wins the right to
//! start establishing the pool. Everyone, the winner included, then waits on
//! a watch channel that flips once.

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::watch;

/// Where the database is in its startup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadinessState {
    /// Nobody has asked for the database yet.
    NotStarted = 0,
    /// The pool is being established.
    Connecting = 1,
    /// The pool has been established and checked.
    Ready = 2,
}

impl ReadinessState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Connecting,
            _ => Self::Ready,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ReadinessGate {
    state: AtomicU8,
    ready_tx: watch::Sender<bool>,
}

impl ReadinessGate {
    pub(crate) fn new() -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            state: AtomicU8::new(ReadinessState::NotStarted as u8),
            ready_tx,
        }
    }

    /// Claim the `NotStarted → Connecting` transition. Returns `true` for
    /// exactly one caller.
    pub(crate) fn try_begin(&self) -> bool {
        self.state
            .compare_exchange(
                ReadinessState::NotStarted as u8,
                ReadinessState::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn mark_ready(&self) {
        let previous = self
            .state
            .swap(ReadinessState::Ready as u8, Ordering::AcqRel);
        if previous != ReadinessState::Ready as u8 {
            self.ready_tx.send_replace(true);
            tracing::info!("database ready");
        }
    }

    pub(crate) async fn wait(&self) {
        if self.is_ready() {
            return;
        }
        let mut rx = self.ready_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub(crate) fn state(&self) -> ReadinessState {
        ReadinessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state() == ReadinessState::Ready
    }
}
