use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Where the tracker is in a run.
///
/// `Idle -> Fetching -> Normalizing -> Reconciling -> Describing -> Persisting
/// -> Done -> Idle`, or `-> Failed -> Idle` from any active phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RunPhase {
    Idle = 0,
    Fetching = 1,
    Normalizing = 2,
    Reconciling = 3,
    Describing = 4,
    Persisting = 5,
    Done = 6,
    Failed = 7,
}

impl RunPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunPhase::Fetching,
            2 => RunPhase::Normalizing,
            3 => RunPhase::Reconciling,
            4 => RunPhase::Describing,
            5 => RunPhase::Persisting,
            6 => RunPhase::Done,
            7 => RunPhase::Failed,
            _ => RunPhase::Idle,
        }
    }

    /// Any phase other than `Idle` holds the run slot.
    pub fn is_running(&self) -> bool {
        *self != RunPhase::Idle
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Fetching => "fetching",
            RunPhase::Normalizing => "normalizing",
            RunPhase::Reconciling => "reconciling",
            RunPhase::Describing => "describing",
            RunPhase::Persisting => "persisting",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder of the current [`RunPhase`]. The `Idle -> Fetching` edge is
/// a compare-and-set, so only one caller can win the run slot.
#[derive(Debug, Default)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub fn get(&self) -> RunPhase {
        RunPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Claim the run slot. `false` if a run is already active.
    pub fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(RunPhase::Idle as u8, RunPhase::Fetching as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move between active phases. Only the slot holder calls this.
    pub fn advance(&self, to: RunPhase) {
        log::debug!("run phase: {} -> {}", self.get(), to);
        self.0.store(to as u8, Ordering::Release);
    }

    pub fn release(&self) {
        self.0.store(RunPhase::Idle as u8, Ordering::Release);
    }
}

/// Returns the slot to `Idle` when dropped, including on panic.
pub(crate) struct SlotGuard<'a>(pub(crate) &'a PhaseCell);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn only_one_claim_wins() {
        let cell = Arc::new(PhaseCell::default());
        let winners: usize = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || cell.try_begin())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
        assert_eq!(cell.get(), RunPhase::Fetching);
    }

    #[test]
    fn guard_releases_slot() {
        let cell = PhaseCell::default();
        assert!(cell.try_begin());
        {
            let _guard = SlotGuard(&cell);
            cell.advance(RunPhase::Failed);
            assert!(!cell.try_begin());
        }
        assert_eq!(cell.get(), RunPhase::Idle);
        assert!(cell.try_begin());
    }

    #[test]
    fn phase_names() {
        assert_eq!(RunPhase::Describing.to_string(), "describing");
        assert!(!RunPhase::Idle.is_running());
        assert!(RunPhase::Done.is_running());
        assert_eq!(RunPhase::from_u8(RunPhase::Persisting as u8), RunPhase::Persisting);
    }
}
