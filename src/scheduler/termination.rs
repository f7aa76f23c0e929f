use crate::util::metadata::Pool;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Termination detection for a parallel trace.
///
/// A collector that has run out of local work and found the shared task pool empty declares
/// itself finished. It then waits until either every participant is finished, in which case the
/// trace is complete, or new work shows up in the pool, in which case it takes itself off the
/// finished count and goes back to work. A collector only publishes work while it is not
/// counted as finished, so once all participants are finished no work can appear.
pub struct TerminationBarrier {
    participants: AtomicUsize,
    finished: AtomicUsize,
}

impl TerminationBarrier {
    pub fn new(participants: usize) -> Self {
        TerminationBarrier {
            participants: AtomicUsize::new(participants),
            finished: AtomicUsize::new(0),
        }
    }

    /// Prepare for the next trace. Must be called while no collector is tracing.
    pub fn reset(&self, participants: usize) {
        debug_assert!(participants > 0);
        self.participants.store(participants, Ordering::SeqCst);
        self.finished.store(0, Ordering::SeqCst);
    }

    /// Called by a collector with no local work. Returns true if the trace is complete, or
    /// false if the caller should take more work from `pool`.
    pub fn wait_for_termination(&self, pool: &Pool) -> bool {
        let participants = self.participants.load(Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        let mut spins = 0usize;
        loop {
            if self.finished.load(Ordering::SeqCst) == participants {
                return true;
            }
            if !pool.is_empty() {
                self.finished.fetch_sub(1, Ordering::SeqCst);
                return false;
            }
            spins += 1;
            if spins < 64 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }
}
