//! Reusable, abortable rendezvous barrier
//!
//! `std::sync::Barrier` cannot be interrupted, so a failing or cancelled
//! participant would leave the others blocked forever. `RoundBarrier` adds an
//! abort that wakes every current and future waiter with an error.

use crate::error::{Result, SimError};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Outcome of a successful [`RoundBarrier::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    leader: bool,
    generation: u64,
}

impl BarrierWaitResult {
    /// True for exactly one participant per generation (the last to arrive)
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Generation this wait completed
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

#[derive(Debug)]
pub struct RoundBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl RoundBarrier {
    /// Barrier for `parties` participants (at least 1)
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                aborted: false,
            }),
            cvar: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until all parties have arrived
    ///
    /// Returns [`SimError::BarrierAborted`] if the barrier is aborted before or
    /// while waiting.
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        let mut state = self.lock();
        if state.aborted {
            return Err(SimError::BarrierAborted);
        }

        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation += 1;
            self.cvar.notify_all();
            return Ok(BarrierWaitResult {
                leader: true,
                generation,
            });
        }

        while state.generation == generation && !state.aborted {
            state = self
                .cvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if state.generation != generation {
            Ok(BarrierWaitResult {
                leader: false,
                generation,
            })
        } else {
            Err(SimError::BarrierAborted)
        }
    }

    /// Release every waiter with an error; later waits fail immediately
    pub fn abort(&self) {
        let mut state = self.lock();
        state.aborted = true;
        self.cvar.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_party_never_blocks() {
        let barrier = RoundBarrier::new(1);
        for g in 0..3 {
            let r = barrier.wait().unwrap();
            assert!(r.is_leader());
            assert_eq!(r.generation(), g);
        }
    }

    #[test]
    fn test_reuse_across_generations() {
        const PARTIES: usize = 4;
        const ROUNDS: usize = 50;

        let barrier = Arc::new(RoundBarrier::new(PARTIES));
        let leaders = Arc::new(AtomicUsize::new(0));
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..PARTIES)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let leaders = Arc::clone(&leaders);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for round in 0..ROUNDS {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let r = barrier.wait().unwrap();
                        assert_eq!(r.generation(), 2 * round as u64);
                        // Everyone has incremented before anyone leaves
                        assert!(counter.load(Ordering::SeqCst) >= (round + 1) * PARTIES);
                        if r.is_leader() {
                            leaders.fetch_add(1, Ordering::SeqCst);
                        }
                        barrier.wait().unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(leaders.load(Ordering::SeqCst), ROUNDS);
        assert_eq!(counter.load(Ordering::SeqCst), ROUNDS * PARTIES);
    }

    #[test]
    fn test_abort_wakes_waiters() {
        let barrier = Arc::new(RoundBarrier::new(3));

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || barrier.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        barrier.abort();

        for w in waiters {
            assert!(matches!(w.join().unwrap(), Err(SimError::BarrierAborted)));
        }
        assert!(barrier.is_aborted());
        assert!(matches!(barrier.wait(), Err(SimError::BarrierAborted)));
    }
}
