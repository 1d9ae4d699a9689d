//! Resettable idle barrier for quiescence detection.
//!
//! Workers rendezvous here when the queue is empty; the driver joins as the
//! final party. A full rendezvous means no thread has work and none is
//! producing any: the run has drained. Enqueueing new work resets the
//! barrier, which wakes all waiters so they re-check the queue.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// How a call to [`Barrier::wait`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    /// All parties met; the run has drained.
    Tripped,
    /// A reset tore down the current cycle; re-check for work.
    Broken,
    /// The caller's timeout expired; the barrier itself is left intact.
    TimedOut,
}

/// Barrier cycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Accepting waiters.
    Filling,
    /// All parties met; waiters are leaving with [`WaitOutcome::Tripped`].
    Draining,
    /// A reset is flushing waiters out with [`WaitOutcome::Broken`].
    Resetting,
}

/// Waiter bookkeeping guarded by the mutex.
struct State {
    phase: Phase,
    count: usize,
}

/// A resettable rendezvous barrier for a fixed number of parties.
pub(crate) struct Barrier {
    parties: usize,
    state: Mutex<State>,
    cond: Condvar,
}

impl Barrier {
    pub(crate) fn new(parties: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(State {
                phase: Phase::Filling,
                count: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Wait for all parties to meet, a reset, or the timeout.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut st = self.state.lock();

        // Let any ending cycle finish before entering the next one.
        while st.phase != Phase::Filling {
            if !self.block(&mut st, deadline) {
                return WaitOutcome::TimedOut;
            }
        }

        st.count += 1;
        if st.count == self.parties {
            st.phase = Phase::Draining;
            self.cond.notify_all();
            self.leave(&mut st);
            return WaitOutcome::Tripped;
        }

        loop {
            match st.phase {
                Phase::Filling => {
                    if !self.block(&mut st, deadline) {
                        st.count -= 1;
                        return WaitOutcome::TimedOut;
                    }
                }
                Phase::Draining => {
                    self.leave(&mut st);
                    return WaitOutcome::Tripped;
                }
                Phase::Resetting => {
                    self.leave(&mut st);
                    return WaitOutcome::Broken;
                }
            }
        }
    }

    /// Break the current cycle: all waiters wake with [`WaitOutcome::Broken`]
    /// and the barrier returns to the filling phase for future waits.
    pub(crate) fn reset(&self) {
        let mut st = self.state.lock();
        if st.phase == Phase::Filling && st.count > 0 {
            st.phase = Phase::Resetting;
        }
        self.cond.notify_all();
    }

    /// Remove the caller from the cycle; the last one out re-opens the barrier.
    fn leave(&self, st: &mut State) {
        st.count -= 1;
        if st.count == 0 {
            st.phase = Phase::Filling;
            self.cond.notify_all();
        }
    }

    /// Block on the condvar; returns false when the deadline expires first.
    fn block(&self, st: &mut parking_lot::MutexGuard<'_, State>, deadline: Option<Instant>) -> bool {
        match deadline {
            None => {
                self.cond.wait(st);
                true
            }
            Some(d) => !self.cond.wait_until(st, d).timed_out(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn trips_when_all_parties_meet() {
        let barrier = Arc::new(Barrier::new(3));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let b = barrier.clone();
            handles.push(thread::spawn(move || b.wait(None)));
        }
        for h in handles {
            assert_eq!(h.join().unwrap(), WaitOutcome::Tripped);
        }
    }

    #[test]
    fn reset_breaks_waiters_and_rearms() {
        let barrier = Arc::new(Barrier::new(2));
        let b = barrier.clone();
        let waiter = thread::spawn(move || b.wait(None));

        // Give the waiter time to park before breaking it out.
        thread::sleep(Duration::from_millis(50));
        barrier.reset();
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Broken);

        // The barrier must still be usable for a full rendezvous.
        let b = barrier.clone();
        let waiter = thread::spawn(move || b.wait(None));
        assert_eq!(barrier.wait(None), WaitOutcome::Tripped);
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Tripped);
    }

    #[test]
    fn timeout_leaves_barrier_intact() {
        let barrier = Arc::new(Barrier::new(2));
        let start = Instant::now();
        assert_eq!(
            barrier.wait(Some(Duration::from_millis(50))),
            WaitOutcome::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(50));

        // A timed-out party must not be counted toward the next rendezvous.
        let b = barrier.clone();
        let waiter = thread::spawn(move || b.wait(None));
        assert_eq!(barrier.wait(None), WaitOutcome::Tripped);
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Tripped);
    }

    #[test]
    fn reset_with_no_waiters_is_a_noop() {
        let barrier = Barrier::new(1);
        barrier.reset();
        assert_eq!(barrier.wait(None), WaitOutcome::Tripped);
    }
}
