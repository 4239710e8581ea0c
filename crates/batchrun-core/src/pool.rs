//! Bounded-concurrency process pool.
//!
//! The [`ProcessPool`] starts processes through a [`Launcher`] and tracks the
//! handles that are still running. Once the number of tracked handles reaches
//! the capacity, the submitting thread runs a full drain: it polls every
//! active handle at a fixed interval, retires the finished ones, and returns
//! when nothing is left. [`ProcessPool::drain`] can also be called with
//! `wait_all` unset, in which case it returns as soon as a slot is free.
//!
//! All waiting happens on the caller's thread; the pool never spawns threads.
//! State sits behind a mutex so a pool can be shared, and only one drain loop
//! runs at a time: a drain requested while another is in progress returns
//! immediately.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::invocation::Invocation;
use crate::process::{Launcher, ProcessHandle, ShellLauncher};

/// Reentrancy state of the drain loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    /// A drain loop currently owns the active set.
    Draining,
}

pub(crate) struct PoolState<H> {
    pub(crate) capacity: usize,
    /// Running handles in submission order.
    pub(crate) active: Vec<H>,
    pub(crate) drain: DrainState,
}

/// Tracks running processes and enforces the concurrency ceiling.
pub struct ProcessPool<L: Launcher = ShellLauncher> {
    launcher: L,
    poll_interval: Duration,
    pub(crate) state: Mutex<PoolState<L::Handle>>,
}

/// Returns the drain state to [`DrainState::Idle`] when the loop exits,
/// whichever way it exits.
struct DrainGuard<'a, H> {
    state: &'a Mutex<PoolState<H>>,
}

impl<H> Drop for DrainGuard<'_, H> {
    fn drop(&mut self) {
        self.state.lock().drain = DrainState::Idle;
    }
}

impl<L: Launcher> ProcessPool<L> {
    /// Create a pool. `capacity` must be at least 1.
    pub fn new(launcher: L, capacity: usize, poll_interval: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        info!(
            capacity,
            poll_interval_us = poll_interval.as_micros(),
            "ProcessPool created"
        );

        Ok(Self {
            launcher,
            poll_interval,
            state: Mutex::new(PoolState {
                capacity,
                active: Vec::new(),
                drain: DrainState::Idle,
            }),
        })
    }

    pub const fn launcher(&self) -> &L {
        &self.launcher
    }

    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Current concurrency ceiling.
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Number of handles not yet observed as finished.
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Ids of the tracked handles, in submission order.
    pub fn active_ids(&self) -> Vec<u32> {
        self.state.lock().active.iter().map(ProcessHandle::id).collect()
    }

    pub fn drain_state(&self) -> DrainState {
        self.state.lock().drain
    }

    pub fn is_draining(&self) -> bool {
        self.drain_state() == DrainState::Draining
    }

    /// Change the ceiling for future admission decisions.
    ///
    /// Running processes are left alone even when they now exceed the new
    /// ceiling; the next submission drains them down.
    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }
        let previous = std::mem::replace(&mut self.state.lock().capacity, capacity);
        debug!(previous, capacity, "Pool capacity updated");
        Ok(())
    }

    /// Start `invocation` and track it, draining if the pool is full.
    ///
    /// Reaching the ceiling, or a `force_full_drain` request, blocks until
    /// every tracked process has exited.
    pub fn submit(&self, invocation: &Invocation, force_full_drain: bool) -> Result<()> {
        let handle = self.launcher.start(invocation)?;
        let pid = handle.id();

        let wait_all = {
            let mut state = self.state.lock();
            state.active.push(handle);
            let active = state.active.len();
            debug!(
                pid,
                command = invocation.command(),
                active,
                capacity = state.capacity,
                "Process admitted"
            );
            if active < state.capacity && !force_full_drain {
                return Ok(());
            }
            force_full_drain || active >= state.capacity
        };

        self.drain(wait_all);
        Ok(())
    }

    /// Poll tracked processes until there is headroom, or until none are
    /// left when `wait_all` is set.
    ///
    /// Returns immediately when another drain loop is already running.
    pub fn drain(&self, wait_all: bool) {
        let Some(_guard) = self.begin_drain() else {
            debug!(wait_all, "Drain already in progress, deferring");
            return;
        };

        let started = Instant::now();
        let mut retired = 0usize;
        loop {
            {
                let mut state = self.state.lock();
                retired += retire_finished(&mut state.active);
                if state.active.is_empty() {
                    break;
                }
                if !wait_all && state.active.len() < state.capacity {
                    break;
                }
            }
            thread::sleep(self.poll_interval);
        }

        debug!(
            wait_all,
            retired,
            remaining = self.active_count(),
            elapsed_ms = started.elapsed().as_millis(),
            "Drain finished"
        );
    }

    /// Claim the drain loop. The check and the transition happen under one
    /// lock acquisition.
    fn begin_drain(&self) -> Option<DrainGuard<'_, L::Handle>> {
        let mut state = self.state.lock();
        if state.drain == DrainState::Draining {
            return None;
        }
        state.drain = DrainState::Draining;
        Some(DrainGuard { state: &self.state })
    }
}

/// Drop every finished handle, keeping submission order. Returns how many
/// were removed.
fn retire_finished<H: ProcessHandle>(active: &mut Vec<H>) -> usize {
    let before = active.len();
    active.retain_mut(|handle| {
        let running = handle.is_running();
        if !running {
            debug!(pid = handle.id(), exit_code = ?handle.exit_code(), "Process finished");
        }
        running
    });
    before - active.len()
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLauncher;
    use std::panic::{self, AssertUnwindSafe};

    const POLL: Duration = Duration::from_millis(1);

    fn inv(command: &str) -> Invocation {
        Invocation::from_command_line(command, format!("bin/console {command}"))
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(POLL);
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = ProcessPool::new(ScriptedLauncher::new(), 0, POLL);
        assert!(matches!(result, Err(Error::InvalidCapacity(0))));
    }

    #[test]
    fn submit_below_capacity_does_not_block() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 3, POLL).unwrap();
        pool.submit(&inv("a"), false).unwrap();
        pool.submit(&inv("b"), false).unwrap();
        assert_eq!(pool.active_count(), 2);
        assert_eq!(pool.drain_state(), DrainState::Idle);
        pool.launcher().finish_all();
    }

    #[test]
    fn reaching_capacity_drains_everything() {
        let pool = ProcessPool::new(ScriptedLauncher::finishing_after(3), 2, POLL).unwrap();
        pool.submit(&inv("a"), false).unwrap();
        assert_eq!(pool.active_count(), 1);
        pool.submit(&inv("b"), false).unwrap();
        assert_eq!(pool.active_count(), 0);
        pool.submit(&inv("c"), false).unwrap();
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.launcher().started_count(), 3);
        assert!(!pool.is_draining());
        pool.launcher().finish_all();
    }

    #[test]
    fn full_pool_waits_for_stragglers() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 2, POLL).unwrap();
        pool.submit(&inv("a"), false).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                wait_until(|| pool.is_draining());
                pool.launcher().finish(0);
                thread::sleep(Duration::from_millis(20));
                // A slot is free by now, but `b` still holds the drain.
                assert!(pool.is_draining());
                pool.launcher().finish(1);
            });
            pool.submit(&inv("b"), false).unwrap();
        });

        assert_eq!(pool.active_count(), 0);
        assert!(pool.launcher().switch(1).unwrap().is_finished());
    }

    #[test]
    fn partial_drain_returns_once_one_slot_frees() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 2, POLL).unwrap();
        pool.execute_single(&inv("a"), false).unwrap();
        pool.execute_single(&inv("b"), false).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                wait_until(|| pool.is_draining());
                pool.launcher().finish(1);
            });
            pool.drain(false);
        });

        assert_eq!(pool.active_ids(), vec![0]);
        assert!(!pool.is_draining());
        pool.launcher().finish_all();
    }

    #[test]
    fn final_submission_empties_pool() {
        let pool = ProcessPool::new(ScriptedLauncher::finishing_after(2), 2, POLL).unwrap();
        pool.submit(&inv("a"), false).unwrap();
        pool.submit(&inv("b"), false).unwrap();
        pool.submit(&inv("c"), true).unwrap();
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn final_submission_below_capacity_still_waits() {
        let pool = ProcessPool::new(ScriptedLauncher::finishing_after(5), 10, POLL).unwrap();
        pool.submit(&inv("a"), true).unwrap();
        assert_eq!(pool.active_count(), 0);
        assert!(pool.launcher().switch(0).unwrap().is_finished());
    }

    #[test]
    fn overshoot_triggers_full_drain() {
        let pool = ProcessPool::new(ScriptedLauncher::finishing_after(2), 2, POLL).unwrap();
        pool.execute_single(&inv("a"), false).unwrap();
        pool.execute_single(&inv("b"), false).unwrap();
        pool.execute_single(&inv("c"), false).unwrap();
        assert_eq!(pool.active_count(), 3);

        pool.submit(&inv("d"), false).unwrap();
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn finished_handles_are_retired_in_order() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 3, POLL).unwrap();
        for name in ["a", "b", "c"] {
            pool.execute_single(&inv(name), false).unwrap();
        }
        pool.launcher().finish(0);
        pool.launcher().finish(2);

        pool.drain(false);

        assert_eq!(pool.active_ids(), vec![1]);
        pool.launcher().finish_all();
    }

    #[test]
    fn launch_failure_leaves_pool_untouched() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 2, POLL).unwrap();
        pool.submit(&inv("ok"), false).unwrap();
        pool.launcher().fail_on("broken");

        let err = pool.submit(&inv("broken"), true).unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
        assert_eq!(pool.active_count(), 1);
        assert!(!pool.is_draining());
        pool.launcher().finish_all();
    }

    #[test]
    fn set_capacity_rejects_zero_and_keeps_state() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 3, POLL).unwrap();
        pool.submit(&inv("a"), false).unwrap();

        assert!(matches!(pool.set_capacity(0), Err(Error::InvalidCapacity(0))));
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.active_count(), 1);
        pool.launcher().finish_all();
    }

    #[test]
    fn lowering_capacity_does_not_touch_running_processes() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 3, POLL).unwrap();
        pool.submit(&inv("a"), false).unwrap();
        pool.submit(&inv("b"), false).unwrap();

        pool.set_capacity(1).unwrap();
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.active_count(), 2);
        assert!(!pool.launcher().switch(0).unwrap().is_finished());
        assert!(!pool.launcher().switch(1).unwrap().is_finished());
        assert!(!pool.is_draining());
        pool.launcher().finish_all();
    }

    #[test]
    fn raising_capacity_admits_more_without_draining() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 1, POLL).unwrap();
        pool.set_capacity(3).unwrap();
        pool.submit(&inv("a"), false).unwrap();
        pool.submit(&inv("b"), false).unwrap();
        assert_eq!(pool.active_count(), 2);
        pool.launcher().finish_all();
    }

    #[test]
    fn drain_on_empty_pool_returns_immediately() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 1, POLL).unwrap();
        pool.drain(true);
        pool.drain(false);
        assert_eq!(pool.drain_state(), DrainState::Idle);
    }

    #[test]
    fn concurrent_drain_is_a_no_op() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 5, POLL).unwrap();
        pool.submit(&inv("a"), false).unwrap();

        thread::scope(|s| {
            let owner = s.spawn(|| pool.drain(true));
            wait_until(|| pool.is_draining());

            // Returns without waiting for `a`.
            pool.drain(true);
            assert_eq!(pool.active_count(), 1);
            assert!(pool.is_draining());

            pool.launcher().finish_all();
            owner.join().unwrap();
        });

        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.drain_state(), DrainState::Idle);
    }

    #[test]
    fn submissions_during_foreign_drain_do_not_block() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 1, POLL).unwrap();
        pool.execute_single(&inv("a"), false).unwrap();

        thread::scope(|s| {
            let owner = s.spawn(|| pool.drain(true));
            wait_until(|| pool.is_draining());

            // Over capacity, but the running drain owns the loop.
            pool.submit(&inv("b"), false).unwrap();
            assert_eq!(pool.active_count(), 2);

            pool.launcher().finish_all();
            owner.join().unwrap();
        });

        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn drain_state_resets_after_panicking_poll() {
        let pool = ProcessPool::new(ScriptedLauncher::new(), 2, POLL).unwrap();
        pool.launcher().panic_on_first_poll("boom");
        pool.execute_single(&inv("boom"), false).unwrap();

        let unwound = panic::catch_unwind(AssertUnwindSafe(|| pool.drain(true)));
        assert!(unwound.is_err());
        assert_eq!(pool.drain_state(), DrainState::Idle);
        assert_eq!(pool.active_count(), 1);

        pool.launcher().finish_all();
        pool.drain(true);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.drain_state(), DrainState::Idle);
    }
}
