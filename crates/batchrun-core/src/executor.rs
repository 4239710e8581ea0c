//! Single-command execution that bypasses admission control.

use std::thread;

use tracing::{debug, info};

use crate::error::Result;
use crate::invocation::Invocation;
use crate::pool::ProcessPool;
use crate::process::{Launcher, ProcessHandle};

/// What [`ProcessPool::execute_single`] did with the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Started and handed to the pool; the caller did not wait.
    Tracked,
    /// Started and waited for on the calling thread.
    Exited {
        /// `None` when the process was terminated by a signal.
        code: Option<i32>,
    },
}

impl ExecOutcome {
    /// Whether the process ran to completion with exit code 0.
    pub const fn success(&self) -> bool {
        matches!(self, Self::Exited { code: Some(0) })
    }
}

impl<L: Launcher> ProcessPool<L> {
    /// Start one process outside of admission control.
    ///
    /// With `synchronous` unset the handle joins the active set without a
    /// capacity check or drain, so the pool may end up above its ceiling.
    /// With `synchronous` set the calling thread polls this one process until
    /// it exits; the active set is never touched.
    pub fn execute_single(&self, invocation: &Invocation, synchronous: bool) -> Result<ExecOutcome> {
        let mut handle = self.launcher().start(invocation)?;

        if !synchronous {
            let pid = handle.id();
            let active = {
                let mut state = self.state.lock();
                state.active.push(handle);
                state.active.len()
            };
            debug!(pid, command = invocation.command(), active, "Process tracked without admission");
            return Ok(ExecOutcome::Tracked);
        }

        while handle.is_running() {
            thread::sleep(self.poll_interval());
        }
        let code = handle.exit_code();
        info!(pid = handle.id(), command = invocation.command(), exit_code = ?code, "Process exited");
        Ok(ExecOutcome::Exited { code })
    }
}
