//! Process start/poll capability.
//!
//! The pool only needs three things from a process: a way to start it, a
//! non-blocking liveness poll, and the exit code once it is done. Those are
//! captured by [`Launcher`] and [`ProcessHandle`]; [`ShellLauncher`] is the
//! OS-backed implementation that runs invocations through the platform shell.

use std::process::{Child, Command, ExitStatus};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::invocation::Invocation;

/// A started process the pool can poll.
pub trait ProcessHandle: Send {
    /// Identity used for logging only.
    fn id(&self) -> u32;

    /// Non-blocking liveness poll. Once this returns `false` it keeps
    /// returning `false`.
    fn is_running(&mut self) -> bool;

    /// Exit code, available after [`is_running`](Self::is_running) first
    /// reported `false`. `None` while running or when the process was
    /// terminated by a signal.
    fn exit_code(&self) -> Option<i32>;
}

/// Starts processes for invocations.
pub trait Launcher: Send + Sync {
    type Handle: ProcessHandle;

    /// Begin execution without waiting for it.
    fn start(&self, invocation: &Invocation) -> Result<Self::Handle>;
}

impl<L: Launcher + ?Sized> Launcher for Arc<L> {
    type Handle = L::Handle;

    fn start(&self, invocation: &Invocation) -> Result<Self::Handle> {
        (**self).start(invocation)
    }
}

/// Runs invocations through `sh -c` (or `cmd /C` on Windows) with inherited
/// stdio. Command lines are expected to be quoted for that shell, which
/// [`InvocationBuilder`](crate::InvocationBuilder) does.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellLauncher;

impl ShellLauncher {
    fn command(command_line: &str) -> Command {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;

            // `arg` would re-escape the quotes meant for cmd.
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").raw_arg(command_line);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command_line);
            cmd
        }
    }
}

impl Launcher for ShellLauncher {
    type Handle = ChildHandle;

    fn start(&self, invocation: &Invocation) -> Result<ChildHandle> {
        let child = Self::command(invocation.command_line())
            .spawn()
            .map_err(|source| Error::Launch {
                command_line: invocation.command_line().to_string(),
                source,
            })?;
        debug!(pid = child.id(), command = invocation.command(), "Process started");
        Ok(ChildHandle {
            child,
            finished: false,
            status: None,
        })
    }
}

/// [`ProcessHandle`] over a `std::process::Child`.
#[derive(Debug)]
pub struct ChildHandle {
    child: Child,
    finished: bool,
    status: Option<ExitStatus>,
}

impl ProcessHandle for ChildHandle {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn is_running(&mut self) -> bool {
        if self.finished {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.status = Some(status);
                self.finished = true;
                false
            }
            Ok(None) => true,
            Err(e) => {
                // An unpollable child would stall the drain loop forever.
                warn!(
                    pid = self.child.id(),
                    error = %e,
                    "Failed to poll process, treating as finished"
                );
                self.finished = true;
                false
            }
        }
    }

    fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}
