//! batchrun Core Library
//!
//! Runs external commands as OS processes under a concurrency ceiling:
//! - Invocation building (shell quoting, environment tag)
//! - Process pool with admission control and a polling drain loop
//! - Single-command execution outside admission control
//! - Teardown that waits for every tracked process
//! - Configuration resolution and tracing setup

pub mod config;
pub mod error;
pub mod executor;
pub mod invocation;
mod lifecycle;
pub mod pool;
pub mod process;
pub mod runner;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod tracing_init;

pub use config::RunnerConfig;
pub use error::{Error, Result};
pub use executor::ExecOutcome;
pub use invocation::{Invocation, InvocationBuilder};
pub use pool::{DrainState, ProcessPool};
pub use process::{ChildHandle, Launcher, ProcessHandle, ShellLauncher};
pub use runner::CommandRunner;
