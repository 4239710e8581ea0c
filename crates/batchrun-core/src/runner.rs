//! Command-level facade over the invocation builder and the process pool.

use tracing::info;

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::executor::ExecOutcome;
use crate::invocation::{Invocation, InvocationBuilder};
use crate::pool::ProcessPool;
use crate::process::{Launcher, ShellLauncher};

/// Runs named commands under the pool's concurrency policy.
///
/// Dropping the runner waits for every tracked process; [`scope`](Self::scope)
/// makes that wait explicit at the end of a block.
pub struct CommandRunner<L: Launcher = ShellLauncher> {
    builder: InvocationBuilder,
    pool: ProcessPool<L>,
}

impl CommandRunner<ShellLauncher> {
    /// Runner that launches real OS processes.
    pub fn from_config(config: &RunnerConfig) -> Result<Self> {
        Self::with_launcher(config, ShellLauncher)
    }
}

impl<L: Launcher> CommandRunner<L> {
    pub fn with_launcher(config: &RunnerConfig, launcher: L) -> Result<Self> {
        config.validate()?;
        info!(
            base_path = %config.base_path.display(),
            environment = config.environment_tag.as_deref().unwrap_or(""),
            capacity = config.default_capacity,
            "CommandRunner created"
        );
        Ok(Self {
            builder: InvocationBuilder::from_config(config),
            pool: ProcessPool::new(launcher, config.default_capacity, config.poll_interval())?,
        })
    }

    pub const fn builder(&self) -> &InvocationBuilder {
        &self.builder
    }

    pub const fn pool(&self) -> &ProcessPool<L> {
        &self.pool
    }

    /// Build the invocation for `command` without running it.
    pub fn invocation<S: AsRef<str>>(&self, command: &str, args: &[S]) -> Invocation {
        self.builder.build(command, args)
    }

    /// Submit `command` under admission control. `is_final` waits for every
    /// tracked process before returning.
    pub fn submit<S: AsRef<str>>(&self, command: &str, args: &[S], is_final: bool) -> Result<()> {
        let invocation = self.invocation(command, args);
        self.pool.submit(&invocation, is_final)
    }

    /// Run `command` outside admission control; see
    /// [`ProcessPool::execute_single`].
    pub fn execute_single<S: AsRef<str>>(
        &self,
        command: &str,
        args: &[S],
        synchronous: bool,
    ) -> Result<ExecOutcome> {
        let invocation = self.invocation(command, args);
        self.pool.execute_single(&invocation, synchronous)
    }

    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        self.pool.set_capacity(capacity)
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Run `f` with this runner, then wait for every tracked process.
    ///
    /// The wait happens whether `f` succeeds or fails; on unwinding it
    /// happens when the runner is dropped.
    pub fn scope<T, E>(
        self,
        f: impl FnOnce(&Self) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let result = f(&self);
        self.shutdown();
        result
    }
}
