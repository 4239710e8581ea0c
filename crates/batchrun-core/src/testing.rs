//! Scripted launcher for exercising the pool without real processes.
//!
//! Every started process gets a [`ProcessSwitch`]; a process runs until its
//! switch is flipped, or until it has been polled a fixed number of times
//! when the launcher was built with [`ScriptedLauncher::finishing_after`].
//! [`ScriptedLauncher::panic_on_first_poll`] makes a process panic inside
//! its first liveness check, for exercising unwinding through the pool.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::invocation::Invocation;
use crate::process::{Launcher, ProcessHandle};

/// Completion switch shared between a test and one scripted process.
#[derive(Debug, Clone, Default)]
pub struct ProcessSwitch(Arc<AtomicBool>);

impl ProcessSwitch {
    pub fn finish(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle produced by [`ScriptedLauncher`].
#[derive(Debug)]
pub struct ScriptedHandle {
    id: u32,
    switch: ProcessSwitch,
    polls_left: Option<u32>,
    exit_code: i32,
    panic_next_poll: bool,
}

impl ProcessHandle for ScriptedHandle {
    fn id(&self) -> u32 {
        self.id
    }

    #[allow(clippy::panic)]
    fn is_running(&mut self) -> bool {
        if std::mem::take(&mut self.panic_next_poll) {
            panic!("scripted poll failure in process {}", self.id);
        }
        if let Some(left) = self.polls_left.as_mut() {
            if *left == 0 {
                self.switch.finish();
            } else {
                *left -= 1;
            }
        }
        !self.switch.is_finished()
    }

    fn exit_code(&self) -> Option<i32> {
        self.switch.is_finished().then_some(self.exit_code)
    }
}

#[derive(Debug)]
struct Started {
    command_line: String,
    switch: ProcessSwitch,
}

/// Launcher whose processes finish when the test says so.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    next_id: AtomicU32,
    polls_until_exit: Option<u32>,
    exit_code: i32,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    started: Mutex<Vec<Started>>,
}

impl ScriptedLauncher {
    /// Processes run until their switch is flipped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes finish on their own after `polls` liveness checks.
    pub fn finishing_after(polls: u32) -> Self {
        Self {
            polls_until_exit: Some(polls),
            ..Self::default()
        }
    }

    /// Processes are already finished when first polled.
    pub fn instant() -> Self {
        Self::finishing_after(0)
    }

    #[must_use]
    pub const fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Make every start of `command` fail with a launch error.
    pub fn fail_on(&self, command: &str) {
        self.failing.lock().insert(command.to_string());
    }

    /// Make the first liveness check of every `command` process panic.
    pub fn panic_on_first_poll(&self, command: &str) {
        self.panicking.lock().insert(command.to_string());
    }

    pub fn started_count(&self) -> usize {
        self.started.lock().len()
    }

    /// Switch of the `index`-th started process.
    pub fn switch(&self, index: usize) -> Option<ProcessSwitch> {
        self.started.lock().get(index).map(|s| s.switch.clone())
    }

    pub fn finish(&self, index: usize) {
        if let Some(switch) = self.switch(index) {
            switch.finish();
        }
    }

    pub fn finish_all(&self) {
        for started in self.started.lock().iter() {
            started.switch.finish();
        }
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.started
            .lock()
            .iter()
            .map(|s| s.command_line.clone())
            .collect()
    }
}

impl Launcher for ScriptedLauncher {
    type Handle = ScriptedHandle;

    fn start(&self, invocation: &Invocation) -> Result<ScriptedHandle> {
        if self.failing.lock().contains(invocation.command()) {
            return Err(Error::Launch {
                command_line: invocation.command_line().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure"),
            });
        }

        let switch = ProcessSwitch::default();
        self.started.lock().push(Started {
            command_line: invocation.command_line().to_string(),
            switch: switch.clone(),
        });

        Ok(ScriptedHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            switch,
            polls_left: self.polls_until_exit,
            exit_code: self.exit_code,
            panic_next_poll: self.panicking.lock().contains(invocation.command()),
        })
    }
}
