//! Invocation descriptors and the builder that assembles them.
//!
//! An [`Invocation`] is a fully assembled command line, quoted for the
//! platform shell (`sh` on Unix, `cmd` on Windows):
//!
//! ```text
//! [binary_path] base_path command args... [--env=<tag>]
//! ```
//!
//! Building is pure and deterministic; nothing here touches the OS.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::RunnerConfig;

/// A ready-to-launch command line plus the logical command it was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    command: String,
    command_line: String,
}

impl Invocation {
    /// Wrap an already-assembled command line.
    pub fn from_command_line(command: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            command_line: command_line.into(),
        }
    }

    /// Logical command name (unquoted), for logging.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Escaped command line handed to the platform shell.
    pub fn command_line(&self) -> &str {
        &self.command_line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line)
    }
}

/// Turns a command name and argument list into an [`Invocation`].
#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    binary_path: Option<PathBuf>,
    base_path: PathBuf,
    environment_tag: Option<String>,
}

impl InvocationBuilder {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: None,
            base_path: base_path.into(),
            environment_tag: None,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            base_path: config.base_path.clone(),
            environment_tag: config.environment_tag.clone(),
        }
    }

    /// Set the interpreter placed in front of the base path.
    #[must_use]
    pub fn with_binary_path(mut self, binary_path: impl Into<PathBuf>) -> Self {
        self.binary_path = Some(binary_path.into());
        self
    }

    /// Set the environment selector appended to every invocation.
    #[must_use]
    pub fn with_environment_tag(mut self, tag: impl Into<String>) -> Self {
        self.environment_tag = Some(tag.into());
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Assemble the command line for `command` with `args`.
    ///
    /// Empty `binary_path` or `environment_tag` values are treated as unset.
    pub fn build<S: AsRef<str>>(&self, command: &str, args: &[S]) -> Invocation {
        let mut parts: Vec<Cow<'_, str>> = Vec::with_capacity(args.len() + 4);

        if let Some(binary) = self.binary_path.as_deref()
            && !binary.as_os_str().is_empty()
        {
            parts.push(shell_quote_owned(binary.to_string_lossy()));
        }
        parts.push(shell_quote_owned(self.base_path.to_string_lossy()));
        parts.push(shell_quote(command));
        parts.extend(args.iter().map(|a| shell_quote(a.as_ref())));

        if let Some(tag) = self.environment_tag.as_deref()
            && !tag.is_empty()
        {
            parts.push(shell_quote_owned(Cow::Owned(format!("--env={tag}"))));
        }

        Invocation {
            command: command.to_string(),
            command_line: parts.join(" "),
        }
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
}

/// Quote `arg` for the shell [`ShellLauncher`](crate::ShellLauncher) runs on
/// this platform.
pub fn shell_quote(arg: &str) -> Cow<'_, str> {
    if cfg!(windows) {
        cmd_quote(arg)
    } else {
        posix_quote(arg)
    }
}

/// Quote `arg` for a POSIX shell.
///
/// Arguments made only of safe characters pass through unchanged; anything
/// else is wrapped in single quotes with embedded quotes written as `'\''`.
pub fn posix_quote(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        return Cow::Borrowed(arg);
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

/// Quote `arg` for `cmd.exe`.
///
/// Anything outside the safe set is wrapped in double quotes, which keeps
/// `&`, `|`, `<`, `>` and `^` literal; embedded double quotes are doubled.
/// `%` is not in the safe set here, but cmd still expands `%VAR%` inside
/// quotes.
pub fn cmd_quote(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && arg.chars().all(|c| c != '%' && is_shell_safe(c)) {
        return Cow::Borrowed(arg);
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' {
            quoted.push_str("\"\"");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

fn shell_quote_owned(arg: Cow<'_, str>) -> Cow<'static, str> {
    Cow::Owned(shell_quote(&arg).into_owned())
}
