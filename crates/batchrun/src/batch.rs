//! Command files: one command per line, run through the pool.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use batchrun_core::{CommandRunner, Launcher};
use tracing::info;

/// One line of a command file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub command: String,
    pub args: Vec<String>,
}

/// Parse a command file. Blank lines and `#` comments are skipped; the rest
/// is split on whitespace into `command arg...`.
pub fn parse_batch(content: &str) -> Vec<BatchEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut words = line.split_whitespace().map(str::to_string);
            let command = words.next()?;
            Some(BatchEntry {
                command,
                args: words.collect(),
            })
        })
        .collect()
}

/// Read and parse a command file; `-` reads stdin.
pub fn read_batch(path: &Path) -> Result<Vec<BatchEntry>> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read commands from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read command file {}", path.display()))?
    };
    Ok(parse_batch(&content))
}

/// Submit every entry; the last one is the final submission, so this returns
/// only after all of them have exited.
pub fn run_batch<L: Launcher>(runner: &CommandRunner<L>, entries: &[BatchEntry]) -> Result<usize> {
    let last = entries.len().saturating_sub(1);
    for (i, entry) in entries.iter().enumerate() {
        runner
            .submit(&entry.command, &entry.args, i == last)
            .with_context(|| format!("failed to submit `{}` (line {})", entry.command, i + 1))?;
    }
    info!(commands = entries.len(), "Batch finished");
    Ok(entries.len())
}
