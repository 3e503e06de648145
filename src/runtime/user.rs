//! Confirmation prompts for destructive commands such as `uninstall`.

use anyhow::{Context, Result};
use log::debug;

use super::RealRuntime;

use std::io::{self, BufRead, Write};

/// What the user typed after a yes/no prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    /// Input closed before a line was read, e.g. `isopkg uninstall demo < /dev/null`.
    Closed,
}

impl Answer {
    fn parse(line: &str) -> Self {
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Answer::Yes,
            _ => Answer::No,
        }
    }
}

/// Write `prompt` to `prompts` and wait for an answer on `input`.
///
/// Prompts go to stderr in practice so stdout stays clean for command output.
/// A closed input declines and ends the prompt line.
pub(crate) fn ask<R: BufRead, W: Write>(prompt: &str, input: &mut R, prompts: &mut W) -> Result<bool> {
    write!(prompts, "{} [y/N] ", prompt)?;
    prompts.flush()?;

    let mut line = String::new();
    let answer = match input
        .read_line(&mut line)
        .context("Failed to read confirmation")?
    {
        0 => Answer::Closed,
        _ => Answer::parse(&line),
    };
    debug!("{:?} answered {:?}", prompt, answer);

    if answer == Answer::Closed {
        writeln!(prompts)?;
    }
    Ok(answer == Answer::Yes)
}

impl RealRuntime {
    pub(crate) fn confirm_impl(&self, prompt: &str) -> Result<bool> {
        ask(prompt, &mut io::stdin().lock(), &mut io::stderr())
    }
}
