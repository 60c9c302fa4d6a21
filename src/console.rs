//! Operator console
//!
//! All user-facing text of the initialization procedures goes through
//! [`Console`]; logging stays on stderr via `tracing`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};

/// Marker printed in front of every prompt
pub const PROMPT_MARKER: &str = ">>> ";

/// Line-oriented text console
#[async_trait]
pub trait Console: Send {
    /// Print without a trailing newline
    fn print(&mut self, text: &str);

    /// Print followed by a newline
    fn println(&mut self, text: &str);

    /// Print the prompt marker and read one line, without its line ending.
    /// End of input reads as an empty line.
    async fn prompt(&mut self) -> Result<String>;
}

/// Console on the process stdin/stdout
pub struct StdConsole {
    stdin: BufReader<Stdin>,
}

impl StdConsole {
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(tokio::io::stdin()),
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Console for StdConsole {
    fn print(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}", text);
        // Partial lines ("Rotation stage....") must show before the check runs
        let _ = stdout.flush();
    }

    fn println(&mut self, text: &str) {
        println!("{}", text);
    }

    async fn prompt(&mut self) -> Result<String> {
        self.print(PROMPT_MARKER);

        let mut line = String::new();
        self.stdin
            .read_line(&mut line)
            .await
            .context("Failed to read from stdin")?;

        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Console that replays scripted input and captures everything printed
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    inputs: std::collections::VecDeque<String>,
    output: String,
    prompts: usize,
}

#[cfg(test)]
impl ScriptedConsole {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Everything printed so far
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Number of prompts answered
    pub fn prompts(&self) -> usize {
        self.prompts
    }

    /// Inputs not consumed yet
    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }
}

#[cfg(test)]
#[async_trait]
impl Console for ScriptedConsole {
    fn print(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn println(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }

    async fn prompt(&mut self) -> Result<String> {
        self.print(PROMPT_MARKER);
        self.prompts += 1;
        let input = self.inputs.pop_front().unwrap_or_default();
        self.println(&input);
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_console_replays_input() {
        let mut console = ScriptedConsole::new(["retry", "skip"]);
        console.print("Rotation stage....");
        console.println("Error");

        assert_eq!(console.prompt().await.expect("prompt"), "retry");
        assert_eq!(console.prompt().await.expect("prompt"), "skip");
        // Exhausted input behaves like end of stdin
        assert_eq!(console.prompt().await.expect("prompt"), "");

        assert_eq!(console.prompts(), 3);
        assert_eq!(console.remaining(), 0);
        assert!(console.output().starts_with("Rotation stage....Error\n>>> retry\n"));
    }
}
