use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};

/// Output format shared by every subcommand (`spec.md` §6's submit-goal
/// entry point is transport-agnostic; the CLI's only job is to render its
/// JSON-shaped responses for a human or a script).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON, one value per line where it helps readability.
    Human,
    /// Compact JSON for scripting.
    Json,
}

pub trait Output: Serialize {
    /// Lines rendered in human mode; falls back to pretty JSON if a command
    /// hasn't bothered with a bespoke rendering.
    fn human_lines(&self) -> Vec<String> {
        vec![serde_json::to_string_pretty(self).unwrap_or_default()]
    }
}

impl OutputFormat {
    pub fn print<T: Output>(self, value: &T) -> anyhow::Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        match self {
            OutputFormat::Human => {
                for line in value.human_lines() {
                    writeln!(handle, "{line}")?;
                }
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut handle, value)?;
                writeln!(handle)?;
            }
        }
        Ok(())
    }
}
