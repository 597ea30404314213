use crate::config::CliConfig;
use crate::output::{Output, OutputFormat};

impl Output for CliConfig {
    fn human_lines(&self) -> Vec<String> {
        vec![toml::to_string_pretty(self).unwrap_or_default()]
    }
}

/// Print the effective configuration (file values merged over defaults).
pub fn show(config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    format.print(config)
}
