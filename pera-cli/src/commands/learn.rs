use pera_learning::LearningCycleReport;

use crate::config::System;
use crate::output::{Output, OutputFormat};

impl Output for LearningCycleReport {
    fn human_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("episodes considered:  {}", self.episodes_considered),
            format!("pattern clusters:     {} ({} noise)", self.pattern_clusters, self.pattern_noise),
            format!("candidates accepted:  {}", self.candidates_accepted),
            format!("skills integrated:    {}", self.skills_integrated),
            format!("preferences applied:  {}", self.preferences_applied),
        ];
        if !self.errors.is_empty() {
            lines.push(format!("errors: {}", self.errors.join("; ")));
        }
        lines
    }
}

/// Run one learning-loop window immediately, over episodes recorded within
/// the configured window (`spec.md` §4.6), rather than waiting for the
/// scheduler's normal periodic or per-episode trigger.
pub async fn run(system: &System, format: OutputFormat) -> anyhow::Result<()> {
    let report = system.learning.run_default_window().await?;
    format.print(&report)
}
