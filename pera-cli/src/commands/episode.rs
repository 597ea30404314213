use clap::{Args, Subcommand};
use pera_types::episode::GlobalState;
use pera_types::filters::EpisodeFilter;
use serde::Serialize;
use uuid::Uuid;

use crate::config::System;
use crate::output::{Output, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum EpisodeCommand {
    /// List recorded episodes, most recent first.
    List(ListArgs),
    /// Show one episode in full.
    Show(ShowArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only episodes in this terminal state (success, failure, partial, timeout, canceled).
    #[arg(long)]
    pub state: Option<String>,
    /// Only episodes belonging to this session.
    #[arg(long)]
    pub session: Option<Uuid>,
    /// Only episodes whose goal text contains this substring.
    #[arg(long)]
    pub goal_contains: Option<String>,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

fn parse_state(raw: &str) -> anyhow::Result<GlobalState> {
    match raw.to_lowercase().as_str() {
        "success" => Ok(GlobalState::Success),
        "failure" => Ok(GlobalState::Failure),
        "partial" => Ok(GlobalState::Partial),
        "timeout" => Ok(GlobalState::Timeout),
        "canceled" | "cancelled" => Ok(GlobalState::Canceled),
        other => anyhow::bail!("unrecognized episode state '{other}'"),
    }
}

#[derive(Debug, Serialize)]
struct EpisodeSummary {
    id: String,
    goal: String,
    state: String,
    success_ratio: f32,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl Output for EpisodeSummary {}

#[derive(Debug, Serialize)]
struct EpisodeSummaryList(Vec<EpisodeSummary>);

impl Output for EpisodeSummaryList {
    fn human_lines(&self) -> Vec<String> {
        if self.0.is_empty() {
            return vec!["(no episodes found)".to_string()];
        }
        self.0
            .iter()
            .map(|e| format!("{}  [{}]  {:.0}%  {}", e.id, e.state, e.success_ratio * 100.0, e.goal))
            .collect()
    }
}

pub async fn list(args: ListArgs, system: &System, format: OutputFormat) -> anyhow::Result<()> {
    let mut filter = EpisodeFilter::default();
    if let Some(state) = &args.state {
        filter = filter.with_state(parse_state(state)?);
    }
    if let Some(session) = args.session {
        filter = filter.with_session(session);
    }
    if let Some(term) = &args.goal_contains {
        filter = filter.with_goal_contains(term.clone());
    }

    let episodes = system.episodic.list_episodes(&filter, args.limit).await?;
    let view = EpisodeSummaryList(
        episodes
            .into_iter()
            .map(|e| EpisodeSummary {
                id: e.display_id(),
                goal: e.goal,
                state: format!("{:?}", e.global_state).to_lowercase(),
                success_ratio: e.metrics.success_ratio,
                started_at: e.start,
            })
            .collect(),
    );
    format.print(&view)
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(value_name = "EPISODE_ID")]
    pub id: Uuid,
}

impl Output for pera_types::episode::Episode {
    fn human_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("id:            {}", self.display_id()),
            format!("goal:          {}", self.goal),
            format!("session:       {}", self.session_id),
            format!("state:         {:?}", self.global_state),
            format!("success ratio: {:.2}", self.metrics.success_ratio),
            format!("retries:       {}", self.metrics.total_retries),
            format!("duration:      {:?}", self.total_duration),
            "tasks:".to_string(),
        ];
        for result in &self.task_results {
            lines.push(format!(
                "  - {}  success={}  tool={:?}  retries={}",
                result.task_id, result.success, result.tool_used, result.retries
            ));
        }
        lines
    }
}

pub async fn show(args: ShowArgs, system: &System, format: OutputFormat) -> anyhow::Result<()> {
    let episode = system
        .episodic
        .get_episode(args.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no episode with id {}", args.id))?;
    format.print(&episode)
}
