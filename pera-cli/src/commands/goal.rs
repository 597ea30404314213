use std::collections::HashMap;

use clap::Args;
use pera_types::goal::Goal;
use serde::Serialize;
use uuid::Uuid;

use crate::config::System;
use crate::output::{Output, OutputFormat};

/// Submit a goal and run it to completion (`spec.md` §6's submit-goal entry
/// point), printing the resulting [`GoalOutcome`](pera_orchestrator::GoalOutcome).
#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Free-text goal statement.
    #[arg(value_name = "TEXT")]
    pub text: String,
    /// Session to run the goal under; a fresh one is generated if omitted.
    #[arg(long)]
    pub session: Option<Uuid>,
    /// Priority in `[1, 10]`.
    #[arg(long, default_value_t = 5)]
    pub priority: u8,
}

#[derive(Debug, Serialize)]
struct GoalOutcomeView {
    session_id: Uuid,
    state: String,
    episode_id: Option<Uuid>,
    tasks_succeeded: usize,
    tasks_total: usize,
}

impl Output for GoalOutcomeView {
    fn human_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("session:  {}", self.session_id), format!("state:    {}", self.state)];
        if let Some(episode_id) = self.episode_id {
            lines.push(format!("episode:  {episode_id}"));
        }
        lines.push(format!("tasks:    {}/{} succeeded", self.tasks_succeeded, self.tasks_total));
        lines
    }
}

pub async fn run(args: SubmitArgs, system: &System, format: OutputFormat) -> anyhow::Result<()> {
    let session_id = args.session.unwrap_or_else(Uuid::new_v4);
    let goal = Goal::new(session_id, args.text, HashMap::new()).with_priority(args.priority);
    let outcome = system.orchestrator.run_goal(goal).await?;

    let view = GoalOutcomeView {
        session_id: outcome.session_id,
        state: format!("{:?}", outcome.state).to_lowercase(),
        episode_id: outcome.episode_id,
        tasks_succeeded: outcome.results.iter().filter(|r| r.success).count(),
        tasks_total: outcome.results.len(),
    };
    format.print(&view)
}

/// Cancel a currently running session.
#[derive(Debug, Args)]
pub struct CancelArgs {
    #[arg(value_name = "SESSION_ID")]
    pub session: Uuid,
}

#[derive(Debug, Serialize)]
struct CancelView {
    session_id: Uuid,
    canceled: bool,
}

impl Output for CancelView {
    fn human_lines(&self) -> Vec<String> {
        vec![if self.canceled {
            format!("session {} canceled", self.session_id)
        } else {
            format!("no running session {}", self.session_id)
        }]
    }
}

pub async fn cancel(args: CancelArgs, system: &System, format: OutputFormat) -> anyhow::Result<()> {
    let canceled = system.orchestrator.cancel_session(args.session).await;
    format.print(&CancelView { session_id: args.session, canceled })
}
