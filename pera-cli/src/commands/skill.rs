use clap::{Args, Subcommand};
use pera_types::filters::SkillFilter;
use serde::Serialize;
use uuid::Uuid;

use crate::config::System;
use crate::output::{Output, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum SkillCommand {
    /// List skills currently in the Knowledge Store.
    List(ListArgs),
    /// Semantic search over skills by free text.
    Search(SearchArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(value_name = "QUERY")]
    pub query: String,
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
struct SkillSummary {
    id: Uuid,
    name: String,
    version: String,
    success_rate: f32,
    categories: Vec<String>,
}

impl Output for SkillSummary {}

#[derive(Debug, Serialize)]
struct SkillSummaryList(Vec<SkillSummary>);

impl Output for SkillSummaryList {
    fn human_lines(&self) -> Vec<String> {
        if self.0.is_empty() {
            return vec!["(no skills found)".to_string()];
        }
        self.0
            .iter()
            .map(|s| format!("{}  {} v{}  {:.0}% success  [{}]", s.id, s.name, s.version, s.success_rate * 100.0, s.categories.join(", ")))
            .collect()
    }
}

pub async fn list(args: ListArgs, system: &System, format: OutputFormat) -> anyhow::Result<()> {
    let filter = SkillFilter { category: args.category.clone(), ..SkillFilter::default() };
    let skills = system.knowledge.list_all_skills(&filter, args.limit).await?;
    let view = SkillSummaryList(
        skills
            .into_iter()
            .map(|s| SkillSummary { id: s.id, name: s.name, version: s.version.to_string(), success_rate: s.success_rate(), categories: s.categories })
            .collect(),
    );
    format.print(&view)
}

#[derive(Debug, Serialize)]
struct SkillMatchView {
    id: Uuid,
    name: String,
    similarity: f32,
    success_rate: f32,
}

impl Output for SkillMatchView {}

#[derive(Debug, Serialize)]
struct SkillMatchList(Vec<SkillMatchView>);

impl Output for SkillMatchList {
    fn human_lines(&self) -> Vec<String> {
        if self.0.is_empty() {
            return vec!["(no matching skills)".to_string()];
        }
        self.0
            .iter()
            .map(|m| format!("{}  {}  similarity={:.2}  success_rate={:.2}", m.id, m.name, m.similarity, m.success_rate))
            .collect()
    }
}

pub async fn search(args: SearchArgs, system: &System, format: OutputFormat) -> anyhow::Result<()> {
    let matches = system.knowledge.search_skills(&args.query, &SkillFilter::default(), args.limit).await?;
    let view = SkillMatchList(
        matches
            .into_iter()
            .map(|m| SkillMatchView { id: m.skill.id, name: m.skill.name, similarity: m.similarity, success_rate: m.skill.success_rate() })
            .collect(),
    );
    format.print(&view)
}
