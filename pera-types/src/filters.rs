use chrono::{DateTime, Utc};

use crate::episode::GlobalState;

/// Filter criteria for `EpisodicLog::list_episodes`.
#[derive(Debug, Clone, Default)]
pub struct EpisodeFilter {
    pub state: Option<GlobalState>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub goal_contains: Option<String>,
    pub session_id: Option<uuid::Uuid>,
    pub performance_band: Option<String>,
}

impl EpisodeFilter {
    #[must_use]
    pub fn with_state(mut self, state: GlobalState) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: uuid::Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    #[must_use]
    pub fn with_goal_contains(mut self, term: impl Into<String>) -> Self {
        self.goal_contains = Some(term.into());
        self
    }
}

/// Filter criteria for `KnowledgeStore::list_all_skills` /
/// `search_skills`.
#[derive(Debug, Clone, Default)]
pub struct SkillFilter {
    pub skill_type: Option<crate::skill::SkillType>,
    pub category: Option<String>,
    pub min_success_rate: Option<f32>,
}
