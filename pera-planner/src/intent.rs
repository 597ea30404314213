/// Coarse intent classification used to prepend a tag to the objective and
/// to choose a decomposition strategy (`spec.md` §4.4 preprocessing step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Search,
    Create,
    Analyze,
    Summarize,
    Other,
}

impl Intent {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Intent::Search => "search",
            Intent::Create => "create",
            Intent::Analyze => "analyze",
            Intent::Summarize => "summarize",
            Intent::Other => "general",
        }
    }
}

const KEYWORD_GROUPS: &[(Intent, &[&str])] = &[
    (Intent::Search, &["find", "search", "look up", "locate", "discover"]),
    (Intent::Create, &["create", "generate", "build", "write", "draft"]),
    (Intent::Analyze, &["analyze", "evaluate", "compare", "assess", "diagnose"]),
    (Intent::Summarize, &["summarize", "condense", "recap", "digest"]),
];

/// Classify a normalized goal's intent by keyword group membership, first
/// match wins (`spec.md` §4.4: "classify intent by keyword groups").
#[must_use]
pub fn classify_intent(normalized_goal: &str) -> Intent {
    for (intent, keywords) in KEYWORD_GROUPS {
        if keywords.iter().any(|kw| normalized_goal.contains(kw)) {
            return *intent;
        }
    }
    Intent::Other
}

/// Markers that push a goal toward `LLM-reasoning` rather than
/// `skill-based` decomposition even without a matching skill: the goal is
/// long, multi-clause, or names a known complexity signal.
const COMPLEXITY_MARKERS: &[&str] =
    &["and then", "after that", "depending on", "if", "multiple", "several steps"];

/// Whether a normalized goal should be treated as "complex" for strategy
/// selection purposes (`spec.md` §4.4 step 2).
#[must_use]
pub fn is_complex(normalized_goal: &str) -> bool {
    const LONG_GOAL_WORD_THRESHOLD: usize = 25;
    let word_count = normalized_goal.split_whitespace().count();
    let multi_clause = normalized_goal.matches(',').count() >= 2;
    let has_marker = COMPLEXITY_MARKERS.iter().any(|m| normalized_goal.contains(m));
    word_count >= LONG_GOAL_WORD_THRESHOLD || multi_clause || has_marker
}

/// Preprocess a raw goal: normalize whitespace/case and prepend the
/// classified intent tag to the objective, per `spec.md` §4.4.
#[must_use]
pub fn preprocess(raw_goal: &str) -> (String, Intent) {
    let normalized = raw_goal.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let intent = classify_intent(&normalized);
    let tagged = format!("[{}] {normalized}", intent.tag());
    (tagged, intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_search_intent() {
        assert_eq!(classify_intent("please find the latest release notes"), Intent::Search);
    }

    #[test]
    fn classifies_create_intent() {
        assert_eq!(classify_intent("write a summary of the incident"), Intent::Create);
    }

    #[test]
    fn falls_back_to_other_when_no_keyword_matches() {
        assert_eq!(classify_intent("ping the health endpoint"), Intent::Other);
    }

    #[test]
    fn long_goal_is_complex() {
        let goal = "do one thing and then do another thing and then finally do a third";
        assert!(is_complex(goal));
    }

    #[test]
    fn short_simple_goal_is_not_complex() {
        assert!(!is_complex("find the weather"));
    }

    #[test]
    fn preprocess_tags_the_objective() {
        let (tagged, intent) = preprocess("  Find   the   weather  ");
        assert_eq!(intent, Intent::Search);
        assert_eq!(tagged, "[search] find the weather");
    }
}
