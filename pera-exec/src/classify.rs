use pera_types::task::{ErrorCategory, ErrorClassification, ErrorKind, RecommendedAction};

/// One row of the classification table: substring alternates to match
/// case-insensitively against the lowercased error message, in the order
/// `spec.md` §4.3 lists them (first match wins).
struct Pattern {
    needles: &'static [&'static str],
    kind: ErrorKind,
    category: ErrorCategory,
    recoverable: bool,
    action: RecommendedAction,
    confidence: f32,
}

const PATTERNS: &[Pattern] = &[
    Pattern {
        needles: &["timeout", "timed out"],
        kind: ErrorKind::Timeout,
        category: ErrorCategory::Performance,
        recoverable: true,
        action: RecommendedAction::BackoffRetry,
        confidence: 0.9,
    },
    Pattern {
        needles: &["connection refused", "cannot connect"],
        kind: ErrorKind::ConnRefused,
        category: ErrorCategory::Infra,
        recoverable: true,
        action: RecommendedAction::BackoffRetry,
        confidence: 0.85,
    },
    Pattern {
        needles: &["rate limit", "too many requests"],
        kind: ErrorKind::RateLimit,
        category: ErrorCategory::Resources,
        recoverable: true,
        action: RecommendedAction::ExponentialBackoffRetry,
        confidence: 0.8,
    },
    Pattern {
        needles: &["unauthorized", "invalid token", "authentication"],
        kind: ErrorKind::Auth,
        category: ErrorCategory::Security,
        recoverable: false,
        action: RecommendedAction::Escalate,
        confidence: 0.95,
    },
    Pattern {
        needles: &["not found", "404", "invalid endpoint"],
        kind: ErrorKind::MissingResource,
        category: ErrorCategory::Config,
        recoverable: false,
        action: RecommendedAction::Escalate,
        confidence: 0.7,
    },
];

/// Classify a tool or dispatch error message against the fixed pattern
/// table (`original_source/src/met/ejecucion/gestion_errores.py`'s
/// `clasificar_error`). Falls back to [`ErrorClassification::unknown`]
/// when nothing matches.
#[must_use]
pub fn classify_error(message: &str) -> ErrorClassification {
    let lowered = message.to_lowercase();
    for pattern in PATTERNS {
        if pattern.needles.iter().any(|needle| lowered.contains(needle)) {
            return ErrorClassification {
                kind: pattern.kind,
                category: pattern.category,
                recoverable: pattern.recoverable,
                recommended_action: pattern.action,
                confidence: pattern.confidence,
            };
        }
    }
    ErrorClassification::unknown()
}

/// Classification for a task that failed local validation, never reaching
/// a tool. Always non-recoverable: retrying wouldn't change the outcome.
#[must_use]
pub fn invalid_task_classification() -> ErrorClassification {
    ErrorClassification {
        kind: ErrorKind::InvalidTask,
        category: ErrorCategory::Config,
        recoverable: false,
        recommended_action: RecommendedAction::None,
        confidence: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_recoverable_with_backoff() {
        let c = classify_error("operation Timeout after 30s");
        assert_eq!(c.kind, ErrorKind::Timeout);
        assert!(c.recoverable);
        assert_eq!(c.recommended_action, RecommendedAction::BackoffRetry);
    }

    #[test]
    fn connection_refused_is_infra_with_linear_backoff() {
        let c = classify_error("Connection refused by host");
        assert_eq!(c.kind, ErrorKind::ConnRefused);
        assert_eq!(c.category, ErrorCategory::Infra);
        assert_eq!(c.recommended_action, RecommendedAction::BackoffRetry);
    }

    #[test]
    fn cannot_connect_is_treated_as_connection_refused() {
        let c = classify_error("cannot connect to upstream host");
        assert_eq!(c.kind, ErrorKind::ConnRefused);
        assert!(c.recoverable);
    }

    #[test]
    fn rate_limit_maps_to_resources() {
        let c = classify_error("429 rate limit exceeded");
        assert_eq!(c.kind, ErrorKind::RateLimit);
        assert_eq!(c.category, ErrorCategory::Resources);
    }

    #[test]
    fn too_many_requests_is_treated_as_rate_limit() {
        let c = classify_error("too many requests, slow down");
        assert_eq!(c.kind, ErrorKind::RateLimit);
        assert_eq!(c.recommended_action, RecommendedAction::ExponentialBackoffRetry);
    }

    #[test]
    fn unauthorized_is_non_recoverable_security() {
        let c = classify_error("401 Unauthorized");
        assert_eq!(c.kind, ErrorKind::Auth);
        assert!(!c.recoverable);
        assert_eq!(c.recommended_action, RecommendedAction::Escalate);
    }

    #[test]
    fn invalid_token_and_authentication_are_treated_as_auth() {
        let invalid_token = classify_error("invalid token supplied");
        assert_eq!(invalid_token.kind, ErrorKind::Auth);
        let authentication = classify_error("authentication required");
        assert_eq!(authentication.kind, ErrorKind::Auth);
    }

    #[test]
    fn missing_resource_maps_to_config_and_escalates() {
        let c = classify_error("resource not found");
        assert_eq!(c.kind, ErrorKind::MissingResource);
        assert_eq!(c.category, ErrorCategory::Config);
        assert_eq!(c.recommended_action, RecommendedAction::Escalate);
    }

    #[test]
    fn status_404_and_invalid_endpoint_are_treated_as_missing_resource() {
        let status = classify_error("404 returned by server");
        assert_eq!(status.kind, ErrorKind::MissingResource);
        let endpoint = classify_error("invalid endpoint requested");
        assert_eq!(endpoint.kind, ErrorKind::MissingResource);
    }

    #[test]
    fn timed_out_alternate_phrasing_is_classified_as_timeout() {
        let c = classify_error("the request timed out");
        assert_eq!(c.kind, ErrorKind::Timeout);
    }

    #[test]
    fn unmatched_message_is_unknown() {
        let c = classify_error("something entirely unexpected happened");
        assert_eq!(c.kind, ErrorKind::Unknown);
        assert!((c.confidence - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn first_match_wins_when_multiple_patterns_present() {
        let c = classify_error("request timed out: timeout while rate limit pending");
        assert_eq!(c.kind, ErrorKind::Timeout);
    }
}
