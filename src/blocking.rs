//! Classification of pull requests that cannot be merged as they stand.

use std::fmt;

use crate::types::{MergeStateStatus, Mergeable, PullRequestNode};

/// Why a pull request is blocked. Variants are declared in reporting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockingReason {
    MergeConflicts,
    FailingChecks(Vec<String>),
    BranchProtection,
    BehindBase,
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingReason::MergeConflicts => write!(f, "Merge conflicts"),
            BlockingReason::FailingChecks(checks) => {
                write!(f, "Failing checks: {}", checks.join(", "))
            }
            BlockingReason::BranchProtection => write!(f, "Blocked by branch protection rules"),
            BlockingReason::BehindBase => write!(f, "Behind base branch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockingResult {
    pub reasons: Vec<BlockingReason>,
}

impl BlockingResult {
    pub fn is_blocked(&self) -> bool {
        !self.reasons.is_empty()
    }

    /// Human readable reasons, in priority order.
    pub fn reason_strings(&self) -> Vec<String> {
        self.reasons.iter().map(ToString::to_string).collect()
    }
}

/// Identifiers of the failing `CheckRun`s and `StatusContext`s, in the order
/// GitHub reported them. Duplicates are kept.
pub fn failing_checks(pr: &PullRequestNode) -> Vec<String> {
    pr.check_contexts()
        .iter()
        .filter_map(|context| context.failing_identifier())
        .map(str::to_owned)
        .collect()
}

/// Classifies a pull request node. Draft state is not considered here.
pub fn classify(pr: &PullRequestNode) -> BlockingResult {
    let mut reasons = Vec::new();

    if pr.mergeable() == Mergeable::Conflicting {
        reasons.push(BlockingReason::MergeConflicts);
    }

    let failing = failing_checks(pr);
    if !failing.is_empty() {
        reasons.push(BlockingReason::FailingChecks(failing));
    }

    match pr.merge_state_status() {
        MergeStateStatus::Blocked => reasons.push(BlockingReason::BranchProtection),
        MergeStateStatus::Behind => reasons.push(BlockingReason::BehindBase),
        _ => {}
    }

    BlockingResult { reasons }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn pr(mergeable: Option<&str>, merge_state: Option<&str>, contexts: Value) -> PullRequestNode {
        let mut node = json!({
            "number": 1,
            "title": "Test",
            "isDraft": false,
            "commits": {"nodes": [{"commit": {"statusCheckRollup": {"contexts": {"nodes": contexts}}}}]}
        });
        if let Some(m) = mergeable {
            node["mergeable"] = json!(m);
        }
        if let Some(s) = merge_state {
            node["mergeStateStatus"] = json!(s);
        }
        PullRequestNode::new(node)
    }

    fn check_run(name: &str, conclusion: &str) -> Value {
        json!({"__typename": "CheckRun", "name": name, "conclusion": conclusion})
    }

    fn status(context: &str, state: &str) -> Value {
        json!({"__typename": "StatusContext", "context": context, "state": state})
    }

    #[test]
    fn test_failing_check_run_conclusions() {
        for conclusion in ["failure", "cancelled", "timed_out", "action_required", "FAILURE"] {
            let node = pr(None, None, json!([check_run("CI", conclusion)]));
            assert_eq!(failing_checks(&node), vec!["CI"], "conclusion {conclusion}");
        }
        for conclusion in ["success", "neutral", "skipped", "SUCCESS"] {
            let node = pr(None, None, json!([check_run("CI", conclusion)]));
            assert!(failing_checks(&node).is_empty(), "conclusion {conclusion}");
        }
    }

    #[test]
    fn test_failing_status_context_states() {
        let node = pr(
            None,
            None,
            json!([
                status("ci/jenkins", "FAILURE"),
                status("security/scan", "error"),
                status("ci/ok", "SUCCESS"),
                status("ci/wait", "PENDING"),
            ]),
        );
        assert_eq!(failing_checks(&node), vec!["ci/jenkins", "security/scan"]);
    }

    #[test]
    fn test_entries_without_identifier_or_unknown_type_are_skipped() {
        let node = pr(
            None,
            None,
            json!([
                {"__typename": "CheckRun", "conclusion": "failure"},
                {"__typename": "StatusContext", "state": "failure"},
                {"__typename": "Mystery", "name": "x", "conclusion": "failure"},
                {"__typename": "CheckRun", "name": "no-conclusion", "conclusion": null},
            ]),
        );
        assert!(failing_checks(&node).is_empty());
    }

    #[test]
    fn test_duplicates_keep_encounter_order() {
        let node = pr(
            None,
            None,
            json!([
                check_run("lint", "failure"),
                status("ci/build", "error"),
                check_run("lint", "failure"),
            ]),
        );
        assert_eq!(failing_checks(&node), vec!["lint", "ci/build", "lint"]);
    }

    #[test]
    fn test_not_blocked_when_clean() {
        let node = pr(
            Some("MERGEABLE"),
            Some("CLEAN"),
            json!([check_run("CI", "success"), status("ci/x", "success")]),
        );
        let result = classify(&node);
        assert!(!result.is_blocked());
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_behind_base_only() {
        let node = pr(Some("MERGEABLE"), Some("BEHIND"), json!([]));
        let result = classify(&node);
        assert!(result.is_blocked());
        assert_eq!(result.reason_strings(), vec!["Behind base branch"]);
    }

    #[test]
    fn test_all_reasons_in_priority_order() {
        let node = pr(
            Some("CONFLICTING"),
            Some("BLOCKED"),
            json!([check_run("Test A", "failure"), check_run("Test B", "failure")]),
        );
        let result = classify(&node);
        assert!(result.is_blocked());
        assert_eq!(
            result.reason_strings(),
            vec![
                "Merge conflicts",
                "Failing checks: Test A, Test B",
                "Blocked by branch protection rules",
            ]
        );
    }

    #[test]
    fn test_failing_checks_grouped_into_one_reason() {
        let node = pr(
            Some("MERGEABLE"),
            Some("CLEAN"),
            json!([
                check_run("Test A", "failure"),
                check_run("Test B", "timed_out"),
                status("ci/test", "failure"),
            ]),
        );
        let result = classify(&node);
        assert_eq!(result.reasons.len(), 1);
        assert_eq!(
            result.reason_strings()[0],
            "Failing checks: Test A, Test B, ci/test"
        );
    }

    #[test]
    fn test_unknown_and_missing_states_contribute_nothing() {
        for (mergeable, state) in [
            (Some("UNKNOWN"), Some("CLEAN")),
            (None, Some("CLEAN")),
            (Some("MERGEABLE"), None),
            (Some("conflicting"), Some("behind")),
            (Some("MERGEABLE"), Some("DIRTY")),
            (Some("MERGEABLE"), Some("UNSTABLE")),
        ] {
            let result = classify(&pr(mergeable, state, json!([])));
            assert!(!result.is_blocked(), "{mergeable:?}/{state:?}");
        }
    }

    #[test]
    fn test_empty_node_is_not_blocked() {
        let result = classify(&PullRequestNode::new(json!({})));
        assert!(!result.is_blocked());

        let result = classify(&PullRequestNode::new(Value::Null));
        assert!(!result.is_blocked());
    }

    #[test]
    fn test_draft_never_contributes_a_reason() {
        let mut node = pr(Some("MERGEABLE"), Some("DRAFT"), json!([])).into_value();
        node["isDraft"] = json!(true);
        let result = classify(&PullRequestNode::new(node));
        assert!(!result.is_blocked());
    }

    #[test]
    fn test_classification_is_repeatable() {
        let node = pr(
            Some("CONFLICTING"),
            Some("BEHIND"),
            json!([status("ci/a", "error")]),
        );
        assert_eq!(classify(&node), classify(&node));
    }
}
