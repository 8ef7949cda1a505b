//! Block/allow decision from the provider results

use serde::{Deserialize, Serialize};
use spamblock_common::config::PolicyConfig;
use spamblock_common::types::SpfAction;

use super::{ProviderResult, POSTMARK, SPF, STOPFORUMSPAM};
use crate::spf::SpfOutcome;

/// The three inputs the policy acts on
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Signals {
    pub postmark_score: Option<f64>,
    pub sfs_confidence: Option<f64>,
    pub spf_result: Option<SpfOutcome>,
}

impl Signals {
    /// Pick each signal out of the provider results by provider name
    pub fn from_results(results: &[ProviderResult]) -> Self {
        let mut signals = Signals::default();
        for result in results {
            match result.provider.as_str() {
                POSTMARK => signals.postmark_score = result.score,
                STOPFORUMSPAM => signals.sfs_confidence = result.score,
                SPF => signals.spf_result = result.spf_outcome(),
                _ => {}
            }
        }
        signals
    }
}

/// Final decision for one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamDecision {
    /// Any source fired, regardless of test mode
    pub would_block: bool,
    /// `would_block` and not in test mode
    pub should_block: bool,
    /// Sources that fired, in provider order
    pub triggered: Vec<String>,
    /// Sources that produced a result
    pub queried: Vec<String>,
    pub postmark_score: Option<f64>,
    pub sfs_confidence: Option<f64>,
    pub spf_result: Option<SpfOutcome>,
}

/// Decision fields as handed back to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionFields {
    pub provider: String,
    /// Content score, empty when unknown
    pub score: String,
    /// `"1"` or `"0"`
    pub should_block: String,
}

impl SpamDecision {
    /// Triggered sources, or every queried source when nothing fired
    pub fn provider_tag(&self) -> String {
        if self.triggered.is_empty() {
            self.queried.join(",")
        } else {
            self.triggered.join(",")
        }
    }

    pub fn score_field(&self) -> String {
        self.postmark_score
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    pub fn should_block_flag(&self) -> &'static str {
        if self.should_block {
            "1"
        } else {
            "0"
        }
    }

    pub fn fields(&self) -> DecisionFields {
        DecisionFields {
            provider: self.provider_tag(),
            score: self.score_field(),
            should_block: self.should_block_flag().to_string(),
        }
    }
}

fn spf_blocks(outcome: Option<SpfOutcome>, policy: &PolicyConfig) -> bool {
    let action = match outcome {
        Some(SpfOutcome::Fail) => policy.spf_fail_action,
        Some(SpfOutcome::None) => policy.spf_none_action,
        Some(SpfOutcome::Invalid) => policy.spf_invalid_action,
        Some(SpfOutcome::Pass) | None => SpfAction::Ignore,
    };
    action.is_spam()
}

/// Apply the policy to a set of signals
pub fn aggregate(signals: Signals, queried: Vec<String>, policy: &PolicyConfig) -> SpamDecision {
    let mut triggered = Vec::new();

    if signals
        .postmark_score
        .is_some_and(|s| s >= policy.min_block_score)
    {
        triggered.push(POSTMARK.to_string());
    }

    if signals
        .sfs_confidence
        .is_some_and(|c| c >= policy.sfs_min_confidence)
    {
        triggered.push(STOPFORUMSPAM.to_string());
    }

    if spf_blocks(signals.spf_result, policy) {
        triggered.push(SPF.to_string());
    }

    let would_block = !triggered.is_empty();

    SpamDecision {
        would_block,
        should_block: would_block && !policy.test_mode,
        triggered,
        queried,
        postmark_score: signals.postmark_score,
        sfs_confidence: signals.sfs_confidence,
        spf_result: signals.spf_result,
    }
}

/// Decide from provider results under `policy`
pub fn decide(results: &[ProviderResult], policy: &PolicyConfig) -> SpamDecision {
    let queried = results.iter().map(|r| r.provider.clone()).collect();
    aggregate(Signals::from_results(results), queried, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spf(outcome: &str) -> ProviderResult {
        ProviderResult::scored(SPF, None).with_data("result", outcome)
    }

    fn results(postmark: Option<f64>, sfs: Option<f64>, spf_outcome: &str) -> Vec<ProviderResult> {
        vec![
            ProviderResult::scored(POSTMARK, postmark),
            ProviderResult::scored(STOPFORUMSPAM, sfs),
            spf(spf_outcome),
        ]
    }

    #[test]
    fn test_postmark_triggers() {
        let decision = decide(&results(Some(6.0), Some(10.0), "pass"), &PolicyConfig::default());

        assert!(decision.would_block);
        assert!(decision.should_block);
        assert_eq!(decision.triggered, vec!["postmark".to_string()]);
        assert_eq!(
            decision.fields(),
            DecisionFields {
                provider: "postmark".to_string(),
                score: "6".to_string(),
                should_block: "1".to_string(),
            }
        );
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let decision = decide(&results(Some(5.0), Some(90.0), "pass"), &PolicyConfig::default());
        assert_eq!(
            decision.triggered,
            vec!["postmark".to_string(), "sfs".to_string()]
        );
        assert_eq!(decision.provider_tag(), "postmark,sfs");

        let decision = decide(&results(Some(4.9), Some(89.9), "pass"), &PolicyConfig::default());
        assert!(!decision.would_block);
    }

    #[test]
    fn test_test_mode_never_enforces() {
        let policy = PolicyConfig {
            test_mode: true,
            ..PolicyConfig::default()
        };
        let decision = decide(&results(Some(9.0), Some(99.0), "fail"), &policy);

        assert!(decision.would_block);
        assert!(!decision.should_block);
        assert_eq!(decision.should_block_flag(), "0");
    }

    #[test]
    fn test_nothing_triggered_tags_all_queried() {
        let decision = decide(&results(Some(1.5), None, "pass"), &PolicyConfig::default());

        assert!(!decision.would_block);
        assert_eq!(decision.provider_tag(), "postmark,sfs,spf");
        assert_eq!(decision.score_field(), "1.5");
        assert_eq!(decision.should_block_flag(), "0");
    }

    #[test]
    fn test_missing_score_never_blocks() {
        let results = vec![
            ProviderResult::failed(POSTMARK, "Network error calling Postmark Spamcheck"),
            ProviderResult::failed(STOPFORUMSPAM, "Network error calling StopForumSpam"),
        ];
        let decision = decide(&results, &PolicyConfig::default());

        assert!(!decision.would_block);
        assert_eq!(decision.score_field(), "");
        assert_eq!(decision.provider_tag(), "postmark,sfs");
    }

    #[test]
    fn test_spf_actions() {
        let policy = PolicyConfig {
            spf_fail_action: SpfAction::Spam,
            spf_invalid_action: SpfAction::Spam,
            ..PolicyConfig::default()
        };

        let fail = decide(&results(None, None, "fail"), &policy);
        assert_eq!(fail.triggered, vec!["spf".to_string()]);
        assert_eq!(fail.spf_result, Some(SpfOutcome::Fail));

        let invalid = decide(&results(None, None, "invalid"), &policy);
        assert!(invalid.would_block);

        let none = decide(&results(None, None, "none"), &policy);
        assert!(!none.would_block);

        let pass = decide(&results(None, None, "pass"), &PolicyConfig {
            spf_none_action: SpfAction::Spam,
            ..policy.clone()
        });
        assert!(!pass.would_block);
    }

    #[test]
    fn test_default_policy_ignores_spf() {
        let decision = decide(&results(None, None, "fail"), &PolicyConfig::default());
        assert!(!decision.would_block);
    }
}
