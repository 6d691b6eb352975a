//! # Extraction Pipeline
//!
//! Applies named regular-expression rules to page content. Each rule is
//! evaluated on its own: a rule that fails to compile records an error for
//! itself and never affects the other rules of the same request.
//!
//! For every match the first capturing group is used when it participated in
//! the match, otherwise the whole match. Matches keep their order in the content.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

/// Result of a single rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Matched values in match order
    Matches(Vec<String>),
    /// The rule could not be evaluated
    Failed(String),
}

impl RuleOutcome {
    pub fn matches(&self) -> Option<&[String]> {
        match self {
            RuleOutcome::Matches(values) => Some(values),
            RuleOutcome::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RuleOutcome::Failed(_))
    }
}

// Matches serialize as a JSON array, failures as the bare error string.
impl Serialize for RuleOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RuleOutcome::Matches(values) => values.serialize(serializer),
            RuleOutcome::Failed(message) => serializer.serialize_str(message),
        }
    }
}

/// Rule name to outcome
pub type ExtractionOutcome = BTreeMap<String, RuleOutcome>;

/// Run every rule against `content`
pub fn extract(content: &str, rules: &BTreeMap<String, String>) -> ExtractionOutcome {
    rules
        .iter()
        .map(|(name, pattern)| {
            let outcome = apply_rule(content, pattern);
            match &outcome {
                RuleOutcome::Matches(values) => {
                    debug!(rule = %name, matches = values.len(), "rule applied")
                }
                RuleOutcome::Failed(message) => warn!(rule = %name, "{}", message),
            }
            (name.clone(), outcome)
        })
        .collect()
}

fn apply_rule(content: &str, pattern: &str) -> RuleOutcome {
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => return RuleOutcome::Failed(format!("Error extracting: {}", e)),
    };

    let values = regex
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.as_str().to_string())
        .collect();
    RuleOutcome::Matches(values)
}
