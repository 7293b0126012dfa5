//! Wait conditions - a probe, a match rule and the verdict a match stands for

use crate::core::probe::Probe;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What a matching condition says about the watched job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// The job reached the state we were waiting for
    Success,
    /// The job reported a failure marker
    Failure,
}

/// Which part of the probe output a rule is tested against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subject {
    /// The full output
    #[default]
    Whole,
    /// Only the first whitespace-separated token
    FirstToken,
}

impl Subject {
    fn select<'a>(&self, output: &'a str) -> &'a str {
        match self {
            Subject::Whole => output,
            Subject::FirstToken => output.split_whitespace().next().unwrap_or(""),
        }
    }
}

/// Match rule applied to probe output
#[derive(Debug, Clone)]
pub enum MatchRule {
    /// Substring containment
    Contains(String),
    /// Exact equality (surrounding whitespace ignored)
    Equals(String),
    /// Exact inequality (surrounding whitespace ignored)
    NotEquals(String),
    /// Regular expression match
    Pattern(Regex),
}

impl MatchRule {
    /// Check if the rule holds for the given text
    pub fn matches(&self, text: &str) -> bool {
        match self {
            MatchRule::Contains(needle) => text.contains(needle.as_str()),
            MatchRule::Equals(target) => text.trim() == target,
            MatchRule::NotEquals(target) => text.trim() != target,
            MatchRule::Pattern(regex) => regex.is_match(text),
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchRule::Contains(s) => write!(f, "contains \"{}\"", s),
            MatchRule::Equals(s) => write!(f, "== \"{}\"", s),
            MatchRule::NotEquals(s) => write!(f, "!= \"{}\"", s),
            MatchRule::Pattern(r) => write!(f, "matches /{}/", r.as_str()),
        }
    }
}

/// A single immutable test: run `probe`, apply `rule`, emit `verdict` on a match
#[derive(Debug, Clone)]
pub struct Condition {
    probe: Probe,
    subject: Subject,
    rule: MatchRule,
    verdict: Verdict,
}

impl Condition {
    pub fn new(probe: Probe, rule: MatchRule, verdict: Verdict) -> Self {
        Self {
            probe,
            subject: Subject::Whole,
            rule,
            verdict,
        }
    }

    pub fn contains(probe: Probe, needle: impl Into<String>, verdict: Verdict) -> Self {
        Self::new(probe, MatchRule::Contains(needle.into()), verdict)
    }

    pub fn equals(probe: Probe, target: impl Into<String>, verdict: Verdict) -> Self {
        Self::new(probe, MatchRule::Equals(target.into()), verdict)
    }

    pub fn not_equals(probe: Probe, target: impl Into<String>, verdict: Verdict) -> Self {
        Self::new(probe, MatchRule::NotEquals(target.into()), verdict)
    }

    pub fn pattern(probe: Probe, regex: Regex, verdict: Verdict) -> Self {
        Self::new(probe, MatchRule::Pattern(regex), verdict)
    }

    /// Apply the rule to the first token of the probe output only
    pub fn on_first_token(mut self) -> Self {
        self.subject = Subject::FirstToken;
        self
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Evaluate against probe output; `Some(verdict)` when the rule holds
    pub fn evaluate(&self, output: &str) -> Option<Verdict> {
        self.rule
            .matches(self.subject.select(output))
            .then_some(self.verdict)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subject = match self.subject {
            Subject::Whole => "",
            Subject::FirstToken => " (first token)",
        };
        write!(
            f,
            "[{}]{} {} => {:?}",
            self.probe, subject, self.rule, self.verdict
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionSetError {
    #[error("Condition set is empty")]
    Empty,

    #[error("Condition set has no success condition, the wait could never complete")]
    NoSuccessCondition,
}

/// Ordered conditions, evaluated in order on every tick; first match wins
#[derive(Debug, Clone)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    pub fn new(conditions: Vec<Condition>) -> Result<Self, ConditionSetError> {
        if conditions.is_empty() {
            return Err(ConditionSetError::Empty);
        }
        if !conditions.iter().any(|c| c.verdict == Verdict::Success) {
            return Err(ConditionSetError::NoSuccessCondition);
        }
        Ok(Self { conditions })
    }

    /// Single condition waiting for an artifact to appear
    pub fn appearance(pattern: impl Into<String>) -> Self {
        Self {
            conditions: vec![Condition::equals(
                Probe::exists(pattern),
                crate::core::probe::PRESENT,
                Verdict::Success,
            )],
        }
    }

    /// A success condition followed by failure conditions, evaluated in that order
    pub fn completion(success: Condition, failures: Vec<Condition>) -> Self {
        let success = Condition {
            verdict: Verdict::Success,
            ..success
        };
        let mut conditions = Vec::with_capacity(failures.len() + 1);
        conditions.push(success);
        conditions.extend(failures);
        Self { conditions }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Condition> {
        self.conditions.get(index)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
