use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to one topic during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TopicOutcome {
    Changed {
        fingerprint: String,
        /// Subscribers the push service accepted.
        notified: usize,
        /// Subscribers whose dispatch failed.
        failed: usize,
        /// Subscribers removed because their endpoint is gone.
        pruned: usize,
    },
    Unchanged {
        fingerprint: String,
    },
    Failed {
        error: String,
    },
}

impl TopicOutcome {
    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            TopicOutcome::Changed { fingerprint, .. } | TopicOutcome::Unchanged { fingerprint } => {
                Some(fingerprint.as_str())
            }
            TopicOutcome::Failed { .. } => None,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, TopicOutcome::Changed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TopicOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub notify: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: BTreeMap<String, TopicOutcome>,
}

impl RunReport {
    pub fn outcome(&self, topic: &str) -> Option<&TopicOutcome> {
        self.outcomes.get(topic)
    }

    /// topic → fingerprint for every topic that was fetched successfully.
    pub fn fingerprints(&self) -> BTreeMap<&str, &str> {
        self.outcomes
            .iter()
            .filter_map(|(topic, outcome)| outcome.fingerprint().map(|fp| (topic.as_str(), fp)))
            .collect()
    }

    pub fn changed_topics(&self) -> Vec<&str> {
        self.topics_where(TopicOutcome::is_changed)
    }

    pub fn failed_topics(&self) -> Vec<&str> {
        self.topics_where(TopicOutcome::is_failed)
    }

    pub fn total_notified(&self) -> usize {
        self.outcomes
            .values()
            .map(|o| match o {
                TopicOutcome::Changed { notified, .. } => *notified,
                _ => 0,
            })
            .sum()
    }

    fn topics_where(&self, pred: impl Fn(&TopicOutcome) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|&(_, o)| pred(o))
            .map(|(t, _)| t.as_str())
            .collect()
    }
}
