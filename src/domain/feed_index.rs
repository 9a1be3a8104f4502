use std::collections::BTreeMap;

use serde_json::Value;

use crate::app::{NotifierError, Result};

/// The published list of schedules: topic → source page URL.
///
/// The upstream document is a JSON object whose values are objects; the
/// page URL sits in one string field of each value (`RASPORED` by default).
/// Entries lacking that field are kept with no URL so the cycle can report
/// them as failed instead of silently skipping them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedIndex {
    entries: BTreeMap<String, Option<String>>,
}

impl FeedIndex {
    pub fn parse(body: &str, url_field: &str) -> Result<Self> {
        let root: Value =
            serde_json::from_str(body).map_err(|e| NotifierError::FeedIndex(e.to_string()))?;

        let object = root.as_object().ok_or_else(|| {
            NotifierError::FeedIndex("expected a JSON object keyed by topic".to_string())
        })?;

        let entries = object
            .iter()
            .map(|(topic, entry)| {
                let url = entry
                    .get(url_field)
                    .and_then(Value::as_str)
                    .map(String::from);
                (topic.clone(), url)
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn source_url(&self, topic: &str) -> Option<&str> {
        self.entries.get(topic).and_then(|u| u.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(t, u)| (t.as_str(), u.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
