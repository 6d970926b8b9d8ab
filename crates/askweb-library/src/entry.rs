use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One registered notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookEntry {
    /// Slug of the name at creation time.
    pub id: String,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Tags, deduplicated and kept sorted.
    #[serde(default)]
    pub topics: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Successful queries recorded through `Library::touch`.
    #[serde(default)]
    pub use_count: u64,
    /// Mirrors the library's active id; never set independently.
    #[serde(default)]
    pub is_active: bool,
}

impl NotebookEntry {
    /// Case-insensitive substring match over name, description and topics.
    /// `needle` must already be lowercase.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.topics.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

impl fmt::Display for NotebookEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_active { "*" } else { " " };
        write!(f, "{} {}: {}", marker, self.id, self.name)?;
        if !self.topics.is_empty() {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();
            write!(f, " [{}]", topics.join(", "))?;
        }
        Ok(())
    }
}

/// Input to `Library::add`.
#[derive(Debug, Clone, Default)]
pub struct NewNotebook {
    pub url: String,
    pub name: String,
    pub description: String,
    pub topics: Vec<String>,
}

impl NewNotebook {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a comma-separated topic list as accepted on the command line.
    pub fn topics_csv(self, csv: &str) -> Self {
        self.topics(csv.split(','))
    }
}

/// Trim tags and drop empty ones; the set collapses duplicates.
pub(crate) fn normalize_topics(topics: &[String]) -> BTreeSet<String> {
    topics
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
