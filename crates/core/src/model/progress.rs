use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

static MODULE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"module-(\d+)").expect("module number regex is valid"));

// Only used to resolve relative urls; never leaves this module.
const PATH_BASE: &str = "http://progress.invalid/";

/// Reduces an absolute or relative url to its path.
///
/// Unparsable input is returned trimmed so it can still act as a key.
#[must_use]
pub fn normalize_page_path(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(base) = Url::parse(PATH_BASE) else {
        return trimmed.to_owned();
    };
    match base.join(trimmed) {
        Ok(url) => url.path().to_owned(),
        Err(_) => trimmed.to_owned(),
    }
}

/// Extracts `N` from a `module-N` path segment.
#[must_use]
pub fn module_number_from_path(path: &str) -> Option<u32> {
    MODULE_NUMBER
        .captures(path)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

//
// ─── METADATA ──────────────────────────────────────────────────────────────────
//

/// Extra facts attached to a tracked activation.
///
/// Known fields are typed; anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl VisitMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed_text.is_none() && self.section.is_none() && self.extra.is_empty()
    }
}

//
// ─── PAGE DESCRIPTOR ───────────────────────────────────────────────────────────
//

/// What a tracked button reports when activated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDescriptor {
    pub url: String,
    pub title: Option<String>,
    pub module_number: Option<u32>,
    pub metadata: VisitMetadata,
}

impl PageDescriptor {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_module(mut self, module_number: u32) -> Self {
        self.module_number = Some(module_number);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: VisitMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

//
// ─── ENTRIES ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitEntry {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub module_number: Option<u32>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "VisitMetadata::is_empty")]
    pub metadata: VisitMetadata,
    #[serde(default)]
    pub visited: bool,
}

impl VisitEntry {
    /// Title to show for the entry, falling back to `Module N`.
    #[must_use]
    pub fn display_title(&self) -> String {
        if let Some(title) = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return title.to_owned();
        }
        match self.module_number.or_else(|| module_number_from_path(&self.url)) {
            Some(n) => format!("Module {n}"),
            None => self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastVisited {
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// Current visit state per page for one (token, form) pair.
///
/// This is not a log: recording a path again replaces its entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    entries: BTreeMap<String, VisitEntry>,
    last_visited: Option<LastVisited>,
}

impl ProgressState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_parts(
        entries: BTreeMap<String, VisitEntry>,
        last_visited: Option<LastVisited>,
    ) -> Self {
        Self {
            entries,
            last_visited,
        }
    }

    /// Record a visit at `now`. `fallback_title` is used when the page carries none.
    pub fn record(
        &mut self,
        page: &PageDescriptor,
        fallback_title: Option<&str>,
        now: DateTime<Utc>,
    ) -> &VisitEntry {
        let path = normalize_page_path(&page.url);
        let title = page
            .title
            .clone()
            .or_else(|| fallback_title.map(str::to_owned))
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());
        let entry = VisitEntry {
            title,
            url: path.clone(),
            module_number: page
                .module_number
                .or_else(|| module_number_from_path(&path)),
            timestamp: now,
            metadata: page.metadata.clone(),
            visited: true,
        };
        self.last_visited = Some(LastVisited {
            url: path.clone(),
            timestamp: now,
        });
        self.entries.insert(path.clone(), entry);
        &self.entries[&path]
    }

    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, VisitEntry> {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, path: &str) -> Option<&VisitEntry> {
        self.entries.get(&normalize_page_path(path))
    }

    #[must_use]
    pub fn last_visited(&self) -> Option<&LastVisited> {
        self.last_visited.as_ref()
    }

    pub fn set_last_visited(&mut self, last_visited: Option<LastVisited>) {
        self.last_visited = last_visited;
    }

    #[must_use]
    pub fn is_visited(&self, path: &str) -> bool {
        self.entry(path).is_some_and(|e| e.visited)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the entry map as the stored progress blob.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if an extension value cannot be encoded.
    pub fn entries_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }

    /// Parse a stored progress blob. Blank input is an empty map.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` for malformed JSON; callers decide whether to
    /// fall back to an empty state.
    pub fn parse_entries(raw: &str) -> Result<BTreeMap<String, VisitEntry>, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn normalizes_absolute_and_relative_urls() {
        assert_eq!(
            normalize_page_path("https://example.org/modules-home/module-3/?x=1#top"),
            "/modules-home/module-3/"
        );
        assert_eq!(normalize_page_path("/my-progress/"), "/my-progress/");
        assert_eq!(normalize_page_path("my-progress/"), "/my-progress/");
    }

    #[test]
    fn extracts_module_numbers() {
        assert_eq!(module_number_from_path("/modules-home/module-12/"), Some(12));
        assert_eq!(module_number_from_path("/about-us/"), None);
    }

    #[test]
    fn record_overwrites_per_path() {
        let now = fixed_now();
        let mut state = ProgressState::new();
        state.record(&PageDescriptor::new("/module-1/").with_title("Intro"), None, now);
        state.record(
            &PageDescriptor::new("https://host/module-1/"),
            Some("Page title"),
            now + Duration::minutes(5),
        );

        assert_eq!(state.len(), 1);
        let entry = state.entry("/module-1/").unwrap();
        assert_eq!(entry.title.as_deref(), Some("Page title"));
        assert_eq!(entry.module_number, Some(1));
        assert!(entry.visited);
        assert_eq!(
            state.last_visited().unwrap().timestamp,
            now + Duration::minutes(5)
        );
    }

    #[test]
    fn display_title_falls_back_to_module_number() {
        let now = fixed_now();
        let mut state = ProgressState::new();
        let entry = state.record(&PageDescriptor::new("/module-7/"), None, now);
        assert_eq!(entry.display_title(), "Module 7");
    }

    #[test]
    fn metadata_keeps_unknown_keys_in_extra() {
        let raw = r#"{"completedText":"Done!","video":"intro","weight":2}"#;
        let meta: VisitMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.completed_text.as_deref(), Some("Done!"));
        assert_eq!(meta.extra.get("video"), Some(&serde_json::json!("intro")));
        assert_eq!(meta.extra.get("weight"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn blob_round_trips() {
        let now = fixed_now();
        let mut state = ProgressState::new();
        let mut meta = VisitMetadata::default();
        meta.extra.insert("kind".into(), serde_json::json!("video"));
        state.record(
            &PageDescriptor::new("/module-2/").with_metadata(meta),
            None,
            now,
        );
        let raw = state.entries_json().unwrap();
        let parsed = ProgressState::parse_entries(&raw).unwrap();
        assert_eq!(&parsed, state.entries());
    }

    #[test]
    fn parse_entries_treats_blank_as_empty_and_rejects_garbage() {
        assert!(ProgressState::parse_entries("  ").unwrap().is_empty());
        assert!(ProgressState::parse_entries("{not json").is_err());
    }
}
