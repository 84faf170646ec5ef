use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 20;

/// A bookmark as produced by the import parsers or the bookmark store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BookmarkRecord {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl BookmarkRecord {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            description: None,
            tags: Vec::new(),
            folder: None,
            created_at: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeOptions {
    pub generate_tags: bool,
    pub generate_description: bool,
    /// Lowercase, hyphenate, and snap to existing spellings.
    pub normalize_tags: bool,
    #[serde(default)]
    pub existing_tags: Vec<String>,
    /// Records per AI call. Defaults to the organizer's configured size.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            generate_tags: true,
            generate_description: false,
            normalize_tags: true,
            existing_tags: Vec::new(),
            batch_size: None,
        }
    }
}

/// A record after the pipeline has looked at it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganizedRecord {
    #[serde(flatten)]
    pub record: BookmarkRecord,
    /// Empty when the record's batch degraded.
    pub ai_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_description: Option<String>,
    /// The record's tags before the pipeline ran, for diffing and undo.
    pub original_tags: Vec<String>,
}

impl OrganizedRecord {
    /// The record with no AI annotations.
    pub fn untouched(record: BookmarkRecord) -> Self {
        let original_tags = record.tags.clone();
        Self {
            record,
            ai_tags: Vec::new(),
            ai_description: None,
            original_tags,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Preparing,
    Processing,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Records completed so far.
    pub current: usize,
    pub total: usize,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressSnapshot {
    pub fn new(status: ProgressStatus, current: usize, total: usize) -> Self {
        Self {
            current,
            total,
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrganizeResult {
    /// Every input record, in input order.
    pub bookmarks: Vec<OrganizedRecord>,
    /// Tags the AI introduced that were not in `existing_tags`.
    pub new_tags: Vec<String>,
    /// Character-based estimate, not a billed figure.
    pub tokens_used: u64,
}

/// One item of an organize job's stream.
#[derive(Debug, Clone)]
pub enum OrganizeEvent {
    Progress(ProgressSnapshot),
    /// Final aggregate. Emitted once, after the `done` snapshot.
    Finished(OrganizeResult),
}
