use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dispatch::registry::ProviderId;
use crate::organize::types::{BookmarkRecord, OrganizeOptions, OrganizeResult, ProgressSnapshot};

/// Upper bound on bookmarks accepted in a single tool call.
pub const MAX_BOOKMARKS: usize = 5000;

/// Tag (and optionally describe) a list of bookmarks in batches.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct OrganizeRequest {
    /// Provider id (see `providers`). Defaults to the configured provider.
    pub provider: Option<ProviderId>,
    /// API key. Falls back to the provider's environment variable.
    pub api_key: Option<String>,
    /// Base URL override. Required for `custom`.
    pub api_url: Option<String>,
    /// Model override. Required for `custom`.
    pub model: Option<String>,
    /// Bookmarks to organize: {title, url, tags?, folder?, description?, created_at?}.
    pub bookmarks: Vec<BookmarkRecord>,
    /// Suggest tags (default true).
    pub generate_tags: Option<bool>,
    /// Write a one-sentence description per bookmark (default false).
    pub generate_description: Option<bool>,
    /// Lowercase/hyphenate tags and reuse existing spellings (default true).
    pub normalize_tags: Option<bool>,
    /// The user's current tag vocabulary. Only the first 100 are shown to the model.
    pub existing_tags: Option<Vec<String>>,
    /// Bookmarks per AI call (default 20).
    pub batch_size: Option<usize>,
}

impl OrganizeRequest {
    pub fn options(&self) -> OrganizeOptions {
        let defaults = OrganizeOptions::default();
        OrganizeOptions {
            generate_tags: self.generate_tags.unwrap_or(defaults.generate_tags),
            generate_description: self
                .generate_description
                .unwrap_or(defaults.generate_description),
            normalize_tags: self.normalize_tags.unwrap_or(defaults.normalize_tags),
            existing_tags: self.existing_tags.clone().unwrap_or_default(),
            batch_size: self.batch_size,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrganizeResponse {
    #[serde(flatten)]
    pub result: OrganizeResult,
    pub progress: Vec<ProgressSnapshot>,
}
