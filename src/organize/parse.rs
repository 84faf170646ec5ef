//! Turning a model's free-form reply into per-record annotations.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::BatchError;

/// What the model said about one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub tags: Vec<String>,
    pub description: Option<String>,
}

/// Locate the first balanced top-level `{...}` in `text`.
///
/// Braces inside JSON strings are ignored, so prose around the object and
/// braces within tag text do not confuse the scan.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a batch reply into annotations keyed by 1-based index.
///
/// Entries with a missing or out-of-range index are skipped; the first entry
/// for an index wins.
pub fn parse_batch_reply(text: &str, batch_len: usize) -> Result<HashMap<usize, Annotation>, BatchError> {
    let json = extract_json_object(text)
        .ok_or_else(|| BatchError::Parse("no JSON object in reply".to_string()))?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| BatchError::Parse(format!("invalid JSON: {e}")))?;
    let results = value
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| BatchError::Parse("missing results array".to_string()))?;

    let mut annotations = HashMap::new();
    for entry in results {
        let Some(index) = entry.get("index").and_then(index_of) else {
            continue;
        };
        if index == 0 || index > batch_len {
            continue;
        }
        let tags = entry
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        annotations
            .entry(index)
            .or_insert(Annotation { tags, description });
    }
    Ok(annotations)
}

/// Models sometimes quote numbers.
fn index_of(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Lowercase, trim, and join inner whitespace with hyphens.
pub fn normalize_tag(tag: &str) -> String {
    tag.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Case-insensitive view of the caller's tag vocabulary.
#[derive(Debug, Default)]
pub struct TagVocabulary {
    exact: HashSet<String>,
    folded: HashMap<String, String>,
}

impl TagVocabulary {
    pub fn new(existing: &[String]) -> Self {
        let mut vocab = Self::default();
        for tag in existing {
            let tag = tag.trim();
            if tag.is_empty() {
                continue;
            }
            vocab.exact.insert(tag.to_string());
            vocab
                .folded
                .entry(normalize_tag(tag))
                .or_insert_with(|| tag.to_string());
        }
        vocab
    }

    /// True if `tag` is already known, exactly or after normalization.
    pub fn contains(&self, tag: &str) -> bool {
        self.exact.contains(tag) || self.folded.contains_key(&normalize_tag(tag))
    }

    /// Clean the raw tags for one record.
    ///
    /// With `normalize`, tags are normalized and snapped to an existing
    /// spelling; otherwise they are only trimmed. Empties and duplicates go.
    pub fn clean(&self, raw: &[String], normalize: bool) -> Vec<String> {
        let mut seen = HashSet::new();
        raw.iter()
            .filter_map(|tag| {
                let tag = if normalize {
                    let key = normalize_tag(tag);
                    self.folded.get(&key).cloned().unwrap_or(key)
                } else {
                    tag.trim().to_string()
                };
                (!tag.is_empty() && seen.insert(tag.clone())).then_some(tag)
            })
            .collect()
    }
}
