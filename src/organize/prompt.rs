use std::fmt::Write;

use crate::organize::types::{BookmarkRecord, OrganizeOptions};

/// Build the user prompt for one batch. Indices in the prompt are 1-based.
pub fn build_batch_prompt(
    batch: &[BookmarkRecord],
    options: &OrganizeOptions,
    max_existing_tags: usize,
) -> String {
    let mut prompt = String::new();

    let task = match (options.generate_tags, options.generate_description) {
        (true, true) => "suggest tags and write a short description for each one",
        (true, false) => "suggest tags for each one",
        (false, _) => "write a short description for each one",
    };
    let _ = writeln!(prompt, "Analyze the following {} bookmarks and {task}.", batch.len());
    prompt.push_str("\nBookmarks:\n");

    for (i, record) in batch.iter().enumerate() {
        let _ = writeln!(prompt, "{}. Title: {}", i + 1, one_line(&record.title));
        let _ = writeln!(prompt, "   URL: {}", one_line(&record.url));
        if let Some(folder) = record.folder.as_deref().filter(|f| !f.trim().is_empty()) {
            let _ = writeln!(prompt, "   Folder: {}", one_line(folder));
        }
    }

    let existing: Vec<&str> = options
        .existing_tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .take(max_existing_tags)
        .collect();
    if options.generate_tags && !existing.is_empty() {
        let _ = writeln!(
            prompt,
            "\nExisting tags (prefer these when they fit): {}",
            existing.join(", ")
        );
    }

    prompt.push_str("\nInstructions:\n");
    if options.generate_tags {
        prompt.push_str("- Give each bookmark 1 to 5 short, general tags.\n");
        if options.normalize_tags {
            prompt.push_str("- Use lowercase tags; join multi-word tags with hyphens.\n");
        }
    }
    if options.generate_description {
        prompt.push_str(
            "- Write a one-sentence description (at most 30 words) of what each page offers.\n",
        );
    }
    prompt.push_str("- Respond with a single JSON object and no other text, in exactly this shape:\n");
    prompt.push_str(&response_shape(options));
    prompt.push_str(
        "\n- \"index\" is the bookmark's number in the list above. Include every bookmark once.\n",
    );

    prompt
}

fn response_shape(options: &OrganizeOptions) -> String {
    let entry = match (options.generate_tags, options.generate_description) {
        (true, true) => r#"{"index": 1, "tags": ["tag1", "tag2"], "description": "..."}"#,
        (true, false) => r#"{"index": 1, "tags": ["tag1", "tag2"]}"#,
        (false, _) => r#"{"index": 1, "tags": [], "description": "..."}"#,
    };
    format!(r#"{{"results": [{entry}]}}"#)
}

/// Newlines inside a field would break the numbered layout.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
