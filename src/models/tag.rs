//! Tag model
//!
//! Tags label publications and double as user interests. Names are unique
//! case-insensitively; `usage_count` shadows the number of live attachments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted tag name, in characters
pub const MAX_TAG_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    /// Display name as first entered
    pub name: String,
    /// Attachments to publications plus attachments to users
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Lookup key for a tag name: trimmed and lowercased. `None` for blank input.
pub fn normalize_tag_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Trim, drop blanks and collapse case-insensitive duplicates, keeping the
/// first spelling of each name.
pub fn dedup_tag_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .filter_map(|name| {
            let display = name.as_ref().trim().to_string();
            let key = normalize_tag_name(&display)?;
            seen.insert(key).then_some(display)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tag_name() {
        assert_eq!(normalize_tag_name("  Machine Learning "), Some("machine learning".to_string()));
        assert_eq!(normalize_tag_name("   "), None);
    }

    #[test]
    fn test_dedup_keeps_first_spelling() {
        let names = dedup_tag_names(["Rust", " rust", "", "Graphs", "GRAPHS", "ml"]);
        assert_eq!(names, vec!["Rust", "Graphs", "ml"]);
    }
}
