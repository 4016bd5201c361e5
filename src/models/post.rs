use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

pub const TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Serialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_name: String,
    pub author_id: String,
    pub published_at: DateTime<Utc>,
}

/// Trimmed title, or why it is unacceptable.
pub fn validate_title(raw: &str) -> Result<String, &'static str> {
    let title = raw.trim();
    if title.is_empty() {
        return Err("Post title cannot be empty");
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err("Post title cannot exceed 100 characters");
    }
    Ok(title.to_string())
}

pub fn validate_content(raw: &str) -> Result<String, &'static str> {
    if raw.trim().is_empty() {
        return Err("Post content cannot be empty");
    }
    Ok(raw.to_string())
}
