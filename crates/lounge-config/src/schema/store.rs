//! Durable counter store (PostgREST) settings.

use serde::{Deserialize, Serialize};

/// Maps one toggle kind onto the table that records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleTableConfig {
    /// `post_like`, `comment_like`, `follow` or `pin`.
    pub kind: String,
    pub table: String,
    pub subject_column: String,
    pub resource_column: String,
    pub state_column: String,
}

impl ToggleTableConfig {
    fn new(kind: &str, table: &str, subject: &str, resource: &str) -> Self {
        Self {
            kind: kind.into(),
            table: table.into(),
            subject_column: subject.into(),
            resource_column: resource.into(),
            state_column: "active".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// PostgREST base URL. Empty means `https://<project_ref>.supabase.co/rest/v1`.
    pub rest_url: String,
    pub request_timeout_secs: u64,
    pub tables: Vec<ToggleTableConfig>,
}

impl StoreSettings {
    /// Resolve the REST endpoint, falling back to the project's hosted URL.
    pub fn resolved_rest_url(&self, project_ref: &str) -> String {
        if self.rest_url.is_empty() {
            format!("https://{project_ref}.supabase.co/rest/v1")
        } else {
            self.rest_url.trim_end_matches('/').to_string()
        }
    }

    pub fn table_for(&self, kind: &str) -> Option<&ToggleTableConfig> {
        self.tables.iter().find(|t| t.kind == kind)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            rest_url: String::new(),
            request_timeout_secs: 10,
            tables: vec![
                ToggleTableConfig::new("post_like", "likes", "user_id", "post_id"),
                ToggleTableConfig::new("comment_like", "comment_likes", "user_id", "comment_id"),
                ToggleTableConfig::new("follow", "follows", "follower_id", "following_id"),
                ToggleTableConfig::new("pin", "pinned_posts", "user_id", "post_id"),
            ],
        }
    }
}
