//! Counter store backed by Supabase PostgREST tables.
//!
//! Each toggle kind maps to a table with a subject column, a resource
//! column and a boolean state column, with a unique constraint on
//! (subject, resource).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use lounge_config::{StoreSettings, ToggleTableConfig};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::debug;

use super::store::{CounterStore, StoreError, ToggleKey, ToggleKind, ToggleState, ToggleWrite};

/// Postgres SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

pub struct PostgrestCounterStore {
    http: reqwest::Client,
    rest_url: String,
    api_key: String,
    access_token: Option<String>,
    tables: HashMap<ToggleKind, ToggleTableConfig>,
}

impl PostgrestCounterStore {
    pub fn new(
        settings: &StoreSettings,
        project_ref: &str,
        api_key: &str,
    ) -> Result<Self, StoreError> {
        let mut tables = HashMap::new();
        for table in &settings.tables {
            let kind: ToggleKind = table.kind.parse()?;
            tables.insert(kind, table.clone());
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http,
            rest_url: settings.resolved_rest_url(project_ref),
            api_key: api_key.to_string(),
            access_token: None,
            tables,
        })
    }

    /// Authenticate as a user so row-level security applies.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token: String = token.into();
        self.access_token = Some(token).filter(|t| !t.is_empty());
        self
    }

    fn table(&self, kind: ToggleKind) -> Result<&ToggleTableConfig, StoreError> {
        self.tables
            .get(&kind)
            .ok_or_else(|| StoreError::UnknownKind(kind.to_string()))
    }

    fn request(&self, method: Method, table: &ToggleTableConfig) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.http
            .request(method, format!("{}/{}", self.rest_url, table.table))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }

    /// Filters selecting the single record for `key`.
    fn key_filter(table: &ToggleTableConfig, key: &ToggleKey) -> [(String, String); 2] {
        [
            (table.subject_column.clone(), format!("eq.{}", key.subject_id)),
            (table.resource_column.clone(), format!("eq.{}", key.resource_id)),
        ]
    }

    async fn send(request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &text));
        }
        Ok(response)
    }

    async fn rows(response: Response) -> Result<Vec<serde_json::Value>, StoreError> {
        response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }

    async fn count(&self, table: &ToggleTableConfig, resource_id: &str) -> Result<u64, StoreError> {
        let request = self
            .request(Method::HEAD, table)
            .query(&[
                ("select", "*".to_string()),
                (table.resource_column.as_str(), format!("eq.{resource_id}")),
                (table.state_column.as_str(), "eq.true".to_string()),
            ])
            .header("Prefer", "count=exact");
        let response = Self::send(request).await?;
        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Parse("missing Content-Range".to_string()))?;
        parse_content_range_total(range)
            .ok_or_else(|| StoreError::Parse(format!("bad Content-Range: {range}")))
    }
}

#[async_trait]
impl CounterStore for PostgrestCounterStore {
    async fn read_state(&self, key: &ToggleKey) -> Result<ToggleState, StoreError> {
        let table = self.table(key.kind)?;
        let request = self
            .request(Method::GET, table)
            .query(&[("select", table.state_column.as_str())])
            .query(&Self::key_filter(table, key));
        let rows = Self::rows(Self::send(request).await?).await?;
        let state = state_from_rows(&rows, &table.state_column).unwrap_or(false);
        let count = self.count(table, &key.resource_id).await?;
        debug!(key = %key, state, count, "Read toggle state");
        Ok(ToggleState { state, count })
    }

    async fn insert_toggle(&self, key: &ToggleKey, state: bool) -> Result<ToggleWrite, StoreError> {
        let table = self.table(key.kind)?;
        let mut body = serde_json::Map::new();
        body.insert(table.subject_column.clone(), key.subject_id.clone().into());
        body.insert(table.resource_column.clone(), key.resource_id.clone().into());
        body.insert(table.state_column.clone(), state.into());

        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&body);
        let rows = Self::rows(Self::send(request).await?).await?;
        Ok(ToggleWrite {
            state: state_from_rows(&rows, &table.state_column).unwrap_or(state),
            count: None,
        })
    }

    async fn update_toggle(&self, key: &ToggleKey, state: bool) -> Result<ToggleWrite, StoreError> {
        let table = self.table(key.kind)?;
        let mut body = serde_json::Map::new();
        body.insert(table.state_column.clone(), state.into());

        let request = self
            .request(Method::PATCH, table)
            .query(&Self::key_filter(table, key))
            .header("Prefer", "return=representation")
            .json(&body);
        let rows = Self::rows(Self::send(request).await?).await?;
        let confirmed = state_from_rows(&rows, &table.state_column).ok_or(StoreError::NotFound)?;
        Ok(ToggleWrite {
            state: confirmed,
            count: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Total from a `Content-Range` header (`0-24/25`, `*/0`).
fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

/// Map a failed response onto a store error; unique violations become
/// [`StoreError::Conflict`].
fn classify_error(status: StatusCode, body: &str) -> StoreError {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let code = json
        .as_ref()
        .and_then(|j| j.get("code"))
        .and_then(|c| c.as_str());
    let message = json
        .as_ref()
        .and_then(|j| j.get("message"))
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| body.chars().take(200).collect());

    if status == StatusCode::CONFLICT || code == Some(UNIQUE_VIOLATION) {
        StoreError::Conflict(message)
    } else {
        StoreError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// State column of the first returned row, if any.
fn state_from_rows(rows: &[serde_json::Value], state_column: &str) -> Option<bool> {
    rows.first()?.get(state_column)?.as_bool()
}
