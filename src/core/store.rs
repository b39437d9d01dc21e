//! Interaction log stores
//!
//! The log is advisory: writes from request handlers are fire-and-forget,
//! and a failed write is logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::core::error::StoreError;
use crate::types::InteractionRecord;
use crate::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};

/// Table holding interaction rows
pub const INTERACTION_TABLE: &str = "interaction_logs";

/// Append-only interaction log
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Append one record
    async fn append(&self, record: InteractionRecord) -> Result<(), StoreError>;

    /// Last `limit` records of a session, oldest first
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<InteractionRecord>, StoreError>;

    /// Short backend name for health output and logs
    fn backend(&self) -> &'static str;
}

/// Write a record without waiting for it
pub fn spawn_append(store: Arc<dyn InteractionStore>, record: InteractionRecord) {
    tokio::spawn(async move {
        let session_id = record.session_id.clone();
        if let Err(err) = store.append(record).await {
            warn!(backend = store.backend(), session_id = %session_id, error = %err, "interaction log write dropped");
        }
    });
}

/// Process-local store: session id → records
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Vec<InteractionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with at least one record
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn append(&self, record: InteractionRecord) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(record.session_id.clone()).or_default().push(record);
        Ok(())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<InteractionRecord>, StoreError> {
        let sessions = self.sessions.read().await;
        let records = match sessions.get(session_id) {
            Some(records) => records,
            None => return Ok(Vec::new()),
        };
        let start = records.len().saturating_sub(limit);
        Ok(records[start..].to_vec())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// PostgREST-style table (Supabase)
#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, INTERACTION_TABLE)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected { status, message })
}

#[async_trait]
impl InteractionStore for RestStore {
    async fn append(&self, record: InteractionRecord) -> Result<(), StoreError> {
        let response = self
            .authed(self.client.post(self.table_url()))
            .header("Prefer", "return=minimal")
            .json(&record)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        check_status(response).await?;
        debug!(session_id = %record.session_id, "interaction row written");
        Ok(())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<InteractionRecord>, StoreError> {
        let session_filter = format!("eq.{}", session_id);
        let limit = limit.to_string();
        let response = self
            .authed(self.client.get(self.table_url()))
            .query(&[
                ("select", "*"),
                ("session_id", session_filter.as_str()),
                ("order", "timestamp.desc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let mut rows: Vec<InteractionRecord> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        rows.reverse();
        Ok(rows)
    }

    fn backend(&self) -> &'static str {
        "rest"
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_memory_store_append_order() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .append(InteractionRecord::new("bartender", "s1", format!("q{}", i), format!("a{}", i)))
                .await
                .unwrap();
        }
        store.append(InteractionRecord::new("cook", "s2", "x", "y")).await.unwrap();

        let recent = store.recent("s1", 3).await.unwrap();
        let inputs: Vec<_> = recent.iter().map(|r| r.input.as_str()).collect();
        assert_eq!(inputs, vec!["q2", "q3", "q4"]);
        assert_eq!(store.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_memory_store_unknown_session() {
        let store = MemoryStore::new();
        assert!(store.recent("missing", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_append_writes_eventually() {
        let store = Arc::new(MemoryStore::new());
        spawn_append(store.clone(), InteractionRecord::new("guard", "s9", "站住", "好"));

        for _ in 0..50 {
            if !store.recent("s9", 1).await.unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("record never appeared");
    }

    #[tokio::test]
    async fn test_rest_store_append() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/interaction_logs"))
            .and(header("apikey", "svc"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "svc");
        store
            .append(InteractionRecord::new("linxi", "s1", "你好", "嗯"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rest_store_recent_is_oldest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/interaction_logs"))
            .and(query_param("session_id", "eq.s1"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"character_id": "linxi", "session_id": "s1", "input": "second", "output": "b", "timestamp": "2025-08-20T10:01:00Z"},
                {"character_id": "linxi", "session_id": "s1", "input": "first", "output": "a", "timestamp": "2025-08-20T10:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "svc");
        let rows = store.recent("s1", 2).await.unwrap();
        assert_eq!(rows[0].input, "first");
        assert_eq!(rows[1].input, "second");
    }

    #[tokio::test]
    async fn test_rest_store_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "wrong");
        let err = store
            .append(InteractionRecord::new("linxi", "s1", "a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 401, .. }));
    }
}
