//! Per-session state: interaction history and the uploader generation.
//!
//! Sessions are in memory only. A session's mutex is held for the whole of
//! each request, so requests within a session run one at a time while other
//! sessions proceed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{Error, Result};

/// One answered query, as shown in the session's history panel.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InteractionRecord {
    pub page: String,
    /// Tab label, e.g. `"Code Analysis"`.
    pub kind: String,
    pub query: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub history: Vec<InteractionRecord>,
    /// Bumped by every clear so front-ends can reset their upload widgets.
    pub uploader_generation: u64,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            history: Vec::new(),
            uploader_generation: 0,
        }
    }

    pub fn record(&mut self, record: InteractionRecord) {
        self.history.push(record);
    }

    /// History for one page, oldest first.
    pub fn history_for<'a>(&'a self, page: &'a str) -> impl Iterator<Item = &'a InteractionRecord> {
        self.history.iter().filter(move |r| r.page == page)
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedSession = Arc<Mutex<SessionContext>>;

#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> (Uuid, SharedSession) {
        let ctx = SessionContext::new();
        let id = ctx.id;
        let shared = Arc::new(Mutex::new(ctx));
        self.sessions.write().await.insert(id, shared.clone());
        (id, shared)
    }

    pub async fn get(&self, id: Uuid) -> Result<SharedSession> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {}", id)))
    }

    /// Drop a session and its history.
    pub async fn end(&self, id: Uuid) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("session {}", id)))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(page: &str, query: &str) -> InteractionRecord {
        InteractionRecord {
            page: page.into(),
            kind: "Code Analysis".into(),
            query: query.into(),
            response: "ok".into(),
            category: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lifecycle() {
        let sessions = SessionManager::new();
        let (id, shared) = sessions.create().await;
        shared.lock().await.record(record("code-analysis", "q1"));

        let again = sessions.get(id).await.unwrap();
        assert_eq!(again.lock().await.history.len(), 1);

        sessions.end(id).await.unwrap();
        assert!(matches!(sessions.get(id).await, Err(Error::NotFound(_))));
        assert!(sessions.end(id).await.is_err());
    }

    #[test]
    fn history_filters_by_page() {
        let mut ctx = SessionContext::new();
        ctx.record(record("a", "1"));
        ctx.record(record("b", "2"));
        ctx.record(record("a", "3"));
        let queries: Vec<_> = ctx.history_for("a").map(|r| r.query.as_str()).collect();
        assert_eq!(queries, vec!["1", "3"]);
    }

    #[test]
    fn category_is_omitted_when_absent() {
        let v = serde_json::to_value(record("a", "q")).unwrap();
        assert!(v.get("category").is_none());
        assert_eq!(v["kind"], "Code Analysis");
    }
}
