// src/persistence.rs
// The "Mandrel" persistence collaborator: a text+tags context /
// decision log with search-by-query and fetch-by-ID. The core only ever
// calls `store_context`, `search_context`, `get_context_by_id` — schema
// evolution and richer querying are out of scope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ForgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContextType {
    Planning,
    Completion,
    Error,
    Decision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: String,
    pub content: String,
    pub context_type: ContextType,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreResult {
    pub success: bool,
    pub id: String,
}

/// The three operations the orchestration core is allowed to call against
/// Mandrel.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn store_context(
        &self,
        content: &str,
        context_type: ContextType,
        tags: &[String],
    ) -> Result<StoreResult>;

    /// Free-text search; returns matching records newest-first.
    async fn search_context(&self, query: &str) -> Result<Vec<ContextRecord>>;

    async fn get_context_by_id(&self, id: &str) -> Result<Option<ContextRecord>>;
}

/// SQLite-backed implementation, one table, FTS-free substring search (the
/// corpus this ships against is small — a query planner isn't worth the
/// complexity here).
pub struct SqliteContextStore {
    pool: Arc<deadpool_sqlite::Pool>,
}

impl SqliteContextStore {
    pub async fn open(path: &std::path::Path) -> Result<Self> {
        let cfg = deadpool_sqlite::Config::new(path);
        let pool = cfg
            .create_pool(deadpool_sqlite::Runtime::Tokio1)
            .map_err(|e| ForgeError::InfrastructureError(format!("sqlite pool: {e}")))?;
        let store = Self {
            pool: Arc::new(pool),
        };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self> {
        let cfg = deadpool_sqlite::Config::new(":memory:");
        let pool = cfg
            .create_pool(deadpool_sqlite::Runtime::Tokio1)
            .map_err(|e| ForgeError::InfrastructureError(format!("sqlite pool: {e}")))?;
        let store = Self {
            pool: Arc::new(pool),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| ForgeError::InfrastructureError(format!("pool get: {e}")))?;
        conn.interact(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS context_records (
                    id TEXT PRIMARY KEY,
                    content TEXT NOT NULL,
                    context_type TEXT NOT NULL,
                    tags TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_context_type ON context_records(context_type);",
            )
        })
        .await
        .map_err(|e| ForgeError::InfrastructureError(format!("interact: {e}")))?
        .map_err(ForgeError::Db)?;
        Ok(())
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn store_context(
        &self,
        content: &str,
        context_type: ContextType,
        tags: &[String],
    ) -> Result<StoreResult> {
        let id = uuid::Uuid::new_v4().to_string();
        let content = content.to_string();
        let context_type_str = context_type.to_string();
        let tags_json = serde_json::to_string(tags)?;
        let now = Utc::now().to_rfc3339();
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| ForgeError::InfrastructureError(format!("pool get: {e}")))?;
        let id_clone = id.clone();
        let result = conn
            .interact(move |conn| {
                conn.execute(
                    "INSERT INTO context_records (id, content, context_type, tags, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id_clone, content, context_type_str, tags_json, now],
                )
            })
            .await
            .map_err(|e| ForgeError::InfrastructureError(format!("interact: {e}")));

        match result {
            Ok(Ok(_)) => Ok(StoreResult { success: true, id }),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to persist context record");
                Ok(StoreResult {
                    success: false,
                    id: String::new(),
                })
            }
            Err(e) => {
                warn!(error = %e, "failed to persist context record");
                Ok(StoreResult {
                    success: false,
                    id: String::new(),
                })
            }
        }
    }

    async fn search_context(&self, query: &str) -> Result<Vec<ContextRecord>> {
        let like = format!("%{}%", query.replace('%', "").replace('_', ""));
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| ForgeError::InfrastructureError(format!("pool get: {e}")))?;
        let rows = conn
            .interact(move |conn| -> rusqlite::Result<Vec<(String, String, String, String, String)>> {
                let mut stmt = conn.prepare(
                    "SELECT id, content, context_type, tags, created_at FROM context_records
                     WHERE content LIKE ?1 OR tags LIKE ?1
                     ORDER BY created_at DESC LIMIT 50",
                )?;
                let rows = stmt
                    .query_map(params![like], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    })?
                    .filter_map(|r| r.ok())
                    .collect();
                Ok(rows)
            })
            .await
            .map_err(|e| ForgeError::InfrastructureError(format!("interact: {e}")))?
            .map_err(ForgeError::Db)?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, content, ctype, tags, created_at)| {
                Some(ContextRecord {
                    id,
                    content,
                    context_type: parse_context_type(&ctype)?,
                    tags: serde_json::from_str(&tags).unwrap_or_default(),
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .ok()?
                        .with_timezone(&Utc),
                })
            })
            .collect())
    }

    async fn get_context_by_id(&self, id: &str) -> Result<Option<ContextRecord>> {
        let id = id.to_string();
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| ForgeError::InfrastructureError(format!("pool get: {e}")))?;
        let row = conn
            .interact(move |conn| -> rusqlite::Result<Option<(String, String, String, String, String)>> {
                conn.query_row(
                    "SELECT id, content, context_type, tags, created_at FROM context_records WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    },
                )
                .ok()
            })
            .await
            .map_err(|e| ForgeError::InfrastructureError(format!("interact: {e}")))?;

        Ok(row.and_then(|(id, content, ctype, tags, created_at)| {
            Some(ContextRecord {
                id,
                content,
                context_type: parse_context_type(&ctype)?,
                tags: serde_json::from_str(&tags).unwrap_or_default(),
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .ok()?
                    .with_timezone(&Utc),
            })
        }))
    }
}

fn parse_context_type(s: &str) -> Option<ContextType> {
    match s {
        "planning" => Some(ContextType::Planning),
        "completion" => Some(ContextType::Completion),
        "error" => Some(ContextType::Error),
        "decision" => Some(ContextType::Decision),
        _ => {
            debug!(value = %s, "unknown context_type in store, skipping row");
            None
        }
    }
}
