//! Per-collection prompt resolution.
//!
//! Prompts are owned by the external CRUD layer; this module reads the
//! currently-active one for a collection and signals usage increments.
//! Resolution order: default-flagged prompt, then any active prompt, then
//! the process-wide defaults.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::config::PromptDefaults;
use crate::core::errors::RagError;

/// Resolved prompt configuration for one answer.
#[derive(Debug, Clone)]
pub struct PromptConfig {
    /// Row id of the stored prompt; `None` for the process-wide fallback.
    pub id: Option<i64>,
    pub system_prompt: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub is_default: bool,
}

impl PromptConfig {
    pub fn fallback(defaults: &PromptDefaults) -> Self {
        Self {
            id: None,
            system_prompt: defaults.system_prompt.clone(),
            model_name: defaults.model_name.clone(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            is_default: false,
        }
    }
}

/// Read-only prompt source plus the usage-increment side channel.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    /// The active prompt for a collection, default-flagged rows first.
    async fn active_prompt(&self, collection_id: &str) -> Result<Option<PromptConfig>, RagError>;

    /// Record that a stored prompt was used to synthesize an answer.
    async fn record_usage(&self, prompt_id: i64) -> Result<(), RagError>;
}

/// Resolves the prompt used for one answer.
///
/// Wraps an optional provider; with no provider wired (or nothing stored for
/// the collection) the process-wide defaults apply. Provider errors and
/// usage-increment failures are logged and never fail the answer path.
#[derive(Clone)]
pub struct PromptResolver {
    provider: Option<Arc<dyn PromptProvider>>,
    defaults: PromptDefaults,
}

impl PromptResolver {
    pub fn new(provider: Option<Arc<dyn PromptProvider>>, defaults: PromptDefaults) -> Self {
        Self { provider, defaults }
    }

    pub async fn resolve(&self, collection_id: Option<&str>) -> PromptConfig {
        let (provider, collection_id) = match (&self.provider, collection_id) {
            (Some(provider), Some(collection_id)) => (provider, collection_id),
            _ => return PromptConfig::fallback(&self.defaults),
        };

        match provider.active_prompt(collection_id).await {
            Ok(Some(prompt)) => {
                if let Some(prompt_id) = prompt.id {
                    if let Err(err) = provider.record_usage(prompt_id).await {
                        tracing::warn!("Prompt usage increment failed: {}", err);
                    }
                }
                prompt
            }
            Ok(None) => PromptConfig::fallback(&self.defaults),
            Err(err) => {
                tracing::warn!(
                    "Prompt lookup failed for collection {}: {}",
                    collection_id,
                    err
                );
                PromptConfig::fallback(&self.defaults)
            }
        }
    }
}

/// SQLite-backed prompt provider.
///
/// Consumes the prompts table maintained by the external CRUD layer.
/// "Exactly one default per collection" is that layer's invariant; when it
/// is violated this store simply takes the first row by id.
pub struct SqlitePromptStore {
    pool: SqlitePool,
}

impl SqlitePromptStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS prompts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection_id TEXT NOT NULL,
                system_prompt TEXT NOT NULL,
                model_name TEXT NOT NULL,
                max_tokens INTEGER NOT NULL DEFAULT 1024,
                temperature REAL NOT NULL DEFAULT 0.3,
                is_default INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                usage_count INTEGER NOT NULL DEFAULT 0,
                last_used_at TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_prompts_collection ON prompts(collection_id)")
            .execute(&self.pool)
            .await
            .map_err(RagError::internal)?;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PromptProvider for SqlitePromptStore {
    async fn active_prompt(&self, collection_id: &str) -> Result<Option<PromptConfig>, RagError> {
        let row = sqlx::query(
            "SELECT id, system_prompt, model_name, max_tokens, temperature, is_default
             FROM prompts
             WHERE collection_id = ?1 AND is_active = 1
             ORDER BY is_default DESC, id
             LIMIT 1",
        )
        .bind(collection_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(row.map(|row| PromptConfig {
            id: Some(row.get::<i64, _>("id")),
            system_prompt: row.get("system_prompt"),
            model_name: row.get("model_name"),
            max_tokens: row.get::<i64, _>("max_tokens") as u32,
            temperature: row.get::<f64, _>("temperature") as f32,
            is_default: row.get::<i64, _>("is_default") != 0,
        }))
    }

    async fn record_usage(&self, prompt_id: i64) -> Result<(), RagError> {
        sqlx::query(
            "UPDATE prompts SET usage_count = usage_count + 1, last_used_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(prompt_id)
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }
}
