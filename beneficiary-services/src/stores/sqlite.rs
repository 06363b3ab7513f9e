//! SQLite-backed cache and knowledge base

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use beneficiary_core::{normalize_name, ResolutionResult};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use super::{
    candidate_length_window, match_score, CacheTtlPolicy, KnowledgeEntry, KnowledgeMatch,
    KnowledgeStore, StoreError, MIN_CANDIDATE_SIMILARITY,
};

pub struct SqliteKnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    ttl: CacheTtlPolicy,
}

impl SqliteKnowledgeStore {
    #[instrument(skip(path, ttl))]
    pub fn open<P: AsRef<Path>>(path: P, ttl: CacheTtlPolicy) -> Result<Self, StoreError> {
        info!("Opening knowledge database: {:?}", path.as_ref());
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Io(format!("Failed to create {:?}: {}", parent, e)))?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn, ttl)
    }

    /// In-memory database, for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, CacheTtlPolicy::default())
    }

    fn with_connection(conn: Connection, ttl: CacheTtlPolicy) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS resolution_cache (
                cache_key TEXT PRIMARY KEY,
                data JSON NOT NULL,
                stored_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS knowledge (
                entry_key TEXT PRIMARY KEY,
                normalized_brand TEXT NOT NULL,
                confidence_score INTEGER NOT NULL,
                data JSON NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_knowledge_brand
            ON knowledge(normalized_brand);
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl,
        })
    }

    /// Remove expired cache rows, returning how many were deleted
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM resolution_cache WHERE expires_at <= ?1",
            params![Utc::now().timestamp_millis()],
        )?;
        Ok(deleted)
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn lookup(&self, key: &str) -> Result<Option<ResolutionResult>, StoreError> {
        let conn = self.conn.lock();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT data, expires_at FROM resolution_cache WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((data, expires_at)) if expires_at > Utc::now().timestamp_millis() => {
                Ok(Some(serde_json::from_str(&data)?))
            }
            Some(_) => {
                debug!(key, "Cache row expired");
                conn.execute(
                    "DELETE FROM resolution_cache WHERE cache_key = ?1",
                    params![key],
                )?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, key: &str, result: &ResolutionResult) -> Result<(), StoreError> {
        let data = serde_json::to_string(result)?;
        let now = Utc::now();
        let expires_at = self.ttl.expires_at(now, result.confidence_score);

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO resolution_cache (cache_key, data, stored_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(cache_key) DO UPDATE SET
                data = excluded.data,
                stored_at = excluded.stored_at,
                expires_at = excluded.expires_at
            "#,
            params![
                key,
                data,
                now.timestamp_millis(),
                expires_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    async fn search_similar(
        &self,
        brand: &str,
        product_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<KnowledgeMatch>, StoreError> {
        let Some((min_len, max_len)) = candidate_length_window(brand) else {
            return Ok(Vec::new());
        };
        let entries: Vec<KnowledgeEntry> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                r#"
                SELECT data FROM knowledge
                WHERE length(replace(normalized_brand, ' ', '')) BETWEEN ?1 AND ?2
                "#,
            )?;
            let rows = stmt.query_map(params![min_len as i64, max_len as i64], |row| {
                row.get::<_, String>(0)
            })?;
            let mut entries = Vec::new();
            for data in rows {
                entries.push(serde_json::from_str(&data?)?);
            }
            entries
        };

        let mut matches: Vec<KnowledgeMatch> = entries
            .into_iter()
            .map(|entry| KnowledgeMatch {
                similarity: match_score(brand, product_name, &entry),
                entry,
            })
            .filter(|m| m.similarity >= MIN_CANDIDATE_SIMILARITY)
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(b.entry.confidence_score.cmp(&a.entry.confidence_score))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn upsert_knowledge(&self, entry: KnowledgeEntry) -> Result<(), StoreError> {
        let data = serde_json::to_string(&entry)?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO knowledge (entry_key, normalized_brand, confidence_score, data, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(entry_key) DO UPDATE SET
                confidence_score = excluded.confidence_score,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            params![
                entry.key(),
                normalize_name(&entry.brand),
                entry.confidence_score,
                data,
                entry.updated_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }
}
