use crate::models::{unix_now, Candidate, Memory, MemoryId, NewMemory};
use crate::traits::MemoryStore;
use crate::StoreError;
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS memories (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    content      TEXT NOT NULL,
    tags         TEXT NOT NULL DEFAULT '[]',
    source       TEXT,
    created_at   REAL NOT NULL,
    updated_at   REAL NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    metadata     TEXT NOT NULL DEFAULT '{}',
    content_hash TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content,
    tags,
    content='memories',
    content_rowid='id',
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, content, tags)
    VALUES (new.id, new.content, new.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content, tags)
    VALUES ('delete', old.id, old.content, old.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE OF content, tags ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content, tags)
    VALUES ('delete', old.id, old.content, old.tags);
    INSERT INTO memories_fts(rowid, content, tags)
    VALUES (new.id, new.content, new.tags);
END;

CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);
CREATE INDEX IF NOT EXISTS idx_memories_content_hash ON memories(content_hash);
";

const MEMORY_COLUMNS: &str =
    "m.id, m.content, m.tags, m.source, m.created_at, m.updated_at, m.access_count, m.metadata";

/// SQLite store using an FTS5 index ranked by `bm25()`.
pub struct SqliteMemoryStore {
    connection: Mutex<Connection>,
}

impl SqliteMemoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(path)?;
        connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        Self::initialize(connection)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(connection: Connection) -> Result<Self, StoreError> {
        connection.pragma_update(None, "foreign_keys", "ON")?;
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn with_connection<T>(
        &self,
        operation: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))?;
        operation(&connection)
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn search_by_expression(
        &self,
        expression: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        self.with_connection(|connection| {
            let mut statement = connection.prepare(&format!(
                "SELECT {MEMORY_COLUMNS}, bm25(memories_fts) AS lexical_score
                 FROM memories_fts f
                 JOIN memories m ON m.id = f.rowid
                 WHERE memories_fts MATCH ?1
                 ORDER BY lexical_score
                 LIMIT ?2"
            ))?;

            let rows = statement.query_map(params![expression, limit as i64], |row| {
                Ok((read_memory(row)?, row.get::<_, f64>(8)?))
            })?;

            let mut candidates = Vec::new();
            for row in rows {
                let (memory, lexical_score) = row?;
                candidates.push(Candidate {
                    memory: memory.parse()?,
                    lexical_score,
                });
            }

            debug!(expression, candidates = candidates.len(), "fts lookup");
            Ok(candidates)
        })
    }

    async fn max_access_count(&self) -> Result<u64, StoreError> {
        self.with_connection(|connection| {
            let max: Option<i64> = connection.query_row(
                "SELECT MAX(access_count) FROM memories",
                [],
                |row| row.get(0),
            )?;
            Ok(max.unwrap_or(0).max(0) as u64)
        })
    }

    async fn increment_access_count(&self, id: MemoryId) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            let changed = connection.execute(
                "UPDATE memories SET access_count = access_count + 1, updated_at = ?1 WHERE id = ?2",
                params![unix_now(), id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
    }

    async fn store(&self, memory: NewMemory) -> Result<MemoryId, StoreError> {
        let tags = serde_json::to_string(&memory.tags)?;
        let metadata = serde_json::to_string(&memory.metadata)?;
        let now = unix_now();
        let created_at = memory.created_at.unwrap_or(now);
        let hash = content_hash(&memory.content);

        self.with_connection(|connection| {
            connection.execute(
                "INSERT INTO memories
                    (content, tags, source, created_at, updated_at, metadata, content_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![memory.content, tags, memory.source, created_at, now, metadata, hash],
            )?;
            Ok(connection.last_insert_rowid())
        })
    }

    async fn get(&self, id: MemoryId) -> Result<Option<Memory>, StoreError> {
        self.with_connection(|connection| {
            let raw = connection
                .query_row(
                    &format!("SELECT {MEMORY_COLUMNS} FROM memories m WHERE m.id = ?1"),
                    params![id],
                    read_memory,
                )
                .optional()?;
            raw.map(RawMemory::parse).transpose()
        })
    }

    async fn delete(&self, id: MemoryId) -> Result<bool, StoreError> {
        self.with_connection(|connection| {
            let changed = connection.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    async fn list(
        &self,
        limit: usize,
        offset: usize,
        tags: &[String],
    ) -> Result<Vec<Memory>, StoreError> {
        self.with_connection(|connection| {
            let mut values: Vec<rusqlite::types::Value> = Vec::new();
            let filter = if tags.is_empty() {
                String::new()
            } else {
                let clauses = tags
                    .iter()
                    .enumerate()
                    .map(|(index, tag)| {
                        values.push(format!("%{}%", serde_json::to_string(tag)?).into());
                        Ok(format!("m.tags LIKE ?{}", index + 1))
                    })
                    .collect::<Result<Vec<_>, serde_json::Error>>()?;
                format!("WHERE {}", clauses.join(" OR "))
            };

            let limit_slot = values.len() + 1;
            values.push((limit as i64).into());
            values.push((offset as i64).into());

            let mut statement = connection.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories m {filter}
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?{limit_slot} OFFSET ?{}",
                limit_slot + 1
            ))?;

            let rows = statement.query_map(params_from_iter(values), read_memory)?;
            let mut memories = Vec::new();
            for row in rows {
                memories.push(row?.parse()?);
            }
            Ok(memories)
        })
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.with_connection(|connection| {
            let count: i64 =
                connection.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
    }

    async fn find_by_content(&self, content: &str) -> Result<Option<MemoryId>, StoreError> {
        let hash = content_hash(content);
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare("SELECT id, content FROM memories WHERE content_hash = ?1 ORDER BY id")?;
            let rows = statement.query_map(params![hash], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;

            for row in rows {
                let (id, stored) = row?;
                if stored == content {
                    return Ok(Some(id));
                }
            }
            Ok(None)
        })
    }
}

/// Row as read from SQLite, before the JSON columns are decoded.
struct RawMemory {
    id: MemoryId,
    content: String,
    tags: String,
    source: Option<String>,
    created_at: f64,
    updated_at: f64,
    access_count: i64,
    metadata: String,
}

impl RawMemory {
    fn parse(self) -> Result<Memory, StoreError> {
        let tags: Vec<String> = if self.tags.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.tags)?
        };
        let metadata: Map<String, Value> = if self.metadata.trim().is_empty() {
            Map::new()
        } else {
            serde_json::from_str(&self.metadata)?
        };

        Ok(Memory {
            id: self.id,
            content: self.content,
            tags,
            source: self.source,
            created_at: self.created_at,
            updated_at: self.updated_at,
            access_count: self.access_count.max(0) as u64,
            metadata,
        })
    }
}

fn read_memory(row: &Row<'_>) -> rusqlite::Result<RawMemory> {
    Ok(RawMemory {
        id: row.get(0)?,
        content: row.get(1)?,
        tags: row.get(2)?,
        source: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        access_count: row.get(6)?,
        metadata: row.get(7)?,
    })
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn seeded() -> SqliteMemoryStore {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        let entries = [
            ("JWT refresh tokens expire after fifteen minutes", vec!["auth"], Some("api")),
            ("The database migration runner lives in tools/migrate", vec!["db"], None),
            ("Authentication middleware rejects expired tokens", vec!["auth", "backend"], Some("api")),
        ];
        for (content, tags, source) in entries {
            store
                .store(
                    NewMemory::new(content)
                        .with_tags(tags.into_iter().map(String::from).collect())
                        .with_source(source.map(String::from)),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn fts_search_returns_lower_is_better_scores() {
        let store = seeded().await;
        let candidates = store
            .search_by_expression("\"tokens\" OR \"expired\"", 10)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].lexical_score <= candidates[1].lexical_score);
        assert!(candidates.iter().all(|candidate| candidate.lexical_score < 0.0));
        assert!(candidates.iter().all(|candidate| candidate.memory.tags.contains(&"auth".to_string())));
    }

    #[tokio::test]
    async fn fts_search_respects_limit_and_stemming() {
        let store = seeded().await;
        let candidates = store.search_by_expression("\"token\"", 1).await.unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn malformed_expression_is_an_error() {
        let store = seeded().await;
        assert!(store.search_by_expression("\"unterminated", 5).await.is_err());
    }

    #[tokio::test]
    async fn access_counts_feed_max() {
        let store = seeded().await;
        assert_eq!(store.max_access_count().await.unwrap(), 0);

        store.increment_access_count(2).await.unwrap();
        store.increment_access_count(2).await.unwrap();
        store.increment_access_count(1).await.unwrap();

        assert_eq!(store.max_access_count().await.unwrap(), 2);
        let memory = store.get(2).await.unwrap().unwrap();
        assert_eq!(memory.access_count, 2);
        assert!(memory.updated_at >= memory.created_at);

        assert!(matches!(
            store.increment_access_count(99).await,
            Err(StoreError::NotFound(99))
        ));
    }

    #[tokio::test]
    async fn delete_removes_from_index() {
        let store = seeded().await;
        assert!(store.delete(2).await.unwrap());
        assert!(!store.delete(2).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store
            .search_by_expression("\"migration\"", 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_any_tag_newest_first() {
        let store = seeded().await;

        let all = store.list(10, 0, &[]).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, 3);

        let tagged = store.list(10, 0, &["db".to_string()]).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, 2);

        let paged = store
            .list(1, 1, &["auth".to_string(), "db".to_string()])
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, 2);
    }

    #[tokio::test]
    async fn exact_content_lookup() {
        let store = seeded().await;
        let found = store
            .find_by_content("The database migration runner lives in tools/migrate")
            .await
            .unwrap();
        assert_eq!(found, Some(2));
        assert_eq!(store.find_by_content("The database").await.unwrap(), None);
    }

    #[tokio::test]
    async fn open_creates_parent_directories() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("memory.db");
        let store = SqliteMemoryStore::open(&path)?;
        store.store(NewMemory::new("persisted")).await?;
        drop(store);

        let reopened = SqliteMemoryStore::open(&path)?;
        assert_eq!(reopened.count().await?, 1);
        Ok(())
    }
}
