//! SQLite-backed history and memory store

use std::path::Path;

use rusqlite::{Connection, params};

use crate::Result;

/// One conversation history row
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub id: String,
    pub role: String,
    pub content: String,
    pub source: Option<String>,
    pub created_at: String,
}

/// One memory row
#[derive(Debug, Clone)]
pub struct MemoryRow {
    pub id: String,
    pub category: String,
    pub content: String,
    pub created_at: String,
}

/// Owns the SQLite connection for history and memories.
///
/// Used from the storage adapter's worker thread only; the connection is not
/// shared.
pub struct MemoryStore {
    conn: Connection,
}

impl MemoryStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        super::schema::init(&conn)?;
        tracing::info!(path = %path.display(), "memory store opened");
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns error if the schema cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::init(&conn)?;
        Ok(Self { conn })
    }

    /// Append one history row.
    ///
    /// # Errors
    ///
    /// Returns error on insert failure.
    pub fn append_history(&self, role: &str, content: &str, source: Option<&str>) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO history (id, role, content, source, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, role, content, source, now],
        )?;
        Ok(id)
    }

    /// Append one memory row.
    ///
    /// # Errors
    ///
    /// Returns error on insert failure.
    pub fn append_memory(&self, category: &str, content: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO memories (id, category, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, category, content, now],
        )?;
        Ok(id)
    }

    /// Most recent history rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns error on query failure.
    pub fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, role, content, source, created_at FROM history
             ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(HistoryRow {
                    id: row.get(0)?,
                    role: row.get(1)?,
                    content: row.get(2)?,
                    source: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Memories not yet folded into a distillation summary.
    ///
    /// # Errors
    ///
    /// Returns error on query failure.
    pub fn undistilled_memories(&self) -> Result<Vec<MemoryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, category, content, created_at FROM memories
             WHERE distilled = 0 AND category != 'summary'
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MemoryRow {
                    id: row.get(0)?,
                    category: row.get(1)?,
                    content: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Fold all undistilled memories into one summary row per category and
    /// mark the originals distilled. Returns how many were folded.
    ///
    /// # Errors
    ///
    /// Returns error on any statement failure; the fold is transactional.
    pub fn distill(&mut self) -> Result<usize> {
        let memories = self.undistilled_memories()?;
        if memories.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;

        let mut by_category: std::collections::BTreeMap<String, Vec<&MemoryRow>> =
            std::collections::BTreeMap::new();
        for memory in &memories {
            by_category.entry(memory.category.clone()).or_default().push(memory);
        }

        let now = chrono::Utc::now().to_rfc3339();
        for (category, group) in &by_category {
            let combined = group
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            tx.execute(
                "INSERT INTO memories (id, category, content, created_at, distilled)
                 VALUES (?1, 'summary', ?2, ?3, 0)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    format!("[{category}] {combined}"),
                    now
                ],
            )?;
        }

        for memory in &memories {
            tx.execute("UPDATE memories SET distilled = 1 WHERE id = ?1", params![memory.id])?;
        }

        tx.commit()?;
        tracing::info!(folded = memories.len(), "memories distilled");
        Ok(memories.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_round_trips_newest_first() {
        let store = MemoryStore::in_memory().unwrap();
        store.append_history("user", "first", Some("voice")).unwrap();
        store.append_history("model", "second", None).unwrap();

        let rows = store.recent_history(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].content, "second");
        assert_eq!(rows[1].source.as_deref(), Some("voice"));
    }

    #[test]
    fn distill_folds_and_marks() {
        let mut store = MemoryStore::in_memory().unwrap();
        store.append_memory("environment", "Room got hot: 31.0C").unwrap();
        store.append_memory("environment", "Room got hot: 33.0C").unwrap();
        store.append_memory("people", "Sam likes jazz").unwrap();

        assert_eq!(store.distill().unwrap(), 3);
        assert!(store.undistilled_memories().unwrap().is_empty());
        // A second pass has nothing left to fold
        assert_eq!(store.distill().unwrap(), 0);
    }
}
