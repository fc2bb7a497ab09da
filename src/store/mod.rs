//! Coordinate store: append-only entries addressed by `(s, t, i)`.
//!
//! - `s`: scale/category axis (`0.1` skills, `0.2` shell, `0.3` identity)
//! - `t`: temporal token from [`crate::temporal`]
//! - `i`: identity axis
//!
//! Coordinates are not unique. Entries are never updated in place: an update
//! is a delete followed by a fresh write, which is what
//! [`CoordinateStore::replace_singleton`] does for axes that hold one live
//! entry.

pub mod db;

use std::sync::Arc;

use rusqlite::{params, params_from_iter, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SeedResult;
use crate::temporal;

pub use db::Database;

pub const SKILL_AXIS: &str = "0.1";
pub const SHELL_AXIS: &str = "0.2";
pub const IDENTITY_AXIS: &str = "0.3";

/// Characters of content kept in a list preview
pub const PREVIEW_CHARS: usize = 200;

/// A stored entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub s: String,
    pub t: String,
    pub i: String,
    pub content: String,
    pub created_at: String,
}

/// Lightweight listing row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub id: i64,
    pub s: String,
    pub t: String,
    pub i: String,
    pub preview: String,
    pub created_at: String,
}

/// Axis filter; `None` matches everything on that axis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<String>,
}

impl CoordinateQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn scale(s: impl Into<String>) -> Self {
        Self {
            s: Some(s.into()),
            ..Default::default()
        }
    }

    pub fn with_t(mut self, t: impl Into<String>) -> Self {
        self.t = Some(t.into());
        self
    }

    pub fn with_i(mut self, i: impl Into<String>) -> Self {
        self.i = Some(i.into());
        self
    }

    fn axes(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("s", self.s.as_deref()),
            ("t", self.t.as_deref()),
            ("i", self.i.as_deref()),
        ]
    }

    /// WHERE clause for exact matching
    fn exact_clause(&self) -> (String, Vec<String>) {
        self.clause(|col, n| format!("{col} = ?{n}"))
    }

    /// WHERE clause for case-sensitive prefix matching
    fn prefix_clause(&self) -> (String, Vec<String>) {
        self.clause(|col, n| format!("substr({col}, 1, length(?{n})) = ?{n}"))
    }

    fn clause(&self, cond: impl Fn(&str, usize) -> String) -> (String, Vec<String>) {
        let mut conds = Vec::new();
        let mut values = Vec::new();
        for (col, value) in self.axes() {
            if let Some(v) = value {
                values.push(v.to_string());
                conds.push(cond(col, values.len()));
            }
        }
        if conds.is_empty() {
            ("1=1".into(), values)
        } else {
            (conds.join(" AND "), values)
        }
    }
}

/// Acknowledgement for a delete; also returned for ids that never existed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReceipt {
    pub deleted: i64,
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get("id")?,
        s: row.get("s")?,
        t: row.get("t")?,
        i: row.get("i")?,
        content: row.get("content")?,
        created_at: row.get::<_, Option<String>>("created_at")?.unwrap_or_default(),
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<EntrySummary> {
    Ok(EntrySummary {
        id: row.get("id")?,
        s: row.get("s")?,
        t: row.get("t")?,
        i: row.get("i")?,
        preview: row.get("preview")?,
        created_at: row.get::<_, Option<String>>("created_at")?.unwrap_or_default(),
    })
}

/// The coordinate-addressed table
#[derive(Clone)]
pub struct CoordinateStore {
    db: Arc<Database>,
}

impl CoordinateStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append an entry. An empty `t` is replaced by the current temporal coordinate.
    pub async fn write(&self, s: &str, t: &str, i: &str, content: &str) -> SeedResult<i64> {
        let t = if t.is_empty() {
            temporal::now()
        } else {
            t.to_string()
        };
        let (s, i, content) = (s.to_string(), i.to_string(), content.to_string());
        let id = self
            .db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO pscale (s, t, i, content) VALUES (?1, ?2, ?3, ?4)",
                    params![s, t, i, content],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        debug!(id, "pscale entry written");
        Ok(id)
    }

    /// Entries matching every provided axis exactly, oldest first.
    pub async fn read(&self, query: &CoordinateQuery) -> SeedResult<Vec<Entry>> {
        let (clause, values) = query.exact_clause();
        self.db
            .with_conn(move |conn| {
                let sql = format!("SELECT * FROM pscale WHERE {clause} ORDER BY id");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values.iter()), entry_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Summaries of entries whose axes start with each provided value, oldest first.
    pub async fn list(&self, query: &CoordinateQuery) -> SeedResult<Vec<EntrySummary>> {
        let (clause, values) = query.prefix_clause();
        self.db
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT id, s, t, i, substr(content, 1, {PREVIEW_CHARS}) AS preview, created_at \
                     FROM pscale WHERE {clause} ORDER BY id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values.iter()), summary_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete(&self, id: i64) -> SeedResult<DeleteReceipt> {
        self.db
            .with_conn(move |conn| {
                conn.execute("DELETE FROM pscale WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await?;
        debug!(id, "pscale entry deleted");
        Ok(DeleteReceipt { deleted: id })
    }

    /// Purge every entry on axis `s`, then write the replacement.
    pub async fn replace_singleton(&self, s: &str, t: &str, i: &str, content: &str) -> SeedResult<i64> {
        for entry in self.read(&CoordinateQuery::scale(s)).await? {
            self.delete(entry.id).await?;
        }
        self.write(s, t, i, content).await
    }

    pub async fn is_empty(&self) -> SeedResult<bool> {
        let count: i64 = self
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM pscale", [], |r| r.get(0))?))
            .await?;
        Ok(count == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CoordinateStore {
        CoordinateStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_get_distinct_ids() {
        let store = store();
        let writers: Vec<_> = (0..40)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.write("0.1", "t", "0.1", &format!("entry {n}")).await.unwrap() })
            })
            .collect();
        let mut ids = std::collections::BTreeSet::new();
        for writer in writers {
            assert!(ids.insert(writer.await.unwrap()));
        }
        assert_eq!(ids.len(), 40);

        let stored = store.read(&CoordinateQuery::scale("0.1")).await.unwrap();
        let stored_ids: std::collections::BTreeSet<i64> = stored.iter().map(|e| e.id).collect();
        assert_eq!(stored_ids, ids);
    }

    #[tokio::test]
    async fn write_assigns_increasing_ids() {
        let store = store();
        let a = store.write("0.1", "t", "0.1", "first").await.unwrap();
        let b = store.write("0.1", "t", "0.1", "second").await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn empty_t_defaults_to_now() {
        let store = store();
        store.write("0.1", "", "0.1", "x").await.unwrap();
        let rows = store.read(&CoordinateQuery::all()).await.unwrap();
        assert_eq!(rows[0].t.chars().count(), 9);
    }

    #[tokio::test]
    async fn read_is_exact_and_list_is_prefix() {
        let store = store();
        store.write("0.1", "t", "a", "exact").await.unwrap();
        store.write("0.1x", "t", "a", "suffixed").await.unwrap();
        store.write("0.12", "t", "a", "longer").await.unwrap();
        store.write("0.2", "t", "a", "other").await.unwrap();

        let exact = store.read(&CoordinateQuery::scale("0.1")).await.unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].content, "exact");

        let listed = store.list(&CoordinateQuery::scale("0.1")).await.unwrap();
        let previews: Vec<_> = listed.iter().map(|e| e.preview.as_str()).collect();
        assert_eq!(previews, vec!["exact", "suffixed", "longer"]);
    }

    #[tokio::test]
    async fn prefix_match_is_literal() {
        let store = store();
        store.write("0_1", "t", "a", "underscore").await.unwrap();
        store.write("0x1", "t", "a", "wildcard bait").await.unwrap();
        let listed = store.list(&CoordinateQuery::scale("0_")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].preview, "underscore");
    }

    #[tokio::test]
    async fn read_combines_axes() {
        let store = store();
        store.write("0.3", "t1", "a", "one").await.unwrap();
        store.write("0.3", "t2", "a", "two").await.unwrap();
        store.write("0.3", "t1", "b", "three").await.unwrap();

        let rows = store
            .read(&CoordinateQuery::scale("0.3").with_t("t1").with_i("a"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "one");
    }

    #[tokio::test]
    async fn list_truncates_preview() {
        let store = store();
        store.write("0.1", "t", "a", &"z".repeat(500)).await.unwrap();
        let listed = store.list(&CoordinateQuery::all()).await.unwrap();
        assert_eq!(listed[0].preview.len(), PREVIEW_CHARS);
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let store = store();
        let receipt = store.delete(9999).await.unwrap();
        assert_eq!(receipt.deleted, 9999);
    }

    #[tokio::test]
    async fn singleton_leaves_one_survivor() {
        let store = store();
        for n in 0..4 {
            store
                .write(SHELL_AXIS, "t", "0.1", &format!("old {n}"))
                .await
                .unwrap();
        }
        store.write(SKILL_AXIS, "t", "0.1", "untouched").await.unwrap();

        store
            .replace_singleton(SHELL_AXIS, "t", "0.1", "new")
            .await
            .unwrap();

        let shells = store.read(&CoordinateQuery::scale(SHELL_AXIS)).await.unwrap();
        assert_eq!(shells.len(), 1);
        assert_eq!(shells[0].content, "new");
        assert_eq!(
            store.read(&CoordinateQuery::scale(SKILL_AXIS)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn is_empty_tracks_rows() {
        let store = store();
        assert!(store.is_empty().await.unwrap());
        store.write("0.1", "t", "a", "x").await.unwrap();
        assert!(!store.is_empty().await.unwrap());
    }
}
