//! Numbered logs with semantic-number compaction.
//!
//! Two logs share one algorithm: **memory** (crystallized exchanges) and
//! **changelog** (infrastructure events). Each is partitioned by identity.
//!
//! Numbers carry their zoom level:
//!
//! | Number | Level | Holds |
//! |--------|-------|-------|
//! | 1-9, 11-19, ... | 0 | raw entries |
//! | 10, 20, ..., 90 | 1 | rollup of 9 raw entries |
//! | 100, 200, ... | 2 | rollup of 9 level-1 summaries |
//! | 1000, 2000, ... | 3 | rollup of 9 level-2 summaries |
//! | 10000, ... | 4 | rollup of 9 level-3 summaries |
//!
//! Raw writes never land on a multiple of 10. After every raw write the
//! compaction pass fills each empty summary slot whose nine constituents all
//! exist. A slot, once written, is never rewritten.

pub mod crystal;
pub mod summarize;

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SeedResult;
use crate::store::{Database, PREVIEW_CHARS};

pub use summarize::{render_block, ConcatSummarizer, ProviderSummarizer, Summarizer};

/// Highest zoom level that gets rollups
pub const MAX_LEVEL: u32 = 4;

/// Entries per rollup group
pub const GROUP_SIZE: i64 = 9;

/// Which numbered log a handle writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Memory,
    Changelog,
}

impl LogKind {
    pub fn table(&self) -> &'static str {
        match self {
            LogKind::Memory => "memory",
            LogKind::Changelog => "changelog",
        }
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// A full log row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub number: i64,
    pub content: String,
    pub created_at: String,
}

/// A listing row with truncated content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
    pub number: i64,
    pub preview: String,
    pub created_at: String,
}

/// Smallest number above `highest` that is not a summary slot.
pub fn next_raw_number(highest: i64) -> i64 {
    let mut candidate = highest.max(0) + 1;
    while candidate % 10 == 0 {
        candidate += 1;
    }
    candidate
}

/// Zoom level of a number: 0 for raw, L for multiples of 10^L (capped at [`MAX_LEVEL`] + 1).
pub fn level_of(number: i64) -> u32 {
    let mut level = 0;
    let mut n = number;
    while n != 0 && n % 10 == 0 && level <= MAX_LEVEL {
        n /= 10;
        level += 1;
    }
    level
}

/// Numbers a summary slot at `level` rolls up, ascending.
pub fn constituents(slot: i64, level: u32) -> Vec<i64> {
    let sub = 10i64.pow(level.saturating_sub(1));
    (1..=GROUP_SIZE).rev().map(|k| slot - k * sub).collect()
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        number: row.get("number")?,
        content: row.get("content")?,
        created_at: row.get::<_, Option<String>>("created_at")?.unwrap_or_default(),
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<LogSummary> {
    Ok(LogSummary {
        number: row.get("number")?,
        preview: row.get("preview")?,
        created_at: row.get::<_, Option<String>>("created_at")?.unwrap_or_default(),
    })
}

fn highest_number(conn: &Connection, table: &str, identity: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!("SELECT COALESCE(MAX(number), 0) FROM {table} WHERE identity = ?1"),
        params![identity],
        |r| r.get(0),
    )
}

/// One numbered log (memory or changelog) with its rollup strategy
#[derive(Clone)]
pub struct NumberedLog {
    db: Arc<Database>,
    kind: LogKind,
    summarizer: Arc<dyn Summarizer>,
}

impl NumberedLog {
    pub fn new(db: Arc<Database>, kind: LogKind, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            db,
            kind,
            summarizer,
        }
    }

    /// Changelog handle using deterministic concatenation
    pub fn changelog(db: Arc<Database>) -> Self {
        Self::new(db, LogKind::Changelog, Arc::new(ConcatSummarizer::default()))
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Append a raw entry, run compaction, and return the entry's number.
    pub async fn write(&self, identity: &str, content: &str) -> SeedResult<i64> {
        let table = self.kind.table();
        let (owned_identity, owned_content) = (identity.to_string(), content.to_string());
        // Number assignment and insert happen under one lock acquisition.
        let number = self
            .db
            .with_conn(move |conn| {
                let number = next_raw_number(highest_number(conn, table, &owned_identity)?);
                conn.execute(
                    &format!("INSERT INTO {table} (identity, number, content) VALUES (?1, ?2, ?3)"),
                    params![owned_identity, number, owned_content],
                )?;
                Ok(number)
            })
            .await?;
        info!(table, identity, number, chars = content.chars().count(), "raw entry written");

        self.compact(identity).await?;
        Ok(number)
    }

    /// Fill every eligible empty summary slot for `identity`.
    ///
    /// Levels are processed from a worklist seeded with level 1; level L+1 is
    /// queued once level L holds at least [`GROUP_SIZE`] entries, so rollups
    /// created in this pass cascade upward. Returns the slots created.
    pub async fn compact(&self, identity: &str) -> SeedResult<Vec<i64>> {
        let mut numbers = self.numbers(identity).await?;
        let mut created = Vec::new();
        if numbers.is_empty() {
            return Ok(created);
        }

        let mut worklist: VecDeque<u32> = VecDeque::from([1]);
        while let Some(level) = worklist.pop_front() {
            let base = 10i64.pow(level);
            let max = numbers.iter().next_back().copied().unwrap_or(0);

            let mut slot = base;
            while slot < max + base {
                if level_of(slot) == level && !numbers.contains(&slot) {
                    let needed = constituents(slot, level);
                    if needed.iter().all(|n| numbers.contains(n)) {
                        if self.fill_slot(identity, slot, level, &needed).await? {
                            numbers.insert(slot);
                            created.push(slot);
                        }
                    }
                }
                slot += base;
            }

            let filled = numbers.iter().filter(|&&n| level_of(n) == level).count() as i64;
            if level < MAX_LEVEL && filled >= GROUP_SIZE {
                worklist.push_back(level + 1);
            }
        }

        Ok(created)
    }

    /// Summarize the constituents and insert at `slot`. Returns whether a row was added.
    async fn fill_slot(&self, identity: &str, slot: i64, level: u32, needed: &[i64]) -> SeedResult<bool> {
        let table = self.kind.table();
        let entries = self.fetch(identity, needed).await?;

        let summary = match self.summarizer.summarize(&entries).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                debug!(table, identity, slot, "summarizer returned nothing, slot left empty");
                return Ok(false);
            }
            Err(e) => {
                warn!(table, identity, slot, error = %e, "summarization failed, slot left empty");
                return Ok(false);
            }
        };

        let owned_identity = identity.to_string();
        let inserted = self
            .db
            .with_conn(move |conn| {
                let n = conn.execute(
                    &format!(
                        "INSERT INTO {table} (identity, number, content) \
                         SELECT ?1, ?2, ?3 WHERE NOT EXISTS \
                         (SELECT 1 FROM {table} WHERE identity = ?1 AND number = ?2)"
                    ),
                    params![owned_identity, slot, summary],
                )?;
                Ok(n > 0)
            })
            .await?;

        if inserted {
            info!(table, identity, slot, level, "compacted");
        }
        Ok(inserted)
    }

    async fn numbers(&self, identity: &str) -> SeedResult<BTreeSet<i64>> {
        let table = self.kind.table();
        let identity = identity.to_string();
        self.db
            .with_conn(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT number FROM {table} WHERE identity = ?1"))?;
                let rows = stmt
                    .query_map(params![identity], |r| r.get::<_, i64>(0))?
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn fetch(&self, identity: &str, numbers: &[i64]) -> SeedResult<Vec<LogEntry>> {
        let table = self.kind.table();
        let placeholders = (0..numbers.len())
            .map(|n| format!("?{}", n + 2))
            .collect::<Vec<_>>()
            .join(",");
        let mut values: Vec<rusqlite::types::Value> = vec![identity.to_string().into()];
        values.extend(numbers.iter().map(|&n| rusqlite::types::Value::Integer(n)));

        self.db
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT number, content, created_at FROM {table} \
                     WHERE identity = ?1 AND number IN ({placeholders}) ORDER BY number"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values.iter()), entry_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Exact entry when `number` is given, otherwise every entry ordered by number.
    pub async fn read(&self, identity: &str, number: Option<i64>) -> SeedResult<Vec<LogEntry>> {
        let table = self.kind.table();
        let identity = identity.to_string();
        self.db
            .with_conn(move |conn| {
                let rows = match number {
                    Some(n) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT number, content, created_at FROM {table} \
                             WHERE identity = ?1 AND number = ?2 ORDER BY id"
                        ))?;
                        let rows = stmt
                            .query_map(params![identity, n], entry_from_row)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT number, content, created_at FROM {table} \
                             WHERE identity = ?1 ORDER BY number, id"
                        ))?;
                        let rows = stmt
                            .query_map(params![identity], entry_from_row)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(rows)
            })
            .await
    }

    /// Listing filtered by zoom level: `Some(0)` raw only, `Some(L)` level-L
    /// summaries, `None` everything.
    pub async fn list(&self, identity: &str, level: Option<u32>) -> SeedResult<Vec<LogSummary>> {
        let table = self.kind.table();
        let filter = match level {
            None => "1=1".to_string(),
            Some(0) => "number % 10 != 0".to_string(),
            Some(l) => {
                let next = l.checked_add(1).and_then(|n| 10i64.checked_pow(n));
                match (10i64.checked_pow(l), next) {
                    (Some(base), Some(next)) => {
                        format!("number % {base} = 0 AND number % {next} != 0")
                    }
                    _ => "0".to_string(),
                }
            }
        };
        let identity = identity.to_string();
        self.db
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT number, substr(content, 1, {PREVIEW_CHARS}) AS preview, created_at \
                     FROM {table} WHERE identity = ?1 AND {filter} ORDER BY number, id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![identity], summary_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}
