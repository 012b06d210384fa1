use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::task;
use tracing::debug;

use super::{DebateStore, StatusUpdate};
use crate::model::{
    Council, Debate, DebateFilter, DebateStatus, DebateSummary, HistoryEntry, Round,
};

const BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite-based debate storage
///
/// Opens a connection per operation on the blocking pool.
pub struct SqliteStorage {
    /// Path to the SQLite database file
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Create a new SQLite storage at the given path
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        // Create parent directories if they don't exist
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        let storage = Self { db_path };
        storage.init_schema()?;

        Ok(storage)
    }

    /// Create storage using default location (~/.agents-council/council.db)
    pub fn default_location() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        let db_path = PathBuf::from(home).join(".agents-council").join("council.db");
        Self::new(db_path)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = open(&self.db_path)?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .context("failed to enable WAL mode")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS councils (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS debates (
                id TEXT PRIMARY KEY,
                council_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                status TEXT NOT NULL,
                current_round INTEGER NOT NULL DEFAULT 0,
                summary TEXT,
                pro_points TEXT,
                against_points TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS rounds (
                debate_id TEXT NOT NULL,
                round_number INTEGER NOT NULL,
                consensus_reached INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (debate_id, round_number)
            );

            CREATE TABLE IF NOT EXISTS debate_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                debate_id TEXT NOT NULL,
                status TEXT NOT NULL,
                round INTEGER NOT NULL,
                message TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_debates_council ON debates(council_id);
            CREATE INDEX IF NOT EXISTS idx_debates_status ON debates(status);
            CREATE INDEX IF NOT EXISTS idx_debates_created ON debates(created_at);
            CREATE INDEX IF NOT EXISTS idx_history_debate ON debate_history(debate_id);",
        )
        .context("failed to create schema")?;

        debug!(path = %self.db_path.display(), "initialized SQLite storage");

        Ok(())
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || {
            let mut conn = open(&db_path)?;
            f(&mut conn)
        })
        .await
        .context("spawn_blocking failed")?
    }
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database: {}", path.display()))?;
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
    Ok(conn)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp: {}", value))?
        .with_timezone(&Utc))
}

fn points_to_json(points: &Option<Vec<String>>) -> Result<Option<String>> {
    points
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("failed to serialize points")
}

fn points_from_json(value: Option<String>) -> Result<Option<Vec<String>>> {
    value
        .map(|v| serde_json::from_str(&v))
        .transpose()
        .context("failed to parse points")
}

fn insert_round(conn: &Connection, debate_id: &str, round: &Round) -> Result<()> {
    let data = serde_json::to_string(round)?;
    conn.execute(
        "INSERT OR REPLACE INTO rounds (debate_id, round_number, consensus_reached, data)
         VALUES (?1, ?2, ?3, ?4)",
        params![debate_id, round.round_number, round.consensus_reached, data],
    )?;
    Ok(())
}

fn stored_status(conn: &Connection, debate_id: &str) -> Result<Option<DebateStatus>> {
    conn.query_row("SELECT status FROM debates WHERE id = ?1", [debate_id], |row| {
        row.get::<_, String>(0)
    })
    .optional()?
    .map(|s| s.parse())
    .transpose()
}

struct DebateRow {
    id: String,
    council_id: String,
    topic: String,
    status: String,
    current_round: u32,
    summary: Option<String>,
    pro_points: Option<String>,
    against_points: Option<String>,
    error_message: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl DebateRow {
    fn into_debate(self, rounds: Vec<Round>) -> Result<Debate> {
        Ok(Debate {
            status: self.status.parse::<DebateStatus>()?,
            pro_points: points_from_json(self.pro_points)?,
            against_points: points_from_json(self.against_points)?,
            created_at: parse_time(&self.created_at)?,
            completed_at: self.completed_at.as_deref().map(parse_time).transpose()?,
            id: self.id,
            council_id: self.council_id,
            topic: self.topic,
            rounds,
            current_round: self.current_round,
            summary: self.summary,
            error_message: self.error_message,
        })
    }
}

#[async_trait]
impl DebateStore for SqliteStorage {
    async fn save_council(&self, council: &Council) -> Result<()> {
        let council = council.clone();
        self.with_conn(move |conn| {
            let data = serde_json::to_string(&council)?;
            conn.execute(
                "INSERT OR REPLACE INTO councils (id, name, created_at, data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![council.id, council.name, council.created_at.to_rfc3339(), data],
            )?;
            debug!(id = %council.id, "saved council");
            Ok(())
        })
        .await
    }

    async fn load_council(&self, id: &str) -> Result<Option<Council>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let data: Option<String> = conn
                .query_row("SELECT data FROM councils WHERE id = ?1", [&id], |row| {
                    row.get(0)
                })
                .optional()?;

            data.map(|d| serde_json::from_str(&d).context("failed to parse council"))
                .transpose()
        })
        .await
    }

    async fn list_councils(&self) -> Result<Vec<Council>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT data FROM councils ORDER BY created_at DESC")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            rows.iter()
                .map(|d| serde_json::from_str(d).context("failed to parse council"))
                .collect()
        })
        .await
    }

    async fn delete_council(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM councils WHERE id = ?1", [&id])?;
            debug!(id = %id, deleted, "deleted council");
            Ok(deleted > 0)
        })
        .await
    }

    async fn save_debate(&self, debate: &Debate) -> Result<()> {
        let debate = debate.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO debates (id, council_id, topic, status, current_round,
                    summary, pro_points, against_points, error_message, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    debate.id,
                    debate.council_id,
                    debate.topic,
                    debate.status.to_string(),
                    debate.current_round,
                    debate.summary,
                    points_to_json(&debate.pro_points)?,
                    points_to_json(&debate.against_points)?,
                    debate.error_message,
                    debate.created_at.to_rfc3339(),
                    debate.completed_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            tx.execute("DELETE FROM rounds WHERE debate_id = ?1", [&debate.id])?;
            for round in &debate.rounds {
                insert_round(&tx, &debate.id, round)?;
            }
            tx.commit()?;

            debug!(id = %debate.id, rounds = debate.rounds.len(), "saved debate");
            Ok(())
        })
        .await
    }

    async fn load_debate(&self, id: &str) -> Result<Option<Debate>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, council_id, topic, status, current_round, summary, pro_points,
                        against_points, error_message, created_at, completed_at
                     FROM debates WHERE id = ?1",
                    [&id],
                    |row| {
                        Ok(DebateRow {
                            id: row.get(0)?,
                            council_id: row.get(1)?,
                            topic: row.get(2)?,
                            status: row.get(3)?,
                            current_round: row.get(4)?,
                            summary: row.get(5)?,
                            pro_points: row.get(6)?,
                            against_points: row.get(7)?,
                            error_message: row.get(8)?,
                            created_at: row.get(9)?,
                            completed_at: row.get(10)?,
                        })
                    },
                )
                .optional()?;

            let Some(row) = row else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT data FROM rounds WHERE debate_id = ?1 ORDER BY round_number ASC",
            )?;
            let rounds = stmt
                .query_map([&id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
                .iter()
                .map(|d| serde_json::from_str(d).context("failed to parse round"))
                .collect::<Result<Vec<Round>>>()?;

            let debate = row.into_debate(rounds)?;
            debug!(id = %debate.id, "loaded debate");
            Ok(Some(debate))
        })
        .await
    }

    async fn list_debates(&self, filter: &DebateFilter) -> Result<Vec<DebateSummary>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, council_id, topic, status, current_round, created_at
                 FROM debates
                 WHERE (?1 IS NULL OR council_id = ?1) AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC",
            )?;

            let rows = stmt
                .query_map(
                    params![filter.council_id, filter.status.map(|s| s.to_string())],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, u32>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, council_id, topic, status, current_round, created_at)| {
                    Ok(DebateSummary {
                        id,
                        council_id,
                        topic,
                        status: status.parse()?,
                        current_round,
                        created_at,
                    })
                })
                .collect()
        })
        .await
    }

    async fn delete_debate(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM rounds WHERE debate_id = ?1", [&id])?;
            tx.execute("DELETE FROM debate_history WHERE debate_id = ?1", [&id])?;
            let deleted = tx.execute("DELETE FROM debates WHERE id = ?1", [&id])?;
            tx.commit()?;
            debug!(id = %id, deleted, "deleted debate");
            Ok(deleted > 0)
        })
        .await
    }

    async fn save_round(&self, debate_id: &str, round: &Round) -> Result<()> {
        let debate_id = debate_id.to_string();
        let round = round.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE debates SET current_round = MAX(current_round, ?2)
                 WHERE id = ?1 AND status IN ('pending', 'in_progress')",
                params![debate_id, round.round_number],
            )?;
            if updated == 0 {
                match stored_status(&tx, &debate_id)? {
                    Some(status) => {
                        anyhow::bail!("debate {} already finished ({})", debate_id, status)
                    }
                    None => anyhow::bail!("debate not found: {}", debate_id),
                }
            }
            insert_round(&tx, &debate_id, &round)?;
            tx.commit()?;

            debug!(debate_id = %debate_id, round = round.round_number, "saved round");
            Ok(())
        })
        .await
    }

    async fn update_debate_status(&self, debate_id: &str, update: &StatusUpdate) -> Result<bool> {
        let debate_id = debate_id.to_string();
        let update = update.clone();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE debates SET status = ?2, current_round = ?3, summary = ?4,
                    pro_points = ?5, against_points = ?6, error_message = ?7, completed_at = ?8
                 WHERE id = ?1 AND status IN ('pending', 'in_progress')",
                params![
                    debate_id,
                    update.status.to_string(),
                    update.current_round,
                    update.summary,
                    points_to_json(&update.pro_points)?,
                    points_to_json(&update.against_points)?,
                    update.error_message,
                    update.completed_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            if updated == 0 {
                let Some(status) = stored_status(conn, &debate_id)? else {
                    anyhow::bail!("debate not found: {}", debate_id);
                };
                debug!(debate_id = %debate_id, %status, "debate already finished, status kept");
                return Ok(false);
            }

            debug!(debate_id = %debate_id, status = %update.status, "updated debate status");
            Ok(true)
        })
        .await
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO debate_history (debate_id, status, round, message, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.debate_id,
                    entry.status.to_string(),
                    entry.round,
                    entry.message,
                    entry.recorded_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn history(&self, debate_id: &str) -> Result<Vec<HistoryEntry>> {
        let debate_id = debate_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT debate_id, status, round, message, recorded_at
                 FROM debate_history WHERE debate_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([&debate_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(debate_id, status, round, message, recorded_at)| {
                    Ok(HistoryEntry {
                        debate_id,
                        status: status.parse()?,
                        round,
                        message,
                        recorded_at: parse_time(&recorded_at)?,
                    })
                })
                .collect()
        })
        .await
    }
}
