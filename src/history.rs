use chrono::{DateTime, Days, Local, NaiveDate};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use crate::app_dirs::AppDirs;
use crate::drill::DrillType;
use crate::error::HistoryError;
use crate::session::CompletedSessionRecord;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Sink for finished sessions. Fire-and-forget: implementations log their
/// own failures and never report them back to the sequencer.
pub trait HistoryStore: Send + Sync {
    fn record_session(&self, record: &CompletedSessionRecord);
}

/// A stored practice session
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub drill: DrillType,
    pub reps: u32,
    pub duration_secs: u64,
    pub timestamp: DateTime<Local>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_sessions: u64,
    pub total_reps: u64,
    pub total_duration_secs: u64,
    pub current_streak: u32,
    pub total_days: u32,
}

/// SQLite-backed practice history
#[derive(Debug)]
pub struct HistoryDb {
    conn: Mutex<Connection>,
}

impl HistoryDb {
    /// Open (creating if needed) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_default() -> Result<Self, HistoryError> {
        Self::open(AppDirs::db_path())
    }

    pub fn open_in_memory() -> Result<Self, HistoryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS practice_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                drill TEXT NOT NULL,
                reps INTEGER NOT NULL,
                duration_secs INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                date TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_practice_sessions_date ON practice_sessions(date)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a record stamped with `at`, returning its row id
    pub fn insert(
        &self,
        record: &CompletedSessionRecord,
        at: DateTime<Local>,
    ) -> Result<i64, HistoryError> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO practice_sessions (drill, reps, duration_secs, timestamp, date)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.drill.to_string(),
                record.reps,
                record.duration_secs,
                at.to_rfc3339(),
                at.date_naive().format(DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn sessions_for_date(&self, date: NaiveDate) -> Result<Vec<HistoryEntry>, HistoryError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, drill, reps, duration_secs, timestamp, date
            FROM practice_sessions
            WHERE date = ?1
            ORDER BY timestamp ASC
            "#,
        )?;
        let rows = stmt.query_map([date.format(DATE_FORMAT).to_string()], entry_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Most recent first
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, drill, reps, duration_secs, timestamp, date
            FROM practice_sessions
            ORDER BY timestamp DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map([limit as i64], entry_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Distinct days with at least one session, newest first
    pub fn practice_dates(&self) -> Result<Vec<NaiveDate>, HistoryError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT DISTINCT date FROM practice_sessions ORDER BY date DESC")?;
        let rows = stmt.query_map([], |row| parse_date(row, 0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn statistics(&self, today: NaiveDate) -> Result<Statistics, HistoryError> {
        let (total_sessions, total_reps, total_duration_secs) = self.conn().query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(reps), 0), COALESCE(SUM(duration_secs), 0)
            FROM practice_sessions
            "#,
            [],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?, row.get::<_, u64>(2)?)),
        )?;

        let dates = self.practice_dates()?;
        Ok(Statistics {
            total_sessions,
            total_reps,
            total_duration_secs,
            current_streak: current_streak(&dates, today),
            total_days: dates.len() as u32,
        })
    }

    pub fn clear_all(&self) -> Result<(), HistoryError> {
        self.conn().execute("DELETE FROM practice_sessions", [])?;
        Ok(())
    }
}

impl HistoryStore for HistoryDb {
    fn record_session(&self, record: &CompletedSessionRecord) {
        match self.insert(record, Local::now()) {
            Ok(id) => info!(id, drill = %record.drill, reps = record.reps, "practice session saved"),
            Err(err) => warn!(%err, drill = %record.drill, "failed to save practice session"),
        }
    }
}

/// Consecutive practice days ending today. `dates` need not be sorted.
pub fn current_streak(dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut sorted = dates.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();

    let mut streak = 0;
    let mut expected = Some(today);
    for date in sorted {
        if date > today {
            continue;
        }
        if Some(date) != expected {
            break;
        }
        streak += 1;
        expected = date.checked_sub_days(Days::new(1));
    }
    streak
}

/// Keeps records in memory; used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<CompletedSessionRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CompletedSessionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HistoryStore for MemoryHistory {
    fn record_session(&self, record: &CompletedSessionRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let drill: String = row.get(1)?;
    let drill = drill.parse::<DrillType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let timestamp: String = row.get(4)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Local);

    Ok(HistoryEntry {
        id: row.get(0)?,
        drill,
        reps: row.get(2)?,
        duration_secs: row.get(3)?,
        timestamp,
        date: parse_date(row, 5)?,
    })
}

fn parse_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
