//! Persistent record of every audio file relayed to the channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to create database directory '{}': {source}", path.display())]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid forward_date '{value}': {source}")]
    Timestamp { value: String, source: chrono::ParseError },
}

/// Result of looking a file up in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
    /// Storage failed; whether the file was relayed is not known.
    Unknown,
}

/// One relayed audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRecord {
    pub file_id: String,
    pub file_name: String,
    pub performer: String,
    pub title: String,
    pub forward_timestamp: DateTime<Utc>,
    pub target_message_id: i64,
}

/// SQLite-backed relay ledger.
///
/// Every operation opens its own connection and drops it before returning,
/// so concurrent callers never share a handle. Read failures are logged
/// and degrade to "not forwarded" / zero / none.
pub struct Ledger {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Ledger {
    /// Open (and create if needed) the ledger at `path`.
    pub fn open(path: impl Into<PathBuf>, busy_timeout: Duration) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let ledger = Self { path, busy_timeout };
        ledger.init_schema()?;
        info!("Ledger ready at {:?} ({} files)", ledger.path, ledger.count());
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, LedgerError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<(), LedgerError> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS forwarded_files (
                file_id TEXT PRIMARY KEY,
                file_name TEXT,
                performer TEXT,
                title TEXT,
                forward_date TIMESTAMP,
                message_id INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_forwarded_files_date ON forwarded_files(forward_date);
            "#,
        )?;
        Ok(())
    }

    /// Tri-state existence check that keeps storage failures visible.
    pub fn lookup(&self, file_id: &str) -> Presence {
        let found = self.connect().and_then(|conn| {
            conn.query_row(
                "SELECT 1 FROM forwarded_files WHERE file_id = ?1",
                params![file_id],
                |_| Ok(()),
            )
            .optional()
            .map_err(LedgerError::from)
        });

        match found {
            Ok(Some(())) => Presence::Present,
            Ok(None) => Presence::Absent,
            Err(e) => {
                warn!(file_id, error = %e, "ledger lookup failed");
                Presence::Unknown
            }
        }
    }

    /// True iff `file_id` was relayed. Fails open: storage errors read as `false`.
    pub fn exists(&self, file_id: &str) -> bool {
        self.lookup(file_id) == Presence::Present
    }

    /// Upsert a relay record stamped with the current time.
    ///
    /// Returns the committed timestamp, or `None` if the write failed.
    pub fn record(
        &self,
        file_id: &str,
        file_name: &str,
        performer: &str,
        title: &str,
        target_message_id: i64,
    ) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        let result = self.connect().and_then(|conn| {
            conn.execute(
                "INSERT INTO forwarded_files (file_id, file_name, performer, title, forward_date, message_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(file_id) DO UPDATE SET
                    file_name = excluded.file_name,
                    performer = excluded.performer,
                    title = excluded.title,
                    forward_date = excluded.forward_date,
                    message_id = excluded.message_id",
                params![file_id, file_name, performer, title, encode_timestamp(now), target_message_id],
            )
            .map_err(LedgerError::from)
        });

        match result {
            Ok(_) => {
                debug!(file_id, target_message_id, "relay recorded");
                Some(now)
            }
            Err(e) => {
                warn!(file_id, error = %e, "failed to record relay");
                None
            }
        }
    }

    /// Number of distinct relayed files (0 if storage fails).
    pub fn count(&self) -> u64 {
        let count = self.connect().and_then(|conn| {
            conn.query_row("SELECT COUNT(*) FROM forwarded_files", [], |row| row.get::<_, i64>(0))
                .map_err(LedgerError::from)
        });

        match count {
            Ok(n) => n.max(0) as u64,
            Err(e) => {
                warn!(error = %e, "failed to count relayed files");
                0
            }
        }
    }

    /// Timestamp of the most recent relay, or `None` if there is none or storage fails.
    pub fn last_forwarded_at(&self) -> Option<DateTime<Utc>> {
        let latest = self.connect().and_then(|conn| {
            conn.query_row(
                "SELECT forward_date FROM forwarded_files ORDER BY forward_date DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(LedgerError::from)
        });

        match latest.and_then(|value| value.map(|v| decode_timestamp(&v)).transpose()) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(error = %e, "failed to read last relay date");
                None
            }
        }
    }

    /// Fetch a full record by file id.
    pub fn get(&self, file_id: &str) -> Result<Option<RelayRecord>, LedgerError> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT file_id, file_name, performer, title, forward_date, message_id
                 FROM forwarded_files WHERE file_id = ?1",
                params![file_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(file_id, file_name, performer, title, date, message_id)| {
            Ok(RelayRecord {
                file_id,
                file_name: file_name.unwrap_or_default(),
                performer: performer.unwrap_or_default(),
                title: title.unwrap_or_default(),
                forward_timestamp: decode_timestamp(&date)?,
                target_message_id: message_id,
            })
        })
        .transpose()
    }
}

// Fixed-width UTC so lexical order in SQLite matches time order.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(value: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| LedgerError::Timestamp {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Ledger) {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("data/forwarded_files.db"), Duration::from_secs(5)).unwrap();
        (dir, ledger)
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let (dir, ledger) = open_temp();
        assert!(dir.path().join("data").is_dir());
        assert!(ledger.path().exists());
        assert_eq!(ledger.count(), 0);
        assert_eq!(ledger.last_forwarded_at(), None);
    }

    #[test]
    fn test_record_then_exists() {
        let (_dir, ledger) = open_temp();
        assert!(!ledger.exists("A1"));
        assert_eq!(ledger.lookup("A1"), Presence::Absent);

        assert!(ledger.record("A1", "song.mp3", "Someone", "Song", 77).is_some());

        assert!(ledger.exists("A1"));
        assert_eq!(ledger.lookup("A1"), Presence::Present);
        let record = ledger.get("A1").unwrap().unwrap();
        assert_eq!(record.file_name, "song.mp3");
        assert_eq!(record.performer, "Someone");
        assert_eq!(record.title, "Song");
        assert_eq!(record.target_message_id, 77);
    }

    #[test]
    fn test_record_is_last_write_wins() {
        let (_dir, ledger) = open_temp();
        ledger.record("A1", "old.mp3", "", "", 1);
        ledger.record("A1", "new.mp3", "Artist", "Title", 2);

        assert_eq!(ledger.count(), 1);
        let record = ledger.get("A1").unwrap().unwrap();
        assert_eq!(record.file_name, "new.mp3");
        assert_eq!(record.target_message_id, 2);
    }

    #[test]
    fn test_count_and_last_forwarded_consistent() {
        let (_dir, ledger) = open_temp();
        let mut last = None;
        for i in 0..5 {
            last = ledger.record(&format!("file-{i}"), "", "", "", i);
        }

        assert_eq!(ledger.count(), 5);
        let last = last.unwrap();
        let stored = ledger.last_forwarded_at().unwrap();
        // stored at microsecond precision
        assert_eq!(encode_timestamp(stored), encode_timestamp(last));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let ledger = Ledger::open(&path, Duration::from_secs(5)).unwrap();
            ledger.record("A1", "", "", "", 10);
        }
        let ledger = Ledger::open(&path, Duration::from_secs(5)).unwrap();
        assert!(ledger.exists("A1"));
        assert_eq!(ledger.count(), 1);
    }

    #[test]
    fn test_storage_failure_fails_open() {
        let (dir, ledger) = open_temp();
        ledger.record("A1", "", "", "", 10);

        // Swap the database file for a directory so every connection fails.
        std::fs::remove_file(ledger.path()).unwrap();
        std::fs::create_dir(ledger.path()).unwrap();

        assert_eq!(ledger.lookup("A1"), Presence::Unknown);
        assert!(!ledger.exists("A1"));
        assert_eq!(ledger.count(), 0);
        assert_eq!(ledger.last_forwarded_at(), None);
        assert!(ledger.record("B2", "", "", "", 11).is_none());
        drop(dir);
    }
}
