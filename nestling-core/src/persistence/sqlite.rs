//! SQLite store for the companion.
//!
//! ```sql
//! CREATE TABLE companion_state (
//!     id                       INTEGER PRIMARY KEY CHECK (id = 1),
//!     mood                     REAL NOT NULL,
//!     energy                   REAL NOT NULL,
//!     affinity                 REAL NOT NULL,
//!     currency                 INTEGER NOT NULL,
//!     experience               INTEGER NOT NULL,
//!     total_interactions       INTEGER NOT NULL,
//!     created_at               TEXT NOT NULL,
//!     last_interaction_at      TEXT NOT NULL,
//!     last_decay_applied_at    TEXT NOT NULL,
//!     last_interaction_by_kind TEXT NOT NULL,
//!     updated_at               TEXT NOT NULL
//! );
//! CREATE TABLE achievement_unlocks (id TEXT PRIMARY KEY, unlocked_at TEXT NOT NULL);
//! CREATE TABLE activity_stats (
//!     id         INTEGER PRIMARY KEY CHECK (id = 1),
//!     data       TEXT NOT NULL,
//!     updated_at TEXT NOT NULL
//! );
//! ```
//!
//! The attribute record is a single row with one column per field, so a
//! partial write can update only the columns it carries (`COALESCE(?, col)`).
//! Timestamps are RFC 3339 text. Activity stats are a JSON document.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info};

use crate::achievement::UnlockRecord;
use crate::activity::ActivityStats;
use crate::config::PersistenceConfig;
use crate::error::StorageError;
use crate::persistence::{AttributePatch, ProgressStore, SnapshotStore, StoreResult};
use crate::types::AttributeState;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS companion_state (
        id                       INTEGER PRIMARY KEY CHECK (id = 1),
        mood                     REAL NOT NULL,
        energy                   REAL NOT NULL,
        affinity                 REAL NOT NULL,
        currency                 INTEGER NOT NULL,
        experience               INTEGER NOT NULL,
        total_interactions       INTEGER NOT NULL,
        created_at               TEXT NOT NULL,
        last_interaction_at      TEXT NOT NULL,
        last_decay_applied_at    TEXT NOT NULL,
        last_interaction_by_kind TEXT NOT NULL DEFAULT '{}',
        updated_at               TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS achievement_unlocks (
        id          TEXT PRIMARY KEY,
        unlocked_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS activity_stats (
        id         INTEGER PRIMARY KEY CHECK (id = 1),
        data       TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

/// Handle to an open SQLite database holding one companion.
///
/// ```no_run
/// # use nestling_core::persistence::{SqliteStore, SnapshotStore};
/// # use nestling_core::config::PersistenceConfig;
/// # use nestling_core::types::AttributeState;
/// let store = SqliteStore::open("nestling.db", &PersistenceConfig::default())?;
/// store.seed(&AttributeState::new(chrono::Utc::now()))?;
/// let state = store.load_snapshot()?;
/// # Ok::<(), nestling_core::error::NestlingError>(())
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// The schema is created if missing. WAL mode is enabled when
    /// `config.wal_mode` is set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Companion store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] on SQLite failures.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl SnapshotStore for SqliteStore {
    fn load_snapshot(&self) -> StoreResult<Option<AttributeState>> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT mood, energy, affinity, currency, experience, total_interactions,
                    created_at, last_interaction_at, last_decay_applied_at,
                    last_interaction_by_kind
             FROM companion_state WHERE id = 1",
        )?;

        let row: Option<StateRow> = stmt
            .query_row([], |row| {
                Ok(StateRow {
                    mood: row.get(0)?,
                    energy: row.get(1)?,
                    affinity: row.get(2)?,
                    currency: row.get(3)?,
                    experience: row.get(4)?,
                    total_interactions: row.get(5)?,
                    created_at: row.get(6)?,
                    last_interaction_at: row.get(7)?,
                    last_decay_applied_at: row.get(8)?,
                    last_interaction_by_kind: row.get(9)?,
                })
            })
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state = row.into_state()?;

        debug!(
            total_interactions = state.total_interactions,
            elapsed_us = start.elapsed().as_micros(),
            "Loaded companion state"
        );
        Ok(Some(state))
    }

    fn seed(&self, state: &AttributeState) -> StoreResult<bool> {
        let by_kind = serde_json::to_string(&state.last_interaction_by_kind)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let inserted = self.conn.lock().execute(
            "INSERT OR IGNORE INTO companion_state (
                id, mood, energy, affinity, currency, experience, total_interactions,
                created_at, last_interaction_at, last_decay_applied_at,
                last_interaction_by_kind, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                state.mood,
                state.energy,
                state.affinity,
                to_sql_int(state.currency)?,
                to_sql_int(state.experience)?,
                to_sql_int(state.total_interactions)?,
                state.created_at.to_rfc3339(),
                state.last_interaction_at.to_rfc3339(),
                state.last_decay_applied_at.to_rfc3339(),
                by_kind,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if inserted > 0 {
            info!("Companion state seeded");
        }
        Ok(inserted > 0)
    }

    fn write_snapshot(&self, patch: &AttributePatch) -> StoreResult<()> {
        let start = Instant::now();
        let by_kind = patch
            .last_interaction_by_kind
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let updated = self.conn.lock().execute(
            "UPDATE companion_state SET
                mood                     = COALESCE(?1, mood),
                energy                   = COALESCE(?2, energy),
                affinity                 = COALESCE(?3, affinity),
                currency                 = COALESCE(?4, currency),
                experience               = COALESCE(?5, experience),
                total_interactions       = COALESCE(?6, total_interactions),
                created_at               = COALESCE(?7, created_at),
                last_interaction_at      = COALESCE(?8, last_interaction_at),
                last_decay_applied_at    = COALESCE(?9, last_decay_applied_at),
                last_interaction_by_kind = COALESCE(?10, last_interaction_by_kind),
                updated_at               = ?11
             WHERE id = 1",
            params![
                patch.mood,
                patch.energy,
                patch.affinity,
                patch.currency.map(to_sql_int).transpose()?,
                patch.experience.map(to_sql_int).transpose()?,
                patch.total_interactions.map(to_sql_int).transpose()?,
                patch.created_at.map(|t| t.to_rfc3339()),
                patch.last_interaction_at.map(|t| t.to_rfc3339()),
                patch.last_decay_applied_at.map(|t| t.to_rfc3339()),
                by_kind,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::NotSeeded);
        }

        debug!(
            fields = patch.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Wrote companion state"
        );
        Ok(())
    }
}

impl ProgressStore for SqliteStore {
    fn load_unlocks(&self) -> StoreResult<Vec<UnlockRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, unlocked_at FROM achievement_unlocks ORDER BY unlocked_at",
        )?;

        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let unlocked_at: String = row.get(1)?;
            Ok((id, unlocked_at))
        })?;

        let mut unlocks = Vec::new();
        for row in rows {
            let (id, unlocked_at) = row?;
            unlocks.push(UnlockRecord {
                id,
                unlocked_at: parse_time(&unlocked_at)?,
            });
        }
        Ok(unlocks)
    }

    fn record_unlock(&self, unlock: &UnlockRecord) -> StoreResult<()> {
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO achievement_unlocks (id, unlocked_at) VALUES (?1, ?2)",
            params![unlock.id, unlock.unlocked_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn load_activity(&self) -> StoreResult<Option<ActivityStats>> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row("SELECT data FROM activity_stats WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        data.map(|json| {
            serde_json::from_str(&json).map_err(|e| StorageError::Serialization(e.to_string()))
        })
        .transpose()
    }

    fn save_activity(&self, stats: &ActivityStats) -> StoreResult<()> {
        let json =
            serde_json::to_string(stats).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.conn.lock().execute(
            "INSERT INTO activity_stats (id, data, updated_at)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at",
            params![json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn reset(&self) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM companion_state", [])?;
        tx.execute("DELETE FROM achievement_unlocks", [])?;
        tx.execute("DELETE FROM activity_stats", [])?;
        tx.commit()?;
        drop(conn);
        info!(path = %self.db_path.display(), "Companion store reset");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

struct StateRow {
    mood: f64,
    energy: f64,
    affinity: f64,
    currency: i64,
    experience: i64,
    total_interactions: i64,
    created_at: String,
    last_interaction_at: String,
    last_decay_applied_at: String,
    last_interaction_by_kind: String,
}

impl StateRow {
    fn into_state(self) -> StoreResult<AttributeState> {
        Ok(AttributeState {
            mood: self.mood,
            energy: self.energy,
            affinity: self.affinity,
            currency: from_sql_int(self.currency),
            experience: from_sql_int(self.experience),
            total_interactions: from_sql_int(self.total_interactions),
            created_at: parse_time(&self.created_at)?,
            last_interaction_at: parse_time(&self.last_interaction_at)?,
            last_decay_applied_at: parse_time(&self.last_decay_applied_at)?,
            last_interaction_by_kind: serde_json::from_str(&self.last_interaction_by_kind)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        })
    }
}

fn to_sql_int(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| {
        StorageError::Serialization(format!("{value} does not fit in an SQLite integer"))
    })
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn parse_time(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{text}': {e}")))
}

/// Extension trait that adds an `.optional()` combinator to `rusqlite::Result`.
///
/// Converts `Err(QueryReturnedNoRows)` into `Ok(None)`.
trait OptionalExt<T> {
    /// Convert `QueryReturnedNoRows` into `Ok(None)`.
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
