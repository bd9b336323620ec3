use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};

use crate::app_dirs::AppDirs;
use crate::error::SprintResult;

/// Key the personal best is stored under
pub const HIGHSCORE_KEY: &str = "highscore";

/// Key/value store that survives across sessions
pub trait HighscoreStore {
    /// Read the raw value for `key`. Read failures are reported as absent.
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> SprintResult<()>;
    fn remove(&mut self, key: &str) -> SprintResult<()>;
}

/// Parse a stored best time. Anything that is not a finite, non-negative
/// number of seconds is treated as no best time.
pub fn parse_best_time(raw: &str) -> Option<f64> {
    match raw.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Some(secs),
        _ => None,
    }
}

pub fn encode_best_time(secs: f64) -> String {
    secs.to_string()
}

/// Load the best time from an optional store
pub fn load_best_time(store: Option<&dyn HighscoreStore>) -> Option<f64> {
    let raw = store?.get(HIGHSCORE_KEY)?;
    let parsed = parse_best_time(&raw);
    if parsed.is_none() {
        warn!("ignoring malformed highscore value {:?}", raw);
    }
    parsed
}

/// SQLite backed store, one row per key
#[derive(Debug)]
pub struct SqliteHighscoreStore {
    conn: Connection,
}

impl SqliteHighscoreStore {
    /// Open the store at the default state location
    pub fn open_default() -> SprintResult<Self> {
        let db_path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("alphabet_sprint.db"));
        Self::open(db_path)
    }

    /// Open (or create) the store at `path`, creating parent directories as needed
    pub fn open<P: AsRef<Path>>(path: P) -> SprintResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        debug!("opened highscore store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn in_memory() -> SprintResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SprintResult<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        Ok(Self { conn })
    }

    /// When the value for `key` was last written, as RFC 3339
    pub fn updated_at(&self, key: &str) -> SprintResult<Option<String>> {
        let ts = self
            .conn
            .query_row(
                "SELECT updated_at FROM settings WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }
}

impl HighscoreStore for SqliteHighscoreStore {
    fn get(&self, key: &str) -> Option<String> {
        let result = self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional();

        match result {
            Ok(value) => value,
            Err(e) => {
                warn!("failed to read {key} from highscore store: {e}");
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) -> SprintResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, Local::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> SprintResult<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }
}

/// In-memory store. Clones share the same map, so a test can keep a handle
/// on the store it gave away.
#[derive(Debug, Clone, Default)]
pub struct MemoryHighscoreStore {
    values: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryHighscoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        store
    }

    pub fn peek(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }
}

impl HighscoreStore for MemoryHighscoreStore {
    fn get(&self, key: &str) -> Option<String> {
        self.peek(key)
    }

    fn set(&mut self, key: &str, value: &str) -> SprintResult<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> SprintResult<()> {
        self.values.borrow_mut().remove(key);
        Ok(())
    }
}
