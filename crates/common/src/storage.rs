//! Durable client storage using SQLite
//!
//! Provides a small key-value table that survives restarts. The session
//! token is the main tenant; anything else the client needs to remember
//! between runs goes here too.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Key under which the session token is persisted.
pub const TOKEN_KEY: &str = "token";

/// Database connection wrapper
pub struct Database {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        }

        let conn = rusqlite::Connection::open(path)
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Default database location inside the platform data directory.
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("co", "conciliar", "conciliar") {
            dirs.data_dir().join("client.db")
        } else {
            PathBuf::from("client.db")
        }
    }

    fn initialize_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .map_err(|e| StorageError::SchemaError(e.to_string()))?;

        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT value FROM kv_store WHERE key = ?")
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        match stmt.query_row([key], |row| row.get::<_, String>(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::QueryError(e.to_string())),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = ?2,
                updated_at = CURRENT_TIMESTAMP
            "#,
            rusqlite::params![key, value],
        )
        .map_err(|e| StorageError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock();

        let affected = conn
            .execute("DELETE FROM kv_store WHERE key = ?", [key])
            .map_err(|e| StorageError::WriteError(e.to_string()))?;

        Ok(affected > 0)
    }
}

/// Persistence for the session token.
///
/// Read once at start-up, written on successful login, cleared on logout or
/// on any authentication failure.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, StorageError>;
    fn save(&self, token: &str) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

pub struct SqliteTokenStore {
    db: Database,
}

impl SqliteTokenStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::new(Database::open(path)?))
    }
}

impl TokenStore for SqliteTokenStore {
    fn load(&self) -> Result<Option<String>, StorageError> {
        self.db.get(TOKEN_KEY)
    }

    fn save(&self, token: &str) -> Result<(), StorageError> {
        self.db.set(TOKEN_KEY, token)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.db.delete(TOKEN_KEY).map(|_| ())
    }
}

/// Process-local token store, mostly for tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.token.lock().clone())
    }

    fn save(&self, token: &str) -> Result<(), StorageError> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.token.lock() = None;
        Ok(())
    }
}

impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    fn load(&self) -> Result<Option<String>, StorageError> {
        (**self).load()
    }

    fn save(&self, token: &str) -> Result<(), StorageError> {
        (**self).save(token)
    }

    fn clear(&self) -> Result<(), StorageError> {
        (**self).clear()
    }
}

// =========================================================================
// Errors
// =========================================================================

#[derive(Debug, Clone)]
pub enum StorageError {
    ConnectionFailed(String),
    SchemaError(String),
    QueryError(String),
    WriteError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Database connection failed: {}", msg),
            Self::SchemaError(msg) => write!(f, "Schema initialization failed: {}", msg),
            Self::QueryError(msg) => write!(f, "Query error: {}", msg),
            Self::WriteError(msg) => write!(f, "Write error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}
