//! SQLite-backed persistence for accounts and system configuration.
//!
//! Schema evolves via `ensure_column`/`has_column`-guarded `ALTER TABLE`
//! statements rather than a migration-file runner.

mod accounts;
pub mod config;

use rusqlite::Connection;

pub use accounts::AccountRow;

/// Unix timestamp, seconds. Re-exported here so storage call sites that
/// don't want the full `time` module can still stamp rows.
pub fn now_ts() -> i64 {
    crate::time::now_ts()
}

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &str) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    /// Idempotent: create tables if missing, then apply any pending
    /// `ensure_column` migrations. Safe to call on every startup.
    pub fn init(&self) -> rusqlite::Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                session_cookie TEXT NOT NULL,
                host_cookie TEXT NOT NULL,
                session_index TEXT NOT NULL,
                config_id TEXT NOT NULL,
                user_agent TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                temp_mail_url TEXT,
                last_cookie_refresh_at INTEGER,
                sort INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_accounts_sort ON accounts(sort)",
            [],
        )?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS system_config (
                key TEXT PRIMARY KEY,
                value TEXT
            )",
            [],
        )?;
        self.ensure_account_user_agent_column()?;
        Ok(())
    }

    fn has_column(&self, table: &str, column: &str) -> rusqlite::Result<bool> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            if name == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn ensure_column(&self, table: &str, column: &str, sql_type: &str) -> rusqlite::Result<()> {
        if self.has_column(table, column)? {
            return Ok(());
        }
        self.conn.execute(
            &format!("ALTER TABLE {table} ADD COLUMN {column} {sql_type}"),
            [],
        )?;
        Ok(())
    }

    fn ensure_account_user_agent_column(&self) -> rusqlite::Result<()> {
        self.ensure_column("accounts", "user_agent", "TEXT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let storage = Storage::open_in_memory().expect("open");
        storage.init().expect("second init");
        assert!(storage.has_column("accounts", "user_agent").unwrap());
        assert!(!storage.has_column("accounts", "nonexistent").unwrap());
    }
}
