use rusqlite::{Result, Row};

use super::Storage;
use crate::model::Account;

/// Row shape returned by the account queries; identical fields to `Account`
/// but kept as its own type so storage-layer changes don't leak into the
/// pool's in-memory model without an explicit conversion.
pub type AccountRow = Account;

impl Storage {
    pub fn upsert_account(&self, account: &Account) -> Result<()> {
        self.conn.execute(
            "INSERT INTO accounts (
                id, session_cookie, host_cookie, session_index, config_id,
                user_agent, enabled, temp_mail_url, last_cookie_refresh_at, sort
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                session_cookie = excluded.session_cookie,
                host_cookie = excluded.host_cookie,
                session_index = excluded.session_index,
                config_id = excluded.config_id,
                user_agent = excluded.user_agent,
                enabled = excluded.enabled,
                temp_mail_url = excluded.temp_mail_url,
                last_cookie_refresh_at = excluded.last_cookie_refresh_at,
                sort = excluded.sort",
            (
                &account.id,
                &account.session_cookie,
                &account.host_cookie,
                &account.session_index,
                &account.config_id,
                &account.user_agent,
                account.enabled as i64,
                &account.temp_mail_url,
                account.last_cookie_refresh_at,
                account.sort,
            ),
        )?;
        Ok(())
    }

    pub fn list_accounts(&self) -> Result<Vec<AccountRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_cookie, host_cookie, session_index, config_id,
                    user_agent, enabled, temp_mail_url, last_cookie_refresh_at, sort
             FROM accounts ORDER BY sort ASC, id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(map_account_row(row)?);
        }
        Ok(out)
    }

    pub fn find_account(&self, id: &str) -> Result<Option<AccountRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_cookie, host_cookie, session_index, config_id,
                    user_agent, enabled, temp_mail_url, last_cookie_refresh_at, sort
             FROM accounts WHERE id = ?1 LIMIT 1",
        )?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(map_account_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn set_account_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE accounts SET enabled = ?1 WHERE id = ?2",
            (enabled as i64, id),
        )?;
        Ok(())
    }

    pub fn set_account_cookies(
        &self,
        id: &str,
        session_cookie: &str,
        host_cookie: &str,
        session_index: &str,
        refreshed_at: i64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE accounts SET session_cookie = ?1, host_cookie = ?2, session_index = ?3,
                last_cookie_refresh_at = ?4, enabled = 1
             WHERE id = ?5",
            (session_cookie, host_cookie, session_index, refreshed_at, id),
        )?;
        Ok(())
    }

    pub fn delete_account(&self, id: &str) -> Result<()> {
        self.conn.execute("DELETE FROM accounts WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn account_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(1) FROM accounts", [], |row| row.get(0))
    }
}

fn map_account_row(row: &Row<'_>) -> Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        session_cookie: row.get(1)?,
        host_cookie: row.get(2)?,
        session_index: row.get(3)?,
        config_id: row.get(4)?,
        user_agent: row.get(5)?,
        enabled: row.get::<_, i64>(6)? != 0,
        temp_mail_url: row.get(7)?,
        last_cookie_refresh_at: row.get(8)?,
        sort: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_account(id: &str, sort: i64) -> Account {
        Account {
            id: id.to_string(),
            session_cookie: "sc".to_string(),
            host_cookie: "hc".to_string(),
            session_index: "0".to_string(),
            config_id: "cfg-1".to_string(),
            user_agent: None,
            enabled: true,
            temp_mail_url: None,
            last_cookie_refresh_at: None,
            sort,
        }
    }

    #[test]
    fn upsert_then_list_round_trips_in_sort_order() {
        let storage = Storage::open_in_memory().expect("open");
        storage.upsert_account(&sample_account("b", 2)).unwrap();
        storage.upsert_account(&sample_account("a", 1)).unwrap();

        let accounts = storage.list_accounts().unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, "a");
        assert_eq!(accounts[1].id, "b");
    }

    #[test]
    fn upsert_is_update_on_conflict() {
        let storage = Storage::open_in_memory().expect("open");
        storage.upsert_account(&sample_account("a", 1)).unwrap();
        let mut updated = sample_account("a", 1);
        updated.enabled = false;
        storage.upsert_account(&updated).unwrap();

        let found = storage.find_account("a").unwrap().expect("present");
        assert!(!found.enabled);
        assert_eq!(storage.account_count().unwrap(), 1);
    }

    #[test]
    fn set_account_cookies_clears_cookie_expired_by_reenabling() {
        let storage = Storage::open_in_memory().expect("open");
        storage.upsert_account(&sample_account("a", 1)).unwrap();
        storage.set_account_enabled("a", false).unwrap();
        storage
            .set_account_cookies("a", "new-sc", "new-hc", "1", 1000)
            .unwrap();

        let found = storage.find_account("a").unwrap().expect("present");
        assert!(found.enabled);
        assert_eq!(found.session_cookie, "new-sc");
        assert_eq!(found.last_cookie_refresh_at, Some(1000));
    }
}
