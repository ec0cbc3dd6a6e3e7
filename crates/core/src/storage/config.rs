use rusqlite::Result;

use super::Storage;

/// Known system-config keys (SPEC_FULL.md §6). Any other key still
/// round-trips through `get_config`/`set_config`; these constants just
/// avoid typos at call sites.
pub mod keys {
    pub const PROXY: &str = "proxy";
    pub const IMAGE_BASE_URL: &str = "image_base_url";
    pub const UPLOAD_ENDPOINT: &str = "upload_endpoint";
    pub const UPLOAD_API_TOKEN: &str = "upload_api_token";
    pub const AUTO_REFRESH_COOKIE: &str = "auto_refresh_cookie";
}

impl Storage {
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM system_config WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO system_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )?;
        Ok(())
    }

    pub fn delete_config(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM system_config WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_key_returns_none() {
        let storage = Storage::open_in_memory().expect("open");
        assert_eq!(storage.get_config(keys::PROXY).unwrap(), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let storage = Storage::open_in_memory().expect("open");
        storage
            .set_config(keys::UPLOAD_ENDPOINT, "https://files.example/upload")
            .unwrap();
        assert_eq!(
            storage.get_config(keys::UPLOAD_ENDPOINT).unwrap(),
            Some("https://files.example/upload".to_string())
        );
    }

    #[test]
    fn set_overwrites_existing_value() {
        let storage = Storage::open_in_memory().expect("open");
        storage.set_config(keys::PROXY, "http://a").unwrap();
        storage.set_config(keys::PROXY, "http://b").unwrap();
        assert_eq!(
            storage.get_config(keys::PROXY).unwrap(),
            Some("http://b".to_string())
        );
    }
}
