/// Session storage for the current user identity.
///
/// A single SQLite key/value table; the identity lives under
/// `chat_session_user` as JSON. Opening the same file again returns the same
/// identity, so a guest keeps its id across client restarts.

use crate::error::Result;
use crate::models::User;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const SESSION_USER_KEY: &str = "chat_session_user";

pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (or create) the session database at the given path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Session that lives only as long as this value
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;
        Ok(Self { conn })
    }

    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS session (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM session WHERE key = ?1")?;

        let value = stmt
            .query_row((key,), |row| row.get::<_, String>(0))
            .optional()?;

        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT OR REPLACE INTO session (key, value, updated_at) VALUES (?1, ?2, ?3)",
            (key, value, updated_at),
        )?;

        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM session WHERE key = ?1", (key,))?;
        Ok(())
    }

    /// The stored identity, if any
    pub fn load_user(&self) -> Result<Option<User>> {
        match self.get(SESSION_USER_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn save_user(&self, user: &User) -> Result<()> {
        let json = serde_json::to_string(user)?;
        self.set(SESSION_USER_KEY, &json)?;
        log::debug!("Session identity set to {} ({})", user.name, user.id);
        Ok(())
    }

    pub fn clear_user(&self) -> Result<()> {
        self.remove(SESSION_USER_KEY)
    }

    /// Return the stored identity, creating and persisting a guest if there is
    /// none. An unreadable stored identity is replaced.
    pub fn load_or_create_guest(&self) -> Result<User> {
        match self.load_user() {
            Ok(Some(user)) => return Ok(user),
            Ok(None) => {}
            Err(e) => log::warn!("Discarding unreadable session identity: {}", e),
        }

        let guest = User::guest();
        self.save_user(&guest)?;
        log::info!("Created guest identity {}", guest.id);
        Ok(guest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_initialize_creates_table() {
        let store = SessionStore::in_memory().unwrap();

        let mut stmt = store
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"session".to_string()));
    }

    #[test]
    fn test_guest_is_stable_within_session() {
        let store = SessionStore::in_memory().unwrap();

        let first = store.load_or_create_guest().unwrap();
        let second = store.load_or_create_guest().unwrap();

        assert!(first.id.starts_with("guest_"));
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_identity_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("session.db");

        let created = {
            let store = SessionStore::new(&db_path).unwrap();
            store.load_or_create_guest().unwrap()
        };

        let store = SessionStore::new(&db_path).unwrap();
        assert_eq!(store.load_or_create_guest().unwrap(), created);
    }

    #[test]
    fn test_save_replaces_identity() {
        let store = SessionStore::in_memory().unwrap();
        store.load_or_create_guest().unwrap();

        store.save_user(&User::admin()).unwrap();
        let loaded = store.load_user().unwrap().unwrap();
        assert_eq!(loaded.id, User::ADMIN_ID);
    }

    #[test]
    fn test_corrupt_identity_is_replaced() {
        let store = SessionStore::in_memory().unwrap();
        store.set(SESSION_USER_KEY, "{not json").unwrap();

        let user = store.load_or_create_guest().unwrap();
        assert!(user.id.starts_with("guest_"));
        assert_eq!(store.load_user().unwrap().unwrap(), user);
    }

    #[test]
    fn test_clear_user() {
        let store = SessionStore::in_memory().unwrap();
        store.save_user(&User::admin()).unwrap();
        store.clear_user().unwrap();
        assert!(store.load_user().unwrap().is_none());
    }
}
