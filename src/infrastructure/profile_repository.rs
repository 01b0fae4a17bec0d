use crate::infrastructure::error::EngineError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait ProfileRepository: Send + Sync {
    /// Stored IANA timezone identifier for the user, if any.
    fn timezone(&self, user_id: &str) -> Result<Option<String>, EngineError>;
    fn save_timezone(&self, user_id: &str, timezone: &str) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct SqliteProfileRepository {
    db_path: PathBuf,
}

impl SqliteProfileRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        Connection::open(&self.db_path).map_err(EngineError::from)
    }
}

impl ProfileRepository for SqliteProfileRepository {
    fn timezone(&self, user_id: &str) -> Result<Option<String>, EngineError> {
        let connection = self.connect()?;
        let stored: Option<Option<String>> = connection
            .query_row(
                "SELECT timezone FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(stored
            .flatten()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()))
    }

    fn save_timezone(&self, user_id: &str, timezone: &str) -> Result<(), EngineError> {
        let timezone = timezone.trim();
        if timezone.is_empty() {
            return Err(EngineError::InvalidConfig(
                "profile timezone must not be empty".to_string(),
            ));
        }

        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO profiles (user_id, timezone)
             VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET timezone = excluded.timezone",
            params![user_id, timezone],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProfileRepository {
    timezones: Mutex<HashMap<String, String>>,
}

impl ProfileRepository for InMemoryProfileRepository {
    fn timezone(&self, user_id: &str) -> Result<Option<String>, EngineError> {
        let timezones = self.timezones.lock().map_err(|error| {
            EngineError::InvalidConfig(format!("profile lock poisoned: {error}"))
        })?;
        Ok(timezones.get(user_id).cloned())
    }

    fn save_timezone(&self, user_id: &str, timezone: &str) -> Result<(), EngineError> {
        let mut timezones = self.timezones.lock().map_err(|error| {
            EngineError::InvalidConfig(format!("profile lock poisoned: {error}"))
        })?;
        timezones.insert(user_id.to_string(), timezone.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "dayroll-profile-repo-tests-{}-{}.sqlite",
                std::process::id(),
                sequence
            ));
            initialize_database(&path).expect("initialize temp database");
            Self { path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    #[test]
    fn sqlite_profile_save_and_load_timezone() {
        let db = TempDatabase::new();
        let repository = SqliteProfileRepository::new(&db.path);

        assert_eq!(repository.timezone("usr-1").expect("load missing"), None);

        repository
            .save_timezone("usr-1", "Asia/Kolkata")
            .expect("save timezone");
        assert_eq!(
            repository.timezone("usr-1").expect("load timezone"),
            Some("Asia/Kolkata".to_string())
        );

        repository
            .save_timezone("usr-1", "Europe/Berlin")
            .expect("overwrite timezone");
        assert_eq!(
            repository.timezone("usr-1").expect("reload timezone"),
            Some("Europe/Berlin".to_string())
        );
    }

    #[test]
    fn in_memory_profile_save_and_load_timezone() {
        let repository = InMemoryProfileRepository::default();
        assert_eq!(repository.timezone("usr-1").expect("load missing"), None);

        repository
            .save_timezone("usr-1", "Asia/Kolkata")
            .expect("save timezone");
        assert_eq!(
            repository.timezone("usr-1").expect("load timezone"),
            Some("Asia/Kolkata".to_string())
        );
    }

    #[test]
    fn sqlite_profile_rejects_blank_timezone() {
        let db = TempDatabase::new();
        let repository = SqliteProfileRepository::new(&db.path);
        assert!(repository.save_timezone("usr-1", "   ").is_err());
    }
}
