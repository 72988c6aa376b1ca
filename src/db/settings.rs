use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::now_secs;
use crate::error::Result;

/// Arbitrary key-value app settings, shared with the GUI. Values are stored
/// as strings; the JSON helpers cover structured values.
#[derive(Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM user_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, &serde_json::to_string(value)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn set_get_and_overwrite() {
        let store = SettingsStore::new(test_pool().await);

        assert!(store.get("poll_interval_secs").await.unwrap().is_none());

        store.set("poll_interval_secs", "600").await.unwrap();
        assert_eq!(store.get("poll_interval_secs").await.unwrap().as_deref(), Some("600"));

        store.set("poll_interval_secs", "1800").await.unwrap();
        assert_eq!(store.get("poll_interval_secs").await.unwrap().as_deref(), Some("1800"));
    }

    #[tokio::test]
    async fn json_values_roundtrip() {
        let store = SettingsStore::new(test_pool().await);

        store.set_json("enabled_sites", &vec!["yahoo", "mercari"]).await.unwrap();
        let sites: Option<Vec<String>> = store.get_json("enabled_sites").await.unwrap();
        assert_eq!(sites.unwrap(), vec!["yahoo", "mercari"]);
    }
}
