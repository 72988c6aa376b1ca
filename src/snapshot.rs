use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;
use crate::types::Listing;

/// Snapshot databases hold one scrape's result set and nothing else.
const LISTINGS_SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    price_value REAL,
    price_formatted TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL,
    site TEXT NOT NULL,
    image_url TEXT
)";

/// Two-generation snapshot store: per saved search, a `current.db` (this
/// cycle's scrape) and a `previous.db` (last cycle's) under their own
/// directory. Each generation is a single-file SQLite database so promotion
/// is a plain filesystem rename. Journal mode DELETE keeps a snapshot to
/// exactly one file on disk.
///
/// Only one poll cycle runs at a time, so snapshot files never see concurrent
/// access and promotion needs no locking.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn search_dir(&self, search_id: i64) -> PathBuf {
        self.root.join(format!("search_{search_id}"))
    }

    pub fn current_path(&self, search_id: i64) -> PathBuf {
        self.search_dir(search_id).join("current.db")
    }

    pub fn previous_path(&self, search_id: i64) -> PathBuf {
        self.search_dir(search_id).join("previous.db")
    }

    pub fn has_previous(&self, search_id: i64) -> bool {
        self.previous_path(search_id).exists()
    }

    /// Creates a fresh, empty `current` snapshot for the scraper to populate,
    /// discarding any stale one from an earlier aborted cycle. Returns the
    /// path handed to the scraper as its target.
    pub async fn prepare_current(&self, search_id: i64) -> Result<PathBuf> {
        tokio::fs::create_dir_all(self.search_dir(search_id)).await?;

        let path = self.current_path(search_id);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }

        let pool = open_snapshot(&path, true).await?;
        sqlx::query(LISTINGS_SCHEMA).execute(&pool).await?;
        pool.close().await;

        debug!(search_id, path = %path.display(), "prepared current snapshot");
        Ok(path)
    }

    /// Replaces the `current` snapshot with the given listings. The normal
    /// path has the scraper child populate `current` itself; this is for
    /// in-process producers (and test doubles).
    pub async fn write_current(&self, search_id: i64, listings: &[Listing]) -> Result<()> {
        let path = self.prepare_current(search_id).await?;

        let pool = open_snapshot(&path, false).await?;
        for listing in listings {
            sqlx::query(
                "INSERT INTO listings (title, price_value, price_formatted, url, site, image_url)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&listing.title)
            .bind(listing.price_value)
            .bind(&listing.price_formatted)
            .bind(&listing.url)
            .bind(&listing.site)
            .bind(&listing.image_url)
            .execute(&pool)
            .await?;
        }
        pool.close().await;
        Ok(())
    }

    pub async fn read_current(&self, search_id: i64) -> Result<Vec<Listing>> {
        read_snapshot(&self.current_path(search_id)).await
    }

    pub async fn read_previous(&self, search_id: i64) -> Result<Vec<Listing>> {
        read_snapshot(&self.previous_path(search_id)).await
    }

    /// Promotes `current` to `previous`: the old `previous` is deleted and
    /// `current` renamed into its place. Called only after the cycle's diff
    /// and feed insert succeeded — a crash before this point leaves the old
    /// `previous` intact, so the next cycle re-diffs against the same
    /// baseline (at worst re-detecting items, never losing them).
    pub async fn promote_current_to_previous(&self, search_id: i64) -> Result<()> {
        let current = self.current_path(search_id);
        let previous = self.previous_path(search_id);

        if previous.exists() {
            tokio::fs::remove_file(&previous).await?;
        }
        tokio::fs::rename(&current, &previous).await?;

        debug!(search_id, "promoted current snapshot to previous");
        Ok(())
    }

    /// Removes all snapshot state for a search. Called when the search is
    /// deleted.
    pub async fn remove(&self, search_id: i64) -> Result<()> {
        let dir = self.search_dir(search_id);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }
}

async fn open_snapshot(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Reads every listing out of one physical snapshot database, in insertion
/// order.
async fn read_snapshot(path: &Path) -> Result<Vec<Listing>> {
    let pool = open_snapshot(path, false).await?;
    let listings = sqlx::query_as::<_, Listing>(
        "SELECT title, price_value, price_formatted, url, site, image_url
         FROM listings ORDER BY id",
    )
    .fetch_all(&pool)
    .await?;
    pool.close().await;
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(title: &str, url: &str) -> Listing {
        Listing {
            title: title.to_string(),
            price_value: Some(500.0),
            price_formatted: "¥500".to_string(),
            url: url.to_string(),
            site: "rakuten".to_string(),
            image_url: Some("https://img/1.jpg".to_string()),
        }
    }

    #[tokio::test]
    async fn write_and_read_current_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let listings = vec![listing("a", "https://x/1"), listing("b", "https://x/2")];
        store.write_current(1, &listings).await.unwrap();

        let read_back = store.read_current(1).await.unwrap();
        assert_eq!(read_back, listings);
    }

    #[tokio::test]
    async fn write_current_replaces_prior_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store
            .write_current(1, &[listing("a", "https://x/1"), listing("b", "https://x/2")])
            .await
            .unwrap();
        store.write_current(1, &[listing("c", "https://x/3")]).await.unwrap();

        let read_back = store.read_current(1).await.unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].url, "https://x/3");
    }

    #[tokio::test]
    async fn promote_moves_current_into_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.write_current(2, &[listing("a", "https://x/1")]).await.unwrap();
        assert!(!store.has_previous(2));

        store.promote_current_to_previous(2).await.unwrap();
        assert!(store.has_previous(2));
        assert!(!store.current_path(2).exists());

        let previous = store.read_previous(2).await.unwrap();
        assert_eq!(previous[0].url, "https://x/1");
    }

    #[tokio::test]
    async fn promote_discards_old_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.write_current(3, &[listing("old", "https://x/old")]).await.unwrap();
        store.promote_current_to_previous(3).await.unwrap();

        store.write_current(3, &[listing("new", "https://x/new")]).await.unwrap();
        store.promote_current_to_previous(3).await.unwrap();

        let previous = store.read_previous(3).await.unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].url, "https://x/new");
    }

    #[tokio::test]
    async fn snapshots_are_isolated_per_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.write_current(1, &[listing("a", "https://x/1")]).await.unwrap();
        store.write_current(2, &[listing("b", "https://x/2")]).await.unwrap();

        assert_eq!(store.read_current(1).await.unwrap()[0].url, "https://x/1");
        assert_eq!(store.read_current(2).await.unwrap()[0].url, "https://x/2");
    }

    #[tokio::test]
    async fn reading_missing_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.read_previous(9).await.is_err());
    }

    #[tokio::test]
    async fn remove_clears_all_generations() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.write_current(4, &[listing("a", "https://x/1")]).await.unwrap();
        store.promote_current_to_previous(4).await.unwrap();
        store.write_current(4, &[listing("b", "https://x/2")]).await.unwrap();

        store.remove(4).await.unwrap();
        assert!(!store.has_previous(4));
        assert!(!store.current_path(4).exists());
    }
}
