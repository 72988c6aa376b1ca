use std::collections::HashSet;

use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::SavedSearchRow;
use crate::db::now_secs;
use crate::diff::baseline_key;
use crate::error::Result;
use crate::snapshot::SnapshotStore;
use crate::types::{Listing, SavedSearch, SearchOptions};

/// CRUD over saved searches and their baseline item sets. The baseline is the
/// result set captured when the search was created; it stands in for the
/// "previous" snapshot on the search's first poll.
#[derive(Clone)]
pub struct SavedSearchStore {
    pool: SqlitePool,
}

impl SavedSearchStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a saved search, capturing `baseline` as its initial item set.
    /// Returns the new search id.
    pub async fn create(
        &self,
        name: Option<&str>,
        options: &SearchOptions,
        baseline: &[Listing],
    ) -> Result<i64> {
        let options_json = serde_json::to_string(options)?;
        let result = sqlx::query(
            "INSERT INTO saved_searches (name, options, notifications_enabled, created_at)
             VALUES (?, ?, 1, ?)",
        )
        .bind(name)
        .bind(options_json)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        let captured = self.add_baseline_items(id, baseline).await?;
        info!(search_id = id, baseline_items = captured, "saved search created");
        Ok(id)
    }

    /// All saved searches, most recently created first.
    pub async fn all(&self) -> Result<Vec<SavedSearch>> {
        let rows = sqlx::query_as::<_, SavedSearchRow>(
            "SELECT id, name, options, notifications_enabled, created_at
             FROM saved_searches ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SavedSearchRow::into_saved_search).collect()
    }

    pub async fn get(&self, search_id: i64) -> Result<Option<SavedSearch>> {
        let row = sqlx::query_as::<_, SavedSearchRow>(
            "SELECT id, name, options, notifications_enabled, created_at
             FROM saved_searches WHERE id = ?",
        )
        .bind(search_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SavedSearchRow::into_saved_search).transpose()
    }

    pub async fn set_notifications_enabled(&self, search_id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE saved_searches SET notifications_enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(search_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes a saved search. Baseline and feed items go with it via
    /// ON DELETE CASCADE, and its snapshot directory is removed so no
    /// orphaned generations linger on disk.
    pub async fn delete(&self, search_id: i64, snapshots: &SnapshotStore) -> Result<()> {
        sqlx::query("DELETE FROM saved_searches WHERE id = ?")
            .bind(search_id)
            .execute(&self.pool)
            .await?;
        snapshots.remove(search_id).await?;
        info!(search_id, "saved search deleted");
        Ok(())
    }

    pub async fn baseline_items(&self, search_id: i64) -> Result<Vec<Listing>> {
        let listings = sqlx::query_as::<_, Listing>(
            "SELECT title, price_value, price_formatted, url, site, image_url
             FROM saved_search_items WHERE saved_search_id = ? ORDER BY id",
        )
        .bind(search_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(listings)
    }

    /// Appends listings to a search's baseline, skipping any whose normalized
    /// (title, price) identity is already present. Returns how many were
    /// actually inserted.
    pub async fn add_baseline_items(&self, search_id: i64, listings: &[Listing]) -> Result<u64> {
        let existing = self.baseline_items(search_id).await?;
        let mut seen: HashSet<(String, Option<i64>)> = existing
            .iter()
            .map(|l| baseline_key(&l.title, l.price_value))
            .collect();

        let now = now_secs();
        let mut added = 0;
        for listing in listings {
            if !seen.insert(baseline_key(&listing.title, listing.price_value)) {
                continue;
            }
            sqlx::query(
                "INSERT INTO saved_search_items
                 (saved_search_id, title, price_value, price_formatted, url, site, image_url, added_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(search_id)
            .bind(&listing.title)
            .bind(listing.price_value)
            .bind(&listing.price_formatted)
            .bind(&listing.url)
            .bind(&listing.site)
            .bind(&listing.image_url)
            .bind(now)
            .execute(&self.pool)
            .await?;
            added += 1;
        }
        Ok(added)
    }
}
