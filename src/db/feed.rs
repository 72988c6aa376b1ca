use std::collections::HashSet;

use sqlx::SqlitePool;
use tracing::debug;

use crate::config::{FEED_MAX_AGE_SECS, FEED_MAX_ITEMS_PER_SEARCH};
use crate::db::models::FeedItemRow;
use crate::db::now_secs;
use crate::diff::baseline_key;
use crate::error::Result;
use crate::types::{search_display_name, FeedGroup, FeedItem, Listing};

/// The "new items" feed. Holds listings the diff engine judged new, bounded
/// per search to the most recent `FEED_MAX_ITEMS_PER_SEARCH` and to
/// `FEED_MAX_AGE_SECS` of age. Both retention policies run opportunistically
/// on every read and write rather than on their own schedule.
#[derive(Clone)]
pub struct FeedStore {
    pool: SqlitePool,
}

impl FeedStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts the cycle's new listings for one search and returns how many
    /// were actually added.
    ///
    /// A second safety net runs here on top of the URL diff: a listing whose
    /// normalized (title, price) identity already exists in the search's
    /// baseline is silently skipped. This narrows the URL-churn false
    /// positives without suppressing genuine price-change re-listings.
    pub async fn append_new_items(&self, search_id: i64, listings: &[Listing]) -> Result<u64> {
        let now = now_secs();
        self.purge_expired(now).await?;

        if listings.is_empty() {
            return Ok(0);
        }

        let baseline: Vec<(String, Option<f64>)> = sqlx::query_as(
            "SELECT title, price_value FROM saved_search_items WHERE saved_search_id = ?",
        )
        .bind(search_id)
        .fetch_all(&self.pool)
        .await?;
        let baseline_keys: HashSet<(String, Option<i64>)> = baseline
            .iter()
            .map(|(title, price)| baseline_key(title, *price))
            .collect();

        let mut added = 0;
        for listing in listings {
            if baseline_keys.contains(&baseline_key(&listing.title, listing.price_value)) {
                debug!(search_id, url = %listing.url, "skipping listing already in baseline");
                continue;
            }
            sqlx::query(
                "INSERT INTO new_items
                 (saved_search_id, title, price_value, price_formatted, url, site, image_url, found_at)
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

        if added > 0 {
            self.enforce_count_cap(search_id).await?;
        }
        Ok(added)
    }

    /// Unviewed feed items grouped by owning search, most recent first.
    /// `limit`/`offset` paginate the flat feed before grouping; `site`
    /// filters to one marketplace.
    pub async fn get_new_items(
        &self,
        limit: i64,
        offset: i64,
        site: Option<&str>,
    ) -> Result<Vec<FeedGroup>> {
        self.purge_expired(now_secs()).await?;

        let mut sql = String::from(
            "SELECT f.id, f.saved_search_id, f.title, f.price_value, f.price_formatted,
                    f.url, f.site, f.image_url, f.found_at, f.is_viewed, s.name AS search_name
             FROM new_items f
             JOIN saved_searches s ON f.saved_search_id = s.id
             WHERE f.is_viewed = 0",
        );
        if site.is_some() {
            sql.push_str(" AND f.site = ?");
        }
        sql.push_str(" ORDER BY f.found_at DESC, f.id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, FeedItemRow>(&sql);
        if let Some(site) = site {
            query = query.bind(site);
        }
        let rows = query.bind(limit).bind(offset).fetch_all(&self.pool).await?;

        let mut groups: Vec<FeedGroup> = Vec::new();
        for row in rows {
            let search_id = row.saved_search_id;
            let search_name = search_display_name(search_id, row.search_name.as_deref());
            let item = FeedItem {
                id: row.id,
                saved_search_id: row.saved_search_id,
                listing: Listing {
                    title: row.title,
                    price_value: row.price_value,
                    price_formatted: row.price_formatted,
                    url: row.url,
                    site: row.site,
                    image_url: row.image_url,
                },
                found_at: row.found_at,
                is_viewed: row.is_viewed,
            };
            match groups.iter_mut().find(|g| g.search_id == search_id) {
                Some(group) => group.items.push(item),
                None => groups.push(FeedGroup { search_id, search_name, items: vec![item] }),
            }
        }
        Ok(groups)
    }

    /// Flips `is_viewed` for the given feed items. Driven by the GUI, never
    /// the poller.
    pub async fn mark_viewed(&self, item_ids: &[i64]) -> Result<u64> {
        if item_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; item_ids.len()].join(", ");
        let sql = format!("UPDATE new_items SET is_viewed = 1 WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in item_ids {
            query = query.bind(id);
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    pub async fn count_for_search(&self, search_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM new_items WHERE saved_search_id = ?")
                .bind(search_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn purge_expired(&self, now: i64) -> Result<()> {
        let removed = sqlx::query("DELETE FROM new_items WHERE found_at < ?")
            .bind(now - FEED_MAX_AGE_SECS)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed > 0 {
            debug!(removed, "purged expired feed items");
        }
        Ok(())
    }

    /// Keeps only the `FEED_MAX_ITEMS_PER_SEARCH` most recent items for one
    /// search, evicting the oldest by `found_at`.
    async fn enforce_count_cap(&self, search_id: i64) -> Result<()> {
        let removed = sqlx::query(
            "DELETE FROM new_items
             WHERE saved_search_id = ?1
               AND id NOT IN (
                   SELECT id FROM new_items WHERE saved_search_id = ?1
                   ORDER BY found_at DESC, id DESC LIMIT ?2)",
        )
        .bind(search_id)
        .bind(FEED_MAX_ITEMS_PER_SEARCH)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if removed > 0 {
            debug!(search_id, removed, "evicted oldest feed items over cap");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::searches::SavedSearchStore;
    use crate::db::test_pool;
    use crate::types::SearchOptions;

    fn listing(title: &str, price: f64, url: &str, site: &str) -> Listing {
        Listing {
            title: title.to_string(),
            price_value: Some(price),
            price_formatted: format!("¥{price}"),
            url: url.to_string(),
            site: site.to_string(),
            image_url: None,
        }
    }

    async fn make_search(pool: &SqlitePool, name: &str, baseline: &[Listing]) -> i64 {
        SavedSearchStore::new(pool.clone())
            .create(Some(name), &SearchOptions::default(), baseline)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn append_skips_listings_already_in_baseline() {
        let pool = test_pool().await;
        let baseline = vec![listing("Denim Jacket", 1500.0, "https://x/base", "yahoo")];
        let id = make_search(&pool, "s", &baseline).await;
        let feed = FeedStore::new(pool);

        // Same title+price under a fresh URL: the URL diff called it new, the
        // baseline check suppresses it. A different listing goes through.
        let added = feed
            .append_new_items(
                id,
                &[
                    listing("denim jacket", 1500.0, "https://x/relisted", "yahoo"),
                    listing("Other", 900.0, "https://x/2", "yahoo"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(feed.count_for_search(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn count_cap_keeps_most_recent_items() {
        let pool = test_pool().await;
        let id = make_search(&pool, "s", &[]).await;
        let feed = FeedStore::new(pool.clone());

        let batch: Vec<Listing> = (0..150)
            .map(|i| listing(&format!("item {i}"), i as f64, &format!("https://x/{i}"), "yahoo"))
            .collect();
        feed.append_new_items(id, &batch).await.unwrap();

        assert_eq!(
            feed.count_for_search(id).await.unwrap(),
            FEED_MAX_ITEMS_PER_SEARCH
        );

        // Same found_at for the whole batch, so recency falls back to insert
        // order: the first 50 inserted are the evicted ones.
        let urls: Vec<String> =
            sqlx::query_scalar("SELECT url FROM new_items WHERE saved_search_id = ?")
                .bind(id)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(!urls.contains(&"https://x/0".to_string()));
        assert!(urls.contains(&"https://x/149".to_string()));
    }

    #[tokio::test]
    async fn expired_items_are_purged_on_write_and_read() {
        let pool = test_pool().await;
        let id = make_search(&pool, "s", &[]).await;
        let feed = FeedStore::new(pool.clone());

        feed.append_new_items(id, &[listing("a", 1.0, "https://x/1", "yahoo")]).await.unwrap();
        sqlx::query("UPDATE new_items SET found_at = found_at - ?")
            .bind(FEED_MAX_AGE_SECS + 60)
            .execute(&pool)
            .await
            .unwrap();

        assert!(feed.get_new_items(50, 0, None).await.unwrap().is_empty());
        assert_eq!(feed.count_for_search(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn feed_groups_by_search_and_filters_by_site() {
        let pool = test_pool().await;
        let first = make_search(&pool, "First", &[]).await;
        let second = make_search(&pool, "Second", &[]).await;
        let feed = FeedStore::new(pool);

        feed.append_new_items(first, &[listing("a", 1.0, "https://x/1", "yahoo")]).await.unwrap();
        feed.append_new_items(
            second,
            &[
                listing("b", 2.0, "https://x/2", "rakuten"),
                listing("c", 3.0, "https://x/3", "yahoo"),
            ],
        )
        .await
        .unwrap();

        let groups = feed.get_new_items(50, 0, None).await.unwrap();
        assert_eq!(groups.len(), 2);
        let second_group = groups.iter().find(|g| g.search_id == second).unwrap();
        assert_eq!(second_group.search_name, "Second");
        assert_eq!(second_group.items.len(), 2);

        let yahoo_only = feed.get_new_items(50, 0, Some("yahoo")).await.unwrap();
        let total: usize = yahoo_only.iter().map(|g| g.items.len()).sum();
        assert_eq!(total, 2);
        assert!(yahoo_only
            .iter()
            .flat_map(|g| &g.items)
            .all(|i| i.listing.site == "yahoo"));
    }

    #[tokio::test]
    async fn unnamed_searches_group_under_the_id_fallback() {
        let pool = test_pool().await;
        let id = SavedSearchStore::new(pool.clone())
            .create(None, &SearchOptions::default(), &[])
            .await
            .unwrap();
        let feed = FeedStore::new(pool);

        feed.append_new_items(id, &[listing("a", 1.0, "https://x/1", "yahoo")]).await.unwrap();

        let groups = feed.get_new_items(50, 0, None).await.unwrap();
        assert_eq!(groups[0].search_name, format!("Search {id}"));
    }

    #[tokio::test]
    async fn viewed_items_leave_the_feed() {
        let pool = test_pool().await;
        let id = make_search(&pool, "s", &[]).await;
        let feed = FeedStore::new(pool);

        feed.append_new_items(
            id,
            &[
                listing("a", 1.0, "https://x/1", "yahoo"),
                listing("b", 2.0, "https://x/2", "yahoo"),
            ],
        )
        .await
        .unwrap();

        let groups = feed.get_new_items(50, 0, None).await.unwrap();
        let first_id = groups[0].items[0].id;
        assert_eq!(feed.mark_viewed(&[first_id]).await.unwrap(), 1);

        let groups = feed.get_new_items(50, 0, None).await.unwrap();
        assert_eq!(groups[0].items.len(), 1);
        assert_ne!(groups[0].items[0].id, first_id);
    }

    #[tokio::test]
    async fn pagination_applies_to_the_flat_feed() {
        let pool = test_pool().await;
        let id = make_search(&pool, "s", &[]).await;
        let feed = FeedStore::new(pool);

        let batch: Vec<Listing> = (0..5)
            .map(|i| listing(&format!("item {i}"), i as f64, &format!("https://x/{i}"), "yahoo"))
            .collect();
        feed.append_new_items(id, &batch).await.unwrap();

        let page = feed.get_new_items(2, 0, None).await.unwrap();
        assert_eq!(page[0].items.len(), 2);

        let next = feed.get_new_items(2, 2, None).await.unwrap();
        assert_eq!(next[0].items.len(), 2);
        assert_ne!(page[0].items[0].id, next[0].items[0].id);
    }
}
