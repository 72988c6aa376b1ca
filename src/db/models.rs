//! Database row types used by sqlx runtime queries.

use crate::error::Result;
use crate::types::{SavedSearch, SearchOptions};

#[derive(Debug, sqlx::FromRow)]
pub struct SavedSearchRow {
    pub id: i64,
    pub name: Option<String>,
    /// JSON-encoded `SearchOptions`.
    pub options: String,
    pub notifications_enabled: bool,
    pub created_at: i64,
}

impl SavedSearchRow {
    pub fn into_saved_search(self) -> Result<SavedSearch> {
        let options: SearchOptions = serde_json::from_str(&self.options)?;
        Ok(SavedSearch {
            id: self.id,
            name: self.name,
            options,
            notifications_enabled: self.notifications_enabled,
            created_at: self.created_at,
        })
    }
}

/// Joined feed row: a `new_items` record plus its owning search's name.
#[derive(Debug, sqlx::FromRow)]
pub struct FeedItemRow {
    pub id: i64,
    pub saved_search_id: i64,
    pub title: String,
    pub price_value: Option<f64>,
    pub price_formatted: String,
    pub url: String,
    pub site: String,
    pub image_url: Option<String>,
    pub found_at: i64,
    pub is_viewed: bool,
    pub search_name: Option<String>,
}
