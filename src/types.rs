use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Canonical listing shape produced by every scraper and consumed throughout.
///
/// `url` is unique within one scrape of one site but NOT stable over time —
/// sellers re-list and sites restructure URLs. The diff engine still keys on
/// `url` alone; see `diff.rs` for the rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Listing {
    pub title: String,
    /// Numeric price; None when the scraper could not parse one.
    pub price_value: Option<f64>,
    /// Display string, currency-prefixed (e.g. "¥12,800").
    pub price_formatted: String,
    pub url: String,
    /// Originating marketplace identifier ("yahoo", "rakuten", "mercari", ...).
    pub site: String,
    pub image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Saved search
// ---------------------------------------------------------------------------

/// The filter a saved search hands to the scraper on every poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub keywords: Vec<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub sites: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SavedSearch {
    pub id: i64,
    pub name: Option<String>,
    pub options: SearchOptions,
    /// Gates whether the poller picks this search up each cycle.
    pub notifications_enabled: bool,
    pub created_at: i64,
}

impl SavedSearch {
    pub fn display_name(&self) -> String {
        search_display_name(self.id, self.name.as_deref())
    }
}

/// Label for a search wherever one is shown: the stored name when present
/// and non-empty, otherwise "Search {id}".
pub fn search_display_name(id: i64, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("Search {id}"),
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub id: i64,
    pub saved_search_id: i64,
    pub listing: Listing,
    pub found_at: i64,
    pub is_viewed: bool,
}

/// One search's slice of the feed, as returned to the GUI.
#[derive(Debug, Clone)]
pub struct FeedGroup {
    pub search_id: i64,
    pub search_name: String,
    pub items: Vec<FeedItem>,
}

// ---------------------------------------------------------------------------
// Poll cycle results
// ---------------------------------------------------------------------------

/// Per-search outcome accumulated over one poll cycle; the notification
/// payload is the list of these for searches that actually added items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSearchResult {
    pub search_name: String,
    pub items_added: i64,
    /// Feed item count for this search after the cycle's insert.
    pub current_total: i64,
}
