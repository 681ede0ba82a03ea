use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel stored when an entry carries no usable image.
pub const NO_IMAGE: &str = "NONE";

/// Summaries are clipped to this many characters before storage.
pub const SUMMARY_MAX_CHARS: usize = 1000;

/// One normalized news item, as collected from a feed.
///
/// There is no identity beyond `url`; the same story appearing in several
/// feeds yields several records. The store only ever holds the latest run's
/// batch, so no dedup or history columns exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub title: String,
    pub summary: String,
    pub url: String,
    /// Image URL or [`NO_IMAGE`].
    pub image_url: String,
    /// Title of the feed this entry came from.
    pub source: String,
    /// Entry publish time; `updated` or collection time when absent.
    pub published_at: DateTime<Utc>,
    /// When this run collected the entry.
    pub created_at: DateTime<Utc>,
}
