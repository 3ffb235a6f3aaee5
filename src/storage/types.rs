use serde::Serialize;
use thiserror::Error;

/// Smallest polling interval a subscription may be configured with.
pub const MIN_INTERVAL_MS: i64 = 60_000;

// ============================================================================
// Error Types
// ============================================================================

/// Feed store errors with user-facing messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// No subscription matched the lookup
    #[error("Subscription not found")]
    NotFound,

    /// The (url, target) pair already exists
    #[error("Subscription for this feed and channel already exists")]
    Duplicate,

    /// A URL-only lookup matched subscriptions in several channels
    #[error("Feed is subscribed in {0} channels; specify a channel id")]
    Ambiguous(usize),

    /// A write was rejected by a store-level rule
    #[error("{0}")]
    Validation(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Maps unique-constraint violations to [`DatabaseError::Duplicate`].
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DatabaseError::Duplicate;
            }
        }
        DatabaseError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A tracked (feed URL, Discord channel) pair.
///
/// `last_checked_at` is deliberately absent: the polling cursor lives in the
/// scheduler's memory, so a restart makes every subscription due at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: i64,
    pub url: String,
    /// Destination Discord channel id
    #[serde(rename = "channelId")]
    pub target: String,
    pub interval_ms: i64,
    /// Link of the last delivered item; empty until the first delivery
    pub last_seen_link: String,
    /// Publish date (epoch millis) of the last delivered item, if it had one
    pub last_seen_timestamp: Option<i64>,
    pub active: bool,
    /// Feed-level title captured when the subscription was created
    pub title: Option<String>,
    /// Creation time in epoch seconds
    pub created_at: i64,
}

impl Subscription {
    pub fn last_seen(&self) -> LastSeen {
        LastSeen {
            link: self.last_seen_link.clone(),
            timestamp: self.last_seen_timestamp,
        }
    }
}

/// The novelty marker of a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastSeen {
    pub link: String,
    pub timestamp: Option<i64>,
}

/// Input for creating a subscription
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub url: String,
    pub target: String,
    pub interval_ms: i64,
    pub title: Option<String>,
}

/// Partial update of a subscription; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionChanges {
    pub interval_ms: Option<i64>,
    pub target: Option<String>,
    pub url: Option<String>,
}

impl SubscriptionChanges {
    pub fn is_empty(&self) -> bool {
        self.interval_ms.is_none() && self.target.is_none() && self.url.is_none()
    }
}

pub(crate) fn check_interval(interval_ms: i64) -> Result<(), DatabaseError> {
    if interval_ms < MIN_INTERVAL_MS {
        return Err(DatabaseError::Validation(format!(
            "Interval must be at least {} ms (got {})",
            MIN_INTERVAL_MS, interval_ms
        )));
    }
    Ok(())
}
