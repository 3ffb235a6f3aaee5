//! Feed retrieval and new-item detection.
//!
//! - [`parser`] - Converts RSS/Atom/JSON Feed bytes into [`FeedItem`]s using `feed-rs`
//! - [`fetcher`] - HTTP retrieval with a hard timeout and a body size limit
//! - [`novelty`] - Picks the latest item and applies the link/date gate
//!
//! # Example
//!
//! ```ignore
//! use feedcord::feed::{detect, fetch_feed, FetchOptions, Novelty};
//!
//! let feed = fetch_feed(&client, &subscription.url, &FetchOptions::default()).await?;
//! if let Novelty::New { item, link } = detect(&feed.items, &subscription.last_seen()) {
//!     // deliver, then store the new marker
//! }
//! ```

mod fetcher;
mod novelty;
mod parser;

pub use fetcher::{
    build_http_client, fetch_feed, FetchError, FetchOptions, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_MAX_FEED_SIZE, MAX_REDIRECTS,
};
pub use novelty::{
    candidate_link, detect, detect_forced, marker_for, select_latest, Novelty,
};
pub use parser::{parse_feed, FeedItem, ParsedFeed};
