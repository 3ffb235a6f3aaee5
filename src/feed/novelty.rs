//! Decides whether a fetched feed carries an item not yet delivered.
//!
//! Two gates combine: the candidate's link must differ from the stored
//! last-seen link, and when a last-seen timestamp is recorded the candidate
//! must be strictly newer. Links alone break on feeds that rewrite tracking
//! parameters; dates alone break on feeds with missing or unreliable dates.

use crate::feed::parser::FeedItem;
use crate::storage::LastSeen;
use crate::util::sanitize_link;

/// Result of evaluating a feed against a subscription's last-seen marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Novelty<'a> {
    /// The feed has no items
    Empty,
    /// The latest item has no usable link; it is never delivered
    NoLink(&'a FeedItem),
    /// The latest item was already delivered (link or date gate)
    AlreadySeen(&'a FeedItem),
    /// The latest item is new and should be delivered
    New { item: &'a FeedItem, link: String },
}

impl Novelty<'_> {
    /// Marker to store after `New` was delivered successfully.
    ///
    /// The timestamp is only replaced when the item carries a date, so a
    /// dateless item keeps the previous date gate in place.
    pub fn next_last_seen(&self, previous: &LastSeen) -> Option<LastSeen> {
        match self {
            Novelty::New { item, link } => Some(marker_for(item, link, previous)),
            _ => None,
        }
    }
}

/// Marker recording `item` (reached through `link`) as delivered.
pub fn marker_for(item: &FeedItem, link: &str, previous: &LastSeen) -> LastSeen {
    LastSeen {
        link: link.to_string(),
        timestamp: if item.published_ms != 0 {
            Some(item.published_ms)
        } else {
            previous.timestamp
        },
    }
}

/// Picks the item a check should consider.
///
/// When any item carries a date, the newest dated item wins (ties keep
/// document order). A feed without any dates is assumed to be ordered
/// newest-first, so its first item wins.
pub fn select_latest(items: &[FeedItem]) -> Option<&FeedItem> {
    if items.iter().any(|item| item.published_ms != 0) {
        // max_by_key returns the last maximum; reverse so the earliest wins ties
        items.iter().rev().max_by_key(|item| item.published_ms)
    } else {
        items.first()
    }
}

/// The candidate's link: `link` when valid, else `guid` when it is a URL.
pub fn candidate_link(item: &FeedItem) -> Option<String> {
    sanitize_link(item.link.as_deref()).or_else(|| sanitize_link(item.guid.as_deref()))
}

/// Evaluates the latest item of `items` against `last_seen`.
pub fn detect<'a>(items: &'a [FeedItem], last_seen: &LastSeen) -> Novelty<'a> {
    let Some(item) = select_latest(items) else {
        return Novelty::Empty;
    };

    let Some(link) = candidate_link(item) else {
        return Novelty::NoLink(item);
    };

    if link == last_seen.link {
        return Novelty::AlreadySeen(item);
    }

    if let Some(seen_ts) = last_seen.timestamp.filter(|ts| *ts > 0) {
        if item.published_ms <= seen_ts {
            return Novelty::AlreadySeen(item);
        }
    }

    Novelty::New { item, link }
}

/// Like [`detect`] but without the date gate.
///
/// Used for operator-triggered re-sends: an item whose link was already
/// delivered is still refused.
pub fn detect_forced<'a>(items: &'a [FeedItem], last_seen: &LastSeen) -> Novelty<'a> {
    let Some(item) = select_latest(items) else {
        return Novelty::Empty;
    };

    match candidate_link(item) {
        None => Novelty::NoLink(item),
        Some(link) if link == last_seen.link => Novelty::AlreadySeen(item),
        Some(link) => Novelty::New { item, link },
    }
}
