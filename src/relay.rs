//! One check of one subscription: fetch, detect, deliver, record.
//!
//! Shared by the poll scheduler and the `send-latest` API operation. State
//! moves only after Discord accepted the post, and only through the store's
//! compare-and-update, so two overlapping checks of the same subscription
//! never clobber each other's marker.

use serde::Serialize;
use thiserror::Error;

use crate::discord::{Delivery, DiscordError, Gateway};
use crate::feed::{
    detect, detect_forced, fetch_feed, marker_for, FetchError, FetchOptions, Novelty, ParsedFeed,
};
use crate::storage::{Database, DatabaseError, Subscription};

/// Why a check produced no result.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Feed fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DiscordError),
    #[error("Storing last-seen state failed: {0}")]
    Storage(#[from] DatabaseError),
}

/// What a completed check did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CheckOutcome {
    /// The feed had no items
    Empty,
    /// The latest item has no usable link
    NoLink { title: String },
    /// The latest item was delivered before
    AlreadySeen { title: String },
    /// Posted to Discord and recorded as the new marker
    Delivered {
        title: String,
        link: String,
        delivery: Delivery,
    },
    /// Posted, but another check moved the marker first; its state was kept
    StateRaced { link: String },
}

impl CheckOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, CheckOutcome::Delivered { .. })
    }
}

/// Everything a check needs, owned once and shared behind an `Arc`.
#[derive(Debug)]
pub struct Relay {
    db: Database,
    http: reqwest::Client,
    gateway: Gateway,
    fetch_options: FetchOptions,
}

impl Relay {
    pub fn new(
        db: Database,
        http: reqwest::Client,
        gateway: Gateway,
        fetch_options: FetchOptions,
    ) -> Self {
        Self {
            db,
            http,
            gateway,
            fetch_options,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Fetches and parses a feed with the relay's limits.
    pub async fn fetch(&self, url: &str) -> Result<ParsedFeed, FetchError> {
        fetch_feed(&self.http, url, &self.fetch_options).await
    }

    /// Runs one check of `sub` as it was read from the store.
    ///
    /// `force` skips the date gate (the link gate still applies). `sub` is
    /// the expected state for the compare-and-update; when it is stale the
    /// outcome is [`CheckOutcome::StateRaced`].
    pub async fn check_subscription(
        &self,
        sub: &Subscription,
        force: bool,
    ) -> Result<CheckOutcome, CheckError> {
        let feed = self.fetch(&sub.url).await?;
        let previous = sub.last_seen();

        let novelty = if force {
            detect_forced(&feed.items, &previous)
        } else {
            detect(&feed.items, &previous)
        };

        let (item, link) = match &novelty {
            Novelty::Empty => {
                tracing::debug!(feed = %sub.url, "Feed has no items");
                return Ok(CheckOutcome::Empty);
            }
            Novelty::NoLink(item) => {
                tracing::debug!(feed = %sub.url, title = %item.title, "Latest item has no usable link");
                return Ok(CheckOutcome::NoLink {
                    title: item.title.clone(),
                });
            }
            Novelty::AlreadySeen(item) => {
                return Ok(CheckOutcome::AlreadySeen {
                    title: item.title.clone(),
                });
            }
            Novelty::New { item, link } => (*item, link.clone()),
        };

        let delivery = self
            .gateway
            .post_article(&sub.target, &item.title, Some(link.as_str()))
            .await?;

        let next = marker_for(item, &link, &previous);
        let won = self
            .db
            .compare_and_update_last_seen(sub.id, &previous, &next)
            .await?;

        if !won {
            tracing::warn!(
                id = sub.id,
                feed = %sub.url,
                channel = %sub.target,
                link = %link,
                "Last-seen state changed during check, keeping the newer state"
            );
            return Ok(CheckOutcome::StateRaced { link });
        }

        tracing::info!(
            id = sub.id,
            feed = %sub.url,
            channel = %sub.target,
            link = %link,
            "Article delivered"
        );
        Ok(CheckOutcome::Delivered {
            title: item.title.clone(),
            link,
            delivery,
        })
    }

    /// Posts an arbitrary article, bypassing feeds and state.
    pub async fn post_manual(
        &self,
        channel_id: &str,
        title: &str,
        link: Option<&str>,
    ) -> Result<Delivery, DiscordError> {
        self.gateway.post_article(channel_id, title, link).await
    }
}
