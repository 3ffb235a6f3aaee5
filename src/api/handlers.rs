use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ValidationError};
use super::AppState;
use crate::discord::Delivery;
use crate::feed::{candidate_link, select_latest, FeedItem};
use crate::relay::CheckOutcome;
use crate::storage::{NewSubscription, Subscription, SubscriptionChanges, MIN_INTERVAL_MS};
use crate::util::{is_discord_id, validate_url};

// ============================================================================
// Request / Response Bodies
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFeedRequest {
    pub url: String,
    pub channel_id: String,
    pub interval_ms: Option<i64>,
}

/// Identifies one subscription; `channelId` is required when the feed is
/// relayed into several channels.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSelector {
    pub url: String,
    pub channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeedRequest {
    pub url: String,
    pub channel_id: Option<String>,
    pub interval_ms: Option<i64>,
    pub new_url: Option<String>,
    pub new_channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestParseRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendLatestRequest {
    pub url: String,
    pub channel_id: Option<String>,
    /// Skip the date gate; an already delivered link is still refused
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualPostRequest {
    pub channel_id: String,
    pub title: String,
    pub link: Option<String>,
}

/// Result of a dry-run parse.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseReport {
    pub title: Option<String>,
    pub item_count: usize,
    /// The item a check would consider
    pub latest: Option<FeedItem>,
    /// The link a check would deliver for `latest`, if usable
    pub latest_link: Option<String>,
}

// ============================================================================
// Validation
// ============================================================================

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ValidationError::Body(rejection.body_text()).into())
}

fn feed_url(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    validate_url(raw).map_err(|source| ValidationError::Url { field, source })?;
    Ok(raw.trim().to_string())
}

fn channel_id(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let id = raw.trim();
    if !is_discord_id(id) {
        return Err(ValidationError::DiscordId(field));
    }
    Ok(id.to_string())
}

fn optional_channel_id(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<String>, ValidationError> {
    raw.map(|id| channel_id(field, &id)).transpose()
}

fn interval(ms: i64) -> Result<i64, ValidationError> {
    if ms < MIN_INTERVAL_MS {
        return Err(ValidationError::IntervalTooShort(ms));
    }
    Ok(ms)
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /api/feeds`: fetches the feed once, then stores the subscription.
pub async fn add_feed(
    State(state): State<AppState>,
    payload: Result<Json<AddFeedRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    let req = body(payload)?;
    let url = feed_url("url", &req.url)?;
    let target = channel_id("channelId", &req.channel_id)?;
    let interval_ms = interval(req.interval_ms.unwrap_or(state.default_interval_ms))?;

    let feed = state.relay.fetch(&url).await?;

    let created = state
        .relay
        .db()
        .create(&NewSubscription {
            url,
            target,
            interval_ms,
            title: feed.title,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/feeds[?channelId=]`
pub async fn list_feeds(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    let db = state.relay.db();
    let subs = match optional_channel_id("channelId", query.channel_id)? {
        Some(target) => db.find_by_target(&target).await?,
        None => db.find_all().await?,
    };
    Ok(Json(subs))
}

/// `PATCH /api/feeds`: interval, target and URL changes in one call.
pub async fn update_feed(
    State(state): State<AppState>,
    payload: Result<Json<UpdateFeedRequest>, JsonRejection>,
) -> Result<Json<Subscription>, ApiError> {
    let req = body(payload)?;
    let url = feed_url("url", &req.url)?;
    let selector = optional_channel_id("channelId", req.channel_id)?;

    let changes = SubscriptionChanges {
        interval_ms: req.interval_ms.map(interval).transpose()?,
        target: optional_channel_id("newChannelId", req.new_channel_id)?,
        url: req
            .new_url
            .map(|new_url| feed_url("newUrl", &new_url))
            .transpose()?,
    };
    if changes.is_empty() {
        return Err(ValidationError::NoChanges.into());
    }

    let db = state.relay.db();
    let updated = match changes {
        SubscriptionChanges {
            interval_ms: Some(interval_ms),
            target: None,
            url: None,
        } => db.update_interval(&url, selector.as_deref(), interval_ms).await?,
        changes => {
            let existing = db.find_one(&url, selector.as_deref()).await?;
            let updated = db.update_subscription(existing.id, &changes).await?;

            if updated.target != existing.target {
                let cache = state.relay.gateway().cache();
                cache.invalidate(&existing.target);
                cache.invalidate(&updated.target);
            }
            updated
        }
    };

    tracing::info!(
        id = updated.id,
        feed = %updated.url,
        channel = %updated.target,
        interval_ms = updated.interval_ms,
        "Subscription updated"
    );
    Ok(Json(updated))
}

/// `POST /api/feeds/toggle`
pub async fn toggle_feed(
    State(state): State<AppState>,
    payload: Result<Json<FeedSelector>, JsonRejection>,
) -> Result<Json<Subscription>, ApiError> {
    let req = body(payload)?;
    let url = feed_url("url", &req.url)?;
    let target = optional_channel_id("channelId", req.channel_id)?;

    let toggled = state
        .relay
        .db()
        .toggle_active(&url, target.as_deref())
        .await?;

    tracing::info!(id = toggled.id, feed = %toggled.url, active = toggled.active, "Subscription toggled");
    Ok(Json(toggled))
}

/// `DELETE /api/feeds`
pub async fn delete_feed(
    State(state): State<AppState>,
    payload: Result<Json<FeedSelector>, JsonRejection>,
) -> Result<Json<Subscription>, ApiError> {
    let req = body(payload)?;
    let url = feed_url("url", &req.url)?;
    let target = optional_channel_id("channelId", req.channel_id)?;

    let deleted = state.relay.db().delete(&url, target.as_deref()).await?;
    state.relay.gateway().cache().invalidate(&deleted.target);
    Ok(Json(deleted))
}

/// `POST /api/test-parse`: fetch and summarize without storing anything.
pub async fn test_parse(
    State(state): State<AppState>,
    payload: Result<Json<TestParseRequest>, JsonRejection>,
) -> Result<Json<ParseReport>, ApiError> {
    let req = body(payload)?;
    let url = feed_url("url", &req.url)?;

    let feed = state.relay.fetch(&url).await?;
    let latest = select_latest(&feed.items).cloned();
    let latest_link = latest.as_ref().and_then(candidate_link);

    Ok(Json(ParseReport {
        title: feed.title,
        item_count: feed.items.len(),
        latest,
        latest_link,
    }))
}

/// `POST /api/send-latest`: runs one check immediately.
pub async fn send_latest(
    State(state): State<AppState>,
    payload: Result<Json<SendLatestRequest>, JsonRejection>,
) -> Result<Json<CheckOutcome>, ApiError> {
    let req = body(payload)?;
    let url = feed_url("url", &req.url)?;
    let target = optional_channel_id("channelId", req.channel_id)?;

    let sub = state.relay.db().find_one(&url, target.as_deref()).await?;
    let outcome = state.relay.check_subscription(&sub, req.force).await?;
    Ok(Json(outcome))
}

/// `POST /api/manual`: posts an arbitrary title/link, no feed involved.
pub async fn manual_post(
    State(state): State<AppState>,
    payload: Result<Json<ManualPostRequest>, JsonRejection>,
) -> Result<Json<Delivery>, ApiError> {
    let req = body(payload)?;
    let target = channel_id("channelId", &req.channel_id)?;

    let title = req.title.trim();
    if title.is_empty() {
        return Err(ValidationError::Empty("title").into());
    }

    let link = match req.link.as_deref().map(str::trim) {
        Some(link) if !link.is_empty() => Some(feed_url("link", link)?),
        _ => None,
    };

    let delivery = state
        .relay
        .post_manual(&target, title, link.as_deref())
        .await?;
    Ok(Json(delivery))
}
