use super::schema::Database;
use super::types::{
    check_interval, DatabaseError, LastSeen, NewSubscription, Subscription, SubscriptionChanges,
};

const SUBSCRIPTION_COLUMNS: &str = "id, url, target, interval_ms, last_seen_link, \
     last_seen_timestamp, active, title, created_at";

impl Database {
    // ========================================================================
    // Queries
    // ========================================================================

    /// All subscriptions, oldest first
    pub async fn find_all(&self) -> Result<Vec<Subscription>, DatabaseError> {
        let rows = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Subscriptions the scheduler should consider
    pub async fn find_all_active(&self) -> Result<Vec<Subscription>, DatabaseError> {
        let rows = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Subscriptions posting into one channel
    pub async fn find_by_target(&self, target: &str) -> Result<Vec<Subscription>, DatabaseError> {
        let rows = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE target = ? ORDER BY id"
        ))
        .bind(target)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Subscription, DatabaseError> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DatabaseError::NotFound)
    }

    /// Look up one subscription by feed URL, optionally qualified by target.
    ///
    /// Without a target the URL must identify exactly one subscription;
    /// a feed relayed into several channels yields [`DatabaseError::Ambiguous`].
    pub async fn find_one(
        &self,
        url: &str,
        target: Option<&str>,
    ) -> Result<Subscription, DatabaseError> {
        let mut rows = match target {
            Some(target) => {
                sqlx::query_as::<_, Subscription>(&format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE url = ? AND target = ?"
                ))
                .bind(url)
                .bind(target)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Subscription>(&format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE url = ? ORDER BY id"
                ))
                .bind(url)
                .fetch_all(&self.pool)
                .await?
            }
        };

        match rows.len() {
            0 => Err(DatabaseError::NotFound),
            1 => Ok(rows.remove(0)),
            n => Err(DatabaseError::Ambiguous(n)),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert a new subscription with an empty last-seen marker.
    pub async fn create(&self, new: &NewSubscription) -> Result<Subscription, DatabaseError> {
        check_interval(new.interval_ms)?;
        let now = chrono::Utc::now().timestamp();

        let created = sqlx::query_as::<_, Subscription>(&format!(
            "INSERT INTO subscriptions (url, target, interval_ms, title, created_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(&new.url)
        .bind(&new.target)
        .bind(new.interval_ms)
        .bind(&new.title)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_write)?;

        tracing::info!(
            id = created.id,
            feed = %created.url,
            channel = %created.target,
            interval_ms = created.interval_ms,
            "Subscription created"
        );
        Ok(created)
    }

    /// Change the polling interval; rejects values below one minute.
    pub async fn update_interval(
        &self,
        url: &str,
        target: Option<&str>,
        interval_ms: i64,
    ) -> Result<Subscription, DatabaseError> {
        check_interval(interval_ms)?;
        let existing = self.find_one(url, target).await?;
        self.update_subscription(
            existing.id,
            &SubscriptionChanges {
                interval_ms: Some(interval_ms),
                ..Default::default()
            },
        )
        .await
    }

    /// Apply a partial update (interval, target, url) to one subscription.
    ///
    /// The last-seen marker is left alone even when the URL changes; the
    /// novelty gate treats a foreign link as new, so the next check delivers
    /// the latest item of the new feed.
    pub async fn update_subscription(
        &self,
        id: i64,
        changes: &SubscriptionChanges,
    ) -> Result<Subscription, DatabaseError> {
        if let Some(interval_ms) = changes.interval_ms {
            check_interval(interval_ms)?;
        }

        sqlx::query_as::<_, Subscription>(&format!(
            "UPDATE subscriptions SET \
                 interval_ms = COALESCE(?, interval_ms), \
                 target = COALESCE(?, target), \
                 url = COALESCE(?, url) \
             WHERE id = ? RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(changes.interval_ms)
        .bind(&changes.target)
        .bind(&changes.url)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_write)?
        .ok_or(DatabaseError::NotFound)
    }

    /// Flip the active flag and return the updated subscription.
    pub async fn toggle_active(
        &self,
        url: &str,
        target: Option<&str>,
    ) -> Result<Subscription, DatabaseError> {
        let existing = self.find_one(url, target).await?;

        sqlx::query_as::<_, Subscription>(&format!(
            "UPDATE subscriptions SET active = NOT active WHERE id = ? \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(existing.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DatabaseError::NotFound)
    }

    /// Delete a subscription, returning the removed row.
    pub async fn delete(
        &self,
        url: &str,
        target: Option<&str>,
    ) -> Result<Subscription, DatabaseError> {
        let existing = self.find_one(url, target).await?;

        let deleted = sqlx::query_as::<_, Subscription>(&format!(
            "DELETE FROM subscriptions WHERE id = ? RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(existing.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DatabaseError::NotFound)?;

        tracing::info!(id = deleted.id, feed = %deleted.url, channel = %deleted.target, "Subscription deleted");
        Ok(deleted)
    }

    /// Atomically replace the last-seen marker if it still equals `expected`.
    ///
    /// Returns `false` when another check already moved the marker (or the
    /// subscription was deleted); the caller must not retry blindly.
    /// `IS` is used for the timestamp so NULL compares equal to NULL.
    pub async fn compare_and_update_last_seen(
        &self,
        id: i64,
        expected: &LastSeen,
        new: &LastSeen,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET last_seen_link = ?, last_seen_timestamp = ? \
             WHERE id = ? AND last_seen_link = ? AND last_seen_timestamp IS ?",
        )
        .bind(&new.link)
        .bind(new.timestamp)
        .bind(id)
        .bind(&expected.link)
        .bind(expected.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
