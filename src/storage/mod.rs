//! Feed store: SQLite-backed subscriptions.

mod schema;
mod subscriptions;
mod types;

pub use schema::Database;
pub use types::{
    DatabaseError, LastSeen, NewSubscription, Subscription, SubscriptionChanges, MIN_INTERVAL_MS,
};
