//! feedcord: relays new RSS/Atom articles into Discord channels.
//!
//! - [`storage`] - SQLite feed store
//! - [`feed`] - Fetching, parsing and new-item detection
//! - [`discord`] - Discord REST delivery (forum threads or messages)
//! - [`relay`] - One check of one subscription
//! - [`scheduler`] - Periodic due-selection and concurrent checks
//! - [`api`] - Management HTTP API
//! - [`config`] - TOML configuration with environment overrides

pub mod api;
pub mod config;
pub mod discord;
pub mod feed;
pub mod relay;
pub mod scheduler;
pub mod storage;
pub mod util;
