//! Utility functions for common operations.
//!
//! - **URL validation**: syntax checks for feed URLs and article links, plus
//!   Discord snowflake validation for channel ids
//! - **Text processing**: char-based clamping for Discord length limits and
//!   control-character stripping for untrusted titles
//!
//! # Examples
//!
//! ```
//! use feedcord::util::{clamp_chars, is_discord_id, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert!(is_discord_id("123456789012345678"));
//! assert_eq!(clamp_chars("Long article title", 4), "Long");
//! ```

mod text;
mod url_validator;

pub use text::{clamp_chars, strip_control_chars};
pub use url_validator::{is_discord_id, sanitize_link, validate_url, UrlValidationError};
