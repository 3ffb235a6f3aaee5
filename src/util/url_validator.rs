use thiserror::Error;
use url::Url;

/// Shortest Discord snowflake accepted as a channel id.
const MIN_DISCORD_ID_LEN: usize = 16;
/// Longest Discord snowflake accepted as a channel id.
const MAX_DISCORD_ID_LEN: usize = 21;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The input was empty or whitespace only.
    #[error("URL is empty")]
    Empty,
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL parsed but carries no host (e.g. `mailto:` or `file:///`).
    #[error("URL has no host")]
    MissingHost,
}

/// Validates URL syntax for feed sources and article links.
///
/// A URL is accepted when it parses and has both a non-empty scheme and a
/// non-empty host. No reachability or address-range policy is applied: feeds
/// are configured by an operator, and article links are only ever echoed
/// into chat messages.
///
/// # Examples
///
/// ```
/// use feedcord::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("").is_err());
/// assert!(validate_url("not a url").is_err());
/// assert!(validate_url("mailto:someone@example.com").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let trimmed = url_str.trim();
    if trimmed.is_empty() {
        return Err(UrlValidationError::Empty);
    }

    let url = Url::parse(trimmed)?;

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}

/// Re-validates an untrusted link taken from a feed document.
///
/// Returns the trimmed link when it is a well-formed URL, `None` otherwise.
/// The original spelling is kept (not `Url::to_string()`), so comparisons
/// against stored last-seen links stay byte-for-byte stable.
pub fn sanitize_link(link: Option<&str>) -> Option<String> {
    let link = link?.trim();
    validate_url(link).ok().map(|_| link.to_string())
}

/// Returns true if `id` looks like a Discord snowflake: 16 to 21 ASCII digits.
pub fn is_discord_id(id: &str) -> bool {
    (MIN_DISCORD_ID_LEN..=MAX_DISCORD_ID_LEN).contains(&id.len())
        && id.bytes().all(|b| b.is_ascii_digit())
}
