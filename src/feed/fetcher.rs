use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::{parse_feed, ParsedFeed};
use crate::util::validate_url;

/// Default upper bound on a whole fetch (request, body, parse)
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);
/// Default response body limit
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed document.
///
/// None of these are fatal to the caller: a failed fetch means "no update
/// this cycle" and leaves subscription state untouched.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The feed URL is not a syntactically valid absolute URL
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The fetch did not finish within the configured bound
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Document could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Tunables for a single fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_bytes: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_bytes: DEFAULT_MAX_FEED_SIZE,
        }
    }
}

/// Fetches and parses a remote feed document.
///
/// The whole operation runs under an independent `tokio::time::timeout`.
/// Whatever timeout the HTTP client itself is configured with, a stalled
/// server (slow headers, trickling body) ends in [`FetchError::Timeout`]
/// once `options.timeout` elapses.
///
/// # Errors
///
/// - [`FetchError::InvalidUrl`] - URL lacks a scheme or host
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::Timeout`] - Exceeded `options.timeout`
/// - [`FetchError::ResponseTooLarge`] - Body exceeded `options.max_bytes`
/// - [`FetchError::Parse`] - Not a feed document
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
) -> Result<ParsedFeed, FetchError> {
    let url = validate_url(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

    let feed = tokio::time::timeout(options.timeout, fetch_and_parse(client, url, options))
        .await
        .map_err(|_| FetchError::Timeout(options.timeout))??;

    tracing::debug!(
        title = feed.title.as_deref().unwrap_or(""),
        items = feed.items.len(),
        "Feed fetched"
    );
    Ok(feed)
}

async fn fetch_and_parse(
    client: &reqwest::Client,
    url: url::Url,
    options: &FetchOptions,
) -> Result<ParsedFeed, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, options.max_bytes).await?;
    parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Maximum redirect hops followed for one request
pub const MAX_REDIRECTS: usize = 5;

/// Redirect policy with a hop limit and loop detection.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {MAX_REDIRECTS})"));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// HTTP client shared by feed fetches and Discord calls.
///
/// `request_timeout` is the client-level bound; feed fetches add their own
/// [`FetchOptions::timeout`] on top.
pub fn build_http_client(request_timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(request_timeout)
        .user_agent(concat!("feedcord/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test Feed</title>
    <item><guid>1</guid><title>Test</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    async fn serve(template: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .insert_header("Content-Type", "application/rss+xml"),
        )
        .await;

        let feed = fetch_feed(
            &reqwest::Client::new(),
            &format!("{}/feed", server.uri()),
            &FetchOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(feed.title.as_deref(), Some("Test Feed"));
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].link.as_deref(), Some("https://example.com/1"));
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let server = serve(ResponseTemplate::new(404)).await;

        let err = fetch_feed(
            &reqwest::Client::new(),
            &format!("{}/feed", server.uri()),
            &FetchOptions::default(),
        )
        .await
        .unwrap_err();

        match err {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_times_out_on_slow_server() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .set_delay(Duration::from_secs(5)),
        )
        .await;

        let options = FetchOptions {
            timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let err = fetch_feed(
            &reqwest::Client::new(),
            &format!("{}/feed", server.uri()),
            &options,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::Timeout(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_malformed_parse_error() {
        let server = serve(ResponseTemplate::new(200).set_body_string("<not valid xml")).await;

        let err = fetch_feed(
            &reqwest::Client::new(),
            &format!("{}/feed", server.uri()),
            &FetchOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::Parse(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_body_limit() {
        let server = serve(ResponseTemplate::new(200).set_body_string(VALID_RSS)).await;

        let options = FetchOptions {
            max_bytes: 16,
            ..Default::default()
        };
        let err = fetch_feed(
            &reqwest::Client::new(),
            &format!("{}/feed", server.uri()),
            &options,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::ResponseTooLarge(16)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url_without_request() {
        let err = fetch_feed(
            &reqwest::Client::new(),
            "not a url",
            &FetchOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_client_follows_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old.xml"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("location", format!("{}/feed.xml", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&server)
            .await;

        let client = build_http_client(Duration::from_secs(5)).unwrap();
        let url = format!("{}/old.xml", server.uri());
        let feed = fetch_feed(&client, &url, &FetchOptions::default()).await.unwrap();
        assert!(!feed.items.is_empty());
    }

    #[tokio::test]
    async fn test_client_stops_redirect_loop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop.xml"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/loop.xml", server.uri()).as_str()),
            )
            .mount(&server)
            .await;

        let client = build_http_client(Duration::from_secs(5)).unwrap();
        let url = format!("{}/loop.xml", server.uri());
        let err = fetch_feed(&client, &url, &FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
