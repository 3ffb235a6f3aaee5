use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::DiscordError;

/// Production REST endpoint
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Identifying header Discord requires on every bot request
const BOT_USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/feedcord/feedcord, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Retries after the first attempt when Discord answers 429
pub const MAX_RATE_LIMIT_RETRIES: u32 = 2;

/// Wait used when a 429 carries no usable retry delay
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on a server-specified retry delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Minimal Discord REST transport.
///
/// Every request carries the bot token and the identifying user agent.
/// A 429 response is retried after the server-specified delay, up to
/// [`MAX_RATE_LIMIT_RETRIES`] times; any other non-2xx status fails at once
/// with [`DiscordError::Api`].
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl DiscordClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: SecretString) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            token,
        }
    }

    /// `GET {base}{path}` decoded as JSON
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DiscordError> {
        let body = self.request(Method::GET, path, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// `POST {base}{path}` with a JSON payload, response decoded as JSON
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
    ) -> Result<T, DiscordError> {
        let bytes = serde_json::to_vec(payload)?;
        let body = self.request(Method::POST, path, Some(bytes)).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Sends one logical request, retrying on rate limits. Returns the body text.
    async fn request(
        &self,
        method: Method,
        path: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<String, DiscordError> {
        let url = format!("{}{}", self.base_url, path);
        let mut retry_count = 0;

        loop {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(
                    AUTHORIZATION,
                    format!("Bot {}", self.token.expose_secret()),
                )
                .header(USER_AGENT, BOT_USER_AGENT);

            if let Some(bytes) = &payload {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(bytes.clone());
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && retry_count < MAX_RATE_LIMIT_RETRIES {
                let headers = response.headers().clone();
                let body = response.text().await.unwrap_or_default();
                let delay = retry_delay(&headers, &body);

                tracing::warn!(
                    method = %method,
                    path = %path,
                    retry = retry_count + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Discord rate limited, backing off"
                );

                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            let body = response.text().await?;

            if !status.is_success() {
                return Err(DiscordError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            return Ok(body);
        }
    }
}

/// Server-specified wait for a 429 response.
///
/// Discord puts `retry_after` (seconds, fractional) in the JSON body and
/// mirrors it in the `Retry-After` header. The body wins; missing, negative,
/// unparsable or unrepresentable values fall back to [`DEFAULT_RETRY_DELAY`].
/// The result never exceeds [`MAX_RETRY_DELAY`].
pub fn retry_delay(headers: &HeaderMap, body: &str) -> Duration {
    #[derive(serde::Deserialize)]
    struct RateLimitBody {
        retry_after: Option<f64>,
    }

    let from_body = serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .and_then(|b| b.retry_after);

    let from_header = || {
        headers
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<f64>()
            .ok()
    };

    from_body
        .or_else(from_header)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(|delay| delay.min(MAX_RETRY_DELAY))
        .unwrap_or(DEFAULT_RETRY_DELAY)
}
