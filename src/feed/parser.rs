use feed_rs::parser;
use serde::Serialize;

use crate::util::strip_control_chars;

/// One entry of a fetched feed.
///
/// Every field comes from an untrusted document: `link` and `guid` are kept
/// verbatim and must be re-validated before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub title: String,
    pub link: Option<String>,
    pub guid: Option<String>,
    /// Epoch millis from the published (else updated) date, 0 when absent
    pub published_ms: i64,
}

/// A parsed feed document: feed-level title plus items in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub items: Vec<FeedItem>,
}

/// Parses RSS 0.9x/1.0/2.0, Atom or JSON Feed bytes.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let title = feed
        .title
        .map(|t| strip_control_chars(t.content.trim()).into_owned())
        .filter(|t| !t.is_empty());

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|href| !href.is_empty());
            let published_ms = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.timestamp_millis())
                .unwrap_or(0);
            let title = entry
                .title
                .map(|t| strip_control_chars(t.content.trim()).into_owned())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string());
            let guid = Some(entry.id.trim().to_string()).filter(|id| !id.is_empty());

            FeedItem {
                title,
                link,
                guid,
                published_ms,
            }
        })
        .collect();

    Ok(ParsedFeed { title, items })
}
