use std::future::Future;
use std::time::Duration;

use reqwest::Client;

use crate::error::{AppError, Result};

/// One item as it appears in the feed document, before any normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeed {
    pub title: Option<String>,
    pub items: Vec<RawItem>,
}

/// Anything that can turn a feed URL into its parsed document.
pub trait FeedSource: Send + Sync {
    fn fetch_feed(&self, url: &str) -> impl Future<Output = Result<RawFeed>> + Send;
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("rss-digest/0.1")
            .build()?;

        Ok(Self { client })
    }
}

impl FeedSource for FeedFetcher {
    async fn fetch_feed(&self, url: &str) -> Result<RawFeed> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

/// Parse an RSS 2.0 document, falling back to the formats feed-rs understands
/// (Atom, RSS 1.0, JSON Feed).
pub fn parse_feed(bytes: &[u8]) -> Result<RawFeed> {
    match rss::Channel::read_from(bytes) {
        Ok(channel) => Ok(from_rss_channel(&channel)),
        Err(rss_error) => match feed_rs::parser::parse(bytes) {
            Ok(feed) => Ok(from_feed_rs(feed)),
            Err(e) => {
                tracing::debug!("feed-rs fallback failed: {}", e);
                Err(AppError::FeedParse(rss_error.to_string()))
            }
        },
    }
}

fn from_rss_channel(channel: &rss::Channel) -> RawFeed {
    let title = Some(channel.title().to_string()).filter(|t| !t.trim().is_empty());
    let items = channel
        .items()
        .iter()
        .map(|item| RawItem {
            title: item.title().unwrap_or_default().to_string(),
            description: item.description().unwrap_or_default().to_string(),
            link: item.link().unwrap_or_default().to_string(),
            pub_date: item.pub_date().unwrap_or_default().to_string(),
        })
        .collect();

    RawFeed { title, items }
}

fn from_feed_rs(feed: feed_rs::model::Feed) -> RawFeed {
    let title = feed
        .title
        .map(|t| t.content)
        .filter(|t| !t.trim().is_empty());

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            // Try summary first, then fall back to content
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();

            RawItem {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                description,
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                pub_date: entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default(),
            }
        })
        .collect();

    RawFeed { title, items }
}
