use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};

use crate::db::Repository;
use crate::error::Result;
use crate::models::Article;

use super::cleaner::clean_text;
use super::dates::normalize_date;
use super::fetcher::{FeedSource, RawFeed};

const MAX_CONCURRENT_FETCHES: usize = 5;

/// Fans out over every active subscription and folds the results into one
/// deduplicated, recency-filtered article list.
pub struct Aggregator<F> {
    repository: Arc<Repository>,
    source: F,
    lookback: Duration,
}

impl<F: FeedSource> Aggregator<F> {
    pub fn new(repository: Arc<Repository>, source: F, lookback: Duration) -> Self {
        Self {
            repository,
            source,
            lookback,
        }
    }

    /// Fetch all feeds and merge them. A broken feed is logged and skipped;
    /// only failing to read the subscription list is an error.
    pub async fn collect(&self) -> Result<Vec<Article>> {
        let feeds = self.repository.list_feeds().await?;
        let now = Utc::now();

        // `buffered` keeps subscription order so "first occurrence wins" is stable
        let fetched: Vec<(String, RawFeed)> = stream::iter(feeds.into_iter().map(|url| self.fetch_one(url)))
            .buffered(MAX_CONCURRENT_FETCHES)
            .filter_map(|r| async { r })
            .collect()
            .await;

        let articles = merge_feed_items(fetched, now, self.lookback);
        tracing::info!("Aggregated {} articles", articles.len());
        Ok(articles)
    }

    async fn fetch_one(&self, url: String) -> Option<(String, RawFeed)> {
        match self.source.fetch_feed(&url).await {
            Ok(feed) => {
                tracing::debug!("Fetched {} items from {}", feed.items.len(), url);
                Some((url, feed))
            }
            Err(e) => {
                tracing::warn!("Failed to fetch feed {}: {}", url, e);
                None
            }
        }
    }
}

/// Merge parsed feeds (in subscription order) into articles.
///
/// Links are trimmed and deduplicated with the first occurrence winning, even
/// when that occurrence falls outside the window. Items older than
/// `now - lookback` are dropped; the boundary itself is kept. The result is
/// stably sorted newest first.
pub fn merge_feed_items(
    feeds: Vec<(String, RawFeed)>,
    now: DateTime<Utc>,
    lookback: Duration,
) -> Vec<Article> {
    let cutoff = now - lookback;
    let mut seen = HashSet::new();
    let mut articles = Vec::new();

    for (feed_url, feed) in feeds {
        let source = feed
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| feed_url.trim())
            .to_string();

        for item in feed.items {
            let link = item.link.trim();
            if link.is_empty() || !seen.insert(link.to_string()) {
                continue;
            }

            let published_at = normalize_date(&item.pub_date);
            if published_at < cutoff {
                continue;
            }

            articles.push(Article {
                title: clean_text(&item.title),
                content: clean_text(&item.description),
                source: source.clone(),
                url: link.to_string(),
                published_at,
                full_content: None,
                author: None,
                word_count: None,
            });
        }
    }

    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    articles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::error::AppError;
    use crate::feed::RawItem;

    fn item(title: &str, link: &str, published: DateTime<Utc>) -> RawItem {
        RawItem {
            title: title.to_string(),
            description: format!("<p>{title} &amp; more</p>"),
            link: link.to_string(),
            pub_date: published.to_rfc2822(),
        }
    }

    fn feed(title: Option<&str>, items: Vec<RawItem>) -> RawFeed {
        RawFeed {
            title: title.map(str::to_string),
            items,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn duplicate_urls_within_and_across_feeds_appear_once() {
        let now = fixed_now();
        let feeds = vec![
            (
                "https://a.test/rss".to_string(),
                feed(
                    Some("Feed A"),
                    vec![
                        item("A version", "https://news.test/story", now - Duration::hours(1)),
                        item("A again", " https://news.test/story ", now - Duration::hours(2)),
                    ],
                ),
            ),
            (
                "https://b.test/rss".to_string(),
                feed(
                    Some("Feed B"),
                    vec![
                        item("B version", "https://news.test/story", now),
                        item("B only", "https://news.test/other", now - Duration::hours(3)),
                    ],
                ),
            ),
        ];

        let articles = merge_feed_items(feeds, now, Duration::hours(72));
        assert_eq!(articles.len(), 2);

        let story: Vec<_> = articles
            .iter()
            .filter(|a| a.url == "https://news.test/story")
            .collect();
        assert_eq!(story.len(), 1);
        assert_eq!(story[0].title, "A version");
        assert_eq!(story[0].source, "Feed A");
    }

    #[test]
    fn lookback_window_is_inclusive_at_the_boundary() {
        let now = fixed_now();
        let lookback = Duration::hours(72);
        let feeds = vec![(
            "https://a.test/rss".to_string(),
            feed(
                Some("Feed A"),
                vec![
                    item("Too old", "https://news.test/old", now - lookback - Duration::seconds(1)),
                    item("Boundary", "https://news.test/edge", now - lookback),
                    item("Fresh", "https://news.test/fresh", now - Duration::hours(71)),
                ],
            ),
        )];

        let articles = merge_feed_items(feeds, now, lookback);
        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Fresh", "Boundary"]);
    }

    #[test]
    fn cleans_text_and_falls_back_to_feed_url_for_source() {
        let now = fixed_now();
        let feeds = vec![(
            "https://untitled.test/rss".to_string(),
            feed(
                Some("   "),
                vec![item("<b>Bold</b> title", "https://news.test/x", now)],
            ),
        )];

        let articles = merge_feed_items(feeds, now, Duration::hours(72));
        assert_eq!(articles[0].title, "Bold title");
        assert_eq!(articles[0].content, "Bold title & more");
        assert_eq!(articles[0].source, "https://untitled.test/rss");
    }

    #[test]
    fn sorts_newest_first_and_skips_empty_links() {
        let now = fixed_now();
        let feeds = vec![(
            "https://a.test/rss".to_string(),
            feed(
                Some("Feed A"),
                vec![
                    item("Older", "https://news.test/1", now - Duration::hours(5)),
                    item("No link", "  ", now),
                    item("Newer", "https://news.test/2", now - Duration::hours(1)),
                    item("Same time", "https://news.test/3", now - Duration::hours(1)),
                ],
            ),
        )];

        let articles = merge_feed_items(feeds, now, Duration::hours(72));
        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Newer", "Same time", "Older"]);
    }

    #[test]
    fn undated_items_count_as_current() {
        let now = Utc::now();
        let mut undated = item("Undated", "https://news.test/undated", now);
        undated.pub_date.clear();
        let feeds = vec![("https://a.test/rss".to_string(), feed(None, vec![undated]))];

        let articles = merge_feed_items(feeds, now, Duration::hours(72));
        assert_eq!(articles.len(), 1);
        assert!(articles[0].published_at >= now);
    }

    struct FakeSource {
        feeds: HashMap<String, RawFeed>,
    }

    impl FeedSource for FakeSource {
        async fn fetch_feed(&self, url: &str) -> Result<RawFeed> {
            self.feeds
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::FeedParse(format!("no feed at {url}")))
        }
    }

    #[tokio::test]
    async fn broken_feed_does_not_abort_aggregation() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(
            Repository::new(dir.path().join("agg.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        repository.add_feed("https://broken.test/rss").await.unwrap();
        repository.add_feed("https://good.test/rss").await.unwrap();
        repository.add_feed("https://dismissed.test/rss").await.unwrap();
        repository.remove_feed("https://dismissed.test/rss").await.unwrap();

        let now = Utc::now();
        let mut feeds = HashMap::new();
        feeds.insert(
            "https://good.test/rss".to_string(),
            feed(Some("Good"), vec![item("Works", "https://good.test/1", now)]),
        );
        feeds.insert(
            "https://dismissed.test/rss".to_string(),
            feed(Some("Gone"), vec![item("Hidden", "https://gone.test/1", now)]),
        );

        let aggregator = Aggregator::new(repository, FakeSource { feeds }, Duration::hours(72));
        let articles = aggregator.collect().await.unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Works");
        assert_eq!(articles[0].source, "Good");
    }
}
