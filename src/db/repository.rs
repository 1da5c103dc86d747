use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Article, ExtractedContent, FeedSubscription};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str =
    "title, url, content, source, published_at, full_content, author, word_count";

/// SQLite-backed store shared by every task. All statements run on the
/// connection's single background thread, which serializes writes.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Article operations

    /// Insert or update an article keyed by URL.
    ///
    /// A stored `published_at` is never overwritten, and enrichment fields are
    /// only replaced when new extracted content is supplied.
    pub async fn upsert_article(
        &self,
        article: &Article,
        extracted: Option<&ExtractedContent>,
    ) -> Result<()> {
        let title = article.title.trim().to_string();
        let url = article.url.trim().to_string();
        let content = article.content.trim().to_string();
        let source = article.source.trim().to_string();
        let published_at = format_timestamp(&article.published_at);
        let full_content = extracted.and_then(|e| non_empty(&e.content));
        let author = extracted.and_then(|e| non_empty(&e.author));
        let word_count = extracted
            .map(|e| e.word_count as i64)
            .filter(|count| *count > 0);

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO articles (title, url, content, source, published_at, full_content, author, word_count)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                       ON CONFLICT(url) DO UPDATE SET
                           title = excluded.title,
                           content = excluded.content,
                           source = excluded.source,
                           full_content = COALESCE(excluded.full_content, articles.full_content),
                           author = COALESCE(excluded.author, articles.author),
                           word_count = COALESCE(excluded.word_count, articles.word_count),
                           updated_at = datetime('now')"#,
                    params![
                        title,
                        url,
                        content,
                        source,
                        published_at,
                        full_content,
                        author,
                        word_count,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Articles published within the last `hours`, newest first.
    pub async fn get_articles_since(&self, hours: u32) -> Result<Vec<Article>> {
        let cutoff = format_timestamp(&(Utc::now() - chrono::Duration::hours(i64::from(hours))));
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE published_at >= ?1
                     ORDER BY published_at DESC, id ASC"
                ))?;
                let articles = stmt
                    .query_map(params![cutoff], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>> {
        let url = url.trim().to_string();
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?1"
                ))?;
                let article = stmt
                    .query_row(params![url], article_from_row)
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    // Feed operations

    /// Subscribe to a feed. Re-adding a dismissed feed revives it and keeps
    /// its original `created_at`.
    pub async fn add_feed(&self, url: &str) -> Result<()> {
        let url = url.trim().to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO feeds (url) VALUES (?1)
                       ON CONFLICT(url) DO UPDATE SET
                           dismissed = 0,
                           updated_at = datetime('now')"#,
                    params![url],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Soft-delete a feed. Returns false if no active subscription matched.
    pub async fn remove_feed(&self, url: &str) -> Result<bool> {
        let url = url.trim().to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE feeds SET dismissed = 1, updated_at = datetime('now') WHERE url = ?1 AND dismissed = 0",
                    params![url],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed > 0)
    }

    /// URLs of all active subscriptions, oldest subscription first.
    pub async fn list_feeds(&self) -> Result<Vec<String>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT url FROM feeds WHERE dismissed = 0 ORDER BY created_at ASC, id ASC",
                )?;
                let feeds = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn get_feed(&self, url: &str) -> Result<Option<FeedSubscription>> {
        let url = url.trim().to_string();
        let feed = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT url, dismissed, created_at, updated_at FROM feeds WHERE url = ?1",
                )?;
                let feed = stmt.query_row(params![url], feed_from_row).optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    // Settings

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM settings WHERE key = ?1",
                        params![key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO settings (key, value) VALUES (?1, ?2)
                       ON CONFLICT(key) DO UPDATE SET
                           value = excluded.value,
                           updated_at = datetime('now')"#,
                    params![key, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Fixed-width UTC form, so stored timestamps compare correctly as text.
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        title: row.get(0)?,
        url: row.get(1)?,
        content: row.get(2)?,
        source: row.get(3)?,
        published_at: parse_datetime(&row.get::<_, String>(4)?).unwrap_or_else(Utc::now),
        full_content: row.get(5)?,
        author: row.get(6)?,
        word_count: row
            .get::<_, Option<i64>>(7)?
            .and_then(|count| u32::try_from(count).ok()),
    })
}

fn feed_from_row(row: &Row) -> rusqlite::Result<FeedSubscription> {
    Ok(FeedSubscription {
        url: row.get(0)?,
        dismissed: row.get::<_, i64>(1)? != 0,
        created_at: parse_datetime(&row.get::<_, String>(2)?).unwrap_or_else(Utc::now),
        updated_at: parse_datetime(&row.get::<_, String>(3)?).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio_test::assert_ok;

    async fn test_repository() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let repository = Repository::new(path.to_str().unwrap()).await.unwrap();
        (dir, repository)
    }

    fn article(url: &str, title: &str, hours_ago: i64) -> Article {
        Article {
            title: title.to_string(),
            content: format!("teaser for {title}"),
            source: "Example News".to_string(),
            url: url.to_string(),
            published_at: Utc::now() - Duration::hours(hours_ago),
            full_content: None,
            author: None,
            word_count: None,
        }
    }

    fn extracted(content: &str) -> ExtractedContent {
        ExtractedContent {
            title: "Page title".to_string(),
            author: "Jane Doe".to_string(),
            content: content.to_string(),
            word_count: 42,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_and_first_published_at() {
        let (_dir, repo) = test_repository().await;
        let first = article("https://example.com/a", "Original", 5);
        assert_ok!(repo.upsert_article(&first, None).await);

        let mut republished = article("https://example.com/a", "Updated", 0);
        republished.published_at = Utc::now();
        assert_ok!(repo.upsert_article(&republished, None).await);

        let all = repo.get_articles_since(72).await.unwrap();
        assert_eq!(all.len(), 1);

        let stored = repo
            .get_article_by_url("https://example.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "Updated");
        assert_eq!(
            stored.published_at.timestamp(),
            first.published_at.timestamp()
        );
    }

    #[tokio::test]
    async fn enrichment_survives_plain_upsert() {
        let (_dir, repo) = test_repository().await;
        let item = article("https://example.com/b", "Enriched", 1);

        repo.upsert_article(&item, Some(&extracted("Full body text")))
            .await
            .unwrap();
        repo.upsert_article(&item, None).await.unwrap();

        let stored = repo
            .get_article_by_url("https://example.com/b")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_enriched());
        assert_eq!(stored.full_content.as_deref(), Some("Full body text"));
        assert_eq!(stored.author.as_deref(), Some("Jane Doe"));
        assert_eq!(stored.word_count, Some(42));
    }

    #[tokio::test]
    async fn empty_extraction_is_not_enriched() {
        let (_dir, repo) = test_repository().await;
        let item = article("https://example.com/c", "Empty", 1);
        let mut empty = extracted("   ");
        empty.author.clear();
        empty.word_count = 0;

        repo.upsert_article(&item, Some(&empty)).await.unwrap();

        let stored = repo
            .get_article_by_url("https://example.com/c")
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_enriched());
        assert!(stored.author.is_none());
        assert!(stored.word_count.is_none());
    }

    #[tokio::test]
    async fn articles_since_filters_and_sorts() {
        let (_dir, repo) = test_repository().await;
        repo.upsert_article(&article("https://example.com/old", "Old", 100), None)
            .await
            .unwrap();
        repo.upsert_article(&article("https://example.com/mid", "Mid", 10), None)
            .await
            .unwrap();
        repo.upsert_article(&article("https://example.com/new", "New", 1), None)
            .await
            .unwrap();

        let recent = repo.get_articles_since(72).await.unwrap();
        let titles: Vec<_> = recent.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Mid"]);

        let last_day = repo.get_articles_since(2).await.unwrap();
        assert_eq!(last_day.len(), 1);
    }

    #[tokio::test]
    async fn missing_article_is_none() {
        let (_dir, repo) = test_repository().await;
        let missing = repo.get_article_by_url("https://nowhere.test/").await;
        assert!(matches!(missing, Ok(None)));
    }

    #[tokio::test]
    async fn feeds_are_soft_deleted_and_revived() {
        let (_dir, repo) = test_repository().await;
        repo.add_feed("https://a.test/rss").await.unwrap();
        repo.add_feed(" https://b.test/rss ").await.unwrap();
        repo.add_feed("https://a.test/rss").await.unwrap();

        assert_eq!(
            repo.list_feeds().await.unwrap(),
            vec!["https://a.test/rss", "https://b.test/rss"]
        );

        let created = repo.get_feed("https://a.test/rss").await.unwrap().unwrap();

        assert!(repo.remove_feed("https://a.test/rss").await.unwrap());
        assert!(!repo.remove_feed("https://a.test/rss").await.unwrap());
        assert!(!repo.remove_feed("https://unknown.test/rss").await.unwrap());
        assert_eq!(repo.list_feeds().await.unwrap(), vec!["https://b.test/rss"]);

        let dismissed = repo.get_feed("https://a.test/rss").await.unwrap().unwrap();
        assert!(dismissed.dismissed);

        repo.add_feed("https://a.test/rss").await.unwrap();
        let revived = repo.get_feed("https://a.test/rss").await.unwrap().unwrap();
        assert!(!revived.dismissed);
        assert_eq!(revived.created_at, created.created_at);
        assert_eq!(
            repo.list_feeds().await.unwrap(),
            vec!["https://a.test/rss", "https://b.test/rss"]
        );
    }

    #[tokio::test]
    async fn settings_overwrite_in_place() {
        let (_dir, repo) = test_repository().await;
        assert_eq!(repo.get_setting("summary").await.unwrap(), None);

        repo.set_setting("summary", "first").await.unwrap();
        repo.set_setting("summary", "second").await.unwrap();

        assert_eq!(
            repo.get_setting("summary").await.unwrap().as_deref(),
            Some("second")
        );
    }
}
