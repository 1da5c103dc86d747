use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::db::Repository;
use crate::error::Result;
use crate::models::{Article, SETTING_API_KEY, SETTING_SUMMARY};

use super::llm::{ChatClient, ChatMessage, ModelTier};

/// Upper bound on the article text sent per item.
const MAX_ITEM_CHARS: usize = 4000;

/// Maintains the rolling summary: each run feeds the previous summary plus
/// the latest articles to the model and stores whatever comes back.
pub struct Summarizer<C> {
    repository: Arc<Repository>,
    client: C,
    tier: ModelTier,
    fallback_api_key: Option<String>,
    bootstrap_hours: u32,
}

impl<C: ChatClient> Summarizer<C> {
    pub fn new(
        repository: Arc<Repository>,
        client: C,
        tier: ModelTier,
        fallback_api_key: Option<String>,
        bootstrap_hours: u32,
    ) -> Self {
        Self {
            repository,
            client,
            tier,
            fallback_api_key,
            bootstrap_hours,
        }
    }

    /// Produce and store a new rolling summary covering `batch`.
    ///
    /// Without a previous summary the recent stored articles are used as a
    /// starting point. On failure the stored summary is left untouched.
    pub async fn summarize(&self, batch: &[Article]) -> Result<String> {
        let previous = self.setting(SETTING_SUMMARY).await.unwrap_or_default();

        let items = if previous.is_empty() {
            self.bootstrap_items(batch).await
        } else {
            batch.to_vec()
        };

        if items.is_empty() {
            return Ok(previous);
        }

        let api_key = self.api_key().await;
        let messages = build_messages(&previous, &items, Local::now());
        tracing::info!("Requesting summary for {} articles", items.len());

        let summary = self.client.complete(&api_key, self.tier, messages).await?;

        if let Err(e) = self.repository.set_setting(SETTING_SUMMARY, &summary).await {
            tracing::warn!("Failed to store summary: {}", e);
        }
        Ok(summary)
    }

    /// Recent stored articles (newest first) plus batch items not among them.
    async fn bootstrap_items(&self, batch: &[Article]) -> Vec<Article> {
        let mut items = match self.repository.get_articles_since(self.bootstrap_hours).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("Failed to load recent articles: {}", e);
                Vec::new()
            }
        };

        let mut seen: HashSet<String> = items.iter().map(|a| a.url.clone()).collect();
        items.extend(
            batch
                .iter()
                .filter(|a| seen.insert(a.url.clone()))
                .cloned(),
        );
        items
    }

    /// Stored key first, then the configured one.
    async fn api_key(&self) -> String {
        self.setting(SETTING_API_KEY)
            .await
            .or_else(|| self.fallback_api_key.clone())
            .unwrap_or_default()
    }

    async fn setting(&self, key: &str) -> Option<String> {
        match self.repository.get_setting(key).await {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                tracing::warn!("Failed to read setting {}: {}", key, e);
                None
            }
        }
    }
}

pub fn build_messages(
    previous: &str,
    items: &[Article],
    now: DateTime<Local>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(items.len() + 1);
    messages.push(ChatMessage::system(system_prompt(previous, now)));
    messages.extend(items.iter().map(|item| ChatMessage::user(item_message(item))));
    messages
}

fn system_prompt(previous: &str, now: DateTime<Local>) -> String {
    format!(
        r#"=== System information ===
Current time: {time}
Platform: {os}/{arch}

=== Instructions ===
You are a news digest assistant. From the news items provided (title, source, publish time, content), pick out what matters, write a structured digest of the day and analyse the trends.

=== Output format ===
## Top stories
- World affairs, government policy, major public events
- Keep the detail, do not over-compress
- Note when it happened and how much impact it has

## Technology and markets
- Technology trends, market moves, economic indicators
- Call out new technology and investment angles

## Everyday life
- Weather, transport, consumer news, health, education and culture

## Trends
- Compare with the previous digest and mark what changed
- Identify developing and emerging topics

=== Rules ===
1. Keep as much of the previous digest as is still relevant (the last 24 hours, major stories)
2. Order by importance and timeliness
3. Fill in details from closely related items
4. Keep figures, times and names
5. Note how reliable each source is
6. Highlight what differs from the previous digest

=== Previous digest ===
{previous}"#,
        time = now.format("%Y-%m-%d %H:%M:%S"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        previous = previous,
    )
    .trim()
    .to_string()
}

fn item_message(item: &Article) -> String {
    format!(
        "Title: {}\nSource: {}\nPublishedAt: {}\nContent: {}",
        item.title,
        item.source,
        item.published_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        truncate_chars(item.body(), MAX_ITEM_CHARS)
    )
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::{Duration, Utc};

    use crate::ai::llm::Role;
    use crate::error::AppError;
    use crate::models::ExtractedContent;

    struct FakeChat {
        reply: std::result::Result<String, String>,
        requests: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    impl FakeChat {
        fn replying(reply: std::result::Result<&str, &str>) -> Self {
            Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatClient for &FakeChat {
        async fn complete(
            &self,
            api_key: &str,
            _tier: ModelTier,
            messages: Vec<ChatMessage>,
        ) -> Result<String> {
            self.requests
                .lock()
                .unwrap()
                .push((api_key.to_string(), messages));
            self.reply.clone().map_err(AppError::Llm)
        }
    }

    fn article(url: &str, title: &str, hours_ago: i64) -> Article {
        Article {
            title: title.to_string(),
            content: format!("teaser {title}"),
            source: "Wire".to_string(),
            url: url.to_string(),
            published_at: Utc::now() - Duration::hours(hours_ago),
            full_content: None,
            author: None,
            word_count: None,
        }
    }

    async fn repository() -> (tempfile::TempDir, Arc<Repository>) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path().join("sum.db").to_str().unwrap())
            .await
            .unwrap();
        (dir, Arc::new(repo))
    }

    #[tokio::test]
    async fn first_run_bootstraps_from_recent_articles() {
        let (_dir, repo) = repository().await;
        let recent = article("https://n.test/recent", "Recent", 2);
        let old = article("https://n.test/old", "Old", 30);
        repo.upsert_article(&recent, None).await.unwrap();
        repo.upsert_article(&old, None).await.unwrap();

        let chat = FakeChat::replying(Ok("Digest v1"));
        let summarizer = Summarizer::new(
            Arc::clone(&repo),
            &chat,
            ModelTier::Small,
            Some("config-key".to_string()),
            24,
        );

        let batch = vec![recent.clone(), article("https://n.test/batch", "Batch", 40)];
        let summary = summarizer.summarize(&batch).await.unwrap();
        assert_eq!(summary, "Digest v1");
        assert_eq!(
            repo.get_setting(SETTING_SUMMARY).await.unwrap().as_deref(),
            Some("Digest v1")
        );

        let requests = chat.requests.lock().unwrap();
        let (api_key, messages) = &requests[0];
        assert_eq!(api_key, "config-key");
        assert_eq!(messages[0].role, Role::System);
        let users: Vec<_> = messages[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(users.len(), 2);
        assert!(users[0].starts_with("Title: Recent\nSource: Wire\n"));
        assert!(users[1].starts_with("Title: Batch\n"));
    }

    #[tokio::test]
    async fn later_runs_send_previous_summary_and_batch_only() {
        let (_dir, repo) = repository().await;
        repo.set_setting(SETTING_SUMMARY, "Yesterday's digest").await.unwrap();
        repo.set_setting(SETTING_API_KEY, "stored-key").await.unwrap();
        repo.upsert_article(&article("https://n.test/stored", "Stored", 1), None)
            .await
            .unwrap();

        let chat = FakeChat::replying(Ok("Digest v2"));
        let summarizer = Summarizer::new(
            Arc::clone(&repo),
            &chat,
            ModelTier::Small,
            Some("config-key".to_string()),
            24,
        );

        let mut fresh = article("https://n.test/fresh", "Fresh", 0);
        fresh.apply_extracted(&ExtractedContent {
            content: "Full body".to_string(),
            ..Default::default()
        });
        summarizer.summarize(&[fresh]).await.unwrap();

        let requests = chat.requests.lock().unwrap();
        let (api_key, messages) = &requests[0];
        assert_eq!(api_key, "stored-key");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("Yesterday's digest"));
        assert!(messages[0].content.contains(std::env::consts::OS));
        assert!(messages[1].content.ends_with("Content: Full body"));
    }

    #[tokio::test]
    async fn failure_leaves_stored_summary_unchanged() {
        let (_dir, repo) = repository().await;
        repo.set_setting(SETTING_SUMMARY, "Keep me").await.unwrap();

        let chat = FakeChat::replying(Err("API Error (Status 401): invalid key"));
        let summarizer = Summarizer::new(Arc::clone(&repo), &chat, ModelTier::Small, None, 24);

        let err = summarizer
            .summarize(&[article("https://n.test/a", "A", 0)])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API Error (Status 401): invalid key");
        assert_eq!(
            repo.get_setting(SETTING_SUMMARY).await.unwrap().as_deref(),
            Some("Keep me")
        );
    }

    #[tokio::test]
    async fn nothing_to_summarize_returns_previous() {
        let (_dir, repo) = repository().await;
        repo.set_setting(SETTING_SUMMARY, "Existing").await.unwrap();

        let chat = FakeChat::replying(Ok("unused"));
        let summarizer = Summarizer::new(Arc::clone(&repo), &chat, ModelTier::Small, None, 24);

        assert_eq!(summarizer.summarize(&[]).await.unwrap(), "Existing");
        assert!(chat.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn long_content_is_truncated_on_char_boundary() {
        let mut item = article("https://n.test/long", "Long", 0);
        item.content = "語".repeat(MAX_ITEM_CHARS + 10);
        let message = item_message(&item);
        let content = message.split("Content: ").nth(1).unwrap();
        assert_eq!(content.chars().count(), MAX_ITEM_CHARS);
    }
}
