use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::db::Repository;
use crate::models::{AppEvent, Article, EventSender};

use super::content_extractor::PageExtractor;

/// URLs currently being enriched, shared by every enrichment run so that two
/// overlapping runs never extract the same article at once.
#[derive(Clone, Default)]
pub struct InFlight {
    urls: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    /// Claim a URL; `None` if another run holds it.
    pub fn claim(&self, url: &str) -> Option<InFlightGuard> {
        let mut urls = self.urls.lock().unwrap_or_else(PoisonError::into_inner);
        urls.insert(url.to_string()).then(|| InFlightGuard {
            urls: Arc::clone(&self.urls),
            url: url.to_string(),
        })
    }
}

/// Releases its URL when dropped.
pub struct InFlightGuard {
    urls: Arc<Mutex<HashSet<String>>>,
    url: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut urls = self.urls.lock().unwrap_or_else(PoisonError::into_inner);
        urls.remove(&self.url);
    }
}

#[derive(Debug, Default)]
pub struct EnrichmentReport {
    /// Articles this run fetched, enriched or not, in input order.
    pub processed: Vec<Article>,
    pub enriched: usize,
    pub failed: usize,
    pub skipped: usize,
}

enum Outcome {
    Enriched,
    Failed,
    Skipped,
}

/// Runs the content extractor over new articles one at a time, pausing
/// between fetches to stay polite to source sites.
pub struct EnrichmentScheduler<E> {
    repository: Arc<Repository>,
    extractor: Arc<E>,
    in_flight: InFlight,
    delay: Duration,
}

impl<E: PageExtractor> EnrichmentScheduler<E> {
    pub fn new(
        repository: Arc<Repository>,
        extractor: Arc<E>,
        in_flight: InFlight,
        delay: Duration,
    ) -> Self {
        Self {
            repository,
            extractor,
            in_flight,
            delay,
        }
    }

    pub async fn run(&self, articles: Vec<Article>, events: &EventSender) -> EnrichmentReport {
        let total = articles.len();
        let mut report = EnrichmentReport::default();

        for (index, mut article) in articles.into_iter().enumerate() {
            let outcome = self.enrich_one(&mut article).await;
            let fetched = !matches!(outcome, Outcome::Skipped);

            match outcome {
                Outcome::Enriched => report.enriched += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped => report.skipped += 1,
            }
            if fetched {
                report.processed.push(article);
            }

            let _ = events.send(AppEvent::Progress {
                completed: index + 1,
                total,
            });

            if fetched && index + 1 < total {
                tokio::time::sleep(self.delay).await;
            }
        }

        tracing::info!(
            "Enrichment finished: {} enriched, {} failed, {} skipped",
            report.enriched,
            report.failed,
            report.skipped
        );
        report
    }

    async fn enrich_one(&self, article: &mut Article) -> Outcome {
        let Some(_guard) = self.in_flight.claim(&article.url) else {
            tracing::debug!("Skipping {}: already being enriched", article.url);
            return Outcome::Skipped;
        };

        match self.repository.get_article_by_url(&article.url).await {
            Ok(Some(stored)) if stored.is_enriched() => {
                tracing::debug!("Skipping {}: already enriched", article.url);
                return Outcome::Skipped;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to look up {}: {}", article.url, e),
        }

        match self.extractor.extract(&article.url).await {
            Ok(extracted) => {
                if let Err(e) = self.repository.upsert_article(article, Some(&extracted)).await {
                    tracing::warn!("Failed to store article {}: {}", article.url, e);
                }
                article.apply_extracted(&extracted);
                Outcome::Enriched
            }
            Err(e) => {
                tracing::warn!("Failed to get content {}: {}", article.url, e);
                if let Err(e) = self.repository.upsert_article(article, None).await {
                    tracing::warn!("Failed to store article {}: {}", article.url, e);
                }
                Outcome::Failed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc;

    use crate::error::{AppError, Result};
    use crate::models::ExtractedContent;

    /// Extractor that records every URL it is asked for.
    #[derive(Default)]
    pub(crate) struct RecordingExtractor {
        pub calls: Mutex<Vec<String>>,
        pub failing: Vec<String>,
    }

    impl RecordingExtractor {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PageExtractor for RecordingExtractor {
        async fn extract(&self, url: &str) -> Result<ExtractedContent> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.failing.iter().any(|u| u == url) {
                return Err(AppError::Other(anyhow::anyhow!("HTTP 500")));
            }
            Ok(ExtractedContent {
                title: "Extracted".to_string(),
                author: "Reporter".to_string(),
                content: format!("Full content of {url}"),
                word_count: 4,
            })
        }
    }

    pub(crate) fn article(url: &str) -> Article {
        Article {
            title: format!("Title {url}"),
            content: "teaser".to_string(),
            source: "Feed".to_string(),
            url: url.to_string(),
            published_at: Utc::now(),
            full_content: None,
            author: None,
            word_count: None,
        }
    }

    async fn setup(
        failing: Vec<String>,
    ) -> (
        tempfile::TempDir,
        Arc<Repository>,
        Arc<RecordingExtractor>,
        EnrichmentScheduler<RecordingExtractor>,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(
            Repository::new(dir.path().join("enrich.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let extractor = Arc::new(RecordingExtractor {
            failing,
            ..Default::default()
        });
        let scheduler = EnrichmentScheduler::new(
            Arc::clone(&repository),
            Arc::clone(&extractor),
            InFlight::default(),
            Duration::ZERO,
        );
        (dir, repository, extractor, scheduler)
    }

    #[tokio::test]
    async fn processes_in_order_and_stores_failures_without_enrichment() {
        let (_dir, repo, extractor, scheduler) =
            setup(vec!["https://n.test/2".to_string()]).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let articles = vec![
            article("https://n.test/1"),
            article("https://n.test/2"),
            article("https://n.test/3"),
        ];
        let report = scheduler.run(articles, &tx).await;

        assert_eq!(
            extractor.calls(),
            vec!["https://n.test/1", "https://n.test/2", "https://n.test/3"]
        );
        assert_eq!((report.enriched, report.failed, report.skipped), (2, 1, 0));
        assert_eq!(report.processed.len(), 3);
        assert!(report.processed[0].is_enriched());
        assert!(!report.processed[1].is_enriched());

        let failed = repo.get_article_by_url("https://n.test/2").await.unwrap().unwrap();
        assert!(!failed.is_enriched());
        let ok = repo.get_article_by_url("https://n.test/3").await.unwrap().unwrap();
        assert_eq!(ok.full_content.as_deref(), Some("Full content of https://n.test/3"));
        assert_eq!(ok.author.as_deref(), Some("Reporter"));

        let mut progress = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::Progress { completed, total } = event {
                progress.push((completed, total));
            }
        }
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn already_enriched_articles_are_skipped() {
        let (_dir, repo, extractor, scheduler) = setup(Vec::new()).await;
        let done = article("https://n.test/done");
        let extracted = ExtractedContent {
            content: "stored body".to_string(),
            ..Default::default()
        };
        repo.upsert_article(&done, Some(&extracted)).await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let report = scheduler
            .run(vec![done, article("https://n.test/fresh")], &tx)
            .await;

        assert_eq!(extractor.calls(), vec!["https://n.test/fresh"]);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed.len(), 1);
    }

    #[tokio::test]
    async fn urls_claimed_by_another_run_are_skipped() {
        let (_dir, _repo, extractor, scheduler) = setup(Vec::new()).await;
        let guard = scheduler.in_flight.claim("https://n.test/busy").unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let report = scheduler.run(vec![article("https://n.test/busy")], &tx).await;
        assert_eq!(report.skipped, 1);
        assert!(extractor.calls().is_empty());

        drop(guard);
        let report = scheduler.run(vec![article("https://n.test/busy")], &tx).await;
        assert_eq!(report.enriched, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_fetched_items_only() {
        let (_dir, repo, extractor, _) = setup(Vec::new()).await;
        let scheduler = EnrichmentScheduler::new(
            Arc::clone(&repo),
            Arc::clone(&extractor),
            InFlight::default(),
            Duration::from_millis(500),
        );
        let done = article("https://n.test/done");
        let extracted = ExtractedContent {
            content: "stored body".to_string(),
            ..Default::default()
        };
        repo.upsert_article(&done, Some(&extracted)).await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let started = tokio::time::Instant::now();
        let report = scheduler
            .run(
                vec![done, article("https://n.test/a"), article("https://n.test/b")],
                &tx,
            )
            .await;

        assert_eq!(report.skipped, 1);
        // one pause, between a and b
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }

    #[test]
    fn in_flight_guard_releases_on_drop() {
        let in_flight = InFlight::default();
        let guard = in_flight.claim("https://n.test/x");
        assert!(guard.is_some());
        assert!(in_flight.claim("https://n.test/x").is_none());
        drop(guard);
        assert!(in_flight.claim("https://n.test/x").is_some());
    }
}
