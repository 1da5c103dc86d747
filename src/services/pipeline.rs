use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::ai::{ChatClient, OpenAiClient, Summarizer};
use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::feed::{Aggregator, FeedFetcher, FeedSource};
use crate::models::{AppEvent, Article, EventSender, ExtractedContent};

use super::content_extractor::{ContentExtractor, PageExtractor};
use super::enrichment::{EnrichmentScheduler, InFlight};
use super::preview::{render_basic, render_full};
use super::reconciler::{reconcile, Reconciled};

pub const UP_TO_DATE: &str = "All news is up to date.";

pub type LivePipeline = Pipeline<FeedFetcher, ContentExtractor, OpenAiClient>;

/// Aggregation, reconciliation, enrichment and summarization, reporting
/// everything destined for display through [`AppEvent`]s.
pub struct Pipeline<F, E, C> {
    repository: Arc<Repository>,
    aggregator: Aggregator<F>,
    extractor: Arc<E>,
    scheduler: EnrichmentScheduler<E>,
    summarizer: Summarizer<C>,
    lookback_hours: u32,
}

impl LivePipeline {
    pub fn from_config(repository: Arc<Repository>, config: &Config) -> Result<Self> {
        Ok(Self::new(
            repository,
            FeedFetcher::new(config.http_timeout())?,
            Arc::new(ContentExtractor::new(config.http_timeout())?),
            OpenAiClient::new(config)?,
            config,
        ))
    }
}

impl<F, E, C> Pipeline<F, E, C>
where
    F: FeedSource + 'static,
    E: PageExtractor + 'static,
    C: ChatClient + 'static,
{
    pub fn new(
        repository: Arc<Repository>,
        source: F,
        extractor: Arc<E>,
        chat: C,
        config: &Config,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(Arc::clone(&repository), source, config.lookback()),
            scheduler: EnrichmentScheduler::new(
                Arc::clone(&repository),
                Arc::clone(&extractor),
                InFlight::default(),
                config.enrich_delay(),
            ),
            summarizer: Summarizer::new(
                Arc::clone(&repository),
                chat,
                config.summary_model,
                config.openai_api_key.clone(),
                config.summary_bootstrap_hours,
            ),
            extractor,
            repository,
            lookback_hours: config.lookback_hours,
        }
    }

    /// Fetch all feeds and publish the reconciled list.
    ///
    /// With `load_cached` the stored articles are published first so the list
    /// is not empty while the network round trip runs. Returns the articles
    /// not seen before, or `None` when the feeds could not be collected.
    pub async fn refresh(&self, events: &EventSender, load_cached: bool) -> Option<Vec<Article>> {
        if load_cached {
            match self.repository.get_articles_since(self.lookback_hours).await {
                Ok(cached) if !cached.is_empty() => {
                    let _ = events.send(AppEvent::Status(format!(
                        "Loaded {} articles from database",
                        cached.len()
                    )));
                    let _ = events.send(AppEvent::Articles(cached));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to load stored articles: {}", e),
            }
        }

        let fresh = match self.aggregator.collect().await {
            Ok(articles) => articles,
            Err(e) => {
                tracing::warn!("Failed to aggregate feeds: {}", e);
                let _ = events.send(AppEvent::Status(format!("Failed to get news list: {e}")));
                return None;
            }
        };

        let mut persisted = HashMap::new();
        for article in &fresh {
            match self.repository.get_article_by_url(&article.url).await {
                Ok(Some(stored)) => {
                    persisted.insert(article.url.clone(), stored);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to look up {}: {}", article.url, e),
            }
        }

        let Reconciled {
            articles,
            new_articles,
        } = reconcile(fresh, &persisted);

        let status = if new_articles.is_empty() {
            UP_TO_DATE.to_string()
        } else {
            format!(
                "Found {} new articles, fetching full content...",
                new_articles.len()
            )
        };
        let _ = events.send(AppEvent::Articles(articles));
        let _ = events.send(AppEvent::Status(status));

        Some(new_articles)
    }

    /// Enrich the new articles, then fold them into the rolling summary.
    pub async fn enrich_and_summarize(&self, new_articles: Vec<Article>, events: &EventSender) {
        let report = self.scheduler.run(new_articles, events).await;
        let _ = events.send(AppEvent::Status(UP_TO_DATE.to_string()));

        let _ = events.send(AppEvent::SummaryStarted);
        let event = match self.summarizer.summarize(&report.processed).await {
            Ok(text) => AppEvent::Summary {
                text,
                failed: false,
            },
            Err(e) => {
                tracing::warn!("Failed to generate summary: {}", e);
                AppEvent::Summary {
                    text: e.to_string(),
                    failed: true,
                }
            }
        };
        let _ = events.send(event);
        let _ = events.send(AppEvent::EnrichmentFinished);
    }

    /// Run a refresh in the background. New articles are handed to a
    /// separate enrichment task so the refresh finishes as soon as the list
    /// is published.
    pub fn spawn_refresh(self: &Arc<Self>, events: EventSender, load_cached: bool) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let new_articles = pipeline.refresh(&events, load_cached).await;
            let _ = events.send(AppEvent::RefreshFinished);

            if let Some(new_articles) = new_articles.filter(|a| !a.is_empty()) {
                tokio::spawn(async move {
                    pipeline.enrich_and_summarize(new_articles, &events).await;
                });
            }
        })
    }

    /// Publish preview text for an article: stored full content when
    /// available, else a live extraction (stored afterwards), else the teaser.
    pub async fn preview(&self, article: Article, events: &EventSender) {
        let _ = events.send(AppEvent::Preview {
            url: article.url.clone(),
            text: "Loading...".to_string(),
        });

        let cached = match self.repository.get_article_by_url(&article.url).await {
            Ok(Some(stored)) => ExtractedContent::from_article(&stored),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to look up {}: {}", article.url, e);
                None
            }
        };

        let text = match cached {
            Some(extracted) => render_full(&article, &extracted),
            None => match self.extractor.extract(&article.url).await {
                Ok(extracted) => {
                    if let Err(e) = self.repository.upsert_article(&article, Some(&extracted)).await {
                        tracing::warn!("Failed to store article {}: {}", article.url, e);
                    }
                    render_full(&article, &extracted)
                }
                Err(e) => {
                    tracing::debug!("Preview extraction failed for {}: {}", article.url, e);
                    render_basic(&article)
                }
            },
        };

        let _ = events.send(AppEvent::Preview {
            url: article.url,
            text,
        });
    }

    pub fn spawn_preview(self: &Arc<Self>, article: Article, events: EventSender) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.preview(article, &events).await;
        })
    }
}
