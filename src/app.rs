use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::commands::{self, Command};
use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::feed::parse_opml_file;
use crate::models::{AppEvent, Article, EventSender, SummaryStatus, SETTING_SUMMARY};
use crate::services::{LivePipeline, RefreshTimer};
use crate::tui::AppAction;

pub struct App {
    // Data
    pub articles: Vec<Article>,
    pub summary: String,

    // UI State
    pub selected_index: usize,
    pub status: String,
    pub preview: String,
    pub show_help: bool,
    pub command_input_active: bool,
    pub command_input: String,
    pub auto_refresh: bool,
    pub next_refresh: Option<DateTime<Local>>,

    // Async state
    pub is_refreshing: bool,
    pub summary_status: SummaryStatus,
    preview_url: Option<String>,
    preview_task: Option<JoinHandle<()>>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    events_tx: EventSender,
    timer: Option<RefreshTimer>,
    refresh_interval: Duration,

    // Services
    repository: Arc<Repository>,
    pipeline: Arc<LivePipeline>,
    fallback_api_key: Option<String>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);
        let pipeline = Arc::new(LivePipeline::from_config(Arc::clone(&repository), config)?);

        let summary = match repository.get_setting(SETTING_SUMMARY).await {
            Ok(summary) => summary.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Failed to load summary: {}", e);
                String::new()
            }
        };
        let summary_status = if summary.is_empty() {
            SummaryStatus::NotGenerated
        } else {
            SummaryStatus::Generated
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            articles: Vec::new(),
            summary,
            selected_index: 0,
            status: String::new(),
            preview: String::new(),
            show_help: false,
            command_input_active: false,
            command_input: String::new(),
            auto_refresh: config.auto_refresh,
            next_refresh: None,
            is_refreshing: false,
            summary_status,
            preview_url: None,
            preview_task: None,
            events_rx,
            events_tx,
            timer: None,
            refresh_interval: config.refresh_interval(),
            repository,
            pipeline,
            fallback_api_key: config.openai_api_key.clone(),
        })
    }

    /// Start the refresh timer and load the list (cached first, then network).
    pub fn start(&mut self) {
        self.timer = Some(RefreshTimer::spawn(
            self.refresh_interval,
            self.events_tx.clone(),
        ));
        self.schedule_next_refresh();
        self.begin_refresh(true);
    }

    pub fn shutdown(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
        if let Some(task) = self.preview_task.take() {
            task.abort();
        }
    }

    pub fn selected_article(&self) -> Option<&Article> {
        self.articles.get(self.selected_index)
    }

    pub async fn handle_action(&mut self, action: AppAction) -> Result<bool> {
        match action {
            AppAction::Quit => return Ok(true),

            AppAction::MoveUp => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                    self.on_selection_changed();
                }
            }

            AppAction::MoveDown => {
                if self.selected_index + 1 < self.articles.len() {
                    self.selected_index += 1;
                    self.on_selection_changed();
                }
            }

            AppAction::MoveToTop => {
                if self.selected_index != 0 && !self.articles.is_empty() {
                    self.selected_index = 0;
                    self.on_selection_changed();
                }
            }

            AppAction::MoveToBottom => {
                let last = self.articles.len().saturating_sub(1);
                if self.selected_index != last {
                    self.selected_index = last;
                    self.on_selection_changed();
                }
            }

            AppAction::Refresh => {
                self.begin_refresh(false);
            }

            AppAction::OpenInBrowser => {
                if let Some(article) = self.selected_article() {
                    let url = article.url.clone();
                    if let Err(e) = open::that(&url) {
                        tracing::warn!("Failed to open browser: {}", e);
                        self.status = format!("Failed to open browser: {e}");
                    }
                }
            }

            AppAction::ToggleAutoRefresh => {
                self.auto_refresh = !self.auto_refresh;
                self.schedule_next_refresh();
                self.status = if self.auto_refresh {
                    "Auto-refresh enabled".to_string()
                } else {
                    "Auto-refresh disabled".to_string()
                };
            }

            AppAction::ShowHelp => {
                self.show_help = true;
            }

            AppAction::HideHelp => {
                self.show_help = false;
            }

            AppAction::CommandStart => {
                self.command_input_active = true;
                self.command_input.clear();
            }

            AppAction::CommandChar(c) => {
                self.command_input.push(c);
            }

            AppAction::CommandBackspace => {
                self.command_input.pop();
            }

            AppAction::CommandConfirm => {
                let input = std::mem::take(&mut self.command_input);
                self.command_input_active = false;
                self.run_command(&input).await;
            }

            AppAction::CommandCancel => {
                self.command_input_active = false;
                self.command_input.clear();
            }
        }

        Ok(false)
    }

    /// Apply every event queued by background tasks (non-blocking).
    pub fn poll_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Articles(articles) => {
                let previous = self.selected_article().map(|a| a.url.clone());
                self.selected_index = reselect(&articles, previous.as_deref(), self.selected_index);
                self.articles = articles;

                let current = self.selected_article().map(|a| a.url.as_str());
                if current.is_some() && current != previous.as_deref() {
                    self.on_selection_changed();
                }
            }
            AppEvent::Status(status) => self.status = status,
            AppEvent::Progress { completed, total } => {
                self.status = format_progress(completed, total);
            }
            AppEvent::Preview { url, text } => {
                if self.preview_url.as_deref() == Some(url.as_str()) {
                    self.preview = text;
                }
            }
            AppEvent::SummaryStarted => self.summary_status = SummaryStatus::Generating,
            AppEvent::Summary { text, failed } => {
                self.summary = text;
                self.summary_status = if failed {
                    SummaryStatus::Failed
                } else {
                    SummaryStatus::Generated
                };
            }
            AppEvent::RefreshTick => {
                if self.auto_refresh {
                    self.schedule_next_refresh();
                    self.status = "Refreshing...".to_string();
                    self.begin_refresh(false);
                }
            }
            AppEvent::RefreshFinished => self.is_refreshing = false,
            AppEvent::EnrichmentFinished => tracing::debug!("Enrichment run finished"),
        }
    }

    /// Spawn a refresh unless one is already running.
    fn begin_refresh(&mut self, load_cached: bool) {
        if self.is_refreshing {
            tracing::debug!("Refresh already running, skipping");
            return;
        }
        self.is_refreshing = true;
        self.status = if load_cached { "Loading..." } else { "Checking..." }.to_string();
        self.pipeline
            .spawn_refresh(self.events_tx.clone(), load_cached);
    }

    fn schedule_next_refresh(&mut self) {
        self.next_refresh = self.auto_refresh.then(|| {
            let interval = chrono::Duration::from_std(self.refresh_interval)
                .unwrap_or_else(|_| chrono::Duration::minutes(5));
            Local::now() + interval
        });
    }

    fn on_selection_changed(&mut self) {
        if let Some(task) = self.preview_task.take() {
            task.abort();
        }

        let Some(article) = self.selected_article().cloned() else {
            self.preview_url = None;
            self.preview.clear();
            return;
        };

        self.preview_url = Some(article.url.clone());
        self.preview_task = Some(
            self.pipeline
                .spawn_preview(article, self.events_tx.clone()),
        );
    }

    async fn run_command(&mut self, input: &str) {
        if input.trim().is_empty() {
            return;
        }

        let output = match Command::parse(input) {
            Ok(command) => {
                commands::execute(command, &self.repository, self.fallback_api_key.as_deref()).await
            }
            Err(usage) => usage,
        };

        // Command output takes over the preview pane until the selection changes
        if let Some(task) = self.preview_task.take() {
            task.abort();
        }
        self.preview_url = None;
        self.preview = output;
    }

    /// Full pipeline without the UI: refresh, enrich, summarize, printing
    /// progress and the resulting summary to stdout.
    pub async fn refresh_headless(&self) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let printer = tokio::spawn(async move {
            let mut summary = None;
            while let Some(event) = rx.recv().await {
                match event {
                    AppEvent::Status(status) => println!("{status}"),
                    AppEvent::Progress { completed, total } => {
                        println!("{}", format_progress(completed, total));
                    }
                    AppEvent::Summary { text, failed } => summary = Some((text, failed)),
                    _ => {}
                }
            }
            summary
        });

        if let Some(new_articles) = self.pipeline.refresh(&tx, false).await {
            self.pipeline.enrich_and_summarize(new_articles, &tx).await;
        }
        drop(tx);

        match printer.await.map_err(anyhow::Error::from)? {
            Some((text, false)) => println!("\n{text}"),
            Some((text, true)) => eprintln!("Summary failed: {text}"),
            None => {}
        }
        Ok(())
    }

    /// Subscribe to every feed in an OPML file. Returns how many were added.
    pub async fn import_opml(&self, path: &Path) -> Result<usize> {
        let feeds = parse_opml_file(path)?;

        let mut imported = 0;
        for url in feeds {
            match self.repository.add_feed(&url).await {
                Ok(()) => imported += 1,
                Err(e) => tracing::warn!("Failed to add feed {}: {}", url, e),
            }
        }

        tracing::info!("Imported {} feeds from {}", imported, path.display());
        Ok(imported)
    }
}

/// Index of `previous` in the new list, else the old index clamped to it.
fn reselect(articles: &[Article], previous: Option<&str>, index: usize) -> usize {
    previous
        .and_then(|url| articles.iter().position(|a| a.url == url))
        .unwrap_or_else(|| index.min(articles.len().saturating_sub(1)))
}

pub fn format_progress(completed: usize, total: usize) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        completed as f64 / total as f64 * 100.0
    };
    format!("Progress: {percent:.1}% ({completed}/{total})")
}
