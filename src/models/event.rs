use tokio::sync::mpsc;

use super::Article;

/// Updates produced by background tasks and applied by the UI loop.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Replace the displayed article list.
    Articles(Vec<Article>),
    Status(String),
    Progress { completed: usize, total: usize },
    Preview { url: String, text: String },
    /// Rolling summary text, or the error message of a failed run.
    Summary { text: String, failed: bool },
    SummaryStarted,
    RefreshTick,
    RefreshFinished,
    EnrichmentFinished,
}

pub type EventSender = mpsc::UnboundedSender<AppEvent>;
