mod content_extractor;
mod enrichment;
mod pipeline;
mod preview;
mod reconciler;
mod refresh_timer;

pub use pipeline::LivePipeline;
pub use refresh_timer::RefreshTimer;
