mod article;
mod event;
mod feed;
mod summary;

pub use article::{Article, ExtractedContent};
pub use event::{AppEvent, EventSender};
pub use feed::FeedSubscription;
pub use summary::{SummaryStatus, SETTING_API_KEY, SETTING_SUMMARY};
