mod aggregator;
pub mod cleaner;
pub mod dates;
mod fetcher;
mod opml;

pub use aggregator::Aggregator;
pub use fetcher::{FeedFetcher, FeedSource};
#[cfg(test)]
pub use fetcher::{RawFeed, RawItem};
pub use opml::parse_opml_file;
