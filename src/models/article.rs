use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single news item. `url` is its identity across feeds and runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    /// Teaser text from the feed item.
    pub content: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,

    pub full_content: Option<String>,
    pub author: Option<String>,
    pub word_count: Option<u32>,
}

impl Article {
    pub fn is_enriched(&self) -> bool {
        self.full_content.is_some()
    }

    /// Best text available for this article: extracted page content, else the teaser.
    pub fn body(&self) -> &str {
        self.full_content.as_deref().unwrap_or(&self.content)
    }

    /// Fold extracted page content into the enrichment fields. Blank values
    /// stay absent, matching what the store keeps.
    pub fn apply_extracted(&mut self, extracted: &ExtractedContent) {
        let content = extracted.content.trim();
        let author = extracted.author.trim();
        if !content.is_empty() {
            self.full_content = Some(content.to_string());
        }
        if !author.is_empty() {
            self.author = Some(author.to_string());
        }
        if extracted.word_count > 0 {
            self.word_count = u32::try_from(extracted.word_count).ok();
        }
    }
}

/// Result of extracting the main content of an article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: String,
    pub author: String,
    pub content: String,
    pub word_count: usize,
}

impl ExtractedContent {
    pub fn from_article(article: &Article) -> Option<Self> {
        let content = article.full_content.clone()?;
        Some(Self {
            title: article.title.clone(),
            author: article.author.clone().unwrap_or_default(),
            content,
            word_count: article.word_count.unwrap_or(0) as usize,
        })
    }
}
