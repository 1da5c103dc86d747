use std::collections::HashMap;

use crate::models::Article;

/// Outcome of merging a fresh aggregation with stored articles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Canonical list for display, newest first.
    pub articles: Vec<Article>,
    /// Articles with no stored counterpart, in aggregation order.
    pub new_articles: Vec<Article>,
}

/// Merge fresh articles with their stored versions (keyed by URL).
///
/// A stored `published_at` always wins so a republished entry cannot jump
/// ahead in recency; title, teaser and source come from the fresh fetch.
/// Stored enrichment fields are carried over for display.
pub fn reconcile(fresh: Vec<Article>, persisted: &HashMap<String, Article>) -> Reconciled {
    let mut articles = Vec::with_capacity(fresh.len());
    let mut new_articles = Vec::new();

    for mut article in fresh {
        match persisted.get(&article.url) {
            Some(stored) => {
                article.published_at = stored.published_at;
                article.full_content = stored.full_content.clone();
                article.author = stored.author.clone();
                article.word_count = stored.word_count;
            }
            None => new_articles.push(article.clone()),
        }
        articles.push(article);
    }

    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    Reconciled {
        articles,
        new_articles,
    }
}
