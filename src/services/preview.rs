use chrono::Local;

use crate::models::{Article, ExtractedContent};

const WRAP_WIDTH: usize = 80;

/// Preview built from extracted page content.
pub fn render_full(article: &Article, extracted: &ExtractedContent) -> String {
    let mut out = String::new();

    out.push_str(article.title.trim());
    out.push_str("\n\n");

    if !extracted.author.trim().is_empty() {
        out.push_str(&format!("Author: {}\n", extracted.author.trim()));
    }
    push_meta(&mut out, article);
    if extracted.word_count > 0 {
        out.push_str(&format!("Words: {}\n", extracted.word_count));
    }
    out.push_str(&format!("Link: {}\n\n", article.url));

    out.push_str("Content:\n");
    out.push_str(&textwrap::fill(extracted.content.trim(), WRAP_WIDTH));
    out
}

/// Preview from feed data only, used when the page could not be extracted.
pub fn render_basic(article: &Article) -> String {
    let mut out = String::new();
    out.push_str(article.title.trim());
    out.push_str("\n\n");
    push_meta(&mut out, article);
    out.push_str(&format!("Link: {}\n\n", article.url));

    out.push_str("Summary:\n");
    if article.content.trim().is_empty() {
        out.push_str("(no summary available)");
    } else {
        out.push_str(&textwrap::fill(article.content.trim(), WRAP_WIDTH));
    }
    out
}

fn push_meta(out: &mut String, article: &Article) {
    out.push_str(&format!("Source: {}\n", article.source));
    out.push_str(&format!(
        "Published: {}\n",
        article
            .published_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
    ));
}
