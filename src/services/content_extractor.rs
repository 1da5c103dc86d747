use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::error::Result;
use crate::feed::cleaner::collapse_whitespace;
use crate::models::ExtractedContent;

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Text longer than this (in characters) is assumed to be article content.
pub const MIN_CONTENT_CHARS: usize = 128;

/// Blocks whose anchor text makes up this share or more are navigation.
pub const MAX_LINK_DENSITY: f64 = 0.3;

const NOISE_SELECTOR: &str = "script, style, nav, aside, footer, .advertisement, .ads, .comment";
const AUTHOR_SELECTOR: &str = "[rel='author'], .author, [itemprop='author']";

static HAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Han}").expect("valid regex"));
static LATIN_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-zA-Z]+").expect("valid regex"));
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));

/// Anything that can produce the main content of an article page.
pub trait PageExtractor: Send + Sync {
    fn extract(&self, url: &str) -> impl Future<Output = Result<ExtractedContent>> + Send;
}

pub struct ContentExtractor {
    client: Client,
}

impl ContentExtractor {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }
}

impl PageExtractor for ContentExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch {}: HTTP {}", url, response.status()).into());
        }

        let html = response.text().await?;
        let extracted = extract_from_html(&html);
        tracing::debug!(
            "Extracted {} words from {} ({} chars)",
            extracted.word_count,
            url,
            extracted.content.chars().count()
        );
        Ok(extracted)
    }
}

/// A block of text in a document tree that can be scored as a content candidate.
pub trait TextBlock {
    /// All text inside the block.
    fn text(&self) -> String;
    /// Text inside the block's anchors.
    fn link_text(&self) -> String;
}

impl TextBlock for ElementRef<'_> {
    fn text(&self) -> String {
        ElementRef::text(self).collect()
    }

    fn link_text(&self) -> String {
        self.select(&ANCHOR_SELECTOR)
            .flat_map(|a| ElementRef::text(&a))
            .collect()
    }
}

/// Share of a block's characters that sit inside links.
pub fn link_density(text: &str, link_text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    link_text.chars().count() as f64 / total as f64
}

/// Pick the longest block above [`MIN_CONTENT_CHARS`] whose link density is
/// below [`MAX_LINK_DENSITY`]. Ties keep the earlier block.
pub fn best_block<B: TextBlock>(blocks: impl IntoIterator<Item = B>) -> Option<String> {
    let mut best: Option<String> = None;
    let mut best_len = 0;

    for block in blocks {
        let text = block.text();
        let len = text.chars().count();
        if len <= best_len || len <= MIN_CONTENT_CHARS {
            continue;
        }

        if link_density(&text, &block.link_text()) < MAX_LINK_DENSITY {
            best_len = len;
            best = Some(text);
        }
    }

    best
}

/// Mixed CJK/Latin word count: Han code points plus runs of Latin letters.
pub fn count_words(text: &str) -> usize {
    HAN_RE.find_iter(text).count() + LATIN_WORD_RE.find_iter(text).count()
}

/// Extract title, author and main content from a page.
pub fn extract_from_html(html: &str) -> ExtractedContent {
    let mut document = Html::parse_document(html);
    remove_noise(&mut document);

    let title = first_text(&document, "h1")
        .or_else(|| first_text(&document, "title"))
        .unwrap_or_default();
    let author = first_text(&document, AUTHOR_SELECTOR).unwrap_or_default();
    let content = main_content(&document);

    ExtractedContent {
        title,
        author,
        word_count: count_words(&content),
        content: collapse_whitespace(&content),
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

fn remove_noise(document: &mut Html) {
    let noise = selector(NOISE_SELECTOR);
    let ids: Vec<_> = document.select(&noise).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let sel = selector(css);
    document
        .select(&sel)
        .next()
        .map(|el| TextBlock::text(&el).trim().to_string())
        .filter(|text| !text.is_empty())
}

fn main_content(document: &Html) -> String {
    for tag in ["article", "main"] {
        let sel = selector(tag);
        let text: String = document
            .select(&sel)
            .map(|el| TextBlock::text(&el))
            .collect();
        if text.chars().count() > MIN_CONTENT_CHARS {
            return text;
        }
    }

    let divs = selector("div");
    best_block(document.select(&divs)).unwrap_or_default()
}
