use url::Url;

use crate::db::Repository;
use crate::models::SETTING_API_KEY;

pub const USAGE: &str = "Commands:
  add <url>        subscribe to a feed
  rm <url>         unsubscribe (alias: remove)
  apikey <key>     store the LLM API key
  config           show API key and feeds (alias: list)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Remove(String),
    ApiKey(String),
    Config,
}

impl Command {
    /// Parse a command line. `Err` carries the message to show instead.
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut parts = input.split_whitespace();
        let Some(verb) = parts.next() else {
            return Err(USAGE.to_string());
        };
        let arg = parts.next();

        match verb.to_lowercase().as_str() {
            "add" => {
                let url = arg.ok_or("Usage: add <url>")?;
                validate_feed_url(url)?;
                Ok(Command::Add(url.to_string()))
            }
            "rm" | "remove" => {
                let url = arg.ok_or("Usage: rm <url>")?;
                Ok(Command::Remove(url.to_string()))
            }
            "apikey" => {
                let key = arg.ok_or("Usage: apikey <key>")?;
                Ok(Command::ApiKey(key.to_string()))
            }
            "config" | "list" => Ok(Command::Config),
            other => Err(format!("Unknown command: {other}\n\n{USAGE}")),
        }
    }
}

fn validate_feed_url(input: &str) -> Result<(), String> {
    match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(()),
        _ => Err(format!("Invalid feed URL: {input} (expected http:// or https://)")),
    }
}

/// Apply a command to the store and describe the outcome.
pub async fn execute(command: Command, repository: &Repository, fallback_key: Option<&str>) -> String {
    match command {
        Command::Add(url) => {
            let message = match repository.get_feed(&url).await {
                Ok(Some(feed)) if !feed.dismissed => format!(
                    "Already subscribed since {}: {url}",
                    feed.created_at.format("%Y-%m-%d")
                ),
                Ok(existing) => match repository.add_feed(&url).await {
                    Ok(()) => match existing {
                        Some(feed) => format!(
                            "Resubscribed (removed {}): {url}",
                            feed.updated_at.format("%Y-%m-%d")
                        ),
                        None => format!("Added feed: {url}"),
                    },
                    Err(e) => format!("Failed to add feed: {e}"),
                },
                Err(e) => format!("Failed to add feed: {e}"),
            };
            format!("{message}\n\n{}", describe(repository, fallback_key).await)
        }
        Command::Remove(url) => {
            let message = match repository.remove_feed(&url).await {
                Ok(true) => format!("Removed feed: {url}"),
                Ok(false) => format!("Not subscribed: {url}"),
                Err(e) => format!("Failed to remove feed: {e}"),
            };
            format!("{message}\n\n{}", describe(repository, fallback_key).await)
        }
        Command::ApiKey(key) => match repository.set_setting(SETTING_API_KEY, &key).await {
            Ok(()) => "API key set successfully.".to_string(),
            Err(e) => format!("Failed to set API key: {e}"),
        },
        Command::Config => describe(repository, fallback_key).await,
    }
}

/// Masked API key followed by the numbered feed list.
async fn describe(repository: &Repository, fallback_key: Option<&str>) -> String {
    let stored = match repository.get_setting(SETTING_API_KEY).await {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!("Failed to read API key: {}", e);
            None
        }
    };
    let key = stored
        .as_deref()
        .or(fallback_key)
        .filter(|k| !k.trim().is_empty())
        .map(mask_api_key)
        .unwrap_or_else(|| "Not set".to_string());

    let feeds = match repository.list_feeds().await {
        Ok(feeds) => feeds,
        Err(e) => return format!("API Key: {key}\n\nFailed to list feeds: {e}"),
    };

    if feeds.is_empty() {
        return format!("API Key: {key}\n\nNo feeds subscribed.");
    }

    let mut out = format!("API Key: {key}\n\nFeeds:\n");
    for (i, feed) in feeds.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, feed));
    }
    out
}

pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
