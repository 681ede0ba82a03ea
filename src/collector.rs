use anyhow::{Context, Result};
use chrono::Utc;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

use crate::article::{Article, NO_IMAGE, SUMMARY_MAX_CHARS};

/// Builds the blocking-per-call HTTP client shared by the pipeline.
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("morningbyte/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build reqwest client")
}

/// Fetches a feed from the given URL and parses it.
pub async fn fetch_and_parse_feed(client: &Client, url: &str) -> Result<Feed> {
    let response = client
        .get(url)
        .send()
        .await
        .context("network error during fetch")?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("feed fetch failed with status: {}", status);
    }

    let bytes = response.bytes().await.context("failed to read response body")?;
    parser::parse(bytes.as_ref()).context("failed to parse feed")
}

/// Collects up to `limit` articles across the configured sources.
///
/// Sources are deduplicated before fetching. Collection short-circuits
/// globally once the limit is reached, skipping remaining entries and
/// remaining sources. A source that fails to fetch or parse is logged and
/// skipped; an empty result means "nothing to do", never an error.
pub async fn collect(client: &Client, sources: &[String], limit: usize) -> Vec<Article> {
    let mut seen = HashSet::new();
    let sources: Vec<&str> = sources
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .filter(|u| seen.insert(*u))
        .collect();

    if sources.is_empty() {
        warn!("no feed sources configured, nothing to collect");
        return Vec::new();
    }

    info!("scanning {} sources for news", sources.len());
    let mut collected: Vec<Article> = Vec::new();

    for url in sources {
        if collected.len() >= limit {
            info!("collected {} articles, stopping fetch", collected.len());
            break;
        }

        match fetch_and_parse_feed(client, url).await {
            Ok(feed) => {
                let source = feed
                    .title
                    .as_ref()
                    .map(|t| t.content.clone())
                    .unwrap_or_else(|| "Unknown Source".to_string());

                for entry in &feed.entries {
                    if collected.len() >= limit {
                        break;
                    }
                    collected.push(article_from_entry(entry, &source));
                }
            }
            Err(e) => {
                warn!("failed to read feed {}: {:#}", url, e);
            }
        }
    }

    info!("total articles gathered: {}", collected.len());
    collected
}

fn article_from_entry(entry: &Entry, source: &str) -> Article {
    let now = Utc::now();

    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_else(|| "No Title".to_string());

    let url = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_else(|| "#".to_string());

    let summary = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .unwrap_or_else(|| "No summary".to_string());

    Article {
        title,
        summary: truncate_chars(&summary, SUMMARY_MAX_CHARS),
        url,
        image_url: extract_image_url(entry),
        source: source.to_string(),
        published_at: entry.published.or(entry.updated).unwrap_or(now),
        created_at: now,
    }
}

/// Picks an image for the entry. Priority: media content, media thumbnail,
/// image-typed enclosure. Falls back to the NONE sentinel.
fn extract_image_url(entry: &Entry) -> String {
    if let Some(url) = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .find_map(|c| c.url.as_ref())
    {
        return url.to_string();
    }

    if let Some(thumb) = entry.media.iter().flat_map(|m| m.thumbnails.iter()).next() {
        return thumb.image.uri.clone();
    }

    // RSS enclosures surface as entry content with a src link
    if let Some(content) = entry.content.as_ref() {
        if let Some(src) = content.src.as_ref() {
            if content.content_type.essence_str().starts_with("image/") {
                return src.href.clone();
            }
        }
    }

    // Atom enclosures are links with rel="enclosure"
    if let Some(link) = entry.links.iter().find(|l| {
        l.rel.as_deref() == Some("enclosure")
            && l.media_type
                .as_deref()
                .map(|t| t.starts_with("image/"))
                .unwrap_or(false)
    }) {
        return link.href.clone();
    }

    NO_IMAGE.to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
