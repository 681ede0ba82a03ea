/*!
The pipeline orchestrator.

One sequential pass: clear the store, collect, save, compose, deliver.
Component failures arrive as degraded results (empty batch, short digest,
skip outcomes) rather than propagated errors; the only decisions made here
are "is there anything to work with". A failed run produces no email and is
simply rerun by the external scheduler.
*/

use reqwest::Client;
use tracing::{error, info, warn};

use crate::collector;
use crate::config::Config;
use crate::digest;
use crate::llm::LlmProvider;
use crate::mail::{Notifier, SendOutcome};
use crate::store::ArticleStore;

/// Default cap on articles gathered per run; large enough that the model has
/// category-specific content to choose from.
pub const ARTICLE_LIMIT: usize = 200;

/// Digests shorter than this are treated as generation failures.
pub const MIN_DIGEST_CHARS: usize = 100;

/// How far a run got. Early exits are normal terminations, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    NoArticles,
    NoDigest,
    DeliveryFailed,
}

pub async fn run(
    http: &Client,
    config: &Config,
    store: Option<&ArticleStore>,
    provider: Option<&dyn LlmProvider>,
    notifier: &Notifier,
) -> PipelineOutcome {
    info!("starting daily newsletter pipeline");

    // Step 1: drop yesterday's batch so the store only ever holds fresh news
    match store {
        Some(store) => {
            if let Err(e) = store.clear().await {
                warn!("could not clear the article store: {:#}", e);
            }
        }
        None => warn!("article store unavailable, skipping clear"),
    }

    // Step 2: fetch a large pool so the model can fill its category quotas
    let limit = config.feeds.max_articles.unwrap_or(ARTICLE_LIMIT);
    let articles = collector::collect(http, &config.feeds.urls, limit).await;

    if articles.is_empty() {
        warn!("no articles found today, aborting pipeline");
        return PipelineOutcome::NoArticles;
    }

    // Step 3: persist the batch; the in-memory copy keeps the run going even
    // if the store is down
    if let Some(store) = store {
        if let Err(e) = store.save(&articles).await {
            error!("error saving articles: {:#}", e);
        }
    }

    // Step 4: compose the newsletter
    let digest = match provider {
        Some(provider) => digest::compose(provider, &articles).await,
        None => {
            error!("no model provider configured, cannot compose the digest");
            None
        }
    };

    let digest = match digest {
        Some(html) if html.chars().count() >= MIN_DIGEST_CHARS => html,
        _ => {
            error!("failed to generate valid newsletter content, aborting pipeline");
            return PipelineOutcome::NoDigest;
        }
    };

    // Step 5: deliver
    match notifier.send(&digest).await {
        SendOutcome::Sent => {
            info!("pipeline completed successfully");
            PipelineOutcome::Completed
        }
        outcome => {
            warn!("newsletter was composed but not delivered: {:?}", outcome);
            PipelineOutcome::DeliveryFailed
        }
    }
}
