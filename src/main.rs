/*
morningbyte - single-run pipeline binary.
Collects RSS news, persists the batch, asks the model for a newsletter and
mails it. Scheduling is external; this process runs once and exits.
*/

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use morningbyte::collector;
use morningbyte::config::{Config, LlmConfig};
use morningbyte::llm::remote::RemoteLlmProvider;
use morningbyte::llm::LlmProvider;
use morningbyte::mail::auth::{
    CredentialChain, EnvCredentials, FileCredentials, InteractiveCredentials,
};
use morningbyte::mail::Notifier;
use morningbyte::pipeline;
use morningbyte::store::ArticleStore;

#[derive(Parser, Debug)]
#[command(name = "morningbyte", about = "Daily RSS digest newsletter pipeline")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths: packaged defaults plus an optional override
    let default_path = PathBuf::from("config.default.toml");
    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            anyhow::bail!("Config file not found: {}", p.display());
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let mut config = Config::load_with_defaults(
        if default_path.exists() {
            Some(&default_path)
        } else {
            None
        },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;
    config.apply_env_overrides();
    info!(default = ?default_path, config_override = ?override_path, "configuration loaded");

    let http = collector::build_http_client(config.feeds.fetch_timeout_seconds.unwrap_or(10))?;

    // Every downstream failure degrades: a missing store or provider means a
    // shorter run, never a crash.
    let store = match ArticleStore::connect(&config.database.path).await {
        Ok(store) => Some(store),
        Err(e) => {
            error!("database connection failed: {:#}", e);
            None
        }
    };

    let provider = match create_llm_provider(config.llm.clone().unwrap_or_default()) {
        Ok(provider) => {
            info!("model provider initialized: {}", provider.model());
            Some(provider)
        }
        Err(e) => {
            error!("failed to initialize model provider: {:#}", e);
            None
        }
    };

    let notifier = build_notifier(&config, http.clone());

    let outcome = pipeline::run(
        &http,
        &config,
        store.as_ref(),
        provider.as_ref().map(|p| p as &dyn LlmProvider),
        &notifier,
    )
    .await;
    info!(?outcome, "pipeline run finished");

    Ok(())
}

/// Create the remote model provider from configuration; the API key comes
/// from the environment variable the config names.
fn create_llm_provider(cfg: LlmConfig) -> Result<RemoteLlmProvider> {
    let api_key_env = cfg.api_key_env.as_deref().unwrap_or("GEMINI_API_KEY");
    let api_key = std::env::var(api_key_env)
        .with_context(|| format!("LLM API key env var '{}' not set", api_key_env))?;

    let api_url = cfg.api_url.unwrap_or_else(|| {
        "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions".to_string()
    });
    let model = cfg.model.unwrap_or_else(|| "gemini-2.0-flash".to_string());

    Ok(RemoteLlmProvider::new(api_url, api_key, model).with_defaults(
        cfg.timeout_seconds.unwrap_or(120),
        cfg.max_tokens.unwrap_or(8192),
        0.7,
    ))
}

fn build_notifier(config: &Config, http: reqwest::Client) -> Notifier {
    let token_path = config
        .email
        .token_path
        .clone()
        .unwrap_or_else(|| "token.json".to_string());
    let secrets_path = config
        .email
        .client_secrets_path
        .clone()
        .unwrap_or_else(|| "credentials.json".to_string());
    let token_env = config
        .email
        .token_env
        .clone()
        .unwrap_or_else(|| "GMAIL_TOKEN_JSON".to_string());

    let chain = CredentialChain::new(&token_path)
        .with(FileCredentials::new(&token_path))
        .with(EnvCredentials::new(token_env))
        .with(InteractiveCredentials::new(secrets_path, http.clone()));

    Notifier::new(http, config.email.recipient.clone(), chain)
}
