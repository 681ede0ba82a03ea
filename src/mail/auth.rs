/*!
Mail credential resolution.

The notifier never touches the filesystem or a browser directly; it sees a
[`CredentialChain`] of [`CredentialProvider`]s tried in order. The standard
chain is: saved token file, token JSON from the environment (persisted
locally for reuse), interactive browser consent (only viable where a browser
and a loopback port are available). An expired token with a refresh token is
refreshed transparently and written back.
*/

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};
use url::Url;

/// The only permission the pipeline needs.
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Google "authorized user" token JSON, as written by the standard client
/// libraries into token.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailToken {
    /// Current access token.
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl GmailToken {
    /// Treats a token within a minute of expiry as expired, so a send never
    /// races the deadline. Tokens without an expiry are assumed live.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= Utc::now() + Duration::seconds(60),
            None => false,
        }
    }
}

/// One way of obtaining a mail credential. `Ok(None)` means "not available
/// here, try the next provider"; `Err` means the provider was available but
/// broke.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &'static str;

    async fn resolve(&self) -> Result<Option<GmailToken>>;

    /// Whether a token from this provider should be persisted for reuse.
    fn persist_on_success(&self) -> bool {
        false
    }
}

/// Reads a previously saved token file.
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for FileCredentials {
    fn name(&self) -> &'static str {
        "token file"
    }

    async fn resolve(&self) -> Result<Option<GmailToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read token file {}", self.path.display()))?;
        match serde_json::from_str::<GmailToken>(&data) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(
                    "local token file {} seems corrupt: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }
}

/// Decodes a token from an environment variable. Critical for headless CI
/// runs, where no token file survives between invocations.
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for EnvCredentials {
    fn name(&self) -> &'static str {
        "environment variable"
    }

    async fn resolve(&self) -> Result<Option<GmailToken>> {
        let raw = match std::env::var(&self.var) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => return Ok(None),
        };
        info!("loading mail credentials from environment variable {}", self.var);
        let token = serde_json::from_str::<GmailToken>(&raw)
            .with_context(|| format!("failed to parse token JSON from {}", self.var))?;
        Ok(Some(token))
    }

    fn persist_on_success(&self) -> bool {
        true
    }
}

/// OAuth client secrets file, "installed app" flavor.
#[derive(Debug, Deserialize)]
struct ClientSecrets {
    installed: InstalledApp,
}

#[derive(Debug, Deserialize)]
struct InstalledApp {
    client_id: String,
    client_secret: String,
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

/// Interactive browser consent against a loopback redirect. Only works where
/// a browser and a local port are available; headless environments fall
/// through with a logged message.
pub struct InteractiveCredentials {
    client_secrets_path: PathBuf,
    http: Client,
}

impl InteractiveCredentials {
    pub fn new(client_secrets_path: impl Into<PathBuf>, http: Client) -> Self {
        Self {
            client_secrets_path: client_secrets_path.into(),
            http,
        }
    }

    async fn run_local_flow(&self, app: &InstalledApp) -> Result<GmailToken> {
        let listener = match TcpListener::bind(("127.0.0.1", 8080)).await {
            Ok(l) => l,
            Err(_) => {
                warn!("port 8080 busy, trying an ephemeral port");
                TcpListener::bind(("127.0.0.1", 0))
                    .await
                    .context("failed to bind loopback listener")?
            }
        };
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://localhost:{}/", port);

        let mut auth_url =
            Url::parse(&app.auth_uri).context("invalid auth_uri in client secrets")?;
        auth_url
            .query_pairs_mut()
            .append_pair("client_id", &app.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", GMAIL_SEND_SCOPE)
            // offline access plus forced consent, so a refresh token is
            // issued and unattended runs keep working past the first hour
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        info!("open this URL in a browser to authorize: {}", auth_url);

        let (mut stream, _) = listener
            .accept()
            .await
            .context("no authorization redirect received")?;

        let mut buf = vec![0u8; 8192];
        let n = stream
            .read(&mut buf)
            .await
            .context("failed to read authorization redirect")?;
        let request = String::from_utf8_lossy(&buf[..n]).to_string();

        let code = extract_auth_code(&request)
            .context("authorization redirect carried no code parameter")?;

        let _ = stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n\
                  Authorization received. You can close this tab.",
            )
            .await;

        self.exchange_code(app, &code, &redirect_uri).await
    }

    async fn exchange_code(
        &self,
        app: &InstalledApp,
        code: &str,
        redirect_uri: &str,
    ) -> Result<GmailToken> {
        #[derive(Serialize)]
        struct ExchangeForm<'a> {
            code: &'a str,
            client_id: &'a str,
            client_secret: &'a str,
            redirect_uri: &'a str,
            grant_type: &'a str,
        }

        #[derive(Deserialize)]
        struct ExchangeResponse {
            access_token: String,
            refresh_token: Option<String>,
            expires_in: i64,
        }

        let response = self
            .http
            .post(&app.token_uri)
            .form(&ExchangeForm {
                code,
                client_id: &app.client_id,
                client_secret: &app.client_secret,
                redirect_uri,
                grant_type: "authorization_code",
            })
            .send()
            .await
            .context("authorization code exchange failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("token endpoint error {}: {}", status, body);
        }

        let body: ExchangeResponse = response
            .json()
            .await
            .context("failed to parse token endpoint response")?;

        Ok(GmailToken {
            token: body.access_token,
            refresh_token: body.refresh_token,
            token_uri: app.token_uri.clone(),
            client_id: app.client_id.clone(),
            client_secret: app.client_secret.clone(),
            scopes: vec![GMAIL_SEND_SCOPE.to_string()],
            expiry: Some(Utc::now() + Duration::seconds(body.expires_in)),
        })
    }
}

#[async_trait::async_trait]
impl CredentialProvider for InteractiveCredentials {
    fn name(&self) -> &'static str {
        "interactive consent"
    }

    async fn resolve(&self) -> Result<Option<GmailToken>> {
        if !self.client_secrets_path.exists() {
            warn!(
                "client secrets file {} is missing, cannot start interactive login",
                self.client_secrets_path.display()
            );
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&self.client_secrets_path)
            .await
            .with_context(|| {
                format!(
                    "failed to read client secrets {}",
                    self.client_secrets_path.display()
                )
            })?;
        let secrets: ClientSecrets =
            serde_json::from_str(&data).context("failed to parse client secrets JSON")?;

        info!("starting interactive browser login");
        let token = self.run_local_flow(&secrets.installed).await?;
        Ok(Some(token))
    }

    fn persist_on_success(&self) -> bool {
        true
    }
}

fn extract_auth_code(request: &str) -> Option<String> {
    let request_line = request.lines().next()?;
    let path = request_line.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{}", path)).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
}

/// Exchanges a refresh token for a fresh access token at the token endpoint.
pub async fn refresh(http: &Client, mut token: GmailToken) -> Result<GmailToken> {
    #[derive(Serialize)]
    struct RefreshForm<'a> {
        client_id: &'a str,
        client_secret: &'a str,
        refresh_token: &'a str,
        grant_type: &'a str,
    }

    #[derive(Deserialize)]
    struct RefreshResponse {
        access_token: String,
        expires_in: i64,
    }

    let refresh_token = token
        .refresh_token
        .clone()
        .context("token has no refresh capability")?;

    let response = http
        .post(&token.token_uri)
        .form(&RefreshForm {
            client_id: &token.client_id,
            client_secret: &token.client_secret,
            refresh_token: &refresh_token,
            grant_type: "refresh_token",
        })
        .send()
        .await
        .context("token refresh request failed")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("token refresh error {}: {}", status, body);
    }

    let body: RefreshResponse = response
        .json()
        .await
        .context("failed to parse refresh response")?;

    token.token = body.access_token;
    token.expiry = Some(Utc::now() + Duration::seconds(body.expires_in));
    Ok(token)
}

/// Ordered list of providers plus the path refreshed or newly acquired
/// tokens are persisted to.
pub struct CredentialChain {
    providers: Vec<Box<dyn CredentialProvider>>,
    token_path: PathBuf,
}

impl CredentialChain {
    pub fn new(token_path: impl Into<PathBuf>) -> Self {
        Self {
            providers: Vec::new(),
            token_path: token_path.into(),
        }
    }

    pub fn with(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Walks the chain until a live token is found. Provider failures and
    /// unrefreshable expired tokens fall through to the next variant.
    pub async fn resolve(&self, http: &Client) -> Result<GmailToken> {
        for provider in &self.providers {
            match provider.resolve().await {
                Ok(Some(token)) => {
                    let token = if token.is_expired() {
                        if token.refresh_token.is_some() {
                            info!("refreshing expired access token ({})", provider.name());
                            match refresh(http, token).await {
                                Ok(refreshed) => {
                                    persist_token(&self.token_path, &refreshed).await;
                                    refreshed
                                }
                                Err(e) => {
                                    warn!(
                                        "token refresh via {} failed: {:#}",
                                        provider.name(),
                                        e
                                    );
                                    continue;
                                }
                            }
                        } else {
                            warn!(
                                "credential from {} is expired and has no refresh token",
                                provider.name()
                            );
                            continue;
                        }
                    } else {
                        if provider.persist_on_success() {
                            persist_token(&self.token_path, &token).await;
                        }
                        token
                    };
                    info!("mail credential resolved via {}", provider.name());
                    return Ok(token);
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!("credential provider {} failed: {:#}", provider.name(), e);
                    continue;
                }
            }
        }
        anyhow::bail!("no valid mail credential found in file, environment, or interactive flow")
    }
}

async fn persist_token(path: &Path, token: &GmailToken) {
    match serde_json::to_string_pretty(token) {
        Ok(json) => {
            if let Err(e) = tokio::fs::write(path, json).await {
                warn!("could not persist token to {}: {}", path.display(), e);
            }
        }
        Err(e) => warn!("could not serialize token for persistence: {}", e),
    }
}
