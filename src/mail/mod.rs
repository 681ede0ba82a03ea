/*!
Email delivery through the Gmail REST API.

The composed digest is wrapped in a MIME text/html message, base64url
encoded per the API's transport requirement and submitted with a bearer
token from the credential chain. Every failure mode is logged and folded
into a [`SendOutcome`]; delivery problems never crash the run.
*/

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chrono::Local;
use reqwest::Client;
use tracing::{error, info};

pub mod auth;

use self::auth::CredentialChain;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// What happened to a delivery attempt. Skips are normal outcomes, not
/// errors; the pipeline only logs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// No recipient configured; nothing was attempted.
    NoRecipient,
    /// No usable credential could be resolved.
    NoCredential,
    /// The message was built but submission failed.
    Failed,
}

pub struct Notifier {
    http: Client,
    recipient: Option<String>,
    credentials: CredentialChain,
    api_base: String,
}

impl Notifier {
    pub fn new(http: Client, recipient: Option<String>, credentials: CredentialChain) -> Self {
        Self {
            http,
            recipient,
            credentials,
            api_base: GMAIL_API_BASE.to_string(),
        }
    }

    /// Points the notifier at a different API base, for tests.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Sends the digest to the configured recipient. Checks the recipient
    /// before touching authorization, so a misconfigured run fails fast and
    /// quietly.
    pub async fn send(&self, html: &str) -> SendOutcome {
        let recipient = match self.recipient.as_deref() {
            Some(r) if !r.trim().is_empty() => r,
            _ => {
                error!("no mail recipient configured, skipping delivery");
                return SendOutcome::NoRecipient;
            }
        };

        info!("authenticating with the mail API");
        let token = match self.credentials.resolve(&self.http).await {
            Ok(token) => token,
            Err(e) => {
                error!("authentication failed, email will not be sent: {:#}", e);
                return SendOutcome::NoCredential;
            }
        };

        let subject = format!("Daily Tech Digest – {}", Local::now().format("%Y-%m-%d"));
        let raw = build_raw_message(recipient, &subject, html);

        info!("sending email to {}", recipient);
        let url = format!("{}/users/me/messages/send", self.api_base);
        let result = self
            .http
            .post(&url)
            .bearer_auth(&token.token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("email sent successfully");
                SendOutcome::Sent
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!("mail API error {}: {}", status, body);
                SendOutcome::Failed
            }
            Err(e) => {
                error!("failed to submit email: {:#}", e);
                SendOutcome::Failed
            }
        }
    }
}

/// Builds the MIME message and encodes it the way the API transport expects.
fn build_raw_message(recipient: &str, subject: &str, html: &str) -> String {
    let message = format!(
        "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/html; charset=\"utf-8\"\r\n\r\n{}",
        recipient, subject, html
    );
    URL_SAFE.encode(message.as_bytes())
}
