use morningbyte::collector;
use morningbyte::config::{Config, DatabaseConfig, EmailConfig, FeedsConfig};
use morningbyte::llm::remote::RemoteLlmProvider;
use morningbyte::llm::LlmProvider;
use morningbyte::mail::auth::{CredentialChain, FileCredentials};
use morningbyte::mail::Notifier;
use morningbyte::pipeline::{self, PipelineOutcome};
use morningbyte::store::ArticleStore;

fn rss_feed(items: usize) -> String {
    let items: String = (1..=items)
        .map(|n| {
            format!(
                "<item><title>Story {n}</title><link>https://example.com/{n}</link>\
                 <description>Summary {n}</description></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Wire</title>{}</channel></rss>"#,
        items
    )
}

fn chat_response(content: &str) -> String {
    serde_json::json!({
        "model": "gemini-2.0-flash",
        "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
    })
    .to_string()
}

fn config_for(feed_urls: Vec<String>, db_path: &str) -> Config {
    Config {
        database: DatabaseConfig {
            path: db_path.to_string(),
        },
        feeds: FeedsConfig {
            urls: feed_urls,
            max_articles: None,
            fetch_timeout_seconds: Some(5),
        },
        llm: None,
        email: EmailConfig::default(),
    }
}

fn write_token_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("token.json");
    std::fs::write(
        &path,
        r#"{
            "token": "ya29.test",
            "refresh_token": "1//refresh",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "app.apps.googleusercontent.com",
            "client_secret": "secret",
            "scopes": ["https://www.googleapis.com/auth/gmail.send"],
            "expiry": "2030-01-01T00:00:00Z"
        }"#,
    )
    .expect("write token file");
    path
}

#[tokio::test]
async fn short_digest_aborts_before_the_notifier() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut feed_server = mockito::Server::new_async().await;
    let mut llm_server = mockito::Server::new_async().await;
    let mut gmail_server = mockito::Server::new_async().await;

    let _feed = feed_server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss_feed(3))
        .create_async()
        .await;
    let _llm = llm_server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_response(&"x".repeat(50)))
        .create_async()
        .await;
    let gmail = gmail_server
        .mock("POST", "/users/me/messages/send")
        .expect(0)
        .create_async()
        .await;

    let db_path = dir.path().join("digest.db");
    let config = config_for(
        vec![format!("{}/feed.xml", feed_server.url())],
        &db_path.to_string_lossy(),
    );
    let http = collector::build_http_client(5).expect("client");
    let store = ArticleStore::connect(&config.database.path)
        .await
        .expect("store");
    let provider = RemoteLlmProvider::new(llm_server.url(), "key", "gemini-2.0-flash");
    let notifier = Notifier::new(
        http.clone(),
        Some("reader@example.com".to_string()),
        CredentialChain::new(write_token_file(&dir)),
    )
    .with_api_base(gmail_server.url());

    let outcome = pipeline::run(
        &http,
        &config,
        Some(&store),
        Some(&provider as &dyn LlmProvider),
        &notifier,
    )
    .await;

    assert_eq!(outcome, PipelineOutcome::NoDigest);
    gmail.assert_async().await;
    // The collected batch was still persisted.
    assert_eq!(store.load_all().await.expect("load").len(), 3);
}

#[tokio::test]
async fn missing_recipient_skips_delivery() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut feed_server = mockito::Server::new_async().await;
    let mut llm_server = mockito::Server::new_async().await;
    let mut gmail_server = mockito::Server::new_async().await;

    let _feed = feed_server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss_feed(2))
        .create_async()
        .await;
    let _llm = llm_server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_response(&format!(
            "<table>{}</table>",
            "n".repeat(200)
        )))
        .create_async()
        .await;
    let gmail = gmail_server
        .mock("POST", "/users/me/messages/send")
        .expect(0)
        .create_async()
        .await;

    let db_path = dir.path().join("digest.db");
    let config = config_for(
        vec![format!("{}/feed.xml", feed_server.url())],
        &db_path.to_string_lossy(),
    );
    let http = collector::build_http_client(5).expect("client");
    let store = ArticleStore::connect(&config.database.path)
        .await
        .expect("store");
    let provider = RemoteLlmProvider::new(llm_server.url(), "key", "gemini-2.0-flash");
    let notifier = Notifier::new(http.clone(), None, CredentialChain::new(write_token_file(&dir)))
        .with_api_base(gmail_server.url());

    let outcome = pipeline::run(
        &http,
        &config,
        Some(&store),
        Some(&provider as &dyn LlmProvider),
        &notifier,
    )
    .await;

    assert_eq!(outcome, PipelineOutcome::DeliveryFailed);
    gmail.assert_async().await;
}

#[tokio::test]
async fn empty_collection_aborts_without_calling_the_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut feed_server = mockito::Server::new_async().await;
    let mut llm_server = mockito::Server::new_async().await;

    let _feed = feed_server
        .mock("GET", "/feed.xml")
        .with_status(500)
        .create_async()
        .await;
    let llm = llm_server
        .mock("POST", "/")
        .expect(0)
        .create_async()
        .await;

    let db_path = dir.path().join("digest.db");
    let config = config_for(
        vec![format!("{}/feed.xml", feed_server.url())],
        &db_path.to_string_lossy(),
    );
    let http = collector::build_http_client(5).expect("client");
    let store = ArticleStore::connect(&config.database.path)
        .await
        .expect("store");
    let provider = RemoteLlmProvider::new(llm_server.url(), "key", "gemini-2.0-flash");
    let notifier = Notifier::new(
        http.clone(),
        Some("reader@example.com".to_string()),
        CredentialChain::new(dir.path().join("token.json")),
    );

    let outcome = pipeline::run(
        &http,
        &config,
        Some(&store),
        Some(&provider as &dyn LlmProvider),
        &notifier,
    )
    .await;

    assert_eq!(outcome, PipelineOutcome::NoArticles);
    llm.assert_async().await;
}

#[tokio::test]
async fn full_run_sends_the_newsletter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut feed_server = mockito::Server::new_async().await;
    let mut llm_server = mockito::Server::new_async().await;
    let mut gmail_server = mockito::Server::new_async().await;

    let _feed = feed_server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss_feed(4))
        .create_async()
        .await;
    let _llm = llm_server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_response(&format!(
            "<table><tr><td>{}</td></tr></table>",
            "MorningByte ".repeat(20)
        )))
        .create_async()
        .await;
    let gmail = gmail_server
        .mock("POST", "/users/me/messages/send")
        .match_header("authorization", "Bearer ya29.test")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "msg-1", "labelIds": ["SENT"]}"#)
        .create_async()
        .await;

    let token_path = write_token_file(&dir);
    let db_path = dir.path().join("digest.db");
    let config = config_for(
        vec![format!("{}/feed.xml", feed_server.url())],
        &db_path.to_string_lossy(),
    );
    let http = collector::build_http_client(5).expect("client");
    let store = ArticleStore::connect(&config.database.path)
        .await
        .expect("store");
    let provider = RemoteLlmProvider::new(llm_server.url(), "key", "gemini-2.0-flash");
    let notifier = Notifier::new(
        http.clone(),
        Some("reader@example.com".to_string()),
        CredentialChain::new(&token_path).with(FileCredentials::new(&token_path)),
    )
    .with_api_base(gmail_server.url());

    let outcome = pipeline::run(
        &http,
        &config,
        Some(&store),
        Some(&provider as &dyn LlmProvider),
        &notifier,
    )
    .await;

    assert_eq!(outcome, PipelineOutcome::Completed);
    gmail.assert_async().await;
    assert_eq!(store.load_all().await.expect("load").len(), 4);
}

#[tokio::test]
async fn unavailable_store_still_composes_and_delivers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut feed_server = mockito::Server::new_async().await;
    let mut llm_server = mockito::Server::new_async().await;
    let mut gmail_server = mockito::Server::new_async().await;

    let _feed = feed_server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(rss_feed(2))
        .create_async()
        .await;
    let _llm = llm_server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_response(&format!(
            "<table>{}</table>",
            "n".repeat(200)
        )))
        .create_async()
        .await;
    let gmail = gmail_server
        .mock("POST", "/users/me/messages/send")
        .with_status(200)
        .with_body(r#"{"id": "msg-2"}"#)
        .create_async()
        .await;

    let token_path = write_token_file(&dir);
    let config = config_for(
        vec![format!("{}/feed.xml", feed_server.url())],
        "unused.db",
    );
    let http = collector::build_http_client(5).expect("client");
    let provider = RemoteLlmProvider::new(llm_server.url(), "key", "gemini-2.0-flash");
    let notifier = Notifier::new(
        http.clone(),
        Some("reader@example.com".to_string()),
        CredentialChain::new(&token_path).with(FileCredentials::new(&token_path)),
    )
    .with_api_base(gmail_server.url());

    // No store at all; the run continues with the in-memory batch.
    let outcome = pipeline::run(
        &http,
        &config,
        None,
        Some(&provider as &dyn LlmProvider),
        &notifier,
    )
    .await;

    assert_eq!(outcome, PipelineOutcome::Completed);
    gmail.assert_async().await;
}
