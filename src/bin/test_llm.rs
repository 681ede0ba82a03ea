//! Standalone model-connectivity check against OpenRouter.
//! Not part of the pipeline; run it to verify the alternate provider key
//! before wiring it into a deployment.

use morningbyte::llm::remote::RemoteLlmProvider;
use morningbyte::llm::{LlmProvider, LlmRequest};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("\n{}", "=".repeat(60));
    println!("LLM Connection Test");
    println!("{}", "=".repeat(60));

    let api_key = match std::env::var("OPENROUTER_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            eprintln!("ERROR: OPENROUTER_API_KEY is not set");
            return;
        }
    };

    let masked = if api_key.len() > 12 {
        format!("{}...{}", &api_key[..8], &api_key[api_key.len() - 4..])
    } else {
        "INVALID KEY LENGTH".to_string()
    };
    println!("Using API Key: {}", masked);

    if api_key.starts_with("sk-proj-") {
        println!("\nWARNING: this looks like an OpenAI project key (starts with 'sk-proj-').");
        println!("OpenRouter will reject it; get a key from https://openrouter.ai/keys");
        println!("or point LLM_BASE_URL at the official OpenAI API.\n");
    } else if api_key.starts_with("sk-or-v1-") {
        println!("Key format looks correct for OpenRouter.");
    }

    let base_url = std::env::var("LLM_BASE_URL")
        .unwrap_or_else(|_| "https://openrouter.ai/api/v1/chat/completions".to_string());
    let model = std::env::var("LLM_MODEL")
        .unwrap_or_else(|_| "qwen/qwen-2.5-coder-32b-instruct".to_string());

    println!("Base URL: {}", base_url);
    println!("Model: {}", model);
    println!("Attempting to connect...");

    let provider = RemoteLlmProvider::new(&base_url, &api_key, &model).with_defaults(30, 200, 0.7);

    let request = LlmRequest {
        prompt: "Say 'Hello!' if you can hear me.".to_string(),
        max_tokens: Some(50),
        temperature: None,
        timeout_seconds: Some(30),
    };

    match provider.generate(request).await {
        Ok(response) => {
            println!("\nSUCCESS! Response received:");
            println!("{}", response.content);
            println!(
                "({} tokens, model {})",
                response.usage.total_tokens, response.model
            );
        }
        Err(e) => {
            eprintln!("\nFAILED. Error details:");
            eprintln!("{:#}", e);
            eprintln!("\nTip: a '401 Unauthorized' means the key is invalid for this endpoint.");
        }
    }

    println!("\n{}", "=".repeat(60));
}
