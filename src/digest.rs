/*!
Digest composition.

Turns the collected batch into one HTML newsletter by handing the model a
fixed instruction payload. The selection policy (20 articles, 5 per
category, overflow fill) lives entirely in the prompt; the model's choice is
trusted and never re-validated here.
*/

use tracing::{error, info, warn};

use crate::article::Article;
use crate::llm::{strip_code_fences, LlmProvider, LlmRequest};

/// Returned when generation fails, so the pipeline still has something to
/// decide on. Deliberately under the minimum-length gate: this fragment is
/// never mailed.
pub const FALLBACK_HTML: &str =
    "<h1>Details Unavailable</h1><p>Sorry, the newsletter could not be generated today.</p>";

/// Composes the newsletter HTML. Returns `None` for an empty batch without
/// calling the model; a model failure yields [`FALLBACK_HTML`] instead of an
/// error.
pub async fn compose(provider: &dyn LlmProvider, articles: &[Article]) -> Option<String> {
    if articles.is_empty() {
        warn!("no articles provided, skipping newsletter generation");
        return None;
    }

    info!("sending {} articles to the model", articles.len());

    let request = LlmRequest {
        prompt: build_prompt(articles),
        max_tokens: None,
        temperature: None,
        timeout_seconds: None,
    };

    match provider.generate(request).await {
        Ok(response) => {
            let html = strip_code_fences(&response.content);
            info!(
                "newsletter HTML generated ({} chars, {} tokens, model {})",
                html.len(),
                response.usage.total_tokens,
                response.model
            );
            Some(html)
        }
        Err(e) => {
            error!("newsletter generation failed: {:#}", e);
            Some(FALLBACK_HTML.to_string())
        }
    }
}

fn story_blocks(articles: &[Article]) -> String {
    let mut blocks = String::new();
    for (i, article) in articles.iter().enumerate() {
        blocks.push_str(&format!("\n--- Story {} ---\n", i + 1));
        blocks.push_str(&format!("Headline: {}\n", article.title));
        blocks.push_str(&format!("Source: {}\n", article.source));
        blocks.push_str(&format!("Link: {}\n", article.url));
        blocks.push_str(&format!("Image: {}\n", article.image_url));
        blocks.push_str(&format!("Summary: {}\n", article.summary));
    }
    blocks
}

fn build_prompt(articles: &[Article]) -> String {
    format!(
        r#"You are a professional technology newspaper editor.

Write a 'MorningByte' HTML email newsletter based on the stories below.

### Design Requirements:
- Use a clean, table-based HTML layout (compatible with Gmail/Outlook).
- Styling: Inline CSS, Sans-serif fonts, professional "Newspaper" look.
- Header: A bold masthead titled 'MorningByte'.
- Layout: Use horizontal separators between sections.

### Content Rules:
Select exactly **20 articles** from the provided data, categorized strictly as follows:
1. **Anime & Manga** (5 articles)
2. **Artificial Intelligence (AI)** (5 articles)
3. **Gaming** (5 articles)
4. **Coding & Development** (5 articles)

If there are not enough articles in a category to meet the quota, select the most relevant remaining tech news to fill the gap, but prioritize the specific categories requested.

For each story:
   - Display the **Title** as a bold link.
   - If a valid 'Image' URL exists (not 'NONE'), show it (Max width: 600px, rounded corners).
   - Write a 2-sentence summary in a neutral, journalistic tone.
   - Mention the source (e.g., "via TechCrunch").

### Data:
{}

**IMPORTANT:** Output ONLY raw HTML code. Do not include markdown formatting like ```html.
"#,
        story_blocks(articles)
    )
}
