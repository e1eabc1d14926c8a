//! Content writing step.
//!
//! Builds a writing prompt from the keyword, the brief, and the brand
//! settings, calls the LLM, and parses the completion into the four content
//! fields. `word_count` is always derived from the parsed fields, never
//! trusted from the model. Failures mark the page failed and are folded into
//! the returned outcome.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use seoforge_integrations::{extract_json, LlmClient};
use seoforge_store::Store;
use seoforge_types::{
    BrandSettings, ContentBrief, ContentStatus, CoreResult, CrawledPage, PageContent, PromptLog,
    PromptStep,
};
use seoforge_quality::content_word_count;

const WRITER_SYSTEM_PROMPT: &str = "\
You are an SEO copywriter for e-commerce collection pages. Write natural, \
specific copy that serves shoppers; work target phrases in only where they \
read naturally. Use simple HTML (<p>, <h2>, <h3>) in the description fields \
and plain text elsewhere. Respond with JSON only: {\"page_title\": ..., \
\"meta_description\": ..., \"top_description\": ..., \"bottom_description\": ...}";

const WRITER_MAX_TOKENS: u32 = 4000;
const WRITER_TEMPERATURE: f32 = 0.7;

/// Result of the writing step.
#[derive(Debug, Clone)]
pub struct WritingOutcome {
    pub success: bool,
    pub page_content: Option<PageContent>,
    pub error: Option<String>,
}

/// Write content for one page. On success the returned `PageContent` has the
/// four fields and a derived word count persisted; on failure the page is
/// marked failed with the error in `qa_results`.
pub async fn generate_content(
    store: &dyn Store,
    llm: &LlmClient,
    page: &CrawledPage,
    brief: Option<&ContentBrief>,
    brand: &BrandSettings,
    keyword: &str,
) -> CoreResult<WritingOutcome> {
    let mut content = store.ensure_page_content(page.id).await?;
    content.status = ContentStatus::Writing;
    store.save_page_content(content.clone()).await?;

    let user_prompt = build_writing_prompt(page, brief, brand, keyword);
    let completion = llm
        .complete(
            &user_prompt,
            Some(WRITER_SYSTEM_PROMPT),
            WRITER_MAX_TOKENS,
            WRITER_TEMPERATURE,
        )
        .await;

    store
        .append_prompt_log(PromptLog::new(
            content.id,
            PromptStep::Writing,
            "user",
            user_prompt,
            completion
                .text
                .clone()
                .or_else(|| completion.error.clone())
                .unwrap_or_default(),
        ))
        .await?;

    if !completion.success {
        let error = completion
            .error
            .unwrap_or_else(|| "completion failed".to_string());
        return fail_content(store, content, error).await;
    }

    let text = completion.text.unwrap_or_default();
    let parsed: Value = match serde_json::from_str(extract_json(&text)) {
        Ok(value) => value,
        Err(err) => {
            warn!(page_id = %page.id, error = %err, "writer returned unparseable content");
            return fail_content(store, content, format!("unparseable writer output: {err}"))
                .await;
        }
    };

    let field = |name: &str| {
        parsed
            .get(name)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    content.page_title = field("page_title");
    content.meta_description = field("meta_description");
    content.top_description = field("top_description");
    content.bottom_description = field("bottom_description");

    if content.content_fields().iter().all(|(_, v)| v.is_none()) {
        return fail_content(store, content, "writer output contained no content fields".to_string()).await;
    }

    content.word_count = content_word_count(&content);
    // Regenerated content always needs fresh review.
    content.is_approved = false;
    content.approved_at = None;
    store.save_page_content(content.clone()).await?;

    info!(
        page_id = %page.id,
        word_count = content.word_count,
        input_tokens = completion.input_tokens,
        output_tokens = completion.output_tokens,
        "content written"
    );

    Ok(WritingOutcome {
        success: true,
        page_content: Some(content),
        error: None,
    })
}

async fn fail_content(
    store: &dyn Store,
    mut content: PageContent,
    error: String,
) -> CoreResult<WritingOutcome> {
    content.status = ContentStatus::Failed;
    content.qa_results = Some(json!({"error": error}));
    content.generation_completed_at = Some(Utc::now());
    store.save_page_content(content.clone()).await?;
    Ok(WritingOutcome {
        success: false,
        page_content: Some(content),
        error: Some(error),
    })
}

fn build_writing_prompt(
    page: &CrawledPage,
    brief: Option<&ContentBrief>,
    brand: &BrandSettings,
    keyword: &str,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    sections.push(format!("Target keyword: {keyword}"));
    sections.push(format!("Page URL: {}", page.normalized_url));
    if let Some(title) = &page.title {
        sections.push(format!("Current title: {title}"));
    }

    if let Some(name) = &brand.brand_name {
        sections.push(format!("Brand: {name}"));
    }
    if let Some(tone) = &brand.tone {
        sections.push(format!("Tone: {tone}"));
    }
    if !brand.vocabulary.banned.is_empty() {
        sections.push(format!(
            "Never use these phrases: {}",
            brand.vocabulary.banned.join(", ")
        ));
    }

    if let Some(brief) = brief {
        if let Some(target) = brief.word_count_target {
            let range = match (brief.word_count_min, brief.word_count_max) {
                (Some(min), Some(max)) => format!(" (competitors range {min}-{max})"),
                _ => String::new(),
            };
            sections.push(format!("Word count target: {target}{range}"));
        }
        if !brief.lsi_terms.is_empty() {
            let terms: Vec<String> = brief
                .lsi_terms
                .iter()
                .take(20)
                .map(|t| format!("{} (target {})", t.phrase, t.target_count))
                .collect();
            sections.push(format!("Related terms to weave in:\n{}", terms.join("\n")));
        }
        if !brief.related_questions.is_empty() {
            sections.push(format!(
                "Questions shoppers ask:\n{}",
                brief.related_questions.join("\n")
            ));
        }
        if !brief.heading_targets.is_empty() {
            let headings: Vec<String> = brief
                .heading_targets
                .iter()
                .map(|h| format!("{}: {}", h.tag, h.target))
                .collect();
            sections.push(format!("Heading structure: {}", headings.join(", ")));
        }
    } else {
        sections.push(
            "No optimization brief is available; write from the keyword and URL alone."
                .to_string(),
        );
    }

    sections.push(
        "Write page_title, meta_description, top_description and bottom_description."
            .to_string(),
    );
    sections.join("\n\n")
}
