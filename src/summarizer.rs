use crate::errors::SummaryFailure;
use crate::llm::{ChatPrompt, LanguageModel};
use crate::parsers::text::{clip, collapse_whitespace};
use crate::results::PageDetails;
use async_trait::async_trait;
use std::sync::Arc;

/// Body text sent to the model for summarizing
const SUMMARY_INPUT_CHARS: usize = 12_000;

const SYSTEM_PROMPT: &str = "You summarize web pages for a research crawler. \
Write 2 to 4 plain sentences. Lead with facts that help answer the user's instruction \
(numbers, dates, names) and say plainly when the page does not contain them. \
Do not invent information that is not on the page.";

/// Produces a short page summary biased toward the user's instruction
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        page: &PageDetails,
        user_instruction: &str,
    ) -> Result<String, SummaryFailure>;
}

/// Summarizer backed by a language model
pub struct LlmSummarizer {
    model: Arc<dyn LanguageModel>,
}

impl LlmSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

/// Prompt for summarizing `page`
pub fn summary_prompt(page: &PageDetails, user_instruction: &str) -> ChatPrompt {
    let body = if page.body_text.trim().is_empty() {
        "(the page has no visible text)".to_string()
    } else {
        clip(&page.body_text, SUMMARY_INPUT_CHARS)
    };

    ChatPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user: format!(
            "Instruction: {}\n\nPage title: {}\nPage URL: {}\n\nPage text:\n{}",
            user_instruction, page.title, page.url, body
        ),
        json_reply: false,
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        page: &PageDetails,
        user_instruction: &str,
    ) -> Result<String, SummaryFailure> {
        let reply = self
            .model
            .complete(&summary_prompt(page, user_instruction))
            .await?;
        let summary = collapse_whitespace(&reply);
        if summary.is_empty() {
            return Err(SummaryFailure::Empty);
        }
        Ok(summary)
    }
}
