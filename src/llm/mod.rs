pub mod openai;

pub use openai::OpenAiChat;

use crate::errors::LlmFailure;
use async_trait::async_trait;

/// A single system + user exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
    /// Ask the backend to constrain the reply to a JSON object
    pub json_reply: bool,
}

/// Text-completion capability backing the summarizer and planner
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmFailure>;
}

/// Outermost `{ ... }` span of a reply, tolerating prose and code fences around it
pub fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object(r#"{"a":1}"#), Some(r#"{"a":1}"#));
        assert_eq!(
            extract_json_object("Sure!\n```json\n{\"actions\": [{\"x\": {}}]}\n```"),
            Some("{\"actions\": [{\"x\": {}}]}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }
}
