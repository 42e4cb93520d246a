use crate::errors::PlanFailure;
use crate::fetcher::FetchedPage;
use crate::llm::{ChatPrompt, LanguageModel, extract_json_object};
use crate::parsers::text::clip;
use crate::results::{ActionKind, PageActionDetailed};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

/// Body text sent to the model when planning
const PLAN_INPUT_CHARS: usize = 6_000;

const SYSTEM_PROMPT: &str = "You steer a web crawler that is looking for information \
requested by a user. Given the current page and the elements that can be clicked, decide \
which elements are most likely to lead to the requested information, or stop when the \
current page already answers the instruction or nothing on it looks promising. \
Reply with a single JSON object of the form \
{\"actions\":[{\"action\":\"click\"|\"stop\",\"target\":\"<element key, empty for stop>\",\
\"reason\":\"<why>\",\"goal\":\"<what you hope to find>\"}]}. \
Only use element keys from the list you are given, never repeat a key, and never pick \
a key that was already visited.";

/// One ancestor page on the path from the start page to the page being planned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchStep {
    pub depth: u32,
    pub url: String,
    pub title: String,
    pub summary: String,
    /// Key of the action that led to this page (`None` for the start page)
    pub action_key: Option<String>,
}

/// Decides which actions to pursue on a page
#[async_trait]
pub trait ActionPlanner: Send + Sync {
    /// Actions for `page`, in the order they should be explored
    ///
    /// At most one `stop` is returned; when present no click is followed.
    async fn plan(
        &self,
        page: &FetchedPage,
        user_instruction: &str,
        history: &[BranchStep],
        visited_keys: &BTreeSet<String>,
    ) -> Result<Vec<PageActionDetailed>, PlanFailure>;
}

/// Planner backed by a language model
pub struct LlmPlanner {
    model: Arc<dyn LanguageModel>,
    max_clicks: usize,
}

impl LlmPlanner {
    pub fn new(model: Arc<dyn LanguageModel>, max_clicks: usize) -> Self {
        Self {
            model,
            max_clicks: max_clicks.max(1),
        }
    }
}

#[async_trait]
impl ActionPlanner for LlmPlanner {
    async fn plan(
        &self,
        page: &FetchedPage,
        user_instruction: &str,
        history: &[BranchStep],
        visited_keys: &BTreeSet<String>,
    ) -> Result<Vec<PageActionDetailed>, PlanFailure> {
        let prompt = plan_prompt(page, user_instruction, history, visited_keys, self.max_clicks);
        let reply = self.model.complete(&prompt).await?;
        let proposed = parse_plan_reply(&reply)?;
        Ok(sanitize_plan(proposed, page, visited_keys, self.max_clicks))
    }
}

/// Prompt for planning the next actions on `page`
pub fn plan_prompt(
    page: &FetchedPage,
    user_instruction: &str,
    history: &[BranchStep],
    visited_keys: &BTreeSet<String>,
    max_clicks: usize,
) -> ChatPrompt {
    let mut user = String::new();
    let _ = writeln!(user, "Instruction: {}\n", user_instruction);

    if history.is_empty() {
        user.push_str("This is the start page.\n\n");
    } else {
        user.push_str("Pages visited on the way here:\n");
        for step in history {
            let _ = writeln!(
                user,
                "- depth {} via {}: {} ({}) - {}",
                step.depth,
                step.action_key.as_deref().unwrap_or("start"),
                step.title,
                step.url,
                step.summary
            );
        }
        user.push('\n');
    }

    let _ = writeln!(
        user,
        "Current page: {}\nURL: {}\nText:\n{}\n",
        page.details.title,
        page.details.url,
        clip(&page.details.body_text, PLAN_INPUT_CHARS)
    );

    if page.elements.is_empty() {
        user.push_str("There are no clickable elements on this page.\n");
    } else {
        user.push_str("Clickable elements (key | kind | label):\n");
        for element in &page.elements {
            let _ = writeln!(
                user,
                "{} | {} | {}",
                element.key,
                element.kind_name(),
                element.label
            );
        }
    }

    if !visited_keys.is_empty() {
        user.push_str("\nAlready visited keys (do not pick these):\n");
        for key in visited_keys {
            let _ = writeln!(user, "{}", key);
        }
    }

    let _ = write!(
        user,
        "\nChoose at most {} click actions, most promising first, or a single stop action.",
        max_clicks
    );

    ChatPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
        json_reply: true,
    }
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    #[serde(default)]
    actions: Vec<ProposedAction>,
}

#[derive(Debug, Deserialize)]
struct ProposedAction {
    #[serde(default)]
    action: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    goal: Option<String>,
}

/// Parse the model's reply into actions, skipping entries with an unknown verb
pub fn parse_plan_reply(reply: &str) -> Result<Vec<PageActionDetailed>, PlanFailure> {
    let json = extract_json_object(reply)
        .ok_or_else(|| PlanFailure::Parse("reply contains no JSON object".to_string()))?;
    let parsed: PlanReply =
        serde_json::from_str(json).map_err(|e| PlanFailure::Parse(e.to_string()))?;

    let mut actions = Vec::with_capacity(parsed.actions.len());
    for proposed in parsed.actions {
        let action = match proposed.action.trim().to_ascii_lowercase().as_str() {
            "click" => ActionKind::Click,
            "stop" => ActionKind::Stop,
            other => {
                ::log::debug!("Ignoring proposed action with verb '{}'", other);
                continue;
            }
        };
        actions.push(PageActionDetailed {
            action,
            target: proposed.target.unwrap_or_default().trim().to_string(),
            reason: proposed.reason.unwrap_or_default(),
            goal: proposed.goal.unwrap_or_default(),
        });
    }
    Ok(actions)
}

/// Enforce the plan invariants on what the model proposed
///
/// Keeps the first `stop` only, drops clicks on unknown, visited or repeated keys,
/// and keeps at most `max_clicks` clicks. Order is preserved.
pub fn sanitize_plan(
    proposed: Vec<PageActionDetailed>,
    page: &FetchedPage,
    visited_keys: &BTreeSet<String>,
    max_clicks: usize,
) -> Vec<PageActionDetailed> {
    let mut seen_stop = false;
    let mut seen_targets = HashSet::new();
    let mut clicks = 0usize;
    let mut plan = Vec::with_capacity(proposed.len());

    for action in proposed {
        match action.action {
            ActionKind::Stop => {
                if seen_stop {
                    continue;
                }
                seen_stop = true;
                plan.push(action);
            }
            ActionKind::Click => {
                if page.element(&action.target).is_none() {
                    ::log::debug!(
                        "Dropping click on unknown target '{}' for {}",
                        action.target,
                        page.details.url
                    );
                    continue;
                }
                if visited_keys.contains(&action.target)
                    || !seen_targets.insert(action.target.clone())
                {
                    continue;
                }
                if clicks >= max_clicks {
                    continue;
                }
                clicks += 1;
                plan.push(action);
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LlmFailure;
    use crate::fetcher::{ActionableElement, ElementKind};
    use crate::results::PageDetails;
    use std::sync::Mutex;

    fn page() -> FetchedPage {
        FetchedPage {
            details: PageDetails {
                url: "https://example.com/".to_string(),
                title: "Home".to_string(),
                body_text: "Welcome".to_string(),
            },
            elements: vec![
                ActionableElement::link("https://example.com/a", "Prices").unwrap(),
                ActionableElement::link("https://example.com/b", "About").unwrap(),
                ActionableElement {
                    key: "button:More".to_string(),
                    kind: ElementKind::Button { ordinal: 0 },
                    label: "More".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_parse_reply_in_code_fence() {
        let reply = "Here is my plan:\n```json\n{\"actions\":[\
            {\"action\":\"CLICK\",\"target\":\" https://example.com/a \",\"reason\":\"prices\",\"goal\":\"find cost\"},\
            {\"action\":\"scroll\",\"target\":\"x\"},\
            {\"action\":\"stop\",\"reason\":\"enough\"}]}\n```";
        let actions = parse_plan_reply(reply).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            PageActionDetailed::click("https://example.com/a", "prices", "find cost")
        );
        assert_eq!(actions[1], PageActionDetailed::stop("enough"));
    }

    #[test]
    fn test_parse_reply_errors() {
        assert!(matches!(
            parse_plan_reply("I would click on prices"),
            Err(PlanFailure::Parse(_))
        ));
        assert!(matches!(
            parse_plan_reply("{\"actions\": 3}"),
            Err(PlanFailure::Parse(_))
        ));
        assert!(parse_plan_reply("{}").unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_filters_unknown_visited_and_duplicate_targets() {
        let visited: BTreeSet<String> = ["https://example.com/b".to_string()].into();
        let proposed = vec![
            PageActionDetailed::click("https://example.com/zzz", "", ""),
            PageActionDetailed::click("https://example.com/a", "", ""),
            PageActionDetailed::click("https://example.com/a", "", ""),
            PageActionDetailed::click("https://example.com/b", "", ""),
            PageActionDetailed::click("button:More", "", ""),
        ];
        let plan = sanitize_plan(proposed, &page(), &visited, 5);
        let targets: Vec<&str> = plan.iter().map(|a| a.target.as_str()).collect();
        assert_eq!(targets, vec!["https://example.com/a", "button:More"]);
    }

    #[test]
    fn test_sanitize_keeps_single_stop_and_caps_clicks() {
        let proposed = vec![
            PageActionDetailed::click("https://example.com/a", "", ""),
            PageActionDetailed::stop("first"),
            PageActionDetailed::click("https://example.com/b", "", ""),
            PageActionDetailed::stop("second"),
        ];
        let plan = sanitize_plan(proposed, &page(), &BTreeSet::new(), 1);
        assert_eq!(
            plan,
            vec![
                PageActionDetailed::click("https://example.com/a", "", ""),
                PageActionDetailed::stop("first"),
            ]
        );
    }

    #[test]
    fn test_prompt_lists_elements_history_and_visited() {
        let history = vec![BranchStep {
            depth: 0,
            url: "https://example.com/".to_string(),
            title: "Home".to_string(),
            summary: "The home page".to_string(),
            action_key: None,
        }];
        let visited: BTreeSet<String> = ["https://example.com/b".to_string()].into();
        let prompt = plan_prompt(&page(), "find prices", &history, &visited, 2);

        assert!(prompt.json_reply);
        assert!(prompt.user.contains("Instruction: find prices"));
        assert!(prompt.user.contains("https://example.com/a | link | Prices"));
        assert!(prompt.user.contains("button:More | button | More"));
        assert!(prompt.user.contains("depth 0 via start: Home"));
        assert!(prompt.user.contains("Already visited keys"));
        assert!(prompt.user.contains("at most 2 click actions"));
    }

    struct RecordingModel {
        reply: &'static str,
        prompts: Mutex<Vec<ChatPrompt>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmFailure> {
            self.prompts.lock().unwrap().push(prompt.clone());
            Ok(self.reply.to_string())
        }
    }

    #[tokio::test]
    async fn test_llm_planner_end_to_end() {
        let model = Arc::new(RecordingModel {
            reply: r#"{"actions":[
                {"action":"click","target":"https://example.com/b","reason":"r","goal":"g"},
                {"action":"click","target":"https://example.com/a","reason":"r","goal":"g"},
                {"action":"click","target":"button:More","reason":"r","goal":"g"}
            ]}"#,
            prompts: Mutex::new(Vec::new()),
        });
        let planner = LlmPlanner::new(model.clone(), 2);

        let plan = planner
            .plan(&page(), "find prices", &[], &BTreeSet::new())
            .await
            .unwrap();
        let targets: Vec<&str> = plan.iter().map(|a| a.target.as_str()).collect();
        assert_eq!(
            targets,
            vec!["https://example.com/b", "https://example.com/a"]
        );
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }
}
