//! Depth-bounded, planner-driven crawl.
//!
//! A single coordinator owns all crawl state: an arena of visited nodes addressed by
//! index, the pending, in-flight and finished node sets, and the visited-key sets. Node
//! work (fetch, summarize, plan) runs in spawned tasks that only return their result, so
//! the coordinator is the one place history is written. Each node carries its path of
//! child ordinals from the start page, which orders nodes in depth-first pre-order.

use crate::config::{DedupScope, ScopeConfig, StrigilConfig};
use crate::errors::{ErrorType, FetchFailure};
use crate::fetcher::{ActionableElement, ElementKind, FetchedPage, PageFetcher};
use crate::filter::{UrlFilter, normalize_url};
use crate::planner::{ActionPlanner, BranchStep};
use crate::response::ResponseBuilder;
use crate::results::{
    CrawlError, CrawlRequest, CrawlResponse, HistoryEntry, PageAction, PageActionDetailed,
    ValidatedRequest,
};
use crate::summarizer::Summarizer;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id as TaskId, JoinError, JoinSet};
use tokio::time::{Instant, timeout, timeout_at};
use url::Url;


/// Limits and policies applied to every crawl run by an engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Nodes processed at the same time
    pub max_concurrency: usize,
    /// Nodes dispatched per crawl, including ones whose fetch fails
    pub max_total_nodes: usize,
    pub crawl_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Bound on each summarizer or planner call
    pub llm_timeout: Duration,
    pub dedup_scope: DedupScope,
    pub scope: ScopeConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&StrigilConfig::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &StrigilConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            max_total_nodes: config.max_total_nodes.max(1),
            crawl_timeout: config.crawl_timeout(),
            fetch_timeout: config.fetch_timeout(),
            llm_timeout: config.llm_timeout(),
            dedup_scope: config.dedup_scope,
            scope: config.scope.clone(),
        }
    }
}

/// Capabilities shared by every node task
#[derive(Clone)]
struct Capabilities {
    fetcher: Arc<dyn PageFetcher>,
    summarizer: Arc<dyn Summarizer>,
    planner: Arc<dyn ActionPlanner>,
    fetch_timeout: Duration,
    llm_timeout: Duration,
}

/// Runs instruction-guided crawls
///
/// The engine holds no per-crawl state; every call to [`CrawlEngine::crawl`] gets a
/// fresh context, so concurrent crawls never share visited sets or history.
pub struct CrawlEngine {
    capabilities: Capabilities,
    settings: EngineSettings,
}

/// What a pending node is reached by
#[derive(Debug, Clone)]
enum Target {
    Start(Url),
    Action {
        parent: usize,
        parent_page: Arc<FetchedPage>,
        element: ActionableElement,
    },
}

/// A node waiting to be explored
#[derive(Debug, Clone)]
struct NodeTask {
    /// Child ordinals from the start page; sorts in depth-first pre-order
    path: Vec<usize>,
    depth: u32,
    target: Target,
    ancestry: Arc<Vec<BranchStep>>,
    visited: BTreeSet<String>,
}

impl NodeTask {
    fn url(&self) -> String {
        match &self.target {
            Target::Start(url) => url.to_string(),
            Target::Action {
                parent_page,
                element,
                ..
            } => match &element.kind {
                ElementKind::Link { href } => href.to_string(),
                ElementKind::Button { .. } => parent_page.details.url.clone(),
            },
        }
    }

    fn action_key(&self) -> Option<&str> {
        match &self.target {
            Target::Start(_) => None,
            Target::Action { element, .. } => Some(&element.key),
        }
    }

    fn node_error(&self, error_type: ErrorType, message: String) -> CrawlError {
        let mut error = CrawlError::new(error_type, message)
            .with_detail("url", self.url())
            .with_detail("depth", self.depth);
        if let Some(key) = self.action_key() {
            error = error.with_detail("action_key", key);
        }
        error
    }
}

/// What a node task hands back to the coordinator
struct NodeOutcome {
    task: NodeTask,
    visit: Option<(HistoryEntry, Arc<FetchedPage>)>,
    errors: Vec<CrawlError>,
}

/// A visited node in the arena
struct Node {
    path: Vec<usize>,
    entry: HistoryEntry,
}

/// State owned by the coordinator for one crawl
///
/// Node tasks may finish in any order, but their results are committed strictly in
/// depth-first pre-order: a finished node waits until every node before it has been
/// committed. Budget slots, visited keys, children and errors are all assigned at commit
/// time, so the outcome matches a sequential crawl whatever the completion order.
struct CrawlContext {
    max_depth: u32,
    max_total_nodes: usize,
    dedup_scope: DedupScope,
    arena: Vec<Node>,
    /// Nodes whose parent is committed, not yet dispatched
    pending: Vec<NodeTask>,
    in_flight: BTreeMap<Vec<usize>, TaskId>,
    /// Finished nodes waiting for earlier nodes to commit
    finished: BTreeMap<Vec<usize>, NodeOutcome>,
    errors: Vec<CrawlError>,
    global_visited: BTreeSet<String>,
    /// Committed nodes, including ones whose fetch failed
    committed: usize,
    omitted: usize,
    exhausted: bool,
}

impl CrawlContext {
    fn new(max_depth: u32, max_total_nodes: usize, dedup_scope: DedupScope) -> Self {
        Self {
            max_depth,
            max_total_nodes: max_total_nodes.max(1),
            dedup_scope,
            arena: Vec::new(),
            pending: Vec::new(),
            in_flight: BTreeMap::new(),
            finished: BTreeMap::new(),
            errors: Vec::new(),
            global_visited: BTreeSet::new(),
            committed: 0,
            omitted: 0,
            exhausted: false,
        }
    }

    /// Whether no outstanding node comes before `path` in pre-order
    ///
    /// Unknown nodes are descendants of in-flight or finished ones, so they never
    /// precede a node that precedes all of those.
    fn is_next(&self, path: &[usize]) -> bool {
        let precedes = |other: &Vec<usize>| other.as_slice() < path;
        !self.pending.iter().any(|t| precedes(&t.path))
            && !self.in_flight.keys().any(precedes)
            && !self.finished.keys().any(precedes)
    }

    /// Take the earliest pending node if it may start now
    fn next_dispatch(&mut self) -> Option<NodeTask> {
        loop {
            if self.exhausted {
                return None;
            }
            let (index, _) = self
                .pending
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.path.cmp(&b.1.path))?;
            let is_next = self.is_next(&self.pending[index].path);

            match self.dedup_scope {
                DedupScope::Local => {
                    // Run ahead only while the budget could still cover every node started
                    let reserved = self.in_flight.len() + self.finished.len();
                    if !is_next && self.committed + reserved >= self.max_total_nodes {
                        return None;
                    }
                    return Some(self.pending.swap_remove(index));
                }
                DedupScope::Global => {
                    // The visited snapshot handed to the planner must be final
                    if !is_next {
                        return None;
                    }
                    let mut task = self.pending.swap_remove(index);
                    if let Some(key) = task.action_key() {
                        if self.global_visited.contains(key) {
                            ::log::debug!("Skipping action '{}' explored elsewhere in this crawl", key);
                            continue;
                        }
                        let key = key.to_string();
                        self.global_visited.insert(key);
                    }
                    task.visited = self.global_visited.clone();
                    return Some(task);
                }
            }
        }
    }

    fn dispatched(&mut self, path: Vec<usize>, id: TaskId) {
        self.in_flight.insert(path, id);
    }

    /// Park a finished node and commit everything that is now in order
    fn finish(&mut self, outcome: NodeOutcome) {
        self.in_flight.remove(&outcome.task.path);
        self.finished.insert(outcome.task.path.clone(), outcome);
        self.commit_ready();
    }

    /// A node task died without producing an outcome
    fn lost(&mut self, error: JoinError) {
        let path = self
            .in_flight
            .iter()
            .find(|(_, id)| **id == error.id())
            .map(|(path, _)| path.clone());
        if let Some(path) = path {
            self.in_flight.remove(&path);
        }
        ::log::error!("Node task failed: {}", error);
        self.errors.push(CrawlError::new(
            ErrorType::Transport,
            format!("internal fault while exploring a page: {}", error),
        ));
        self.commit_ready();
    }

    fn commit_ready(&mut self) {
        loop {
            if self.committed >= self.max_total_nodes {
                self.exhaust();
                return;
            }
            let Some(path) = self.finished.keys().next().cloned() else {
                return;
            };
            if !self.is_next(&path) {
                return;
            }
            if let Some(outcome) = self.finished.remove(&path) {
                self.commit(outcome);
            }
        }
    }

    /// Node limit reached: everything still outstanding is omitted
    fn exhaust(&mut self) {
        if self.exhausted {
            return;
        }
        self.exhausted = true;

        let pending = std::mem::take(&mut self.pending);
        let outstanding = pending
            .iter()
            .filter(|task| {
                self.dedup_scope == DedupScope::Local
                    || task
                        .action_key()
                        .is_none_or(|key| !self.global_visited.contains(key))
            })
            .count();
        self.omitted += outstanding + self.in_flight.len() + self.finished.len();
        self.in_flight.clear();
        self.finished.clear();

        if self.omitted > 0 {
            ::log::debug!("Node limit reached, omitting {} node(s)", self.omitted);
        }
    }

    /// Record a node in pre-order and queue the children its plan asks for
    fn commit(&mut self, outcome: NodeOutcome) {
        let NodeOutcome {
            task,
            visit,
            errors,
        } = outcome;
        self.committed += 1;

        if let Target::Action {
            parent,
            ref element,
            ..
        } = task.target
        {
            self.arena[parent]
                .entry
                .visited_keys
                .insert(element.key.clone());
            self.global_visited.insert(element.key.clone());
        }

        for error in &errors {
            if error.error_type.is_per_node() {
                ::log::warn!("{}: {}", error.error_type, error.message);
            } else {
                ::log::error!("{}: {}", error.error_type, error.message);
            }
        }
        self.errors.extend(errors);

        let Some((entry, page)) = visit else {
            return;
        };

        let index = self.arena.len();
        let mut child_ancestry = task.ancestry.as_ref().clone();
        child_ancestry.push(BranchStep {
            depth: entry.depth,
            url: entry.details.url.clone(),
            title: entry.details.title.clone(),
            summary: entry.summary.clone(),
            action_key: task.action_key().map(str::to_string),
        });
        let child_ancestry = Arc::new(child_ancestry);

        let children = self.children_of(index, &task, &entry, &page, &child_ancestry);
        ::log::debug!(
            "Visited {} at depth {} ({} action(s), {} to explore)",
            entry.details.url,
            entry.depth,
            entry.actions.len(),
            children.len()
        );

        self.arena.push(Node {
            path: task.path,
            entry,
        });
        self.pending.extend(children);
    }

    /// Children for each planned click observed on the page, first occurrence of a key only
    fn children_of(
        &self,
        index: usize,
        task: &NodeTask,
        entry: &HistoryEntry,
        page: &Arc<FetchedPage>,
        child_ancestry: &Arc<Vec<BranchStep>>,
    ) -> Vec<NodeTask> {
        if entry.depth >= self.max_depth {
            return Vec::new();
        }
        if entry.actions.iter().any(PageActionDetailed::is_stop) {
            return Vec::new();
        }

        let mut seen = BTreeSet::new();
        entry
            .actions
            .iter()
            .filter_map(|action| {
                let element = page.element(&action.target);
                if element.is_none() {
                    ::log::warn!("Dropping action '{}' not observed on its page", action.target);
                }
                element
            })
            .filter(|element| {
                if entry.visited_keys.contains(&element.key) || !seen.insert(element.key.clone()) {
                    ::log::debug!("Skipping already visited action '{}'", element.key);
                    return false;
                }
                true
            })
            .enumerate()
            .map(|(ordinal, element)| {
                let mut path = task.path.clone();
                path.push(ordinal);
                NodeTask {
                    path,
                    depth: entry.depth + 1,
                    target: Target::Action {
                        parent: index,
                        parent_page: Arc::clone(page),
                        element: element.clone(),
                    },
                    ancestry: Arc::clone(child_ancestry),
                    visited: BTreeSet::new(),
                }
            })
            .collect()
    }

    /// Stop at the crawl deadline: finished nodes are kept, the rest is abandoned
    fn abandon(&mut self) -> usize {
        let finished = std::mem::take(&mut self.finished);
        for outcome in finished.into_values() {
            if self.committed >= self.max_total_nodes {
                self.omitted += 1;
                continue;
            }
            self.commit(outcome);
        }

        let abandoned = self.in_flight.len() + self.pending.len();
        self.in_flight.clear();
        self.pending.clear();
        abandoned
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty() && self.finished.is_empty()
    }

    /// History in depth-first pre-order
    fn into_history(mut self) -> (Vec<HistoryEntry>, Vec<CrawlError>, usize) {
        self.arena.sort_by(|a, b| a.path.cmp(&b.path));
        let history = self.arena.into_iter().map(|node| node.entry).collect();
        (history, self.errors, self.omitted)
    }
}

impl CrawlEngine {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        summarizer: Arc<dyn Summarizer>,
        planner: Arc<dyn ActionPlanner>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            capabilities: Capabilities {
                fetcher,
                summarizer,
                planner,
                fetch_timeout: settings.fetch_timeout,
                llm_timeout: settings.llm_timeout,
            },
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Release fetcher resources such as browser sessions
    pub async fn shutdown(&self) {
        self.capabilities.fetcher.shutdown().await;
    }

    /// Validate and run a request, always producing a structured response
    pub async fn run(&self, request: &CrawlRequest) -> CrawlResponse {
        match request.validate() {
            Ok(validated) => self.crawl(validated).await,
            Err(error) => {
                ::log::info!("Rejected crawl request: {}", error.message);
                ResponseBuilder::rejected(error)
            }
        }
    }

    /// Crawl from the start page until every branch terminates
    pub async fn crawl(&self, request: ValidatedRequest) -> CrawlResponse {
        let started = std::time::Instant::now();
        let deadline = Instant::now() + self.settings.crawl_timeout;

        let scope = match UrlFilter::new(&request.start_url, &self.settings.scope) {
            Ok(filter) => Arc::new(filter),
            Err(e) => {
                ::log::error!("Invalid scope pattern: {}", e);
                return ResponseBuilder::rejected(
                    CrawlError::new(ErrorType::Validation, format!("invalid scope pattern: {}", e))
                        .with_detail("url", request.start_url.as_str()),
                );
            }
        };
        ::log::info!(
            "Starting crawl of {} (max depth {}): {}",
            request.start_url,
            request.max_depth,
            request.user_instruction
        );
        let instruction: Arc<str> = Arc::from(request.user_instruction.as_str());

        let mut ctx = CrawlContext::new(
            request.max_depth,
            self.settings.max_total_nodes,
            self.settings.dedup_scope,
        );
        if ctx.dedup_scope == DedupScope::Global {
            ctx.global_visited
                .insert(normalize_url(&request.start_url).to_string());
        }
        ctx.pending.push(NodeTask {
            path: Vec::new(),
            depth: 0,
            target: Target::Start(request.start_url.clone()),
            ancestry: Arc::new(Vec::new()),
            visited: BTreeSet::new(),
        });

        let max_concurrency = self.settings.max_concurrency.max(1);
        let mut in_flight: JoinSet<NodeOutcome> = JoinSet::new();
        let mut timed_out = false;

        loop {
            while in_flight.len() < max_concurrency {
                let Some(task) = ctx.next_dispatch() else {
                    break;
                };
                ::log::debug!("Dispatching {} at depth {}", task.url(), task.depth);
                let path = task.path.clone();
                let handle = in_flight.spawn(explore(
                    self.capabilities.clone(),
                    Arc::clone(&instruction),
                    Arc::clone(&scope),
                    task,
                ));
                ctx.dispatched(path, handle.id());
            }

            if ctx.exhausted || in_flight.is_empty() {
                break;
            }

            match timeout_at(deadline, in_flight.join_next()).await {
                Ok(Some(Ok(outcome))) => ctx.finish(outcome),
                Ok(Some(Err(join_error))) => ctx.lost(join_error),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    in_flight.abort_all();
                    let abandoned = ctx.abandon();
                    ::log::warn!(
                        "Crawl of {} timed out, abandoning {} node(s)",
                        request.start_url,
                        abandoned
                    );
                    ctx.errors.push(
                        CrawlError::new(
                            ErrorType::Timeout,
                            format!(
                                "crawl stopped after {:?}; returning the pages collected so far",
                                self.settings.crawl_timeout
                            ),
                        )
                        .with_detail("url", request.start_url.as_str())
                        .with_detail("abandoned_nodes", abandoned),
                    );
                    break;
                }
            }

            if ctx.exhausted {
                break;
            }
        }
        // Node tasks that lost the race for the budget are no longer needed
        in_flight.abort_all();
        if !timed_out && !ctx.exhausted && !ctx.is_idle() {
            ::log::warn!("Crawl of {} ended with unfinished nodes", request.start_url);
        }

        let (history, errors, omitted) = ctx.into_history();
        ::log::info!(
            "Crawl of {} finished in {:.2} seconds: {} page(s), {} error(s), {} omitted",
            request.start_url,
            started.elapsed().as_secs_f64(),
            history.len(),
            errors.len(),
            omitted
        );

        ResponseBuilder::new(request.start_url.as_str())
            .history(history)
            .errors(errors)
            .omitted(omitted)
            .timed_out(timed_out)
            .build()
    }
}

/// Fetch, summarize and plan one node
async fn explore(
    caps: Capabilities,
    instruction: Arc<str>,
    scope: Arc<UrlFilter>,
    task: NodeTask,
) -> NodeOutcome {
    let fetched = match &task.target {
        Target::Start(url) => timeout(caps.fetch_timeout, caps.fetcher.fetch(url, &scope)).await,
        Target::Action {
            parent_page,
            element,
            ..
        } => {
            timeout(
                caps.fetch_timeout,
                caps.fetcher.follow(parent_page, element, &scope),
            )
            .await
        }
    };

    let page = match fetched {
        Ok(Ok(page)) => Arc::new(page),
        Ok(Err(failure)) => {
            let error = task.node_error(failure.error_type(), failure.to_string());
            return NodeOutcome {
                task,
                visit: None,
                errors: vec![error],
            };
        }
        Err(_) => {
            let failure = FetchFailure::Timeout { url: task.url() };
            let error = task.node_error(failure.error_type(), failure.to_string());
            return NodeOutcome {
                task,
                visit: None,
                errors: vec![error],
            };
        }
    };

    let mut errors = Vec::new();
    let prev_page_action = task.action_key().map(|key| PageAction {
        url: page.details.url.clone(),
        action_key: key.to_string(),
    });
    let mut entry = HistoryEntry::new(task.depth, page.details.clone(), prev_page_action);

    entry.summary = match timeout(
        caps.llm_timeout,
        caps.summarizer.summarize(&page.details, &instruction),
    )
    .await
    {
        Ok(Ok(summary)) => summary,
        Ok(Err(failure)) => {
            errors.push(task.node_error(ErrorType::Summarization, failure.to_string()));
            String::new()
        }
        Err(_) => {
            errors.push(task.node_error(
                ErrorType::Summarization,
                format!("summary timed out after {:?}", caps.llm_timeout),
            ));
            String::new()
        }
    };

    entry.actions = match timeout(
        caps.llm_timeout,
        caps.planner
            .plan(&page, &instruction, &task.ancestry, &task.visited),
    )
    .await
    {
        Ok(Ok(actions)) => actions,
        Ok(Err(failure)) => {
            errors.push(task.node_error(ErrorType::Planning, failure.to_string()));
            Vec::new()
        }
        Err(_) => {
            errors.push(task.node_error(
                ErrorType::Planning,
                format!("planning timed out after {:?}", caps.llm_timeout),
            ));
            Vec::new()
        }
    };

    NodeOutcome {
        task,
        visit: Some((entry, page)),
        errors,
    }
}
