//! Scripted collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::Agent;
use crate::config::{AnalysisConfig, RetryPolicy};
use crate::error::{DocumentError, LlmError};
use crate::llm::{ChatModel, Message, ModelRouter, ToolSpec};
use crate::paper::types::{HierarchicalLevel, PaperAnalysis};
use crate::paper::{DocumentLoader, PaperSource};
use crate::search::{SearchProvider, SearchResult};

type ErrorFactory = Box<dyn Fn() -> LlmError + Send + Sync>;

/// LLM that replays queued responses, then falls back to a default.
pub struct ScriptedModel {
    text: Mutex<VecDeque<Result<String, LlmError>>>,
    structured: Mutex<VecDeque<Result<Value, LlmError>>>,
    default_text: String,
    text_failure: Option<ErrorFactory>,
    structured_failure: Option<ErrorFactory>,
    text_calls: AtomicUsize,
    structured_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    tools: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            text: Mutex::new(VecDeque::new()),
            structured: Mutex::new(VecDeque::new()),
            default_text: "THOUGHT: nothing more to do\nACTION: FINISH".to_string(),
            text_failure: None,
            structured_failure: None,
            text_calls: AtomicUsize::new(0),
            structured_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            tools: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_text(mut self, text: &str) -> Self {
        self.default_text = text.to_string();
        self
    }

    pub fn failing_text(mut self, f: impl Fn() -> LlmError + Send + Sync + 'static) -> Self {
        self.text_failure = Some(Box::new(f));
        self
    }

    pub fn failing_structured(mut self, f: impl Fn() -> LlmError + Send + Sync + 'static) -> Self {
        self.structured_failure = Some(Box::new(f));
        self
    }

    pub fn push_text(&self, text: &str) {
        self.text.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn push_structured(&self, value: Value) {
        self.structured.lock().unwrap().push_back(Ok(value));
    }

    pub fn push_structured_err(&self, err: LlmError) {
        self.structured.lock().unwrap().push_back(Err(err));
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    /// Last message of every call, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Tool names requested by structured calls, in call order.
    pub fn tools(&self) -> Vec<String> {
        self.tools.lock().unwrap().clone()
    }

    fn record(&self, messages: &[Message]) {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(last);
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.record(messages);
        if let Some(next) = self.text.lock().unwrap().pop_front() {
            return next;
        }
        match &self.text_failure {
            Some(f) => Err(f()),
            None => Ok(self.default_text.clone()),
        }
    }

    async fn chat_structured(
        &self,
        messages: &[Message],
        tool: &ToolSpec,
    ) -> Result<Value, LlmError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.record(messages);
        self.tools.lock().unwrap().push(tool.name.clone());
        if let Some(next) = self.structured.lock().unwrap().pop_front() {
            return next;
        }
        match &self.structured_failure {
            Some(f) => Err(f()),
            None => Ok(serde_json::json!({})),
        }
    }
}

/// Same scripted model for every agent.
pub struct ScriptedRouter {
    pub model: Arc<ScriptedModel>,
}

impl ScriptedRouter {
    pub fn new(model: ScriptedModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

impl ModelRouter for ScriptedRouter {
    fn for_agent(&self, _agent: Agent) -> Arc<dyn ChatModel> {
        self.model.clone()
    }
}

/// Per-agent scripted models over a shared default.
pub struct AgentRouter {
    default: Arc<ScriptedModel>,
    models: HashMap<Agent, Arc<ScriptedModel>>,
}

impl AgentRouter {
    pub fn new(default: ScriptedModel) -> Self {
        Self {
            default: Arc::new(default),
            models: HashMap::new(),
        }
    }

    pub fn with(self, agent: Agent, model: ScriptedModel) -> Self {
        self.with_shared(agent, Arc::new(model))
    }

    pub fn with_shared(mut self, agent: Agent, model: Arc<ScriptedModel>) -> Self {
        self.models.insert(agent, model);
        self
    }
}

impl ModelRouter for AgentRouter {
    fn for_agent(&self, agent: Agent) -> Arc<dyn ChatModel> {
        self.models
            .get(&agent)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

type SearchFn = Box<dyn Fn(&str, usize, usize) -> Vec<SearchResult> + Send + Sync>;

/// Search provider driven by a closure of `(query, max_results, call_index)`.
pub struct ScriptedSearch {
    generator: SearchFn,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn new(f: impl Fn(&str, usize, usize) -> Vec<SearchResult> + Send + Sync + 'static) -> Self {
        Self {
            generator: Box::new(f),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(|_, _, _| vec![])
    }

    /// Every call returns `max_results` results never seen before.
    pub fn unique() -> Self {
        Self::new(|query, max, call| {
            (0..max)
                .map(|i| {
                    SearchResult::new(
                        format!("{} result {}-{}", query, call, i),
                        format!("https://papers.example/{}/{}", call, i),
                        format!("snippet for {}", query),
                    )
                })
                .collect()
        })
    }

    /// Every call returns the same results.
    pub fn fixed(results: Vec<SearchResult>) -> Self {
        Self::new(move |_, max, _| results.iter().take(max).cloned().collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        (self.generator)(query, max_results, call)
    }
}

/// Loader that returns fixed text for any source.
pub struct StaticLoader(pub String);

#[async_trait]
impl DocumentLoader for StaticLoader {
    async fn load(&self, _source: &PaperSource) -> Result<String, DocumentError> {
        if self.0.trim().is_empty() {
            return Err(DocumentError::Empty);
        }
        Ok(self.0.clone())
    }
}

/// A short paper with one header per common section.
pub fn sample_paper() -> String {
    [
        "Sparse Routing for Efficient Transformers",
        "Jane Doe, John Roe",
        "",
        "Abstract",
        "We propose sparse routing to reduce attention cost.",
        "",
        "1. Introduction",
        "Attention is quadratic in sequence length. We address this cost.",
        "",
        "Methodology",
        "Tokens are routed to a small set of experts using learned gates.",
        "",
        "Results",
        "Sparse routing matches dense accuracy at 40% of the compute [12].",
        "",
        "Conclusion",
        "Routing is an effective way to scale attention.",
    ]
    .join("\n")
}

/// Default analysis config without pacing delays or backoff.
pub fn fast_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.sas.section_delay = Duration::ZERO;
    config.sas.retry_pause = Duration::ZERO;
    config.structured = RetryPolicy::new(2, Duration::ZERO);
    config
}

/// A completed paper analysis with all three hierarchy levels.
pub fn sample_analysis() -> PaperAnalysis {
    let mut paper = PaperAnalysis::default();
    let a = &mut paper.analysis;
    a.paper_title = "Sparse Routing for Efficient Transformers".into();
    a.authors = vec!["Jane Doe".into(), "John Roe".into()];
    a.contributions = vec!["Learned sparse routing".into(), "40% compute at equal accuracy".into()];
    a.limitations = vec!["Only evaluated on language modeling".into()];
    a.domain_tags = vec!["machine learning".into(), "transformers".into()];
    a.citations = vec!["Vaswani et al. 2017".into(), "Shazeer et al. 2017".into()];
    a.novelty = "high".into();
    a.hierarchical_summaries = (1..=3)
        .map(|level| HierarchicalLevel {
            level,
            summary: format!("level {} summary of sparse routing", level),
            key_contributions: vec!["Learned sparse routing".into()],
            scope: String::new(),
        })
        .collect();
    a.section_summaries
        .insert("Methodology (Merged)".into(), "Tokens are routed to experts.".into());
    a.section_summaries
        .insert("Results (Merged)".into(), "Dense accuracy at 40% compute.".into());
    a.total_sections = 5;
    paper.research_gaps = vec!["No evaluation beyond language modeling".into()];
    paper
}
