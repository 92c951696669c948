pub mod protocol;
pub mod results;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ReactLimits;
use crate::error::LlmError;
use crate::llm::{ChatModel, Message};
use crate::search::{SearchProvider, SearchResult};
use crate::text::truncate_chars;

use protocol::Action;
pub use results::ResultSet;

/// Instructions every ReAct system prompt ends with.
pub const PROTOCOL_INSTRUCTIONS: &str = "Respond in exactly this format:\n\
THOUGHT: <your reasoning about what to look for next>\n\
ACTION: web_search | FINISH\n\
ACTION_INPUT: <search query, only for web_search>";

/// One thought/action/observation cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReActStep {
    pub step: u32,
    pub thought: String,
    pub action: String,
    pub action_input: String,
    pub observation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Finished,
    IterationLimit,
    ResultCap,
}

#[derive(Debug, Clone)]
pub struct ReactOutcome {
    pub steps: Vec<ReActStep>,
    pub results: Vec<SearchResult>,
    pub iterations: u32,
    pub stop_reason: StopReason,
}

/// What varies between ReAct call sites.
pub trait ReactTask: Send + Sync {
    fn name(&self) -> &str;
    fn system_prompt(&self) -> String;
    fn user_prompt(&self, trace: &str, collected: usize, limits: &ReactLimits) -> String;
    /// Query used when the model must keep searching but gave none.
    fn fallback_query(&self, iteration: u32) -> String;
    /// Include actions and observations in the trace shown to the model.
    fn verbose_trace(&self) -> bool {
        false
    }
}

/// Bounded search-grounded reasoning loop.
pub struct ReactLoop<'a> {
    llm: &'a dyn ChatModel,
    search: &'a dyn SearchProvider,
    limits: ReactLimits,
}

impl<'a> ReactLoop<'a> {
    pub fn new(llm: &'a dyn ChatModel, search: &'a dyn SearchProvider, limits: ReactLimits) -> Self {
        Self { llm, search, limits }
    }

    /// Run until FINISH is accepted, the iteration limit is hit, or the result
    /// cap is reached. Makes at most `max_iterations` LLM calls.
    pub async fn run(
        &self,
        task: &dyn ReactTask,
        seed: Vec<SearchResult>,
    ) -> Result<ReactOutcome, LlmError> {
        let limits = self.limits;
        let mut results: ResultSet = seed.into_iter().collect();
        let mut steps: Vec<ReActStep> = Vec::new();
        let mut stop_reason = StopReason::IterationLimit;
        let mut iterations = 0;
        let system = Message::system(task.system_prompt());

        for iteration in 1..=limits.max_iterations {
            if results.len() >= limits.result_cap {
                stop_reason = StopReason::ResultCap;
                break;
            }
            iterations = iteration;

            let trace = render_trace(&steps, task.verbose_trace());
            let messages = [
                system.clone(),
                Message::user(task.user_prompt(&trace, results.len(), &limits)),
            ];
            let response = self.llm.chat(&messages).await?;
            let mut parsed = protocol::parse(&response);
            debug!(
                task = task.name(),
                iteration,
                action = parsed.action.label(),
                input = parsed.query(),
                "react step"
            );

            if parsed.action == Action::Finish && results.len() < limits.min_results {
                debug!(
                    task = task.name(),
                    iteration,
                    collected = results.len(),
                    min = limits.min_results,
                    "FINISH rejected, continuing search"
                );
                parsed.action = Action::WebSearch;
            }

            let observation = match &parsed.action {
                Action::WebSearch => {
                    if parsed.query().is_empty() {
                        parsed.action_input = task.fallback_query(iteration);
                    }
                    let query = parsed.query().to_string();
                    let found = self.search.search(&query, limits.results_per_search).await;
                    let returned = found.len();
                    let titles: Vec<String> = found.iter().map(|r| r.title.clone()).collect();
                    let added = results.extend(found);
                    describe_search(returned, added, &titles)
                }
                Action::Finish => "Research complete.".to_string(),
                Action::Unknown(name) => format!(
                    "Unknown action '{}'. Valid actions: web_search, FINISH.",
                    name
                ),
            };

            let finished = parsed.action == Action::Finish;
            steps.push(ReActStep {
                step: iteration,
                thought: parsed.thought,
                action: parsed.action.label().to_string(),
                action_input: parsed.action_input,
                observation,
            });

            if finished {
                stop_reason = StopReason::Finished;
                break;
            }
            if results.len() >= limits.result_cap {
                stop_reason = StopReason::ResultCap;
                break;
            }
        }

        let mut results = results.into_vec();
        results.truncate(limits.result_cap);
        info!(
            task = task.name(),
            iterations,
            steps = steps.len(),
            results = results.len(),
            stop_reason = ?stop_reason,
            "react loop finished"
        );
        Ok(ReactOutcome {
            steps,
            results,
            iterations,
            stop_reason,
        })
    }
}

fn describe_search(returned: usize, added: usize, titles: &[String]) -> String {
    let mut observation = format!("Found {} results ({} new).", returned, added);
    let named: Vec<&str> = titles
        .iter()
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .take(3)
        .collect();
    if !named.is_empty() {
        observation.push_str(" Top: ");
        observation.push_str(&named.join("; "));
    }
    observation
}

/// Previous steps rendered for the next prompt.
pub fn render_trace(steps: &[ReActStep], verbose: bool) -> String {
    if steps.is_empty() {
        return "(no previous steps)".to_string();
    }
    steps
        .iter()
        .map(|s| {
            if verbose {
                format!(
                    "Step {}:\nThought: {}\nAction: {}\nInput: {}\nObservation: {}",
                    s.step,
                    s.thought,
                    s.action,
                    s.action_input,
                    truncate_chars(&s.observation, 500)
                )
            } else {
                format!("Step {}: {}", s.step, truncate_chars(&s.thought, 80))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedModel, ScriptedSearch};

    struct TestTask;

    impl ReactTask for TestTask {
        fn name(&self) -> &str {
            "test"
        }
        fn system_prompt(&self) -> String {
            format!("Find papers.\n{}", PROTOCOL_INSTRUCTIONS)
        }
        fn user_prompt(&self, trace: &str, collected: usize, limits: &ReactLimits) -> String {
            format!("Collected {}/{}.\n{}", collected, limits.min_results, trace)
        }
        fn fallback_query(&self, iteration: u32) -> String {
            format!("fallback {}", iteration)
        }
    }

    #[tokio::test]
    async fn test_finish_only_llm_is_forced_to_floor() {
        let llm = ScriptedModel::new();
        let search = ScriptedSearch::unique();
        let outcome = ReactLoop::new(&llm, &search, ReactLimits::new(5, 3, 15, 2))
            .run(&TestTask, vec![])
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::Finished);
        assert_eq!(llm.text_calls(), 3);
        assert_eq!(outcome.results.len(), 4);
        assert_eq!(search.queries(), vec!["fallback 1", "fallback 2"]);
        assert_eq!(outcome.steps[0].action, "web_search");
        assert_eq!(outcome.steps[2].action, "FINISH");
    }

    #[tokio::test]
    async fn test_terminates_at_iteration_limit() {
        let llm = ScriptedModel::new();
        let search = ScriptedSearch::unique();
        let outcome = ReactLoop::new(&llm, &search, ReactLimits::new(5, 5, 15, 1))
            .run(&TestTask, vec![])
            .await
            .unwrap();
        assert!(llm.text_calls() <= 5);
        assert_eq!(outcome.iterations, 5);
        assert_eq!(outcome.results.len(), 5);
        assert!(outcome.steps.iter().all(|s| s.action == "web_search"));
    }

    #[tokio::test]
    async fn test_empty_search_runs_to_limit() {
        let llm = ScriptedModel::new();
        let search = ScriptedSearch::empty();
        let outcome = ReactLoop::new(&llm, &search, ReactLimits::new(4, 5, 30, 7))
            .run(&TestTask, vec![])
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::IterationLimit);
        assert_eq!(llm.text_calls(), 4);
        assert!(outcome.results.is_empty());
        assert!(outcome.steps[0].observation.starts_with("Found 0 results"));
    }

    #[tokio::test]
    async fn test_result_cap_stops_loop() {
        let llm = ScriptedModel::new()
            .with_default_text("THOUGHT: more\nACTION: web_search\nACTION_INPUT: routing");
        let search = ScriptedSearch::unique();
        let outcome = ReactLoop::new(&llm, &search, ReactLimits::new(8, 0, 10, 7))
            .run(&TestTask, vec![])
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::ResultCap);
        assert_eq!(llm.text_calls(), 2);
        assert_eq!(outcome.results.len(), 10);
        assert_eq!(search.queries(), vec!["routing", "routing"]);
    }

    #[tokio::test]
    async fn test_seed_at_cap_skips_llm() {
        let llm = ScriptedModel::new();
        let search = ScriptedSearch::empty();
        let seed: Vec<SearchResult> = (0..5)
            .map(|i| SearchResult::new(format!("t{}", i), format!("u{}", i), ""))
            .collect();
        let outcome = ReactLoop::new(&llm, &search, ReactLimits::new(5, 0, 5, 3))
            .run(&TestTask, seed)
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::ResultCap);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(llm.text_calls(), 0);
        assert_eq!(outcome.results.len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_action_and_duplicates() {
        let llm = ScriptedModel::new();
        llm.push_text("THOUGHT: try\nACTION: open_pdf\nACTION_INPUT: x");
        llm.push_text("THOUGHT: search\nACTION: web_search\nACTION_INPUT: a");
        llm.push_text("THOUGHT: again\nACTION: web_search\nACTION_INPUT: a");
        let search = ScriptedSearch::fixed(vec![SearchResult::new("A", "https://a", "")]);
        let outcome = ReactLoop::new(&llm, &search, ReactLimits::new(4, 0, 10, 3))
            .run(&TestTask, vec![])
            .await
            .unwrap();
        assert!(outcome.steps[0].observation.contains("Unknown action 'open_pdf'"));
        assert_eq!(outcome.steps[2].observation, "Found 1 results (0 new). Top: A");
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.stop_reason, StopReason::Finished);
        // trace of earlier thoughts is shown to the model
        assert!(llm.prompts()[2].contains("Step 2: search"));
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let llm = ScriptedModel::new().failing_text(|| LlmError::Network("down".into()));
        let search = ScriptedSearch::empty();
        let result = ReactLoop::new(&llm, &search, ReactLimits::new(3, 0, 10, 3))
            .run(&TestTask, vec![])
            .await;
        assert!(matches!(result, Err(LlmError::Network(_))));
    }

    #[test]
    fn test_trace_rendering() {
        let steps = vec![ReActStep {
            step: 1,
            thought: "x".repeat(200),
            action: "web_search".into(),
            action_input: "q".into(),
            observation: "o".repeat(900),
        }];
        let compact = render_trace(&steps, false);
        assert_eq!(compact.len(), "Step 1: ".len() + 80);
        let verbose = render_trace(&steps, true);
        assert!(verbose.contains("Input: q"));
        assert!(verbose.len() < 200 + 500 + 100);
    }
}
