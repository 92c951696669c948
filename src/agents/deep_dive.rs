use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ReactLimits;
use crate::llm::Message;
use crate::react::{ReActStep, ReactLoop, ReactTask, PROTOCOL_INSTRUCTIONS};
use crate::search::SearchResult;
use crate::text::truncate_chars;

use super::{prompt, prompts, StageContext};

const CONTEXT_CHARS: usize = 10_000;
const HISTORY_TURNS: usize = 5;

/// One follow-up question about a report field.
pub struct DeepDiveRequest<'a> {
    pub field: &'a str,
    pub message: &'a str,
    /// Earlier turns of this field's thread, oldest first.
    pub history: &'a [Message],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepDiveAnswer {
    pub answer: String,
    pub sources: Vec<SearchResult>,
    pub thought_process: Vec<String>,
}

/// Find a field in a completed pipeline state: top level first, then the
/// report, then the paper analysis. `sota_analysis` names the tracker output.
pub fn lookup_field(state: &Value, field: &str) -> Option<Value> {
    let present = |v: Option<&Value>| v.filter(|v| !is_empty(v)).cloned();
    let key = if field == "sota_analysis" { "sota_tracker" } else { field };
    present(state.get(key))
        .or_else(|| present(state.get("report").and_then(|r| r.get(field))))
        .or_else(|| present(state.get("paper_analysis").and_then(|p| p.get(field))))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn render_content(content: &Value) -> String {
    let pretty = serde_json::to_string_pretty(content).unwrap_or_default();
    if pretty.chars().count() > CONTEXT_CHARS {
        format!("{}... (truncated)", truncate_chars(&pretty, CONTEXT_CHARS))
    } else {
        pretty
    }
}

struct DeepDiveTask {
    context: String,
    question: String,
}

impl ReactTask for DeepDiveTask {
    fn name(&self) -> &str {
        "deep_dive"
    }

    fn system_prompt(&self) -> String {
        format!("{}\n\n{}", prompts::DEEP_DIVE_SYSTEM_PROMPT, PROTOCOL_INSTRUCTIONS)
    }

    fn user_prompt(&self, trace: &str, _collected: usize, _limits: &ReactLimits) -> String {
        format!(
            "{}\n\nPrevious steps:\n{}\n\nWhat is your next THOUGHT and ACTION?",
            self.context, trace
        )
    }

    fn fallback_query(&self, _iteration: u32) -> String {
        truncate_chars(&self.question, 200).to_string()
    }

    fn verbose_trace(&self) -> bool {
        true
    }
}

pub async fn run(
    ctx: &StageContext<'_>,
    state: &Value,
    request: &DeepDiveRequest<'_>,
) -> Result<DeepDiveAnswer> {
    let content = lookup_field(state, request.field).unwrap_or_else(|| {
        warn!(field = request.field, "field not found in pipeline state");
        Value::String(format!(
            "Field {} not found in structured output. Proceeding with general context.",
            request.field
        ))
    });

    let skip = request.history.len().saturating_sub(HISTORY_TURNS);
    let history: Vec<String> = request.history[skip..]
        .iter()
        .map(|m| format!("{}: {}", m.role.to_uppercase(), m.content))
        .collect();

    let task = DeepDiveTask {
        context: format!(
            "Field: {}\nField Content:\n{}\n\nChat History:\n{}\n\nUser Question: {}",
            request.field,
            render_content(&content),
            if history.is_empty() { "(none)".to_string() } else { history.join("\n") },
            request.message
        ),
        question: request.message.to_string(),
    };

    let outcome = ReactLoop::new(ctx.llm, ctx.search, ctx.config.deep_dive)
        .run(&task, Vec::new())
        .await?;

    let answer = ctx
        .llm
        .chat(&prompt(
            prompts::DEEP_DIVE_ANSWER_PROMPT,
            format!(
                "User Question: {}\n\nResearch Steps:\n{}\n\nProvide a clear, direct answer.",
                request.message,
                summarize_steps(&outcome.steps)
            ),
        ))
        .await?;

    let sources = outcome
        .results
        .iter()
        .map(|r| SearchResult::new(r.title.clone(), r.url.clone(), truncate_chars(&r.snippet, 200)))
        .collect::<Vec<_>>();
    info!(
        field = request.field,
        steps = outcome.steps.len(),
        sources = sources.len(),
        "deep dive answered"
    );

    Ok(DeepDiveAnswer {
        answer,
        sources,
        thought_process: outcome.steps.into_iter().map(|s| s.thought).collect(),
    })
}

fn summarize_steps(steps: &[ReActStep]) -> String {
    if steps.is_empty() {
        return "(no research steps)".to_string();
    }
    steps
        .iter()
        .map(|s| {
            format!(
                "Thought: {}\nObservation: {}",
                s.thought,
                truncate_chars(&s.observation, 500)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, ScriptedModel, ScriptedSearch};
    use serde_json::json;

    fn state() -> Value {
        json!({
            "sota_tracker": {"sota_tracker_summary": "MoE leads"},
            "comparative_analysis": null,
            "report": {"research_findings": "Routing halves compute", "executive_summary": ""},
            "paper_analysis": {"contributions": ["sparse routing"], "executive_summary": "from paper"}
        })
    }

    #[test]
    fn test_lookup_order_and_alias() {
        let state = state();
        assert_eq!(
            lookup_field(&state, "research_findings"),
            Some(json!("Routing halves compute"))
        );
        assert_eq!(lookup_field(&state, "contributions"), Some(json!(["sparse routing"])));
        assert_eq!(
            lookup_field(&state, "sota_analysis"),
            Some(json!({"sota_tracker_summary": "MoE leads"}))
        );
        // empty report value falls through to the paper analysis
        assert_eq!(lookup_field(&state, "executive_summary"), Some(json!("from paper")));
        assert_eq!(lookup_field(&state, "comparative_analysis"), None);
        assert_eq!(lookup_field(&state, "nonexistent"), None);
    }

    #[test]
    fn test_long_content_is_truncated() {
        let rendered = render_content(&json!("x".repeat(20_000)));
        assert!(rendered.ends_with("... (truncated)"));
        assert_eq!(rendered.chars().count(), CONTEXT_CHARS + "... (truncated)".len());
    }

    #[tokio::test]
    async fn test_searches_then_synthesizes_answer() {
        let llm = ScriptedModel::new();
        llm.push_text("THOUGHT: need benchmarks\nACTION: web_search: switch transformer benchmarks");
        llm.push_text("THOUGHT: enough\nACTION: FINISH");
        llm.push_text("Switch Transformers report a 7x speedup.");
        let search = ScriptedSearch::fixed(vec![SearchResult::new(
            "Switch Transformers",
            "https://arxiv.org/abs/2101.03961",
            "7x pre-training speedup",
        )]);
        let config = fast_config();
        let ctx = StageContext {
            llm: &llm,
            search: &search,
            config: &config,
        };
        let history: Vec<Message> = (0..7)
            .map(|i| Message::user(format!("turn {}", i)))
            .collect();
        let request = DeepDiveRequest {
            field: "research_findings",
            message: "How does this compare to Switch Transformers?",
            history: &history,
        };
        let answer = run(&ctx, &state(), &request).await.unwrap();

        assert_eq!(answer.answer, "Switch Transformers report a 7x speedup.");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.thought_process, vec!["need benchmarks", "enough"]);
        assert_eq!(search.queries(), vec!["switch transformer benchmarks"]);
        assert_eq!(search.calls(), 1);

        let prompts = llm.prompts();
        assert!(prompts[0].contains("Routing halves compute"));
        assert!(!prompts[0].contains("turn 1\n"));
        assert!(prompts[0].contains("USER: turn 6"));
        // second step sees the first step's observation
        assert!(prompts[1].contains("Observation: Found 1 results"));
    }

    #[tokio::test]
    async fn test_unknown_field_still_answers() {
        let llm = ScriptedModel::new();
        let search = ScriptedSearch::empty();
        let config = fast_config();
        let ctx = StageContext {
            llm: &llm,
            search: &search,
            config: &config,
        };
        let request = DeepDiveRequest {
            field: "market_insights",
            message: "Anything?",
            history: &[],
        };
        let answer = run(&ctx, &state(), &request).await.unwrap();
        assert!(llm.prompts()[0].contains("Field market_insights not found"));
        // one FINISH step, then the synthesis call
        assert_eq!(llm.text_calls(), 2);
        assert_eq!(answer.thought_process, vec!["nothing more to do"]);
        assert!(answer.sources.is_empty());
    }
}
