use std::collections::BTreeMap;

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::paper::types::{ComprehensivePaperAnalysis, PaperAnalysis};
use crate::repair::safe_structured_invoke;
use crate::text::{join_limited, truncate_chars};

use super::comparative::ComparativeAnalysis;
use super::sota::SotaAnalysis;
use super::web_research::WebResearch;
use super::{compact, prompt, prompts, StageContext};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DirectionAdvice {
    pub gaps_analysis_results: Vec<BTreeMap<String, Value>>,
    pub future_directions_results: Vec<BTreeMap<String, Value>>,
    pub future_references_results: Vec<BTreeMap<String, Value>>,
}

/// Everything the direction advisor reads. Missing stages render as "N/A".
pub struct DirectionInputs<'a> {
    pub paper: Option<&'a PaperAnalysis>,
    pub web: Option<&'a WebResearch>,
    pub sota: Option<&'a SotaAnalysis>,
    pub comparative: Option<&'a ComparativeAnalysis>,
}

fn or_na(s: &str) -> &str {
    if s.trim().is_empty() {
        "N/A"
    } else {
        s
    }
}

fn level_text(paper: Option<&ComprehensivePaperAnalysis>, n: u8) -> &str {
    paper.map(|a| truncate_chars(a.level_text(n), 3000)).unwrap_or("")
}

pub async fn run(ctx: &StageContext<'_>, inputs: DirectionInputs<'_>) -> Result<DirectionAdvice> {
    let paper = inputs.paper.map(|p| &p.analysis);
    let level = |n: u8| level_text(paper, n);
    let (contributions, limitations, domains) = match paper {
        Some(a) => (
            join_limited(&a.contributions, 5, ", "),
            join_limited(&a.limitations, 5, ", "),
            join_limited(&a.domain_tags, 5, ", "),
        ),
        None => Default::default(),
    };

    let key_players = inputs
        .web
        .map(|w| join_limited(&w.findings.key_players, 5, ", "))
        .unwrap_or_default();
    let trends = inputs
        .web
        .filter(|w| !w.findings.trend_signals.is_empty())
        .map(|w| truncate_chars(&compact(&w.findings.trend_signals), 2000).to_string())
        .unwrap_or_default();
    let sota = inputs
        .sota
        .map(|s| truncate_chars(&s.sota_tracker_summary, 2000))
        .unwrap_or("");
    let comparative = inputs
        .comparative
        .map(|c| truncate_chars(&c.findings.comparative_analysis_summary, 2000))
        .unwrap_or("");

    let messages = prompt(
        prompts::DIRECTION_SYSTEM_PROMPT,
        format!(
            "Level 3 (Executive): {}\nLevel 2 (Intermediate): {}\nLevel 1 (Detailed): {}\nContributions: {}\nLimitations: {}\nDomain: {}\nKey Players: {}\nTrends: {}\nSOTA: {}\nComparative: {}\n\nProvide strategic direction.",
            level(3),
            level(2),
            level(1),
            contributions,
            limitations,
            domains,
            or_na(&key_players),
            or_na(&trends),
            or_na(sota),
            or_na(comparative),
        ),
    );

    let advice: DirectionAdvice =
        safe_structured_invoke(ctx.llm, &messages, ctx.config.structured, None).await?;
    info!(
        gaps = advice.gaps_analysis_results.len(),
        directions = advice.future_directions_results.len(),
        references = advice.future_references_results.len(),
        "direction advice complete"
    );
    Ok(advice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::testing::{fast_config, sample_analysis, ScriptedModel, ScriptedSearch};
    use serde_json::json;

    #[tokio::test]
    async fn test_direction_reads_specialist_summaries() {
        let llm = ScriptedModel::new();
        llm.push_structured(json!({
            "gaps_analysis_results": [{"gap": "multilingual evaluation"}],
            "future_directions_results": [{"direction": "routing for vision"}, {"direction": "hardware"}]
        }));
        let search = ScriptedSearch::empty();
        let config = fast_config();
        let ctx = StageContext {
            llm: &llm,
            search: &search,
            config: &config,
        };
        let paper = sample_analysis();
        let sota = SotaAnalysis {
            sota_tracker_summary: "MoE is state of the art".into(),
            ..Default::default()
        };
        let advice = run(
            &ctx,
            DirectionInputs {
                paper: Some(&paper),
                web: None,
                sota: Some(&sota),
                comparative: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(advice.gaps_analysis_results.len(), 1);
        assert_eq!(advice.future_directions_results.len(), 2);
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("SOTA: MoE is state of the art"));
        assert!(prompt.contains("Comparative: N/A"));
        assert!(prompt.contains("Limitations: Only evaluated on language modeling"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_an_error() {
        let llm = ScriptedModel::new().failing_structured(|| LlmError::Api {
            status: 500,
            body: "upstream".into(),
        });
        let search = ScriptedSearch::empty();
        let config = fast_config();
        let ctx = StageContext {
            llm: &llm,
            search: &search,
            config: &config,
        };
        let inputs = DirectionInputs {
            paper: None,
            web: None,
            sota: None,
            comparative: None,
        };
        assert!(run(&ctx, inputs).await.is_err());
        assert_eq!(llm.structured_calls(), 3);
    }
}
