use std::collections::BTreeMap;

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::ReactLimits;
use crate::error::AnalysisError;
use crate::paper::types::{PaperAnalysis, SectionType};
use crate::react::{ReActStep, ReactLoop, ReactTask, PROTOCOL_INSTRUCTIONS};
use crate::repair::safe_structured_invoke;
use crate::text::{join_limited, truncate_chars};

use super::advisor::AdvisorOutput;
use super::web_research::WebResearch;
use super::{compact, prompt, prompts, StageContext};

const COMPARED_RESULTS: usize = 12;
pub const INSUFFICIENT_STATUS: &str = "Incomplete - insufficient data";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ComparativeFindings {
    pub comparative_analysis_results: Vec<BTreeMap<String, Value>>,
    pub comparative_analysis_summary: String,
    pub comparative_analysis_recommendation: String,
    pub comparative_analysis_status: String,
    pub comparative_analysis_date: String,
    pub comparative_analysis_author: String,
    pub comparative_analysis_title: String,
    pub comparative_analysis_publication: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparativeAnalysis {
    #[serde(flatten)]
    pub findings: ComparativeFindings,
    pub react_steps: Vec<ReActStep>,
    pub sources_used: usize,
}

struct ComparisonTask {
    context: String,
    fallbacks: Vec<String>,
}

impl ComparisonTask {
    fn new(paper: &PaperAnalysis) -> Self {
        let a = &paper.analysis;
        let title = title_or_unknown(paper);
        let mut fallbacks = Vec::new();
        if let Some(citation) = a.citations.first() {
            fallbacks.push(format!("{} paper comparison", citation));
        }
        fallbacks.push(format!("{} related work comparison", title));
        fallbacks.push(format!("{} benchmark comparison", title));

        let contributions: Vec<String> = a
            .contributions
            .iter()
            .take(2)
            .map(|c| truncate_chars(c, 100).to_string())
            .collect();
        let context = format!(
            "Paper Title: {}\nDomain: {}\nKey Contributions: {}\nCitations (sample): {}\nRelated Papers: {}",
            title,
            join_limited(&a.domain_tags, 3, ", "),
            contributions.join(", "),
            join_limited(&a.citations, 5, ", "),
            join_limited(&a.related_papers, 3, ", "),
        );
        Self { context, fallbacks }
    }
}

impl ReactTask for ComparisonTask {
    fn name(&self) -> &str {
        "comparative_analysis"
    }

    fn system_prompt(&self) -> String {
        format!("{}\n\n{}", prompts::COMPARATIVE_REACT_PROMPT, PROTOCOL_INSTRUCTIONS)
    }

    fn user_prompt(&self, trace: &str, collected: usize, _limits: &ReactLimits) -> String {
        format!(
            "Context:\n{}\n\nPrevious steps:\n{}\n\nComparison data collected: {} sources\n\nWhat comparison info do we still need?",
            self.context, trace, collected
        )
    }

    fn fallback_query(&self, iteration: u32) -> String {
        let idx = iteration.saturating_sub(1) as usize % self.fallbacks.len();
        self.fallbacks[idx].clone()
    }
}

fn title_or_unknown(paper: &PaperAnalysis) -> &str {
    let title = paper.analysis.paper_title.trim();
    if title.is_empty() {
        "Unknown Paper"
    } else {
        title
    }
}

fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Explicit record returned instead of a synthesis when evidence is too thin.
pub fn insufficient_data(title: &str, sources: usize) -> ComparativeFindings {
    ComparativeFindings {
        comparative_analysis_results: Vec::new(),
        comparative_analysis_summary: format!(
            "Insufficient comparison data available. Only {} source(s) found.",
            sources
        ),
        comparative_analysis_recommendation:
            "More research needed to establish meaningful comparisons.".to_string(),
        comparative_analysis_status: INSUFFICIENT_STATUS.to_string(),
        comparative_analysis_date: timestamp(),
        comparative_analysis_author: "Research Copilot".to_string(),
        comparative_analysis_title: format!("Comparative Analysis - {}", title),
        comparative_analysis_publication: "N/A".to_string(),
    }
}

pub async fn run(
    ctx: &StageContext<'_>,
    paper: Option<&PaperAnalysis>,
    web: Option<&WebResearch>,
    advisor: Option<&AdvisorOutput>,
) -> Result<ComparativeAnalysis> {
    let paper = paper.ok_or(AnalysisError::MissingInput("paper analysis"))?;
    let task = ComparisonTask::new(paper);

    let mut seed = Vec::new();
    if let Some(web) = web {
        seed.extend(web.retrieval_results.iter().cloned());
    }
    if let Some(advisor) = advisor {
        seed.extend(advisor.supplemental_results.iter().cloned());
    }

    let outcome = ReactLoop::new(ctx.llm, ctx.search, ctx.config.comparative)
        .run(&task, seed)
        .await?;
    let sources_used = outcome.results.len();
    let title = title_or_unknown(paper);

    let findings = if sources_used < 2 {
        info!(sources = sources_used, "insufficient comparison data, skipping synthesis");
        insufficient_data(title, sources_used)
    } else {
        let a = &paper.analysis;
        let shown = &outcome.results[..sources_used.min(COMPARED_RESULTS)];
        let messages = prompt(
            prompts::COMPARATIVE_SYSTEM_PROMPT,
            format!(
                "Paper being analyzed:\nTitle: {}\nMethodology: {}\nResults: {}\nDomain: {}\n\nSearch Results (JSON): {}\n\nGenerate the comparative analysis grounded only in these results.",
                title,
                truncate_chars(a.section_summary_for(SectionType::Methodology).unwrap_or(""), 800),
                truncate_chars(a.section_summary_for(SectionType::Results).unwrap_or(""), 800),
                join_limited(&a.domain_tags, 3, ", "),
                compact(&shown),
            ),
        );
        let mut findings = safe_structured_invoke(
            ctx.llm,
            &messages,
            ctx.config.structured,
            Some(ComparativeFindings::default()),
        )
        .await?;
        if findings.comparative_analysis_date.is_empty() {
            findings.comparative_analysis_date = timestamp();
        }
        findings
    };

    info!(
        title = %findings.comparative_analysis_title,
        sources = sources_used,
        steps = outcome.steps.len(),
        "comparative analysis complete"
    );
    Ok(ComparativeAnalysis {
        findings,
        react_steps: outcome.steps,
        sources_used,
    })
}
