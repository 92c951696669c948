use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ReactLimits;
use crate::error::AnalysisError;
use crate::paper::types::PaperAnalysis;
use crate::react::{ReActStep, ReactLoop, ReactTask, PROTOCOL_INSTRUCTIONS};
use crate::repair::safe_structured_invoke;
use crate::search::SearchResult;
use crate::text::{join_limited, truncate_chars};

use super::{compact, prompt, prompts, StageContext};

const AGGREGATED_RESULTS: usize = 10;
const MAX_CANDIDATES: usize = 15;
const PAPER_URL_MARKERS: [&str; 6] = ["arxiv", "semanticscholar", "acm.org", "ieee.org", ".pdf", "paper"];
const PAPER_TITLE_MARKERS: [&str; 6] = ["paper", "study", "research", "learning", "neural", "model"];

/// Findings extracted from web search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WebFindings {
    pub topic_interpretation: String,
    pub related_terms: Vec<String>,
    pub query_intent: String,
    /// Source URLs grouped by category, e.g. "Research Papers" or "Blogs".
    pub aggregated_sources: BTreeMap<String, Vec<String>>,
    pub snippet_highlights: Vec<String>,
    pub credibility_scores: BTreeMap<String, f64>,
    pub trend_signals: BTreeMap<String, Value>,
    pub key_players: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebResearch {
    #[serde(flatten)]
    pub findings: WebFindings,
    pub retrieval_results: Vec<SearchResult>,
    pub react_steps: Vec<ReActStep>,
    pub candidate_papers: Vec<SearchResult>,
}

struct WebResearchTask {
    context: String,
    fallbacks: Vec<String>,
}

impl WebResearchTask {
    fn new(paper: &PaperAnalysis) -> Self {
        let a = &paper.analysis;
        let domains = join_limited(&a.domain_tags, 3, " ");
        let title = a.paper_title.trim();
        let fallbacks = if title.is_empty() {
            vec![
                format!("recent work {}", domains),
                format!("{} survey", domains),
                format!("{} benchmarks", domains),
            ]
        } else {
            vec![
                format!("{} related work", title),
                format!("recent work {}", domains),
                format!("{} benchmark results", title),
            ]
        };
        Self {
            context: research_context(paper),
            fallbacks,
        }
    }
}

impl ReactTask for WebResearchTask {
    fn name(&self) -> &str {
        "web_research"
    }

    fn system_prompt(&self) -> String {
        format!("{}\n\n{}", prompts::WEB_RESEARCH_SYSTEM_PROMPT, PROTOCOL_INSTRUCTIONS)
    }

    fn user_prompt(&self, trace: &str, collected: usize, limits: &ReactLimits) -> String {
        format!(
            "Context:\n{}\n\nPrevious:\n{}\n\nResults so far: {} (at least {} wanted)\n\nWhat next?",
            self.context, trace, collected, limits.min_results
        )
    }

    fn fallback_query(&self, iteration: u32) -> String {
        let idx = iteration.saturating_sub(1) as usize % self.fallbacks.len();
        self.fallbacks[idx].clone()
    }
}

/// Paper context shared by the search loop and the aggregation call.
fn research_context(paper: &PaperAnalysis) -> String {
    let a = &paper.analysis;
    let executive = match a.level(3) {
        Some(level) => truncate_chars(&level.summary, 500),
        None => "No executive summary",
    };
    format!(
        "Executive Summary: {}\nDomain: {}\nContributions: {}\nResearch Gaps: {}\nPaper Title: {}\nAuthors: {}\nCitations (sample): {}\nRelated Papers (sample): {}",
        executive,
        join_limited(&a.domain_tags, 3, ", "),
        join_limited(&a.contributions, 2, ", "),
        join_limited(&paper.research_gaps, 2, ", "),
        truncate_chars(&a.paper_title, 200),
        join_limited(&a.authors, 5, ", "),
        join_limited(&a.citations, 5, ", "),
        join_limited(&a.related_papers, 5, ", "),
    )
}

pub async fn run(ctx: &StageContext<'_>, paper: Option<&PaperAnalysis>) -> Result<WebResearch> {
    let paper = paper.ok_or(AnalysisError::MissingInput("paper analysis"))?;
    let task = WebResearchTask::new(paper);

    let mut seed = Vec::new();
    for citation in paper.analysis.citations.iter().take(ctx.config.citation_seed_count) {
        let query = format!("{} paper", citation);
        let found = ctx
            .search
            .search(&query, ctx.config.citation_seed_results)
            .await;
        debug!(query, results = found.len(), "citation search");
        seed.extend(found);
    }

    let outcome = ReactLoop::new(ctx.llm, ctx.search, ctx.config.web_research)
        .run(&task, seed)
        .await?;

    let findings = if outcome.results.len() < 2 {
        insufficient_findings(outcome.results.len())
    } else {
        let shown = &outcome.results[..outcome.results.len().min(AGGREGATED_RESULTS)];
        let messages = prompt(
            prompts::WEB_AGGREGATION_SYSTEM_PROMPT,
            format!(
                "Context (for query intent only):\n{}\n\nSearch results:\n{}\n\nExtract the information now.",
                truncate_chars(&task.context, 2000),
                compact(&shown)
            ),
        );
        safe_structured_invoke(ctx.llm, &messages, ctx.config.structured, Some(WebFindings::default()))
            .await?
    };

    let candidate_papers = candidate_papers(&outcome.results);
    info!(
        steps = outcome.steps.len(),
        results = outcome.results.len(),
        candidates = candidate_papers.len(),
        players = findings.key_players.len(),
        "web research complete"
    );

    Ok(WebResearch {
        findings,
        retrieval_results: outcome.results,
        react_steps: outcome.steps,
        candidate_papers,
    })
}

fn insufficient_findings(found: usize) -> WebFindings {
    WebFindings {
        topic_interpretation: format!(
            "Insufficient web data available. Only {} result(s) found.",
            found
        ),
        query_intent: "N/A".to_string(),
        ..Default::default()
    }
}

fn looks_like_paper(result: &SearchResult) -> bool {
    let url = result.url.to_lowercase();
    let title = result.title.to_lowercase();
    PAPER_URL_MARKERS.iter().any(|m| url.contains(m))
        || PAPER_TITLE_MARKERS.iter().any(|m| title.contains(m))
}

/// Results that look like papers, unique by lowercase title.
pub fn candidate_papers(results: &[SearchResult]) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .iter()
        .filter(|r| looks_like_paper(r))
        .filter(|r| seen.insert(r.title.to_lowercase()))
        .take(MAX_CANDIDATES)
        .map(|r| SearchResult::new(r.title.clone(), r.url.clone(), truncate_chars(&r.snippet, 200)))
        .collect()
}
