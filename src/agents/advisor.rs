use std::collections::BTreeMap;

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::paper::types::PaperAnalysis;
use crate::react::ResultSet;
use crate::repair::safe_structured_invoke;
use crate::search::SearchResult;
use crate::text::{join_limited, truncate_chars};

use super::web_research::WebResearch;
use super::{compact, prompt, prompts, Agent, StageContext};

const GAP_QUERIES: usize = 3;
const GAP_RESULTS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SearchQualityAssessment {
    /// Between 0.0 and 1.0.
    pub search_quality_score: f64,
    pub coverage_gaps: Vec<String>,
    pub additional_queries_needed: Vec<String>,
    pub is_sufficient: bool,
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RoutingDecision {
    pub needed_specialists: Vec<String>,
    pub specialist_priorities: BTreeMap<String, String>,
    pub routing_reasoning: String,
    pub research_focus_areas: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorOutput {
    pub quality_assessment: SearchQualityAssessment,
    pub routing_decision: RoutingDecision,
    /// Gap-filling results. Web research output is never rewritten.
    pub supplemental_results: Vec<SearchResult>,
    pub next_agents: Vec<Agent>,
}

impl AdvisorOutput {
    /// Route to every specialist without consulting the model.
    pub fn default_routing(reason: &str) -> Self {
        Self {
            quality_assessment: SearchQualityAssessment {
                reasoning: reason.to_string(),
                ..Default::default()
            },
            routing_decision: RoutingDecision {
                needed_specialists: Agent::SPECIALISTS.iter().map(|a| a.to_string()).collect(),
                ..Default::default()
            },
            supplemental_results: Vec::new(),
            next_agents: Agent::SPECIALISTS.to_vec(),
        }
    }
}

/// Known specialists named by the decision, in order and without repeats.
/// An empty selection routes to every specialist.
pub fn select_specialists(decision: &RoutingDecision) -> Vec<Agent> {
    let mut selected = Vec::new();
    for name in &decision.needed_specialists {
        if let Some(agent) = Agent::from_name(name) {
            if Agent::SPECIALISTS.contains(&agent) && !selected.contains(&agent) {
                selected.push(agent);
            }
        }
    }
    if selected.is_empty() {
        return Agent::SPECIALISTS.to_vec();
    }
    selected
}

pub async fn run(
    ctx: &StageContext<'_>,
    paper: Option<&PaperAnalysis>,
    web: Option<&WebResearch>,
) -> Result<AdvisorOutput> {
    let paper = paper.ok_or(AnalysisError::MissingInput("paper analysis"))?;
    let web = match web {
        Some(web) if !web.retrieval_results.is_empty() => web,
        _ => {
            info!("web research missing or empty, routing to all specialists");
            return Ok(AdvisorOutput::default_routing("Web research unavailable"));
        }
    };
    let a = &paper.analysis;
    let (Some(level2), Some(level3)) = (a.level(2), a.level(3)) else {
        return Err(AnalysisError::MissingInput("hierarchical summaries").into());
    };
    let domains = join_limited(&a.domain_tags, 3, ", ");

    let messages = prompt(
        prompts::QUALITY_SYSTEM_PROMPT,
        format!(
            "Domain: {}\nContributions: {}\nLevel 2 Context: {}\n\nSearch Results: {} items\nKey Players: {}\n\nAssess quality:",
            domains,
            join_limited(&a.contributions, 2, " | "),
            truncate_chars(&level2.summary, 1000),
            web.retrieval_results.len(),
            join_limited(&web.findings.key_players, 5, ", "),
        ),
    );
    let assessment: SearchQualityAssessment =
        safe_structured_invoke(ctx.llm, &messages, ctx.config.structured, None).await?;
    info!(
        score = assessment.search_quality_score,
        sufficient = assessment.is_sufficient,
        "search quality assessed"
    );

    let mut supplemental_results = Vec::new();
    if !assessment.is_sufficient {
        let mut known: ResultSet = web.retrieval_results.iter().cloned().collect();
        for query in assessment.additional_queries_needed.iter().take(GAP_QUERIES) {
            let found = ctx.search.search(query, GAP_RESULTS).await;
            debug!(query = %query, results = found.len(), "gap-filling search");
            for result in found {
                if known.extend([result.clone()]) == 1 {
                    supplemental_results.push(result);
                }
            }
        }
    }

    let messages = prompt(
        prompts::ROUTING_SYSTEM_PROMPT,
        format!(
            "Level 3 (Executive): {}\nLevel 2 (Intermediate): {}\n\nDomain: {}\nNovelty: {}\nTrends: {}\n\nWhich specialists?",
            truncate_chars(&level3.summary, 500),
            truncate_chars(&level2.summary, 1000),
            domains,
            if a.novelty.is_empty() { "Unknown" } else { a.novelty.as_str() },
            truncate_chars(&compact(&web.findings.trend_signals), 300),
        ),
    );
    let routing_decision: RoutingDecision =
        safe_structured_invoke(ctx.llm, &messages, ctx.config.structured, None).await?;
    let next_agents = select_specialists(&routing_decision);
    info!(
        specialists = ?next_agents,
        supplemental = supplemental_results.len(),
        "routing decided"
    );

    Ok(AdvisorOutput {
        quality_assessment: assessment,
        routing_decision,
        supplemental_results,
        next_agents,
    })
}
