use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::{info, warn};

use super::prompts::FINAL_SYSTEM_PROMPT;
use super::types::{ComprehensivePaperAnalysis, HierarchicalLevel, SectionSummary};
use crate::config::RetryPolicy;
use crate::error::LlmError;
use crate::llm::{ChatModel, Message};
use crate::repair::safe_structured_invoke;
use crate::text::{first_non_empty_line, join_limited, truncate_chars};

/// Per-attempt truncation budgets for the final synthesis prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisBudget {
    pub document_head: usize,
    pub level1_chars: usize,
    pub contributions: usize,
    pub methodologies: usize,
    pub results: usize,
    pub citations: usize,
}

/// Attempt `n` uses row `n`; attempts past the table reuse the last row.
pub const SYNTHESIS_BUDGETS: [SynthesisBudget; 3] = [
    SynthesisBudget {
        document_head: 4_000,
        level1_chars: 20_000,
        contributions: 50,
        methodologies: 30,
        results: 30,
        citations: 50,
    },
    SynthesisBudget {
        document_head: 3_000,
        level1_chars: 16_000,
        contributions: 40,
        methodologies: 25,
        results: 25,
        citations: 40,
    },
    SynthesisBudget {
        document_head: 2_000,
        level1_chars: 12_000,
        contributions: 30,
        methodologies: 20,
        results: 20,
        citations: 30,
    },
];

const LEVEL2_CHARS: usize = 15_000;
const LEVEL3_CHARS: usize = 10_000;
const FALLBACK_LIST_CAP: usize = 20;
const FALLBACK_JOIN_CAP: usize = 10;

pub fn budget_for(attempt: u32) -> SynthesisBudget {
    let idx = (attempt as usize).min(SYNTHESIS_BUDGETS.len() - 1);
    SYNTHESIS_BUDGETS[idx]
}

pub struct SynthesisInput<'a> {
    pub document: &'a str,
    pub summaries: &'a [SectionSummary],
    pub hierarchy: &'a [HierarchicalLevel],
    /// Number of sections originally detected, before merging or chunking.
    pub total_sections: usize,
}

/// Details aggregated across all section summaries.
struct Extracted {
    contributions: Vec<String>,
    methodologies: Vec<String>,
    results: Vec<String>,
    citations: Vec<String>,
    section_map: BTreeMap<String, String>,
}

impl Extracted {
    fn collect(summaries: &[SectionSummary]) -> Self {
        let mut seen = HashSet::new();
        Self {
            contributions: summaries.iter().flat_map(|s| s.key_points.clone()).collect(),
            methodologies: summaries
                .iter()
                .flat_map(|s| s.methodological_details.clone())
                .collect(),
            results: summaries
                .iter()
                .flat_map(|s| s.empirical_findings.clone())
                .collect(),
            citations: summaries
                .iter()
                .flat_map(|s| s.citations_mentioned.clone())
                .filter(|c| seen.insert(c.clone()))
                .collect(),
            section_map: summaries
                .iter()
                .map(|s| (s.section_title.clone(), s.detailed_summary.clone()))
                .collect(),
        }
    }
}

pub struct FinalSynthesizer<'a> {
    llm: &'a dyn ChatModel,
    max_attempts: u32,
}

impl<'a> FinalSynthesizer<'a> {
    pub fn new(llm: &'a dyn ChatModel, max_attempts: u32) -> Self {
        Self {
            llm,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn synthesize(
        &self,
        input: &SynthesisInput<'_>,
    ) -> Result<ComprehensivePaperAnalysis, LlmError> {
        let extracted = Extracted::collect(input.summaries);

        for attempt in 0..self.max_attempts {
            let budget = budget_for(attempt);
            let messages = build_messages(input, &extracted, budget);
            match safe_structured_invoke::<ComprehensivePaperAnalysis>(
                self.llm,
                &messages,
                RetryPolicy::once(),
                None,
            )
            .await
            {
                Ok(mut analysis) => {
                    finalize(&mut analysis, input, &extracted);
                    info!(
                        attempt,
                        title = %analysis.paper_title,
                        contributions = analysis.contributions.len(),
                        "final synthesis complete"
                    );
                    return Ok(analysis);
                }
                Err(e) if e.is_tool_call_failure() => {
                    warn!(attempt, error = %e, "final synthesis rejected, shrinking budgets");
                }
                Err(e) => return Err(e),
            }
        }

        warn!("final synthesis retries exhausted, building fallback analysis");
        Ok(fallback_analysis(input, &extracted))
    }
}

fn build_messages(
    input: &SynthesisInput<'_>,
    extracted: &Extracted,
    budget: SynthesisBudget,
) -> Vec<Message> {
    let level = |n: u8| {
        input
            .hierarchy
            .iter()
            .find(|l| l.level == n)
            .map(|l| l.summary.as_str())
            .unwrap_or("")
    };
    let bullets = |items: &[String], cap: usize| {
        items
            .iter()
            .take(cap)
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let user = format!(
        "First page:\n{}\n\nExecutive summary:\n{}\n\nMethodology and results summary:\n{}\n\nDetailed overview:\n{}\n\nContributions:\n{}\n\nMethodological details:\n{}\n\nEmpirical findings:\n{}\n\nCitations:\n{}\n\nProduce the complete structured analysis.",
        truncate_chars(input.document, budget.document_head),
        truncate_chars(level(3), LEVEL3_CHARS),
        truncate_chars(level(2), LEVEL2_CHARS),
        truncate_chars(level(1), budget.level1_chars),
        bullets(&extracted.contributions, budget.contributions),
        bullets(&extracted.methodologies, budget.methodologies),
        bullets(&extracted.results, budget.results),
        bullets(&extracted.citations, budget.citations),
    );
    vec![Message::system(FINAL_SYSTEM_PROMPT), Message::user(user)]
}

/// Fields that always come from the pipeline rather than the model.
fn finalize(analysis: &mut ComprehensivePaperAnalysis, input: &SynthesisInput<'_>, extracted: &Extracted) {
    analysis.hierarchical_summaries = input.hierarchy.to_vec();
    analysis.section_summaries = extracted.section_map.clone();
    analysis.total_sections = input.total_sections;
    analysis.processing_timestamp = chrono::Utc::now().to_rfc3339();
    analysis.relevance_score = analysis.relevance_score.clamp(0.0, 1.0);
    analysis.quality_score = analysis.quality_score.clamp(0.0, 1.0);
}

fn fallback_analysis(input: &SynthesisInput<'_>, extracted: &Extracted) -> ComprehensivePaperAnalysis {
    let head = truncate_chars(input.document, SYNTHESIS_BUDGETS[0].document_head);
    let level3 = input
        .hierarchy
        .iter()
        .find(|l| l.level == 3)
        .map(|l| l.summary.clone())
        .unwrap_or_default();

    let mut methodology = BTreeMap::new();
    methodology.insert(
        "approach".to_string(),
        Value::String(join_limited(&extracted.methodologies, FALLBACK_JOIN_CAP, "; ")),
    );
    let mut results = BTreeMap::new();
    results.insert(
        "findings".to_string(),
        Value::String(join_limited(&extracted.results, FALLBACK_JOIN_CAP, "; ")),
    );

    let mut analysis = ComprehensivePaperAnalysis {
        paper_title: first_non_empty_line(head)
            .unwrap_or("Unknown Paper")
            .to_string(),
        abstract_summary: level3,
        contributions: extracted
            .contributions
            .iter()
            .take(FALLBACK_LIST_CAP)
            .cloned()
            .collect(),
        methodology,
        results,
        technical_depth: "Moderate (fallback analysis)".to_string(),
        novelty: "See hierarchical summaries for details".to_string(),
        domain_tags: vec!["Research Paper".to_string()],
        citations: extracted
            .citations
            .iter()
            .take(FALLBACK_LIST_CAP)
            .cloned()
            .collect(),
        relevance_score: 0.7,
        quality_score: 0.7,
        ..Default::default()
    };
    finalize(&mut analysis, input, extracted);
    analysis
}
