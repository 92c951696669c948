use anyhow::Result;
use tracing::{info, warn};

use crate::error::AnalysisError;
use crate::paper::types::{ComprehensivePaperAnalysis, PaperAnalysis, ReasoningTrace};
use crate::paper::{DocumentLoader, PaperProcessor, PaperSource};
use crate::text::truncate_chars;

use super::{prompt, prompts, StageContext};

struct ReasoningQuestion {
    question: &'static str,
    relevant_sections: &'static [&'static str],
}

const REASONING_QUESTIONS: [ReasoningQuestion; 3] = [
    ReasoningQuestion {
        question: "How do the contributions relate to the methodology?",
        relevant_sections: &["introduction", "methodology", "approach"],
    },
    ReasoningQuestion {
        question: "What evidence supports the claimed results?",
        relevant_sections: &["methodology", "experiments", "results"],
    },
    ReasoningQuestion {
        question: "What limitations exist and what gaps remain?",
        relevant_sections: &["results", "discussion", "conclusion", "limitations"],
    },
];

const EVIDENCE_CHARS: usize = 300;
const EVIDENCE_PER_QUESTION: usize = 5;
const CONCLUSION_CHARS: usize = 200;

/// Load the paper, run SAS+HAS, then reason across sections.
pub async fn run(
    ctx: &StageContext<'_>,
    loader: &dyn DocumentLoader,
    source: Option<&PaperSource>,
) -> Result<PaperAnalysis> {
    let source = source.ok_or(AnalysisError::MissingInput("paper path or URL"))?;
    let text = loader.load(source).await?;
    let analysis = PaperProcessor::new(ctx.llm, ctx.config).process(&text).await?;

    let reasoning_traces = reason(ctx, &analysis).await;
    let research_gaps = research_gaps(&reasoning_traces);
    info!(
        title = %analysis.paper_title,
        sections = analysis.total_sections,
        traces = reasoning_traces.len(),
        gaps = research_gaps.len(),
        "paper analysis complete"
    );

    Ok(PaperAnalysis {
        analysis,
        reasoning_traces,
        research_gaps,
    })
}

/// Evidence lines for one question: every section summary whose title names one
/// of the question's relevant sections.
fn gather_evidence(analysis: &ComprehensivePaperAnalysis, relevant: &[&str]) -> Vec<String> {
    analysis
        .section_summaries
        .iter()
        .filter(|(title, _)| {
            let title = title.to_lowercase();
            relevant.iter().any(|r| title.contains(r))
        })
        .map(|(title, summary)| format!("[{}]: {}", title, truncate_chars(summary, EVIDENCE_CHARS)))
        .collect()
}

async fn reason(ctx: &StageContext<'_>, analysis: &ComprehensivePaperAnalysis) -> Vec<ReasoningTrace> {
    let context = truncate_chars(analysis.level_text(2), 1000);
    let mut traces = Vec::new();

    for rq in &REASONING_QUESTIONS {
        let evidence = gather_evidence(analysis, rq.relevant_sections);
        if evidence.is_empty() {
            continue;
        }
        let shown: Vec<&str> = evidence
            .iter()
            .take(EVIDENCE_PER_QUESTION)
            .map(String::as_str)
            .collect();
        let messages = prompt(
            prompts::REASONING_SYSTEM_PROMPT,
            format!(
                "Question: {}\n\nEvidence:\n{}\n\nContext: {}\n\nProvide reasoning:",
                rq.question,
                shown.join("\n\n"),
                context
            ),
        );

        match ctx.llm.chat(&messages).await {
            Ok(answer) => traces.push(ReasoningTrace {
                question: rq.question.to_string(),
                evidence: evidence.into_iter().take(3).collect(),
                conclusion: truncate_chars(&answer, CONCLUSION_CHARS).to_string(),
                reasoning: answer,
            }),
            Err(e) => warn!(question = rq.question, error = %e, "reasoning step failed, skipping"),
        }
    }
    traces
}

fn research_gaps(traces: &[ReasoningTrace]) -> Vec<String> {
    traces
        .iter()
        .filter(|t| {
            let q = t.question.to_lowercase();
            q.contains("limitation") || q.contains("gap")
        })
        .map(|t| t.conclusion.clone())
        .collect()
}
