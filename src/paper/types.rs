use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of recognized paper section kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Abstract,
    Introduction,
    RelatedWork,
    Background,
    Methodology,
    Experiments,
    Results,
    Discussion,
    Conclusion,
    Limitations,
    FutureWork,
}

impl SectionType {
    /// Detection order: the first matching type wins.
    pub const ALL: [SectionType; 11] = [
        SectionType::Abstract,
        SectionType::Introduction,
        SectionType::RelatedWork,
        SectionType::Background,
        SectionType::Methodology,
        SectionType::Experiments,
        SectionType::Results,
        SectionType::Discussion,
        SectionType::Conclusion,
        SectionType::Limitations,
        SectionType::FutureWork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Abstract => "abstract",
            SectionType::Introduction => "introduction",
            SectionType::RelatedWork => "related_work",
            SectionType::Background => "background",
            SectionType::Methodology => "methodology",
            SectionType::Experiments => "experiments",
            SectionType::Results => "results",
            SectionType::Discussion => "discussion",
            SectionType::Conclusion => "conclusion",
            SectionType::Limitations => "limitations",
            SectionType::FutureWork => "future_work",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SectionType::Abstract => "Abstract",
            SectionType::Introduction => "Introduction",
            SectionType::RelatedWork => "Related Work",
            SectionType::Background => "Background",
            SectionType::Methodology => "Methodology",
            SectionType::Experiments => "Experiments",
            SectionType::Results => "Results",
            SectionType::Discussion => "Discussion",
            SectionType::Conclusion => "Conclusion",
            SectionType::Limitations => "Limitations",
            SectionType::FutureWork => "Future Work",
        }
    }

    pub fn importance(&self) -> f64 {
        match self {
            SectionType::Abstract | SectionType::Methodology | SectionType::Results => 1.0,
            SectionType::Introduction | SectionType::Experiments => 0.95,
            SectionType::Conclusion => 0.9,
            SectionType::Discussion => 0.85,
            SectionType::Limitations => 0.8,
            SectionType::Background | SectionType::FutureWork => 0.75,
            SectionType::RelatedWork => 0.7,
        }
    }

    /// Elements a summary of this section is expected to cover.
    pub fn required_elements(&self) -> &'static [&'static str] {
        match self {
            SectionType::Abstract => &["problem", "approach", "results"],
            SectionType::Introduction => &["motivation", "problem", "contributions"],
            SectionType::RelatedWork => &["prior_approaches", "gaps"],
            SectionType::Background => &["concepts", "definitions"],
            SectionType::Methodology => &["approach", "algorithm", "implementation"],
            SectionType::Experiments => &["setup", "datasets", "metrics"],
            SectionType::Results => &["metrics", "comparisons", "analysis"],
            SectionType::Discussion => &["interpretation", "implications"],
            SectionType::Conclusion => &["summary", "impact", "future_work"],
            SectionType::Limitations => &["constraints", "weaknesses"],
            SectionType::FutureWork => &["directions", "extensions"],
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous region of the document under one detected header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub section_type: SectionType,
    /// Header line as it appeared, or a synthesized title after merging/chunking.
    pub title: String,
    pub content: String,
    /// Line index of the header in the source document.
    pub start_position: usize,
    pub word_count: usize,
    pub importance: f64,
}

impl Section {
    pub fn new(section_type: SectionType, title: String, content: String, start_position: usize) -> Self {
        let word_count = content.split_whitespace().count();
        Self {
            section_type,
            title,
            content,
            start_position,
            word_count,
            importance: section_type.importance(),
        }
    }
}

/// What the model is asked to produce for one section. Identity fields are
/// attached afterwards from the section itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SectionSummaryDraft {
    /// One or two sentence summary of the section.
    pub executive_summary: String,
    /// Thorough technical summary of the section.
    pub detailed_summary: String,
    pub key_points: Vec<String>,
    pub methodological_details: Vec<String>,
    pub empirical_findings: Vec<String>,
    pub technical_terms: Vec<String>,
    pub citations_mentioned: Vec<String>,
    pub related_sections: Vec<String>,
    /// 0.0 to 1.0
    pub information_density: f64,
    /// 0.0 to 1.0
    pub novelty_score: f64,
}

/// Section Summary (SAS).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub section_id: String,
    pub section_type: SectionType,
    pub section_title: String,
    pub executive_summary: String,
    pub detailed_summary: String,
    pub key_points: Vec<String>,
    pub methodological_details: Vec<String>,
    pub empirical_findings: Vec<String>,
    pub technical_terms: Vec<String>,
    pub citations_mentioned: Vec<String>,
    pub related_sections: Vec<String>,
    pub information_density: f64,
    pub novelty_score: f64,
}

impl SectionSummary {
    pub fn from_draft(section: &Section, draft: SectionSummaryDraft) -> Self {
        Self {
            section_id: section_id(section),
            section_type: section.section_type,
            section_title: section.title.clone(),
            executive_summary: draft.executive_summary,
            detailed_summary: draft.detailed_summary,
            key_points: draft.key_points,
            methodological_details: draft.methodological_details,
            empirical_findings: draft.empirical_findings,
            technical_terms: draft.technical_terms,
            citations_mentioned: draft.citations_mentioned,
            related_sections: draft.related_sections,
            information_density: draft.information_density.clamp(0.0, 1.0),
            novelty_score: draft.novelty_score.clamp(0.0, 1.0),
        }
    }
}

pub(crate) fn section_id(section: &Section) -> String {
    format!(
        "{}_{}",
        section.section_type.as_str().to_uppercase(),
        section.start_position
    )
}

/// One level of the hierarchical synthesis pyramid (1 = most detailed).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalLevel {
    pub level: u8,
    pub summary: String,
    pub key_contributions: Vec<String>,
    pub scope: String,
}

/// Paper-level structured analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ComprehensivePaperAnalysis {
    pub paper_title: String,
    pub authors: Vec<String>,
    pub publication_info: String,
    #[schemars(skip)]
    pub hierarchical_summaries: Vec<HierarchicalLevel>,
    #[schemars(skip)]
    pub section_summaries: BTreeMap<String, String>,
    pub abstract_summary: String,
    pub contributions: Vec<String>,
    pub methodology: BTreeMap<String, Value>,
    pub datasets: Vec<String>,
    pub experiments: Vec<String>,
    pub results: BTreeMap<String, Value>,
    pub limitations: Vec<String>,
    pub future_work: Vec<String>,
    pub technical_depth: String,
    pub novelty: String,
    pub domain_tags: Vec<String>,
    pub code_resources: BTreeMap<String, Value>,
    pub related_papers: Vec<String>,
    pub citations: Vec<String>,
    /// 0.0 to 1.0
    pub relevance_score: f64,
    /// 0.0 to 1.0
    pub quality_score: f64,
    #[schemars(skip)]
    pub total_sections: usize,
    #[schemars(skip)]
    pub processing_timestamp: String,
}

impl ComprehensivePaperAnalysis {
    pub fn level(&self, level: u8) -> Option<&HierarchicalLevel> {
        self.hierarchical_summaries.iter().find(|l| l.level == level)
    }

    pub fn level_text(&self, level: u8) -> &str {
        self.level(level).map(|l| l.summary.as_str()).unwrap_or("")
    }

    /// Detailed summary of the first section whose title names the given type.
    pub fn section_summary_for(&self, section_type: SectionType) -> Option<&str> {
        let name = section_type.display_name().to_lowercase();
        self.section_summaries
            .iter()
            .find(|(title, _)| title.to_lowercase().starts_with(&name))
            .map(|(_, summary)| summary.as_str())
    }
}

/// One multi-hop reasoning answer over section summaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub question: String,
    pub evidence: Vec<String>,
    pub reasoning: String,
    pub conclusion: String,
}

/// Output of the paper analysis stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperAnalysis {
    #[serde(flatten)]
    pub analysis: ComprehensivePaperAnalysis,
    pub reasoning_traces: Vec<ReasoningTrace>,
    pub research_gaps: Vec<String>,
}
