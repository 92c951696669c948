use serde::{Deserialize, Serialize};

use crate::agents::advisor::AdvisorOutput;
use crate::agents::comparative::ComparativeAnalysis;
use crate::agents::direction::DirectionAdvice;
use crate::agents::report::ResearchReport;
use crate::agents::sota::SotaAnalysis;
use crate::agents::web_research::WebResearch;
use crate::agents::Agent;
use crate::paper::types::PaperAnalysis;
use crate::paper::PaperSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub agent: Agent,
    pub error: String,
}

/// Accumulated pipeline output. Each field is written only by its own stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineState {
    pub paper_source: Option<PaperSource>,
    pub paper_analysis: Option<PaperAnalysis>,
    pub web_research: Option<WebResearch>,
    pub advisor: Option<AdvisorOutput>,
    pub sota_tracker: Option<SotaAnalysis>,
    pub comparative_analysis: Option<ComparativeAnalysis>,
    pub direction_advisor: Option<DirectionAdvice>,
    pub report: Option<ResearchReport>,
    pub errors: Vec<StageError>,
}

impl PipelineState {
    pub fn new(source: PaperSource) -> Self {
        Self {
            paper_source: Some(source),
            ..Default::default()
        }
    }

    pub(crate) fn record_error(&mut self, agent: Agent, err: &anyhow::Error) -> &str {
        self.errors.push(StageError {
            agent,
            error: format!("{:#}", err),
        });
        &self.errors[self.errors.len() - 1].error
    }

    /// Specialists to run: the advisor's routing, or all of them.
    pub fn specialists(&self) -> Vec<Agent> {
        match &self.advisor {
            Some(advisor) if !advisor.next_agents.is_empty() => advisor.next_agents.clone(),
            _ => Agent::SPECIALISTS.to_vec(),
        }
    }

    pub fn paper_title(&self) -> Option<&str> {
        self.paper_analysis
            .as_ref()
            .map(|p| p.analysis.paper_title.as_str())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn errors_for(&self, agent: Agent) -> impl Iterator<Item = &StageError> {
        self.errors.iter().filter(move |e| e.agent == agent)
    }
}
