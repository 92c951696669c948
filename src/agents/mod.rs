pub mod advisor;
pub mod comparative;
pub mod deep_dive;
pub mod direction;
pub mod paper_analysis;
pub mod prompts;
pub mod report;
pub mod sota;
pub mod web_research;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::llm::{ChatModel, Message};
use crate::search::SearchProvider;

/// Named pipeline stages. Each has its own model override and sampling temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    PaperAnalysis,
    WebResearch,
    AdvisorSpecialist,
    SotaTracker,
    ComparativeAnalysis,
    DirectionAdvisor,
    ReportGeneration,
    DeepDive,
}

impl Agent {
    pub const ALL: [Agent; 8] = [
        Agent::PaperAnalysis,
        Agent::WebResearch,
        Agent::AdvisorSpecialist,
        Agent::SotaTracker,
        Agent::ComparativeAnalysis,
        Agent::DirectionAdvisor,
        Agent::ReportGeneration,
        Agent::DeepDive,
    ];

    /// Stages the advisor may route to.
    pub const SPECIALISTS: [Agent; 2] = [Agent::SotaTracker, Agent::ComparativeAnalysis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::PaperAnalysis => "paper_analysis",
            Agent::WebResearch => "web_research",
            Agent::AdvisorSpecialist => "advisor_specialist",
            Agent::SotaTracker => "sota_tracker",
            Agent::ComparativeAnalysis => "comparative_analysis",
            Agent::DirectionAdvisor => "direction_advisor",
            Agent::ReportGeneration => "report_generation",
            Agent::DeepDive => "deep_dive",
        }
    }

    /// Suffix of the `AGENT_<KEY>_MODEL` override variable.
    pub fn env_key(&self) -> String {
        self.as_str().to_uppercase()
    }

    pub fn temperature(&self) -> f32 {
        match self {
            Agent::WebResearch | Agent::AdvisorSpecialist | Agent::DeepDive => 0.0,
            _ => 0.1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Agent::PaperAnalysis => "Paper Analysis",
            Agent::WebResearch => "Web Research",
            Agent::AdvisorSpecialist => "Advisor",
            Agent::SotaTracker => "SOTA Tracker",
            Agent::ComparativeAnalysis => "Comparative Analysis",
            Agent::DirectionAdvisor => "Direction Advisor",
            Agent::ReportGeneration => "Report Generation",
            Agent::DeepDive => "Deep Dive",
        }
    }

    pub fn from_name(name: &str) -> Option<Agent> {
        let name = name.trim().to_lowercase().replace([' ', '-'], "_");
        Agent::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators a stage runs against.
pub struct StageContext<'a> {
    pub llm: &'a dyn ChatModel,
    pub search: &'a dyn SearchProvider,
    pub config: &'a AnalysisConfig,
}

pub(crate) fn prompt(system: &str, user: String) -> [Message; 2] {
    [Message::system(system), Message::user(user)]
}

/// Compact text rendering of a JSON value for prompts.
pub(crate) fn compact<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
