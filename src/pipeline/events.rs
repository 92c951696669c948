use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::agents::Agent;
use crate::text::join_limited;

use super::state::PipelineState;

pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;

pub const START_MESSAGE: &str = "Starting research analysis...";
pub const COMPLETE_MESSAGE: &str =
    "Research analysis complete! Your comprehensive report is ready.";

/// Progress notifications streamed while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Start { message: String },
    AgentStart { agent: Agent, message: String },
    AgentUpdate { agent: Agent, message: String },
    AgentComplete { agent: Agent },
    Complete { message: String },
    Error { message: String },
}

impl PipelineEvent {
    pub fn agent(&self) -> Option<Agent> {
        match self {
            PipelineEvent::AgentStart { agent, .. }
            | PipelineEvent::AgentUpdate { agent, .. }
            | PipelineEvent::AgentComplete { agent } => Some(*agent),
            _ => None,
        }
    }

    /// Chat line for the event, if it carries one.
    pub fn message(&self) -> Option<&str> {
        match self {
            PipelineEvent::Start { message }
            | PipelineEvent::AgentStart { message, .. }
            | PipelineEvent::AgentUpdate { message, .. }
            | PipelineEvent::Complete { message }
            | PipelineEvent::Error { message } => Some(message),
            PipelineEvent::AgentComplete { .. } => None,
        }
    }
}

/// Send if anyone is listening. A dropped receiver never stops the run.
pub(crate) fn emit(events: Option<&EventSender>, event: PipelineEvent) {
    if let Some(tx) = events {
        if tx.send(event).is_err() {
            debug!("pipeline event receiver dropped");
        }
    }
}

pub fn start_message(agent: Agent) -> &'static str {
    match agent {
        Agent::PaperAnalysis => "📰 Analyzing paper structure and extracting key insights...",
        Agent::WebResearch => "🔍 Searching the web for related research and trends...",
        Agent::AdvisorSpecialist => {
            "🤔 Evaluating research quality and planning specialist analysis..."
        }
        Agent::SotaTracker => "🏆 Tracking state-of-the-art developments...",
        Agent::ComparativeAnalysis => "⚖️ Comparing with related research papers (ReAct)...",
        Agent::DirectionAdvisor => "📈 Synthesizing findings and identifying future directions...",
        Agent::ReportGeneration => "📝 Generating your comprehensive research report...",
        Agent::DeepDive => "🔎 Digging deeper into the report...",
    }
}

/// Summary line for a finished stage, read from the stage's own output.
pub fn update_message(agent: Agent, state: &PipelineState) -> Option<String> {
    match agent {
        Agent::PaperAnalysis => state.paper_analysis.as_ref().map(|p| {
            let a = &p.analysis;
            let title = if a.paper_title.is_empty() { "Unknown" } else { a.paper_title.as_str() };
            format!(
                "📄 **Paper:** {}\n\n**Key Contributions:** {} identified\n**Domains:** {}",
                title,
                a.contributions.len(),
                join_limited(&a.domain_tags, 3, ", ")
            )
        }),
        Agent::WebResearch => state.web_research.as_ref().map(|w| {
            let players = join_limited(&w.findings.key_players, 3, ", ");
            format!(
                "🌐 Found **{}** relevant sources\n**Key Researchers:** {}",
                w.retrieval_results.len(),
                if players.is_empty() { "Analyzing..." } else { players.as_str() }
            )
        }),
        Agent::AdvisorSpecialist => state.advisor.as_ref().map(|a| {
            let next: Vec<&str> = a.next_agents.iter().map(|agent| agent.label()).collect();
            format!(
                "🧪 Search quality **{:.2}**, routing to {}",
                a.quality_assessment.search_quality_score,
                next.join(" and ")
            )
        }),
        Agent::SotaTracker => state.sota_tracker.as_ref().map(|s| {
            let status = if s.sota_tracker_status.is_empty() {
                "Analyzed"
            } else {
                s.sota_tracker_status.as_str()
            };
            format!("🎯 **SOTA Status:** {}", status)
        }),
        Agent::ComparativeAnalysis => state.comparative_analysis.as_ref().map(|c| {
            let title = if c.findings.comparative_analysis_title.is_empty() {
                "Comparison Complete"
            } else {
                c.findings.comparative_analysis_title.as_str()
            };
            format!(
                "📊 **Comparative Analysis:** {}\n**Sources compared:** {}",
                title, c.sources_used
            )
        }),
        Agent::DirectionAdvisor => state.direction_advisor.as_ref().map(|d| {
            format!(
                "🧭 Identified **{}** research gaps and **{}** future directions",
                d.gaps_analysis_results.len(),
                d.future_directions_results.len()
            )
        }),
        Agent::ReportGeneration => state.report.as_ref().map(|r| {
            format!(
                "📋 Report generated! Available formats: {}",
                r.export_formats.join(", ")
            )
        }),
        Agent::DeepDive => None,
    }
}

pub fn failure_message(agent: Agent, error: &str) -> String {
    format!("⚠️ {} failed: {}", agent.label(), error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_analysis;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PipelineEvent::AgentStart {
            agent: Agent::WebResearch,
            message: start_message(Agent::WebResearch).to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "agent_start");
        assert_eq!(json["agent"], "web_research");
        assert_eq!(event.agent(), Some(Agent::WebResearch));
        assert!(PipelineEvent::AgentComplete { agent: Agent::SotaTracker }
            .message()
            .is_none());
    }

    #[test]
    fn test_update_lines_read_stage_output() {
        let mut state = PipelineState::default();
        assert!(update_message(Agent::PaperAnalysis, &state).is_none());

        state.paper_analysis = Some(sample_analysis());
        let line = update_message(Agent::PaperAnalysis, &state).unwrap();
        assert!(line.contains("Sparse Routing for Efficient Transformers"));
        assert!(line.contains("**Key Contributions:** 2 identified"));
        assert!(line.contains("machine learning, transformers"));
    }

    #[test]
    fn test_emit_without_receiver_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        emit(Some(&tx), PipelineEvent::Start { message: START_MESSAGE.into() });
        emit(None, PipelineEvent::Start { message: START_MESSAGE.into() });
    }
}
