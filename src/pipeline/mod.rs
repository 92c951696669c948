pub mod events;
pub mod state;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::agents::direction::DirectionInputs;
use crate::agents::report::ReportInputs;
use crate::agents::{
    advisor, comparative, direction, paper_analysis, report, sota, web_research, Agent,
    StageContext,
};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::llm::{ChatModel, ModelRouter};
use crate::paper::{DocumentLoader, PaperSource};
use crate::search::SearchProvider;

pub use events::{EventSender, PipelineEvent};
pub use state::{PipelineState, StageError};

use events::emit;

/// The fixed stage graph: paper analysis, web research, advisor, the routed
/// specialists side by side, direction, report.
pub struct Pipeline {
    models: Arc<dyn ModelRouter>,
    search: Arc<dyn SearchProvider>,
    loader: Arc<dyn DocumentLoader>,
    config: AnalysisConfig,
}

impl Pipeline {
    pub fn new(
        models: Arc<dyn ModelRouter>,
        search: Arc<dyn SearchProvider>,
        loader: Arc<dyn DocumentLoader>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            models,
            search,
            loader,
            config,
        }
    }

    fn context<'a>(&'a self, llm: &'a dyn ChatModel) -> StageContext<'a> {
        StageContext {
            llm,
            search: &*self.search,
            config: &self.config,
        }
    }

    fn begin(&self, agent: Agent, events: Option<&EventSender>) {
        info!(agent = %agent, "stage started");
        emit(
            events,
            PipelineEvent::AgentStart {
                agent,
                message: events::start_message(agent).to_string(),
            },
        );
    }

    /// Unwrap a stage result, recording a failure in the state instead of
    /// propagating it.
    fn settle<T>(
        state: &mut PipelineState,
        agent: Agent,
        result: Result<T>,
        events: Option<&EventSender>,
    ) -> Option<T> {
        match result {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(agent = %agent, error = %format!("{:#}", e), "stage failed");
                let error = state.record_error(agent, &e);
                let message = events::failure_message(agent, error);
                emit(events, PipelineEvent::AgentUpdate { agent, message });
                None
            }
        }
    }

    fn finish(agent: Agent, state: &PipelineState, events: Option<&EventSender>) {
        if let Some(message) = events::update_message(agent, state) {
            emit(events, PipelineEvent::AgentUpdate { agent, message });
        }
        emit(events, PipelineEvent::AgentComplete { agent });
    }

    /// Run every stage against one paper. Fails only when no paper was given;
    /// stage failures land in `PipelineState::errors` and a report is always produced.
    pub async fn run(
        &self,
        source: Option<PaperSource>,
        events: Option<&EventSender>,
    ) -> Result<PipelineState> {
        let Some(source) = source else {
            let err = AnalysisError::MissingInput("paper path or URL");
            emit(events, PipelineEvent::Error { message: err.to_string() });
            return Err(err.into());
        };

        info!(source = %source, "pipeline started");
        emit(
            events,
            PipelineEvent::Start {
                message: events::START_MESSAGE.to_string(),
            },
        );
        let mut state = PipelineState::new(source);

        self.begin(Agent::PaperAnalysis, events);
        let llm = self.models.for_agent(Agent::PaperAnalysis);
        let result =
            paper_analysis::run(&self.context(&*llm), &*self.loader, state.paper_source.as_ref())
                .await;
        state.paper_analysis = Self::settle(&mut state, Agent::PaperAnalysis, result, events);
        Self::finish(Agent::PaperAnalysis, &state, events);

        self.begin(Agent::WebResearch, events);
        let llm = self.models.for_agent(Agent::WebResearch);
        let result = web_research::run(&self.context(&*llm), state.paper_analysis.as_ref()).await;
        state.web_research = Self::settle(&mut state, Agent::WebResearch, result, events);
        Self::finish(Agent::WebResearch, &state, events);

        self.begin(Agent::AdvisorSpecialist, events);
        let llm = self.models.for_agent(Agent::AdvisorSpecialist);
        let result = advisor::run(
            &self.context(&*llm),
            state.paper_analysis.as_ref(),
            state.web_research.as_ref(),
        )
        .await;
        state.advisor = Self::settle(&mut state, Agent::AdvisorSpecialist, result, events);
        Self::finish(Agent::AdvisorSpecialist, &state, events);

        let routed = state.specialists();
        info!(specialists = ?routed, "routing specialists");
        let (sota_result, comparative_result) = {
            let state = &state;
            let routed = &routed;
            let sota_task = async move {
                if !routed.contains(&Agent::SotaTracker) {
                    return None;
                }
                self.begin(Agent::SotaTracker, events);
                let llm = self.models.for_agent(Agent::SotaTracker);
                Some(
                    sota::run(
                        &self.context(&*llm),
                        state.paper_analysis.as_ref(),
                        state.web_research.as_ref(),
                    )
                    .await,
                )
            };
            let comparative_task = async move {
                if !routed.contains(&Agent::ComparativeAnalysis) {
                    return None;
                }
                self.begin(Agent::ComparativeAnalysis, events);
                let llm = self.models.for_agent(Agent::ComparativeAnalysis);
                Some(
                    comparative::run(
                        &self.context(&*llm),
                        state.paper_analysis.as_ref(),
                        state.web_research.as_ref(),
                        state.advisor.as_ref(),
                    )
                    .await,
                )
            };
            futures::join!(sota_task, comparative_task)
        };
        if let Some(result) = sota_result {
            state.sota_tracker = Self::settle(&mut state, Agent::SotaTracker, result, events);
            Self::finish(Agent::SotaTracker, &state, events);
        }
        if let Some(result) = comparative_result {
            state.comparative_analysis =
                Self::settle(&mut state, Agent::ComparativeAnalysis, result, events);
            Self::finish(Agent::ComparativeAnalysis, &state, events);
        }

        self.begin(Agent::DirectionAdvisor, events);
        let llm = self.models.for_agent(Agent::DirectionAdvisor);
        let result = direction::run(
            &self.context(&*llm),
            DirectionInputs {
                paper: state.paper_analysis.as_ref(),
                web: state.web_research.as_ref(),
                sota: state.sota_tracker.as_ref(),
                comparative: state.comparative_analysis.as_ref(),
            },
        )
        .await;
        state.direction_advisor = Self::settle(&mut state, Agent::DirectionAdvisor, result, events);
        Self::finish(Agent::DirectionAdvisor, &state, events);

        self.begin(Agent::ReportGeneration, events);
        let llm = self.models.for_agent(Agent::ReportGeneration);
        let generated = report::run(
            &self.context(&*llm),
            ReportInputs {
                paper: state.paper_analysis.as_ref(),
                web: state.web_research.as_ref(),
                sota: state.sota_tracker.as_ref(),
                comparative: state.comparative_analysis.as_ref(),
                direction: state.direction_advisor.as_ref(),
            },
        )
        .await;
        state.report = Some(generated);
        Self::finish(Agent::ReportGeneration, &state, events);

        info!(
            errors = state.errors.len(),
            title = state.paper_title().unwrap_or("unknown"),
            "pipeline complete"
        );
        emit(
            events,
            PipelineEvent::Complete {
                message: events::COMPLETE_MESSAGE.to_string(),
            },
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::comparative::INSUFFICIENT_STATUS;
    use crate::error::DocumentError;
    use crate::testing::{
        fast_config, sample_paper, AgentRouter, ScriptedModel, ScriptedRouter, ScriptedSearch,
        StaticLoader,
    };
    use serde_json::json;
    use tokio::sync::mpsc;

    fn pipeline(
        models: impl ModelRouter + 'static,
        search: ScriptedSearch,
        paper: String,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(models),
            Arc::new(search),
            Arc::new(StaticLoader(paper)),
            fast_config(),
        )
    }

    fn source() -> Option<PaperSource> {
        Some(PaperSource::Url("https://arxiv.org/abs/2401.00001".into()))
    }

    fn drain(mut rx: mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_empty_search_still_produces_report() {
        let router = ScriptedRouter::new(ScriptedModel::new());
        let model = router.model.clone();
        let pipeline = pipeline(router, ScriptedSearch::empty(), sample_paper());
        let (tx, rx) = mpsc::unbounded_channel();

        let state = pipeline.run(source(), Some(&tx)).await.unwrap();

        assert!(state.errors.is_empty(), "{:?}", state.errors);
        assert!(state.paper_analysis.is_some());
        let comparative = state.comparative_analysis.as_ref().unwrap();
        assert_eq!(comparative.findings.comparative_analysis_status, INSUFFICIENT_STATUS);
        let tools = model.tools();
        assert!(!tools.iter().any(|t| t == "ComparativeFindings"));
        assert!(!tools.iter().any(|t| t == "WebFindings"));
        assert!(tools.iter().any(|t| t == "SotaAnalysis"));
        assert_eq!(tools.last().map(String::as_str), Some("ResearchReport"));
        assert_eq!(state.report.as_ref().unwrap().export_formats, vec!["markdown", "json"]);

        let events = drain(rx);
        assert_eq!(
            events.first(),
            Some(&PipelineEvent::Start {
                message: events::START_MESSAGE.into()
            })
        );
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Complete {
                message: events::COMPLETE_MESSAGE.into()
            })
        );
        let completed: Vec<Agent> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::AgentComplete { agent } => Some(*agent),
                _ => None,
            })
            .collect();
        assert_eq!(
            completed,
            vec![
                Agent::PaperAnalysis,
                Agent::WebResearch,
                Agent::AdvisorSpecialist,
                Agent::SotaTracker,
                Agent::ComparativeAnalysis,
                Agent::DirectionAdvisor,
                Agent::ReportGeneration,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_paper_analysis_degrades_downstream() {
        let router = ScriptedRouter::new(ScriptedModel::new());
        let pipeline = pipeline(router, ScriptedSearch::empty(), String::new());
        let (tx, rx) = mpsc::unbounded_channel();

        let state = pipeline.run(source(), Some(&tx)).await.unwrap();

        let failed: Vec<Agent> = state.errors.iter().map(|e| e.agent).collect();
        assert_eq!(
            failed,
            vec![
                Agent::PaperAnalysis,
                Agent::WebResearch,
                Agent::AdvisorSpecialist,
                Agent::SotaTracker,
                Agent::ComparativeAnalysis,
            ]
        );
        assert_eq!(state.errors[0].error, DocumentError::Empty.to_string());
        assert!(state.paper_analysis.is_none());
        assert!(state.direction_advisor.is_some());
        let report = state.report.unwrap();
        assert!(!report.export_formats.is_empty());

        let events = drain(rx);
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::AgentUpdate { agent: Agent::PaperAnalysis, message }
                if message.contains("Paper Analysis failed")
        )));
    }

    #[tokio::test]
    async fn test_missing_source_refuses_to_start() {
        let router = ScriptedRouter::new(ScriptedModel::new());
        let model = router.model.clone();
        let pipeline = pipeline(router, ScriptedSearch::empty(), sample_paper());
        let (tx, rx) = mpsc::unbounded_channel();

        let err = pipeline.run(None, Some(&tx)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::MissingInput(_))
        ));
        assert_eq!(model.text_calls() + model.structured_calls(), 0);
        assert!(matches!(drain(rx).as_slice(), [PipelineEvent::Error { .. }]));
    }

    #[tokio::test]
    async fn test_advisor_routing_skips_unselected_specialist() {
        let advisor = ScriptedModel::new();
        advisor.push_structured(json!({"search_quality_score": 0.9, "is_sufficient": true}));
        advisor.push_structured(json!({"needed_specialists": ["comparative_analysis"]}));
        let sota = Arc::new(ScriptedModel::new());
        let router = AgentRouter::new(ScriptedModel::new())
            .with(Agent::AdvisorSpecialist, advisor)
            .with_shared(Agent::SotaTracker, sota.clone());
        let pipeline = pipeline(router, ScriptedSearch::unique(), sample_paper());

        let state = pipeline.run(source(), None).await.unwrap();

        assert!(state.errors.is_empty(), "{:?}", state.errors);
        assert_eq!(state.specialists(), vec![Agent::ComparativeAnalysis]);
        assert!(state.sota_tracker.is_none());
        assert_eq!(sota.text_calls() + sota.structured_calls(), 0);
        let comparative = state.comparative_analysis.unwrap();
        assert!(comparative.sources_used >= 2);
        assert_ne!(comparative.findings.comparative_analysis_status, INSUFFICIENT_STATUS);
        assert!(state.web_research.unwrap().retrieval_results.len() >= 15);
    }
}
