use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::agents::deep_dive::{self, DeepDiveAnswer, DeepDiveRequest};
use crate::agents::{Agent, StageContext};
use crate::config::AnalysisConfig;
use crate::llm::{Message, ModelRouter};
use crate::paper::DocumentLoader;
use crate::pipeline::{EventSender, Pipeline, PipelineEvent};
use crate::search::SearchProvider;

use super::{ChatMessage, SessionRecord, SessionStatus, SessionStore};

/// Drives pipeline runs and deep-dive chats against stored sessions.
#[derive(Clone)]
pub struct SessionRunner {
    store: Arc<SessionStore>,
    models: Arc<dyn ModelRouter>,
    search: Arc<dyn SearchProvider>,
    loader: Arc<dyn DocumentLoader>,
    config: Arc<RwLock<AnalysisConfig>>,
}

impl SessionRunner {
    pub fn new(
        store: Arc<SessionStore>,
        models: Arc<dyn ModelRouter>,
        search: Arc<dyn SearchProvider>,
        loader: Arc<dyn DocumentLoader>,
        config: Arc<RwLock<AnalysisConfig>>,
    ) -> Self {
        Self {
            store,
            models,
            search,
            loader,
            config,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Run the pipeline for a session, mirroring every event into its log and
    /// forwarding it to `events`. The final record is returned either way.
    pub async fn run(&self, session_id: &str, events: Option<EventSender>) -> Result<SessionRecord> {
        let Some(record) = self
            .store
            .modify(session_id, |r| r.status = SessionStatus::Processing)
            .await?
        else {
            bail!("session not found: {}", session_id);
        };
        if let Some(source) = &record.paper_source {
            let request = ChatMessage::new("user", format!("Analyze this paper: {}", source), None);
            self.log(session_id, request).await;
        }

        // Each run works against a snapshot of the config taken here.
        let config = self.config.read().await.clone();
        let pipeline = Pipeline::new(
            self.models.clone(),
            self.search.clone(),
            self.loader.clone(),
            config,
        );
        info!(session_id, owner_id = record.owner_id, "session run started");

        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();
        let source = record.paper_source.clone();
        let drive = async move {
            let tx = tx;
            pipeline.run(source, Some(&tx)).await
        };
        let mirror = async {
            let mut forward = events;
            while let Some(event) = rx.recv().await {
                self.mirror(session_id, &event).await;
                let closed = forward.as_ref().is_some_and(|out| out.send(event).is_err());
                if closed {
                    debug!(session_id, "event receiver closed, no longer forwarding");
                    forward = None;
                }
            }
        };
        let (result, ()) = futures::join!(drive, mirror);

        let outcome = match result {
            Ok(state) => {
                let errors: Vec<String> = state
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.agent, e.error))
                    .collect();
                info!(session_id, stage_errors = errors.len(), "session run completed");
                self.store
                    .modify(session_id, move |r| {
                        r.status = SessionStatus::Completed;
                        r.current_agent = None;
                        r.errors = errors;
                        r.state = Some(state);
                    })
                    .await?
            }
            Err(e) => {
                error!(session_id, error = %format!("{:#}", e), "session run failed");
                let message = format!("{:#}", e);
                self.store
                    .modify(session_id, move |r| {
                        r.status = SessionStatus::Error;
                        r.current_agent = None;
                        r.errors.push(message);
                    })
                    .await?
            }
        };
        match outcome {
            Some(record) => Ok(record),
            None => bail!("session {} was deleted during the run", session_id),
        }
    }

    async fn mirror(&self, session_id: &str, event: &PipelineEvent) {
        if let PipelineEvent::AgentStart { agent, .. } = event {
            let agent = *agent;
            if let Err(e) = self
                .store
                .modify(session_id, |r| r.current_agent = Some(agent))
                .await
            {
                warn!(session_id, "failed to record current agent: {:#}", e);
            }
        }
        let line = match event {
            PipelineEvent::Error { message } => {
                ChatMessage::system(format!("❌ Error: {}", message))
            }
            PipelineEvent::Start { message } | PipelineEvent::Complete { message } => {
                ChatMessage::new("assistant", message.clone(), None)
            }
            PipelineEvent::AgentStart { agent, message }
            | PipelineEvent::AgentUpdate { agent, message } => {
                ChatMessage::new("assistant", message.clone(), Some(*agent))
            }
            PipelineEvent::AgentComplete { .. } => return,
        };
        self.log(session_id, line).await;
    }

    async fn log(&self, session_id: &str, message: ChatMessage) {
        if let Err(e) = self.store.add_message(session_id, &message).await {
            warn!(session_id, "failed to append session message: {:#}", e);
        }
    }

    /// Answer a follow-up question about one field of a completed session,
    /// continuing that field's thread.
    pub async fn chat(&self, session_id: &str, field: &str, message: &str) -> Result<DeepDiveAnswer> {
        let Some(record) = self.store.get(session_id).await? else {
            bail!("session not found: {}", session_id);
        };
        let Some(state) = record.state.as_ref().filter(|_| record.is_completed()) else {
            bail!("session {} has no completed analysis", session_id);
        };
        let state = serde_json::to_value(state)?;
        let history = self.store.thread_history(session_id, field).await?;

        let config = self.config.read().await.clone();
        let llm = self.models.for_agent(Agent::DeepDive);
        let ctx = StageContext {
            llm: &*llm,
            search: &*self.search,
            config: &config,
        };
        let request = DeepDiveRequest {
            field,
            message,
            history: &history,
        };
        let answer = deep_dive::run(&ctx, &state, &request).await?;

        self.store
            .add_thread_message(session_id, field, &Message::user(message))
            .await?;
        self.store
            .add_thread_message(session_id, field, &Message::assistant(answer.answer.clone()))
            .await?;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::PaperSource;
    use crate::testing::{
        fast_config, sample_paper, ScriptedModel, ScriptedRouter, ScriptedSearch, StaticLoader,
    };

    async fn runner(dir: &tempfile::TempDir, paper: String) -> SessionRunner {
        let store = SessionStore::new(dir.path()).await.unwrap();
        SessionRunner::new(
            Arc::new(store),
            Arc::new(ScriptedRouter::new(ScriptedModel::new())),
            Arc::new(ScriptedSearch::empty()),
            Arc::new(StaticLoader(paper)),
            Arc::new(RwLock::new(fast_config())),
        )
    }

    fn source() -> Option<PaperSource> {
        Some(PaperSource::Url("https://arxiv.org/abs/2401.00001".into()))
    }

    #[tokio::test]
    async fn test_run_completes_and_logs_progress() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, sample_paper()).await;
        let session = runner.store().create(5, source()).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let record = runner.run(&session.id, Some(tx)).await.unwrap();

        assert_eq!(record.status, SessionStatus::Completed);
        assert!(record.current_agent.is_none());
        assert!(record.state.as_ref().unwrap().report.is_some());

        let log = runner.store().messages(&session.id).await.unwrap();
        assert_eq!(log[0].content, "Analyze this paper: https://arxiv.org/abs/2401.00001");
        assert_eq!(
            log.last().unwrap().content,
            crate::pipeline::events::COMPLETE_MESSAGE
        );
        assert!(log.iter().any(|m| m.agent == Some(Agent::ComparativeAnalysis)));

        let mut forwarded = 0;
        while rx.try_recv().is_ok() {
            forwarded += 1;
        }
        assert!(forwarded > log.len());
    }

    #[tokio::test]
    async fn test_run_survives_closed_event_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, sample_paper()).await;
        let session = runner.store().create(5, source()).await.unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let record = runner.run(&session.id, Some(tx)).await.unwrap();

        assert_eq!(record.status, SessionStatus::Completed);
        let log = runner.store().messages(&session.id).await.unwrap();
        assert_eq!(
            log.last().unwrap().content,
            crate::pipeline::events::COMPLETE_MESSAGE
        );
    }

    #[tokio::test]
    async fn test_run_without_source_marks_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, sample_paper()).await;
        let session = runner.store().create(5, None).await.unwrap();

        let record = runner.run(&session.id, None).await.unwrap();

        assert_eq!(record.status, SessionStatus::Error);
        assert_eq!(record.errors, vec!["missing required input: paper path or URL"]);
        let log = runner.store().messages(&session.id).await.unwrap();
        assert!(log[0].content.starts_with("❌ Error:"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, sample_paper()).await;
        assert!(runner.run("ffffffffffffffff", None).await.is_err());
    }

    #[tokio::test]
    async fn test_chat_requires_completed_session_and_threads_turns() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir, sample_paper()).await;
        let session = runner.store().create(5, source()).await.unwrap();
        assert!(runner
            .chat(&session.id, "research_findings", "Why?")
            .await
            .is_err());

        runner.run(&session.id, None).await.unwrap();
        let answer = runner
            .chat(&session.id, "research_findings", "Why does routing help?")
            .await
            .unwrap();
        assert!(!answer.thought_process.is_empty());

        let thread = runner
            .store()
            .thread_history(&session.id, "research_findings")
            .await
            .unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].content, "Why does routing help?");
        assert_eq!(thread[1].role, "assistant");
    }
}
