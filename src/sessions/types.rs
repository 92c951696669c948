use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agents::Agent;
use crate::llm::Message;
use crate::paper::PaperSource;
use crate::pipeline::PipelineState;

/// First 16 hex chars of a blake3 hash.
pub type SessionId = String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Created,
    Processing,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session metadata stored under `session/meta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    /// Discord user who started the analysis.
    pub owner_id: u64,
    pub paper_source: Option<PaperSource>,
    pub status: SessionStatus,
    #[serde(default)]
    pub current_agent: Option<Agent>,
    #[serde(default)]
    pub state: Option<PipelineState>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SessionRecord {
    pub fn title(&self) -> Option<&str> {
        self.state.as_ref().and_then(|s| s.paper_title())
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

/// One line of the session's progress log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Stage that produced the line; `None` for system lines.
    #[serde(default)]
    pub agent: Option<Agent>,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>, agent: Option<Agent>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            agent,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content, None)
    }

    pub fn as_message(&self) -> Message {
        Message {
            role: self.role.clone(),
            content: self.content.clone(),
        }
    }
}
