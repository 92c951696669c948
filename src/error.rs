use thiserror::Error;

/// Failure of a single LLM invocation, classified once at the HTTP boundary.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider rejected or mangled a forced tool call. Carries the raw
    /// generation when the provider echoed one back.
    #[error("tool call failed: {message}")]
    ToolCallFailed {
        message: String,
        failed_generation: Option<String>,
    },
    /// The tool arguments were valid JSON but did not match the requested schema.
    #[error("structured output did not match schema: {message}")]
    Validation { message: String, raw: String },
    #[error("rate limited by LLM provider")]
    RateLimited,
    #[error("LLM provider rejected credentials (HTTP {0})")]
    Auth(u16),
    #[error("LLM provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("LLM request failed: {0}")]
    Network(String),
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// True for the error class that shrink-and-retry policies act on.
    pub fn is_tool_call_failure(&self) -> bool {
        matches!(self, LlmError::ToolCallFailed { .. })
    }

    /// Raw model output embedded in the error, if any.
    pub fn embedded_output(&self) -> Option<&str> {
        match self {
            LlmError::ToolCallFailed {
                failed_generation: Some(raw),
                ..
            } => Some(raw),
            LlmError::Validation { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Network(e.to_string())
    }
}

/// Failure to turn a paper source into plain text.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("access forbidden (HTTP 403); the publisher may block automated downloads")]
    Forbidden,
    #[error("publisher redirected to a browser-check page")]
    Blocked,
    #[error("document fetch returned HTTP {status}")]
    Http { status: u16 },
    #[error("document fetch failed: {0}")]
    Network(String),
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("pdf extraction failed: {0}")]
    Pdf(String),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("document contained no extractable text")]
    Empty,
}

/// Structural failures of the analysis core.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no analyzable sections were detected in the document")]
    NoAnalyzableContent,
    #[error("missing required input: {0}")]
    MissingInput(&'static str),
}

/// The repair layer could not produce a schema-valid value.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("invalid JSON after repair: {0}")]
    Syntax(String),
    #[error("JSON did not match schema: {0}")]
    Schema(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_failure_classification() {
        let err = LlmError::ToolCallFailed {
            message: "bad".into(),
            failed_generation: Some("{\"a\":1}".into()),
        };
        assert!(err.is_tool_call_failure());
        assert_eq!(err.embedded_output(), Some("{\"a\":1}"));
        assert!(!LlmError::RateLimited.is_tool_call_failure());
        assert!(LlmError::Network("timeout".into()).embedded_output().is_none());
    }
}
