use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::agents::Agent;
use crate::error::LlmError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A forced function call whose parameters are the JSON Schema of the expected output.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn for_type<T: JsonSchema>() -> Self {
        let schema = schemars::schema_for!(T);
        let mut parameters = serde_json::to_value(&schema).unwrap_or_default();
        let mut description = String::from("Return the result as structured arguments.");
        if let Some(obj) = parameters.as_object_mut() {
            obj.remove("$schema");
            obj.remove("title");
            if let Some(Value::String(d)) = obj.remove("description") {
                description = d;
            }
        }
        let name: String = T::schema_name()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        Self {
            name,
            description,
            parameters,
        }
    }

    fn to_request(&self) -> (Value, Value) {
        let tools = serde_json::json!([{
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        }]);
        let choice = serde_json::json!({
            "type": "function",
            "function": { "name": self.name }
        });
        (tools, choice)
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Free-text completion.
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// Forced tool call; returns the tool arguments as JSON.
    async fn chat_structured(&self, messages: &[Message], tool: &ToolSpec)
        -> Result<Value, LlmError>;
}

/// Hands out the model configured for each pipeline agent.
pub trait ModelRouter: Send + Sync {
    fn for_agent(&self, agent: Agent) -> Arc<dyn ChatModel>;
}

/// One schema-constrained call, deserialized into `T`.
pub async fn invoke_structured<T>(llm: &dyn ChatModel, messages: &[Message]) -> Result<T, LlmError>
where
    T: DeserializeOwned + JsonSchema,
{
    let tool = ToolSpec::for_type::<T>();
    let value = llm.chat_structured(messages, &tool).await?;
    serde_json::from_value(value.clone()).map_err(|e| LlmError::Validation {
        message: e.to_string(),
        raw: value.to_string(),
    })
}

struct LlmSettings {
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    agent_models: HashMap<Agent, String>,
    max_tokens: u32,
}

/// OpenAI-compatible chat completions client. Cheap to clone; each clone may be
/// scoped to one agent's model and temperature.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    settings: Arc<LlmSettings>,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string());
        let default_model =
            dotenv::var("LLM_MODEL").unwrap_or_else(|_| "openai/gpt-oss-120b".to_string());
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
        let timeout = dotenv::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(120);

        let agent_models = Agent::ALL
            .iter()
            .filter_map(|agent| {
                dotenv::var(format!("AGENT_{}_MODEL", agent.env_key()))
                    .ok()
                    .filter(|m| !m.is_empty())
                    .map(|m| (*agent, m))
            })
            .collect::<HashMap<_, _>>();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            model: default_model.clone(),
            temperature: 0.1,
            settings: Arc::new(LlmSettings {
                base_url,
                api_key,
                default_model,
                agent_models,
                max_tokens: 4096,
            }),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// A clone bound to the agent's model override and temperature.
    pub fn scoped(&self, agent: Agent) -> Self {
        let model = self
            .settings
            .agent_models
            .get(&agent)
            .cloned()
            .unwrap_or_else(|| self.settings.default_model.clone());
        Self {
            client: self.client.clone(),
            settings: self.settings.clone(),
            model,
            temperature: agent.temperature(),
        }
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        resolve_endpoint(&self.settings.base_url)
    }

    async fn post(&self, body: Value) -> Result<Value, LlmError> {
        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.settings.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(classify_error(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| LlmError::Api {
            status,
            body: format!("invalid JSON response: {}", e),
        })
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.settings.max_tokens,
        });
        let json = self.post(body).await?;
        let content = parse_text_response(&json)?;
        debug!(model = %self.model, response_len = content.len(), "chat completion");
        Ok(content)
    }

    async fn chat_structured(
        &self,
        messages: &[Message],
        tool: &ToolSpec,
    ) -> Result<Value, LlmError> {
        let (tools, tool_choice) = tool.to_request();
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.settings.max_tokens,
            "tools": tools,
            "tool_choice": tool_choice,
        });
        let json = self.post(body).await?;
        debug!(model = %self.model, tool = %tool.name, "structured completion");
        parse_tool_response(&json)
    }
}

impl ModelRouter for LlmClient {
    fn for_agent(&self, agent: Agent) -> Arc<dyn ChatModel> {
        Arc::new(self.scoped(agent))
    }
}

fn resolve_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

/// Map a non-2xx provider response onto an error kind.
pub(crate) fn classify_error(status: u16, body: &str) -> LlmError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().map(|v| &v["error"]);
    let message = error
        .and_then(|e| e["message"].as_str())
        .unwrap_or(body)
        .to_string();

    match status {
        429 => LlmError::RateLimited,
        401 | 403 => LlmError::Auth(status),
        400 | 422 => LlmError::ToolCallFailed {
            message,
            failed_generation: error
                .and_then(|e| e["failed_generation"].as_str())
                .map(|s| s.to_string()),
        },
        _ => LlmError::Api {
            status,
            body: message,
        },
    }
}

fn parse_text_response(json: &Value) -> Result<String, LlmError> {
    let choice = json["choices"].get(0).ok_or(LlmError::EmptyResponse)?;
    // content may be null when the model only produced reasoning tokens
    Ok(choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string())
}

fn parse_tool_response(json: &Value) -> Result<Value, LlmError> {
    let message = &json["choices"][0]["message"];
    match &message["tool_calls"][0]["function"]["arguments"] {
        Value::String(args) => {
            serde_json::from_str(args).map_err(|e| LlmError::ToolCallFailed {
                message: format!("tool arguments were not valid JSON: {}", e),
                failed_generation: Some(args.clone()),
            })
        }
        Value::Object(_) => Ok(message["tool_calls"][0]["function"]["arguments"].clone()),
        _ => match message["content"].as_str().filter(|c| !c.trim().is_empty()) {
            Some(content) => Err(LlmError::ToolCallFailed {
                message: "model answered without calling the tool".to_string(),
                failed_generation: Some(content.to_string()),
            }),
            None => Err(LlmError::EmptyResponse),
        },
    }
}
