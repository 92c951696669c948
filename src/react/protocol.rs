/// Action requested by one ReAct step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    WebSearch,
    Finish,
    Unknown(String),
}

impl Action {
    pub fn label(&self) -> &str {
        match self {
            Action::WebSearch => "web_search",
            Action::Finish => "FINISH",
            Action::Unknown(raw) => raw,
        }
    }
}

/// One parsed model turn. Parsing never fails; missing markers fall back to
/// FINISH with empty fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStep {
    pub thought: String,
    pub action: Action,
    pub action_input: String,
}

impl ParsedStep {
    /// Search query carried by this step: first line of the input, unquoted.
    pub fn query(&self) -> &str {
        let line = self.action_input.lines().next().unwrap_or("").trim();
        strip_quotes(line)
    }
}

const THOUGHT: &str = "THOUGHT:";
const ACTION: &str = "ACTION:";
const ACTION_INPUT: &str = "ACTION_INPUT:";

pub fn parse(response: &str) -> ParsedStep {
    let thought = response
        .find(THOUGHT)
        .map(|i| {
            let rest = &response[i + THOUGHT.len()..];
            let end = rest.find(ACTION).unwrap_or(rest.len());
            rest[..end].trim().to_string()
        })
        .unwrap_or_default();

    let action_chunk = response.find(ACTION).map(|i| {
        let rest = &response[i + ACTION.len()..];
        let end = rest.find(ACTION_INPUT).unwrap_or(rest.len());
        rest[..end].trim()
    });

    let mut action_input = response
        .find(ACTION_INPUT)
        .map(|i| response[i + ACTION_INPUT.len()..].trim().to_string())
        .unwrap_or_default();

    let action_line = action_chunk
        .and_then(|chunk| chunk.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("");

    // inline form: "ACTION: web_search: some query"
    let (name, inline_input) = match action_line.split_once(':') {
        Some((name, input)) => (name.trim(), input.trim()),
        None => (action_line, ""),
    };
    if action_input.is_empty() && !inline_input.is_empty() {
        action_input = inline_input.to_string();
    }

    ParsedStep {
        thought,
        action: classify(name),
        action_input,
    }
}

fn classify(name: &str) -> Action {
    let name = strip_quotes(name.trim().trim_matches('`'));
    let lower = name.to_lowercase();
    if lower.contains("web_search") || lower == "search" || lower == "web search" {
        Action::WebSearch
    } else if name.is_empty() || name.to_uppercase().contains("FINISH") {
        Action::Finish
    } else {
        Action::Unknown(name.to_string())
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}
