use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::paper::types::PaperAnalysis;
use crate::repair::safe_structured_invoke;
use crate::text::{join_limited, truncate_chars};

use super::comparative::ComparativeAnalysis;
use super::direction::DirectionAdvice;
use super::sota::SotaAnalysis;
use super::web_research::WebResearch;
use super::{compact, prompt, prompts, StageContext};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ResearchReport {
    pub executive_summary: String,
    pub research_findings: String,
    pub technical_landscape: String,
    /// {"summary": "...", "key_points": [...]}
    pub sota_overview: BTreeMap<String, Value>,
    /// {"summary": "...", "key_comparisons": [...]}
    pub comparative_analysis: BTreeMap<String, Value>,
    /// {"trends": [...], "insights": "..."}
    pub trend_analysis: BTreeMap<String, Value>,
    /// {"key_players": [...], "technologies": [...]}
    pub ecosystem_map: BTreeMap<String, Value>,
    /// {"recommendations": [...], "priority": "..."}
    pub recommendations: BTreeMap<String, Value>,
    /// {"directions": [...], "opportunities": [...]}
    pub future_directions: BTreeMap<String, Value>,
    pub export_formats: Vec<String>,
}

pub struct ReportInputs<'a> {
    pub paper: Option<&'a PaperAnalysis>,
    pub web: Option<&'a WebResearch>,
    pub sota: Option<&'a SotaAnalysis>,
    pub comparative: Option<&'a ComparativeAnalysis>,
    pub direction: Option<&'a DirectionAdvice>,
}

impl ReportInputs<'_> {
    fn level(&self, n: u8) -> &str {
        self.paper.map(|p| p.analysis.level_text(n)).unwrap_or("")
    }

    fn web_section(&self) -> String {
        let Some(web) = self.web else {
            return String::new();
        };
        let players = join_limited(&web.findings.key_players, 5, ", ");
        format!(
            "WEB RESEARCH INSIGHTS:\n- Key Players: {}\n- Related Papers Found: {}\n- Trend Signals: {}",
            if players.is_empty() { "N/A" } else { players.as_str() },
            web.candidate_papers.len().min(5),
            truncate_chars(&compact(&web.findings.trend_signals), 200),
        )
    }

    fn sota_section(&self) -> String {
        self.sota
            .map(|s| {
                format!(
                    "SOTA TRACKING:\n- Summary: {}\n- Recommendation: {}",
                    truncate_chars(&s.sota_tracker_summary, 300),
                    truncate_chars(&s.sota_tracker_recommendation, 200),
                )
            })
            .unwrap_or_default()
    }

    fn comparative_section(&self) -> String {
        self.comparative
            .map(|c| {
                format!(
                    "COMPARATIVE ANALYSIS:\n- Summary: {}\n- Recommendation: {}\n- Sources Used: {}",
                    truncate_chars(&c.findings.comparative_analysis_summary, 300),
                    truncate_chars(&c.findings.comparative_analysis_recommendation, 200),
                    c.sources_used,
                )
            })
            .unwrap_or_default()
    }
}

/// Produce the final report. Never fails: a failed structured call yields a
/// report assembled from the hierarchy levels and specialist summaries.
pub async fn run(ctx: &StageContext<'_>, inputs: ReportInputs<'_>) -> ResearchReport {
    let direction = inputs.direction.map(compact).unwrap_or_default();
    let messages = prompt(
        prompts::REPORT_SYSTEM_PROMPT,
        format!(
            "HIERARCHICAL SUMMARIES:\nLevel 3 (Executive): {}\nLevel 2 (Intermediate): {}\nLevel 1 (Detailed): {}\n\n{}\n\n{}\n\n{}\n\nSTRATEGIC DIRECTION:\n{}\n\nCreate the report.",
            inputs.level(3),
            truncate_chars(inputs.level(2), 1500),
            truncate_chars(inputs.level(1), 1000),
            inputs.web_section(),
            inputs.sota_section(),
            inputs.comparative_section(),
            truncate_chars(&direction, 500),
        ),
    );

    let mut report =
        match safe_structured_invoke::<ResearchReport>(ctx.llm, &messages, ctx.config.structured, None)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "structured report failed, building fallback report");
                fallback_report(&inputs)
            }
        };
    if report.export_formats.is_empty() {
        report.export_formats = default_formats();
    }
    info!(
        summary_chars = report.executive_summary.len(),
        formats = ?report.export_formats,
        "report generated"
    );
    report
}

fn default_formats() -> Vec<String> {
    vec!["markdown".to_string(), "json".to_string()]
}

fn object(value: Value) -> BTreeMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}

fn or_default(text: &str, limit: usize, default: &str) -> String {
    if text.trim().is_empty() {
        default.to_string()
    } else {
        truncate_chars(text, limit).to_string()
    }
}

pub fn fallback_report(inputs: &ReportInputs<'_>) -> ResearchReport {
    let sota_summary = inputs.sota.map(|s| s.sota_tracker_summary.as_str()).unwrap_or("");
    let comparative_summary = inputs
        .comparative
        .map(|c| c.findings.comparative_analysis_summary.as_str())
        .unwrap_or("");
    let key_players: Vec<String> = inputs
        .web
        .map(|w| w.findings.key_players.iter().take(5).cloned().collect())
        .unwrap_or_default();

    ResearchReport {
        executive_summary: or_default(inputs.level(3), 1000, "Report generation encountered an error."),
        research_findings: or_default(inputs.level(2), 1000, "Limited findings available."),
        technical_landscape: or_default(
            &inputs.web_section(),
            800,
            "Technical landscape analysis pending.",
        ),
        sota_overview: object(json!({
            "summary": or_default(sota_summary, 500, "N/A"),
            "key_points": []
        })),
        comparative_analysis: object(json!({
            "summary": or_default(comparative_summary, 500, "N/A"),
            "key_comparisons": []
        })),
        trend_analysis: object(json!({"trends": [], "insights": "Trend analysis pending"})),
        ecosystem_map: object(json!({"key_players": key_players, "technologies": []})),
        recommendations: object(json!({
            "recommendations": [],
            "priority": "Further analysis recommended"
        })),
        future_directions: object(json!({"directions": [], "opportunities": []})),
        export_formats: default_formats(),
    }
}
