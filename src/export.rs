use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::agents::comparative::ComparativeAnalysis;
use crate::agents::direction::DirectionAdvice;
use crate::agents::sota::SotaAnalysis;
use crate::pipeline::PipelineState;
use crate::text::truncate_chars;

const DEFAULT_TITLE: &str = "Research Report";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Json,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" => Ok(ExportFormat::Text),
            other => bail!(
                "Unsupported format: {}. Use 'markdown', 'json', or 'text'",
                other
            ),
        }
    }
}

/// Everything an exported report shows, collected from a completed pipeline state.
#[derive(Debug, Clone, Serialize)]
pub struct ReportExport {
    pub paper_title: String,
    pub authors: Vec<String>,
    pub executive_summary: String,
    pub research_findings: String,
    pub technical_landscape: String,
    pub contributions: Vec<String>,
    pub methodology: BTreeMap<String, Value>,
    pub results: BTreeMap<String, Value>,
    pub sota_analysis: Option<SotaAnalysis>,
    pub comparative_analysis: Option<ComparativeAnalysis>,
    pub direction_advisor: Option<DirectionAdvice>,
    pub future_directions: Vec<String>,
    pub recommendations: BTreeMap<String, Value>,
}

fn value_line(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("direction")
            .or_else(|| map.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

impl ReportExport {
    pub fn from_state(state: &PipelineState) -> Self {
        let paper = state.paper_analysis.as_ref().map(|p| &p.analysis);
        let report = state.report.as_ref();

        let mut future_directions: Vec<String> = report
            .and_then(|r| r.future_directions.get("directions"))
            .and_then(Value::as_array)
            .map(|items| items.iter().map(value_line).collect())
            .unwrap_or_default();
        if future_directions.is_empty() {
            if let Some(direction) = &state.direction_advisor {
                future_directions = direction
                    .future_directions_results
                    .iter()
                    .map(|item| value_line(&Value::Object(item.clone().into_iter().collect())))
                    .collect();
            }
        }

        Self {
            paper_title: state.paper_title().unwrap_or(DEFAULT_TITLE).to_string(),
            authors: paper.map(|a| a.authors.clone()).unwrap_or_default(),
            executive_summary: report.map(|r| r.executive_summary.clone()).unwrap_or_default(),
            research_findings: report.map(|r| r.research_findings.clone()).unwrap_or_default(),
            technical_landscape: report
                .map(|r| r.technical_landscape.clone())
                .unwrap_or_default(),
            contributions: paper.map(|a| a.contributions.clone()).unwrap_or_default(),
            methodology: paper.map(|a| a.methodology.clone()).unwrap_or_default(),
            results: paper.map(|a| a.results.clone()).unwrap_or_default(),
            sota_analysis: state.sota_tracker.clone(),
            comparative_analysis: state.comparative_analysis.clone(),
            direction_advisor: state.direction_advisor.clone(),
            future_directions,
            recommendations: report.map(|r| r.recommendations.clone()).unwrap_or_default(),
        }
    }

    /// Attachment name: the first 50 chars of the title with spaces as underscores.
    pub fn filename(&self, format: ExportFormat) -> String {
        let stem = truncate_chars(self.paper_title.trim(), 50).replace(' ', "_");
        let stem = if stem.is_empty() { DEFAULT_TITLE.replace(' ', "_") } else { stem };
        format!("{}.{}", stem, format.extension())
    }

    pub fn render(&self, format: ExportFormat) -> Result<String> {
        self.render_at(format, Utc::now())
    }

    pub fn render_at(&self, format: ExportFormat, generated: DateTime<Utc>) -> Result<String> {
        let stamp = generated.format("%Y-%m-%d %H:%M:%S");
        Ok(match format {
            ExportFormat::Json => serde_json::to_string_pretty(self)?,
            ExportFormat::Markdown => self.markdown(&stamp.to_string())?,
            ExportFormat::Text => self.text(&stamp.to_string())?,
        })
    }

    fn markdown(&self, stamp: &str) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "# {}\n", self.paper_title)?;
        writeln!(out, "**Authors:** {}\n", self.authors.join(", "))?;

        let prose = [
            ("Executive Summary", &self.executive_summary),
            ("Research Findings", &self.research_findings),
            ("Technical Landscape", &self.technical_landscape),
        ];
        for (heading, body) in prose {
            writeln!(out, "---\n\n## {}\n\n{}\n", heading, body)?;
        }

        writeln!(out, "---\n\n## Key Contributions\n\n{}\n", bullets(&self.contributions))?;
        writeln!(out, "---\n\n## SOTA Analysis\n\n{}\n", json_block(&self.sota_analysis)?)?;
        writeln!(
            out,
            "---\n\n## Comparative Analysis\n\n{}\n",
            json_block(&self.comparative_analysis)?
        )?;
        writeln!(out, "---\n\n## Future Directions\n\n{}\n", bullets(&self.future_directions))?;
        writeln!(out, "---\n\n## Recommendations\n\n{}\n", json_block(&self.recommendations)?)?;
        write!(out, "---\n\n*Generated by Research Copilot on {}*\n", stamp)?;
        Ok(out)
    }

    fn text(&self, stamp: &str) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "{}", self.paper_title)?;
        writeln!(out, "{}\n", "=".repeat(self.paper_title.chars().count()))?;
        writeln!(out, "Authors: {}\n", self.authors.join(", "))?;

        let contributions = bullets(&self.contributions);
        let directions = bullets(&self.future_directions);
        let sections = [
            ("EXECUTIVE SUMMARY", self.executive_summary.as_str()),
            ("RESEARCH FINDINGS", self.research_findings.as_str()),
            ("TECHNICAL LANDSCAPE", self.technical_landscape.as_str()),
            ("KEY CONTRIBUTIONS", contributions.as_str()),
            ("FUTURE DIRECTIONS", directions.as_str()),
        ];
        for (heading, body) in sections {
            writeln!(out, "{}\n{}\n{}\n", heading, "-".repeat(heading.len()), body)?;
        }
        write!(out, "---\nGenerated by Research Copilot on {}\n", stamp)?;
        Ok(out)
    }
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn json_block<T: Serialize>(value: &T) -> Result<String> {
    Ok(format!("```json\n{}\n```", serde_json::to_string_pretty(value)?))
}
