use tracing::{debug, info, warn};

use super::prompts::{instruction_for, SECTION_SYSTEM_PROMPT};
use super::sections::merge_by_type;
use super::splitter::RecursiveSplitter;
use super::types::{section_id, Section, SectionSummary, SectionSummaryDraft};
use crate::config::{RetryPolicy, SasConfig};
use crate::error::LlmError;
use crate::llm::{ChatModel, Message};
use crate::repair::safe_structured_invoke;
use crate::text::truncate_chars;

/// Section-aware summarizer.
pub struct SectionSummarizer<'a> {
    llm: &'a dyn ChatModel,
    config: &'a SasConfig,
}

impl<'a> SectionSummarizer<'a> {
    pub fn new(llm: &'a dyn ChatModel, config: &'a SasConfig) -> Self {
        Self { llm, config }
    }

    /// Summarize one section. Tool-call failures shrink the content window and
    /// retry; once retries run out a placeholder summary is returned. Any other
    /// error is returned to the caller.
    pub async fn summarize_section(&self, section: &Section) -> Result<SectionSummary, LlmError> {
        let instruction = instruction_for(section.section_type);
        let required = section.section_type.required_elements().join(", ");
        let attempts = self.config.max_retries.max(1);

        for attempt in 0..attempts {
            let window = self.config.window_for_attempt(attempt);
            let content = truncate_chars(&section.content, window);
            let messages = [
                Message::system(SECTION_SYSTEM_PROMPT),
                Message::user(format!(
                    "Section Title: {}\nSection Type: {}\nFocus: {}\nRequired elements: {}\n\nContent:\n{}\n\nProvide a comprehensive section-aware summary.",
                    section.title,
                    section.section_type.as_str().to_uppercase(),
                    instruction,
                    required,
                    content
                )),
            ];

            match safe_structured_invoke::<SectionSummaryDraft>(
                self.llm,
                &messages,
                RetryPolicy::once(),
                None,
            )
            .await
            {
                Ok(draft) => {
                    debug!(
                        section_type = %section.section_type,
                        attempt,
                        key_points = draft.key_points.len(),
                        "section summarized"
                    );
                    return Ok(SectionSummary::from_draft(section, draft));
                }
                Err(e) if e.is_tool_call_failure() => {
                    warn!(
                        section_type = %section.section_type,
                        attempt,
                        window,
                        error = %e,
                        "section summary rejected, retrying with less content"
                    );
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.config.retry_pause).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        warn!(section_type = %section.section_type, "section summary retries exhausted, using placeholder");
        Ok(placeholder_summary(section))
    }

    /// Merge sections by type, split long ones, and summarize every piece in order.
    pub async fn summarize_all(&self, sections: &[Section]) -> Result<Vec<SectionSummary>, LlmError> {
        let merged = merge_by_type(sections);
        let splitter = RecursiveSplitter::new(self.config.chunk_size, self.config.chunk_overlap);
        let mut summaries = Vec::new();
        let mut first = true;

        info!(
            detected = sections.len(),
            groups = merged.len(),
            "summarizing sections"
        );

        for section in &merged {
            if section.word_count == 0 {
                debug!(section_type = %section.section_type, "skipping empty section");
                continue;
            }
            if !first {
                tokio::time::sleep(self.config.section_delay).await;
            }
            first = false;

            if section.word_count > self.config.long_section_words {
                let chunks = splitter.split(&section.content);
                info!(
                    section_type = %section.section_type,
                    words = section.word_count,
                    chunks = chunks.len(),
                    "splitting long section"
                );
                for (i, chunk) in chunks.into_iter().enumerate() {
                    let part = Section {
                        title: format!("{} (Part {})", section.title, i + 1),
                        word_count: chunk.split_whitespace().count(),
                        content: chunk,
                        ..section.clone()
                    };
                    summaries.push(self.summarize_section(&part).await?);
                }
            } else {
                summaries.push(self.summarize_section(section).await?);
            }
        }

        Ok(summaries)
    }
}

/// Deterministic stand-in when a section cannot be summarized.
pub fn placeholder_summary(section: &Section) -> SectionSummary {
    let kind = section.section_type.as_str();
    SectionSummary {
        section_id: section_id(section),
        section_type: section.section_type,
        section_title: section.title.clone(),
        executive_summary: format!("Summary of {} section (processing error occurred).", kind),
        detailed_summary: format!(
            "The {} section could not be fully processed due to API limitations. Original content length: {} chars.",
            kind,
            section.content.chars().count()
        ),
        key_points: vec![format!("Section type: {}", kind)],
        methodological_details: vec![],
        empirical_findings: vec![],
        technical_terms: vec![],
        citations_mentioned: vec![],
        related_sections: vec![],
        information_density: 0.5,
        novelty_score: 0.5,
    }
}
