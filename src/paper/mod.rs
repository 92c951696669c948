pub mod has;
pub mod loader;
pub mod prompts;
pub mod sas;
pub mod sections;
pub mod splitter;
pub mod synthesis;
pub mod types;

use anyhow::Result;
use tracing::info;

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::llm::ChatModel;

pub use loader::{DocumentLoader, HttpDocumentLoader, PaperSource};
use has::HierarchicalSynthesizer;
use sas::SectionSummarizer;
use synthesis::{FinalSynthesizer, SynthesisInput};
use types::ComprehensivePaperAnalysis;

/// Section-aware summarization followed by hierarchical synthesis.
pub struct PaperProcessor<'a> {
    llm: &'a dyn ChatModel,
    config: &'a AnalysisConfig,
}

impl<'a> PaperProcessor<'a> {
    pub fn new(llm: &'a dyn ChatModel, config: &'a AnalysisConfig) -> Self {
        Self { llm, config }
    }

    pub async fn process(&self, text: &str) -> Result<ComprehensivePaperAnalysis> {
        let sections = sections::detect_sections(text);
        if sections.is_empty() {
            return Err(AnalysisError::NoAnalyzableContent.into());
        }
        info!(sections = sections.len(), chars = text.len(), "processing paper");

        let summaries = SectionSummarizer::new(self.llm, &self.config.sas)
            .summarize_all(&sections)
            .await?;
        if summaries.is_empty() {
            return Err(AnalysisError::NoAnalyzableContent.into());
        }
        let hierarchy = HierarchicalSynthesizer::new(self.llm)
            .create_hierarchy(&summaries)
            .await?;

        let input = SynthesisInput {
            document: text,
            summaries: &summaries,
            hierarchy: &hierarchy,
            total_sections: sections.len(),
        };
        let analysis = FinalSynthesizer::new(self.llm, self.config.final_synthesis_retries)
            .synthesize(&input)
            .await?;
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{sample_paper, ScriptedModel};

    fn fast_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.sas.section_delay = Duration::ZERO;
        config.sas.retry_pause = Duration::ZERO;
        config
    }

    #[tokio::test]
    async fn test_process_sample_paper() {
        let llm = ScriptedModel::new().with_default_text("summary text");
        let config = fast_config();
        let analysis = PaperProcessor::new(&llm, &config)
            .process(&sample_paper())
            .await
            .unwrap();
        assert_eq!(analysis.total_sections, 5);
        assert_eq!(analysis.hierarchical_summaries.len(), 3);
        assert_eq!(analysis.section_summaries.len(), 5);
        // five sections plus the final synthesis
        assert_eq!(llm.structured_calls(), 6);
        assert_eq!(llm.text_calls(), 3);
    }

    #[tokio::test]
    async fn test_no_sections_is_structural_error() {
        let llm = ScriptedModel::new();
        let config = fast_config();
        let err = PaperProcessor::new(&llm, &config)
            .process("nothing that looks like a paper")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::NoAnalyzableContent)
        ));
        assert_eq!(llm.structured_calls() + llm.text_calls(), 0);
    }

    #[tokio::test]
    async fn test_headers_without_content_are_not_analyzable() {
        let llm = ScriptedModel::new();
        let config = fast_config();
        let err = PaperProcessor::new(&llm, &config)
            .process("Abstract\nMethodology\n")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::NoAnalyzableContent)
        ));
        assert_eq!(llm.text_calls(), 0);
        assert_eq!(llm.structured_calls(), 0);
    }
}
