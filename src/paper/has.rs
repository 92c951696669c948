use tracing::info;

use super::prompts::{LEVEL1_SYSTEM_PROMPT, LEVEL2_SYSTEM_PROMPT, LEVEL3_SYSTEM_PROMPT};
use super::types::{HierarchicalLevel, SectionSummary, SectionType};
use crate::error::LlmError;
use crate::llm::{ChatModel, Message};
use crate::text::truncate_chars;

/// Contribution caps for levels 1, 2 and 3.
pub const CONTRIBUTION_CAPS: [usize; 3] = [50, 20, 10];

const LEVEL1_SCOPE: &str = "Detailed section-level analysis with technical specifics";
const LEVEL2_SCOPE: &str = "Methodology and results focused synthesis";
const LEVEL3_SCOPE: &str = "Executive summary of problem, innovation, results and impact";

const METHOD_TYPES: &[SectionType] = &[SectionType::Methodology];
const RESULT_TYPES: &[SectionType] = &[SectionType::Results, SectionType::Experiments];

/// Builds the three-level summary pyramid from section summaries.
pub struct HierarchicalSynthesizer<'a> {
    llm: &'a dyn ChatModel,
}

impl<'a> HierarchicalSynthesizer<'a> {
    pub fn new(llm: &'a dyn ChatModel) -> Self {
        Self { llm }
    }

    /// Always returns exactly three levels, most detailed first.
    pub async fn create_hierarchy(
        &self,
        summaries: &[SectionSummary],
    ) -> Result<Vec<HierarchicalLevel>, LlmError> {
        let level1 = self.level1(summaries).await?;
        let level2 = self.level2(summaries, &level1).await?;
        let level3 = self.level3(summaries, &level2).await?;
        info!(
            level1_len = level1.summary.len(),
            level2_len = level2.summary.len(),
            level3_len = level3.summary.len(),
            "hierarchy built"
        );
        Ok(vec![level1, level2, level3])
    }

    async fn level1(&self, summaries: &[SectionSummary]) -> Result<HierarchicalLevel, LlmError> {
        let sections_text = summaries
            .iter()
            .map(|s| {
                format!(
                    "**{}**: {}",
                    s.section_type.as_str().to_uppercase(),
                    s.detailed_summary
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let key_points: Vec<String> = summaries.iter().flat_map(|s| s.key_points.clone()).collect();
        let prompt_points = key_points
            .iter()
            .take(100)
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n");

        let summary = self
            .complete(
                LEVEL1_SYSTEM_PROMPT,
                format!(
                    "Section summaries:\n{}\n\nKey points:\n{}\n\nWrite the detailed technical overview.",
                    truncate_chars(&sections_text, 50_000),
                    prompt_points
                ),
            )
            .await?;

        Ok(HierarchicalLevel {
            level: 1,
            summary,
            key_contributions: key_points.into_iter().take(CONTRIBUTION_CAPS[0]).collect(),
            scope: LEVEL1_SCOPE.to_string(),
        })
    }

    async fn level2(
        &self,
        summaries: &[SectionSummary],
        level1: &HierarchicalLevel,
    ) -> Result<HierarchicalLevel, LlmError> {
        let methods = executive_summaries(summaries, METHOD_TYPES);
        let results = executive_summaries(summaries, RESULT_TYPES);

        let summary = self
            .complete(
                LEVEL2_SYSTEM_PROMPT,
                format!(
                    "Detailed overview:\n{}\n\nMethodology sections: {}\n\nResults sections: {}\n\nWrite the methodology and results summary.",
                    truncate_chars(&level1.summary, 20_000),
                    truncate_chars(&methods, 10_000),
                    truncate_chars(&results, 10_000)
                ),
            )
            .await?;

        Ok(HierarchicalLevel {
            level: 2,
            summary,
            key_contributions: capped(&level1.key_contributions, CONTRIBUTION_CAPS[1]),
            scope: LEVEL2_SCOPE.to_string(),
        })
    }

    async fn level3(
        &self,
        summaries: &[SectionSummary],
        level2: &HierarchicalLevel,
    ) -> Result<HierarchicalLevel, LlmError> {
        let abstract_summary = summaries
            .iter()
            .find(|s| s.section_type == SectionType::Abstract)
            .map(|s| s.executive_summary.as_str())
            .unwrap_or("No abstract found");
        let intro_points = summaries
            .iter()
            .filter(|s| s.section_type == SectionType::Introduction)
            .flat_map(|s| s.key_points.iter())
            .take(20)
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n");

        let summary = self
            .complete(
                LEVEL3_SYSTEM_PROMPT,
                format!(
                    "Abstract: {}\n\nIntroduction key points:\n{}\n\nMethodology and results:\n{}\n\nWrite the executive summary.",
                    abstract_summary,
                    intro_points,
                    truncate_chars(&level2.summary, 20_000)
                ),
            )
            .await?;

        Ok(HierarchicalLevel {
            level: 3,
            summary,
            key_contributions: capped(&level2.key_contributions, CONTRIBUTION_CAPS[2]),
            scope: LEVEL3_SCOPE.to_string(),
        })
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, LlmError> {
        let messages = [Message::system(system), Message::user(user)];
        Ok(self.llm.chat(&messages).await?.trim().to_string())
    }
}

fn executive_summaries(summaries: &[SectionSummary], types: &[SectionType]) -> String {
    summaries
        .iter()
        .filter(|s| types.contains(&s.section_type))
        .map(|s| s.executive_summary.as_str())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn capped(items: &[String], cap: usize) -> Vec<String> {
    items.iter().take(cap).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::sas::placeholder_summary;
    use crate::paper::types::Section;
    use crate::testing::ScriptedModel;

    fn summary_with_points(section_type: SectionType, points: usize) -> SectionSummary {
        let section = Section::new(section_type, section_type.display_name().into(), "body".into(), 0);
        let mut s = placeholder_summary(&section);
        s.executive_summary = format!("{} exec", section_type.as_str());
        s.key_points = (0..points).map(|i| format!("{} point {}", section_type, i)).collect();
        s
    }

    #[tokio::test]
    async fn test_three_levels_with_shrinking_contributions() {
        let llm = ScriptedModel::new().with_default_text("  synthesized text  ");
        let summaries = vec![
            summary_with_points(SectionType::Abstract, 10),
            summary_with_points(SectionType::Methodology, 30),
            summary_with_points(SectionType::Results, 30),
        ];
        let levels = HierarchicalSynthesizer::new(&llm)
            .create_hierarchy(&summaries)
            .await
            .unwrap();

        assert_eq!(levels.len(), 3);
        assert_eq!(levels.iter().map(|l| l.level).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(levels[0].key_contributions.len(), 50);
        assert_eq!(levels[1].key_contributions.len(), 20);
        assert_eq!(levels[2].key_contributions.len(), 10);
        assert!(levels
            .windows(2)
            .all(|w| w[0].key_contributions.len() >= w[1].key_contributions.len()));
        assert_eq!(levels[0].summary, "synthesized text");
        assert_eq!(llm.text_calls(), 3);

        let prompts = llm.prompts();
        assert!(prompts[0].contains("**METHODOLOGY**"));
        assert!(prompts[1].contains("methodology exec"));
        assert!(prompts[1].contains("results exec"));
        assert!(prompts[2].contains("Abstract: abstract exec"));
    }

    #[tokio::test]
    async fn test_hierarchy_without_abstract_or_points() {
        let llm = ScriptedModel::new().with_default_text("text");
        let summaries = vec![summary_with_points(SectionType::Conclusion, 0)];
        let levels = HierarchicalSynthesizer::new(&llm)
            .create_hierarchy(&summaries)
            .await
            .unwrap();
        assert_eq!(levels.len(), 3);
        assert!(levels.iter().all(|l| l.key_contributions.is_empty()));
        assert!(llm.prompts()[2].contains("No abstract found"));
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let llm = ScriptedModel::new().failing_text(|| LlmError::RateLimited);
        let result = HierarchicalSynthesizer::new(&llm)
            .create_hierarchy(&[summary_with_points(SectionType::Results, 2)])
            .await;
        assert!(matches!(result, Err(LlmError::RateLimited)));
    }
}
