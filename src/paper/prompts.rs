pub const SECTION_SYSTEM_PROMPT: &str = r#"You are a research paper analyst producing section-aware summaries.

You receive one section of a paper together with its detected type. Summarize it the way a
careful reviewer would for colleagues who will not read the section themselves:

- executive_summary: one or two sentences stating what the section establishes.
- detailed_summary: a thorough technical summary. Keep numbers, dataset names, model names
  and equations that matter. Do not invent anything that is not in the text.
- key_points: the claims or facts a reader must retain, one per item.
- methodological_details: procedures, algorithms, architectures, hyperparameters.
- empirical_findings: measured results with their metrics and baselines.
- technical_terms: domain terms introduced or relied on.
- citations_mentioned: reference markers or cited works as they appear (e.g. "[12]", "Vaswani et al.").
- related_sections: other section types this section depends on or points to.
- information_density and novelty_score: numbers between 0.0 and 1.0.

Leave a list empty rather than padding it."#;

pub const LEVEL1_SYSTEM_PROMPT: &str = r#"You synthesize section-level summaries of a research paper into one detailed
technical overview. Preserve technical specifics: methods, datasets, metrics, numbers. Organize the
overview by the paper's logical flow (problem, method, evaluation, findings, limitations). Write
plain prose without headings."#;

pub const LEVEL2_SYSTEM_PROMPT: &str = r#"You condense a detailed technical overview of a research paper into a
methodology-and-results summary of a few paragraphs. Keep the core approach, the evaluation setup,
and the headline results with their numbers. Drop secondary detail."#;

pub const LEVEL3_SYSTEM_PROMPT: &str = r#"You write the executive summary of a research paper for a busy expert. In one
or two short paragraphs answer:
1. What problem does the paper address?
2. What is the key innovation?
3. What are the main results?
4. Why does it matter?"#;

pub const FINAL_SYSTEM_PROMPT: &str = r#"You produce the final structured analysis of a research paper from its
hierarchical summaries and extracted details. Fill every field you can support from the material:
title, authors and publication info (usually on the first page), contributions, methodology and
results as key/value maps, datasets, experiments, limitations, future work, technical depth,
novelty, domain tags, code resources, related papers and citations. Scores are between 0.0 and 1.0.
Never invent authors, numbers or citations."#;

/// Type-specific extraction instruction for the section summarizer.
pub fn instruction_for(section_type: super::types::SectionType) -> &'static str {
    use super::types::SectionType::*;
    match section_type {
        Abstract => "Extract the problem, approach, key results, and contributions.",
        Introduction => {
            "Extract motivation, problem statement, main contributions, and paper organization."
        }
        Methodology => {
            "Extract the approach, algorithms, model architecture, and implementation details."
        }
        Experiments => {
            "Extract experimental setup, datasets, baselines, evaluation metrics, and protocols."
        }
        Results => {
            "Extract performance metrics, comparisons with baselines, ablation studies, and key findings."
        }
        Discussion => "Extract interpretation of results, implications, and insights.",
        Conclusion => "Extract main takeaways, impact, and future directions.",
        RelatedWork => "Extract prior approaches, their limitations, and how this work differs.",
        Background | Limitations | FutureWork => {
            "Extract key points, technical details, and important findings."
        }
    }
}
