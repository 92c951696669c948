use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::types::{Section, SectionType};

/// Header lines are short; anything at or above this length is body text.
const MAX_HEADER_LEN: usize = 100;

static PATTERNS: Lazy<Vec<(SectionType, Vec<Regex>)>> = Lazy::new(|| {
    SectionType::ALL
        .iter()
        .map(|t| {
            let regexes = header_patterns(*t)
                .iter()
                .map(|p| Regex::new(p).expect("section header regex"))
                .collect();
            (*t, regexes)
        })
        .collect()
});

fn header_patterns(section_type: SectionType) -> &'static [&'static str] {
    match section_type {
        SectionType::Abstract => &[r"\babstract\b", r"\bsummary\b"],
        SectionType::Introduction => &[r"\bintroduction\b", r"\b1\.\s*introduction\b"],
        SectionType::RelatedWork => &[r"\brelated work\b", r"\bprior work\b", r"\bliterature review\b"],
        SectionType::Background => &[r"\bbackground\b", r"\bpreliminaries\b"],
        SectionType::Methodology => &[
            r"\bmethodology\b",
            r"\bmethod\b",
            r"\bapproach\b",
            r"\bmodel\b",
            r"\barchitecture\b",
        ],
        SectionType::Experiments => &[r"\bexperiments\b", r"\bexperimental setup\b", r"\bevaluation\b"],
        SectionType::Results => &[r"\bresults\b", r"\bfindings\b", r"\bperformance\b"],
        SectionType::Discussion => &[r"\bdiscussion\b", r"\banalysis\b"],
        SectionType::Conclusion => &[r"\bconclusion\b", r"\bconcluding remarks\b"],
        SectionType::Limitations => &[r"\blimitations\b", r"\bweaknesses\b"],
        SectionType::FutureWork => &[r"\bfuture work\b", r"\bfuture directions\b"],
    }
}

/// Classify a single line as a section header.
pub fn classify_header(line: &str) -> Option<SectionType> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.chars().count() >= MAX_HEADER_LEN {
        return None;
    }
    let lower = trimmed.to_lowercase();
    PATTERNS
        .iter()
        .find(|(_, regexes)| regexes.iter().any(|r| r.is_match(&lower)))
        .map(|(t, _)| *t)
}

/// Split a document into typed sections, in document order.
///
/// Text before the first recognized header is discarded. Every header opens a
/// section, so a document with at least one header yields at least one section.
pub fn detect_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Option<(SectionType, String, usize)> = None;
    let mut body: Vec<&str> = Vec::new();

    for (i, line) in text.split('\n').enumerate() {
        if let Some(section_type) = classify_header(line) {
            if let Some((t, title, start)) = current.take() {
                sections.push(Section::new(t, title, body.join("\n"), start));
            }
            current = Some((section_type, line.trim().to_string(), i));
            body.clear();
        } else if current.is_some() {
            body.push(line);
        }
    }
    if let Some((t, title, start)) = current {
        sections.push(Section::new(t, title, body.join("\n"), start));
    }

    debug!(count = sections.len(), "sections detected");
    for s in &sections {
        debug!(section_type = %s.section_type, words = s.word_count, importance = s.importance, "  section");
    }
    sections
}

/// Group sections of the same type into one section per type, preserving the
/// order in which each type first appears.
pub fn merge_by_type(sections: &[Section]) -> Vec<Section> {
    let mut order: Vec<SectionType> = Vec::new();
    for s in sections {
        if !order.contains(&s.section_type) {
            order.push(s.section_type);
        }
    }

    order
        .into_iter()
        .map(|t| {
            let group: Vec<&Section> = sections.iter().filter(|s| s.section_type == t).collect();
            let content = group
                .iter()
                .map(|s| s.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            Section {
                section_type: t,
                title: format!("{} (Merged)", t.display_name()),
                content,
                start_position: group.first().map(|s| s.start_position).unwrap_or(0),
                word_count: group.iter().map(|s| s.word_count).sum(),
                importance: t.importance(),
            }
        })
        .collect()
}
