//! Prompt assembly.
//!
//! `PromptTemplate` holds the instruction fragments as data so a deployment
//! can swap any of them through config. Rendering is a pure function of the
//! template, the question and the evidence.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::document::mentioned_years;
use super::retrieval::EvidenceSet;
use crate::core::config::RagSettings;

/// Separator between context entries and between the evidence and source blocks.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

const SECTION_RULE: &str = "\n\n---\n\n";

pub const DEFAULT_TEMPLATE_VERSION: &str = "v1";

const DEFAULT_PERSONA: &str = "You are \"{assistant}\", an assistant that helps students, applicants, \
and faculty of {institution}. Answer conversationally but factually, keeping replies concise, \
relevant to the question, and easy to read.";

const DEFAULT_TONE: &str = "- You know about {institution}'s academics, admissions, campus life, \
facilities, events, rules, and official notices.
- Keep a friendly, student-supportive tone: approachable, never careless.
- Do not speculate. If something is not in the context, say so politely \
(e.g. \"That detail isn't available in the current documents.\").
- When several documents overlap, merge their points instead of listing them one by one.";

const DEFAULT_TEMPORAL_POLICY: &str = "- For time-sensitive questions (placements, timetables, \
date sheets, holidays, admissions):
  - If the user does not name a year, use the most recent year available in the context, \
starting from {reference_year} and going backwards. Never treat anything after {reference_year} as current.
  - If the user names a year, prefer entries from that year even if newer ones exist.
  - If several years appear, prefer the most recent one and state the year you used in the answer.";

const DEFAULT_SOURCE_GUIDELINES: &str = "- Context entries come from official pages, PDFs, and FAQ \
answers; treat them as credible.
- Mention the kind of source when it helps, e.g. \"According to the 2025 placement report...\" \
or \"As per the exam notice PDF...\".";

const DEFAULT_STRUCTURE_OUTLINE: &str = "1. Answer: a clear, direct response to the question.
2. Contextual merging: combine information from multiple sources without repeating yourself.
3. Clarifications (if needed): note variations, e.g. \"In 2023 the timings were slightly different...\".
4. (Optional) A short practical tip, e.g. where on the official website to check for updates.";

const DEFAULT_LIMITATIONS: &str = "- Do not invent or assume details that are not in the given context.";

/// Versioned set of instruction fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub version: String,
    pub assistant_name: String,
    pub institution_name: String,
    pub persona: String,
    pub tone: String,
    pub temporal_policy: String,
    pub source_guidelines: String,
    pub structure_outline: String,
    pub limitations: String,
    /// Latest year the model may treat as current.
    pub reference_year: i32,
}

impl PromptTemplate {
    pub fn builtin(assistant_name: &str, institution_name: &str, reference_year: i32) -> Self {
        Self {
            version: DEFAULT_TEMPLATE_VERSION.to_string(),
            assistant_name: assistant_name.to_string(),
            institution_name: institution_name.to_string(),
            persona: DEFAULT_PERSONA.to_string(),
            tone: DEFAULT_TONE.to_string(),
            temporal_policy: DEFAULT_TEMPORAL_POLICY.to_string(),
            source_guidelines: DEFAULT_SOURCE_GUIDELINES.to_string(),
            structure_outline: DEFAULT_STRUCTURE_OUTLINE.to_string(),
            limitations: DEFAULT_LIMITATIONS.to_string(),
            reference_year,
        }
    }

    /// Built-in fragments overlaid with `prompt.*` config overrides.
    pub fn from_settings(settings: &RagSettings) -> Self {
        let overrides = &settings.prompt;
        let reference_year = overrides
            .reference_year
            .unwrap_or_else(|| chrono::Utc::now().year());
        let mut template = Self::builtin(
            &settings.assistant.name,
            &settings.assistant.institution_name,
            reference_year,
        );

        let fields: [(&Option<String>, &mut String); 7] = [
            (&overrides.version, &mut template.version),
            (&overrides.persona, &mut template.persona),
            (&overrides.tone, &mut template.tone),
            (&overrides.temporal_policy, &mut template.temporal_policy),
            (&overrides.source_guidelines, &mut template.source_guidelines),
            (&overrides.structure_outline, &mut template.structure_outline),
            (&overrides.limitations, &mut template.limitations),
        ];
        for (value, slot) in fields {
            if let Some(text) = value.as_ref().filter(|t| !t.trim().is_empty()) {
                *slot = text.clone();
            }
        }

        template
    }

    fn fill(&self, fragment: &str) -> String {
        fragment
            .replace("{assistant}", &self.assistant_name)
            .replace("{institution}", &self.institution_name)
            .replace("{reference_year}", &self.reference_year.to_string())
    }

    pub fn render_persona(&self) -> String {
        self.fill(&self.persona)
    }

    pub fn render_tone(&self) -> String {
        format!("ROLE & STYLE\n{}", self.fill(&self.tone))
    }

    /// Temporal policy plus, when the question names years, an explicit
    /// instruction to favour exactly those years.
    pub fn render_temporal_policy(&self, question: &str) -> String {
        let mut section = format!("TEMPORAL UNDERSTANDING\n{}", self.fill(&self.temporal_policy));

        let years = mentioned_years(question);
        if !years.is_empty() {
            let listed = years
                .iter()
                .map(|y| y.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            section.push_str(&format!(
                "\n- This question names {}: prioritise context entries from {} and say which year the answer refers to.",
                listed, listed
            ));
        }

        section
    }

    pub fn render_source_guidelines(&self) -> String {
        format!("SOURCE HANDLING\n{}", self.fill(&self.source_guidelines))
    }

    pub fn render_structure_outline(&self) -> String {
        format!("RESPONSE STRUCTURE\n{}", self.fill(&self.structure_outline))
    }

    pub fn render_limitations(&self) -> String {
        format!("LIMITATIONS\n{}", self.fill(&self.limitations))
    }

    pub fn build_prompt(&self, question: &str, evidence: &EvidenceSet) -> String {
        let context = build_context(&evidence.texts(), &evidence.sources());
        let instructions = [
            self.render_persona(),
            self.render_tone(),
            self.render_temporal_policy(question),
            self.render_source_guidelines(),
            self.render_structure_outline(),
            self.render_limitations(),
        ]
        .join(SECTION_RULE);

        format!(
            "{}{}Context:\n{}\n\nUser question: {}\n\nAnswer:\n",
            instructions, SECTION_RULE, context, question
        )
    }
}

/// Evidence block, separator, source block. Sources are not interleaved with
/// the entries they belong to.
pub fn build_context(texts: &[&str], sources: &[&str]) -> String {
    format!(
        "{}{}{}",
        texts.join(CONTEXT_SEPARATOR),
        CONTEXT_SEPARATOR,
        sources.join(CONTEXT_SEPARATOR)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::retrieval::Evidence;
    use crate::rag::store::Collection;
    use serde_json::json;

    fn template() -> PromptTemplate {
        PromptTemplate::builtin("Campus Assist", "Example Institute of Technology", 2025)
    }

    fn evidence(items: &[(&str, &str, Collection)]) -> EvidenceSet {
        EvidenceSet::new(
            items
                .iter()
                .map(|(text, source, collection)| Evidence {
                    text: text.to_string(),
                    source: source.to_string(),
                    collection: *collection,
                })
                .collect(),
        )
    }

    #[test]
    fn context_is_evidence_block_then_source_block() {
        let context = build_context(&["e1", "e2"], &["s1", "s2"]);
        assert_eq!(context, "e1\n\n---\n\ne2\n\n---\n\ns1\n\n---\n\ns2");
    }

    #[test]
    fn empty_context_is_just_the_separator() {
        assert_eq!(build_context(&[], &[]), CONTEXT_SEPARATOR);
    }

    #[test]
    fn build_prompt_substitutes_question_and_context() {
        let set = evidence(&[
            ("Library opens at 9.", "https://x.edu/library", Collection::Web),
            ("Q: Wifi?; A: Yes.", "Yes.", Collection::Faq),
        ]);

        let prompt = template().build_prompt("When does the library open?", &set);

        assert!(prompt.contains(
            "Context:\nLibrary opens at 9.\n\n---\n\nQ: Wifi?; A: Yes.\n\n---\n\nhttps://x.edu/library\n\n---\n\nYes.\n\n"
        ));
        assert!(prompt.contains("User question: When does the library open?\n\nAnswer:\n"));
        assert!(prompt.starts_with("You are \"Campus Assist\""));
        assert!(prompt.contains("Example Institute of Technology"));
    }

    #[test]
    fn build_prompt_is_deterministic() {
        let set = evidence(&[("a", "b", Collection::Web)]);
        let t = template();
        assert_eq!(t.build_prompt("q?", &set), t.build_prompt("q?", &set));
    }

    #[test]
    fn named_year_is_called_out_in_temporal_section() {
        let set = evidence(&[
            ("Admission cutoff 2022: rank 5400", "https://x.edu/cutoff-2022", Collection::Web),
            ("Admission cutoff 2023: rank 5100", "https://x.edu/cutoff-2023", Collection::Web),
        ]);

        let t = template();
        let temporal = t.render_temporal_policy("What was the 2023 admission cutoff?");
        assert!(temporal.contains("This question names 2023: prioritise context entries from 2023"));

        let prompt = t.build_prompt("What was the 2023 admission cutoff?", &set);
        let instructions = prompt.split("Context:").next().unwrap();
        assert!(instructions.contains("2023"));
    }

    #[test]
    fn undated_question_gets_reference_year_bound_only() {
        let temporal = template().render_temporal_policy("When are the holidays?");
        assert!(temporal.contains("starting from 2025 and going backwards"));
        assert!(!temporal.contains("This question names"));
    }

    #[test]
    fn empty_evidence_still_renders() {
        let prompt = template().build_prompt("Anything?", &EvidenceSet::default());
        assert!(prompt.contains("Context:\n\n\n---\n\n\n\nUser question: Anything?"));
    }

    #[test]
    fn each_fragment_renders_independently() {
        let t = template();
        assert!(t.render_tone().starts_with("ROLE & STYLE\n"));
        assert!(t.render_source_guidelines().starts_with("SOURCE HANDLING\n"));
        assert!(t.render_structure_outline().contains("1. Answer"));
        assert!(t.render_limitations().contains("Do not invent"));
    }

    #[test]
    fn config_overrides_replace_fragments() {
        let settings = RagSettings::from_value(&json!({
            "assistant": { "name": "Helper", "institution_name": "North College" },
            "prompt": {
                "version": "v2",
                "limitations": "- Only answer from context.",
                "tone": "  ",
                "reference_year": 2024
            }
        }))
        .unwrap();

        let t = PromptTemplate::from_settings(&settings);

        assert_eq!(t.version, "v2");
        assert_eq!(t.reference_year, 2024);
        assert_eq!(t.render_limitations(), "LIMITATIONS\n- Only answer from context.");
        assert!(t.render_tone().contains("North College"));
        assert!(t.render_persona().contains("\"Helper\""));
    }
}
