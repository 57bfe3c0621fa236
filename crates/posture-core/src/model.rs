//! Questionnaire structure and the transient per-report input blocks.

use serde::{Deserialize, Serialize};

use crate::scoring::ScaleKind;

/// An answer as stored against a question: a single option slug or a
/// multi-select set of slugs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerValue {
    Single(String),
    Multi(Vec<String>),
}

impl AnswerValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(s) => s.trim().is_empty(),
            Self::Multi(v) => v.is_empty(),
        }
    }

    /// Display form used in prompts and fingerprints: multi-select joins
    /// with ", " in stored order.
    pub fn display(&self) -> String {
        match self {
            Self::Single(s) => s.clone(),
            Self::Multi(v) => v.join(", "),
        }
    }

    pub fn variants(&self) -> Vec<&str> {
        match self {
            Self::Single(s) => vec![s.as_str()],
            Self::Multi(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    YesNo,
    MultipleChoice,
    MultipleSelect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Optional curated explanation surfaced as enhanced prompt context.
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub weight: u32,
    #[serde(default)]
    pub scale_type: Option<ScaleKind>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

impl Question {
    /// Map legacy numeric answers ("1", "2", ...) to the option slug by
    /// ordinal. Slug answers pass through unchanged.
    pub fn map_numeric_to_slug(&self, answer: &str) -> String {
        if answer.is_empty() || !answer.chars().all(|c| c.is_ascii_digit()) {
            return answer.to_string();
        }
        match answer.parse::<usize>() {
            Ok(n) if n >= 1 && n <= self.options.len() => self.options[n - 1].value.clone(),
            _ => answer.to_string(),
        }
    }

    /// Explanation text for the selected option, if curated.
    pub fn option_explanation(&self, answer: &str) -> Option<&str> {
        let slug = self.map_numeric_to_slug(answer);
        self.options
            .iter()
            .find(|o| o.value == slug)
            .and_then(|o| o.explanation.as_deref())
    }
}

/// A questionnaire domain: stable id plus weighted questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentStructure {
    pub sections: Vec<Section>,
}

impl AssessmentStructure {
    /// Restrict the structure to the sections selected at intake.
    pub fn filter_by_sections(mut self, section_ids: &[String]) -> Self {
        self.sections.retain(|s| section_ids.contains(&s.id));
        self
    }
}

/// A user's answer to one question, as loaded from the response store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponse {
    pub question_id: String,
    pub answer: AnswerValue,
    #[serde(default)]
    pub comment: Option<String>,
}

/// One line of the per-section input block handed to the prompt assembler
/// and the fingerprint hasher. Built transiently per report; answers,
/// comments and context are post-redaction here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResponse {
    pub question: String,
    pub answer: String,
    pub weight: u32,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}
