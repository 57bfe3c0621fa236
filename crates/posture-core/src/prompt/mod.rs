//! Prompt assembly for the three call families: section analysis,
//! cross-section synthesis, and intake recommendation.
//!
//! `prompt_version` must be bumped whenever any text here changes in a way
//! that can alter model output; `schema_version` whenever the artifact
//! schema changes (including relaxing a length bound).

mod intake;
mod section;
mod synthesis;

pub use intake::build_intake_prompt;
pub use section::{build_section_prompt, PromptLimits};
pub use synthesis::{build_synthesis_prompt, SectionSummary};

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
