//! Default prompt templates bundled at compile time.
//!
//! Each template is the system instruction for one pipeline task; the
//! skills assemble the user message around it.

/// Intent classifier - picks the retrieval strategy
pub const INTENT: &str = include_str!("defaults/intent.md");

/// Decomposer - splits a question into search queries
pub const DECOMPOSE: &str = include_str!("defaults/decompose.md");

/// Sufficiency judge - scores accumulated evidence
pub const SUFFICIENCY: &str = include_str!("defaults/sufficiency.md");

/// Report writer - cited synthesis
pub const REPORT: &str = include_str!("defaults/report.md");

/// Task labels carried on every gateway request
pub mod tasks {
    pub const CLASSIFY_INTENT: &str = "classify_intent";
    pub const DECOMPOSE: &str = "decompose";
    pub const SCORE_SUFFICIENCY: &str = "score_sufficiency";
    pub const SYNTHESIZE_REPORT: &str = "synthesize_report";
}

/// All default prompts with their task labels
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        (tasks::CLASSIFY_INTENT, INTENT),
        (tasks::DECOMPOSE, DECOMPOSE),
        (tasks::SCORE_SUFFICIENCY, SUFFICIENCY),
        (tasks::SYNTHESIZE_REPORT, REPORT),
    ]
}

/// Cut to at most `max_chars` characters, marking the cut with "..."
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => format!("{}...", &text[..byte]),
        None => text.to_string(),
    }
}
