//! # Memory Module
//!
//! Conversation memory shared across research sessions by the caller.
//!
//! ```text
//! research() ──▶ Report ──▶ ConversationHistory::record ──▶ next research()
//! ```

pub mod conversation;

pub use conversation::{ConversationHistory, ConversationTurn};
