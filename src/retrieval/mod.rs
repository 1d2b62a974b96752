//! Retrieval and answer composition.

pub mod composer;
pub mod context;
pub mod language;
pub mod prompt;

pub use composer::{AnswerComposer, ComposedAnswer};
pub use context::SourceCitation;
pub use language::{detect_language, is_greeting, Language};
