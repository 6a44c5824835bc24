//! Commentary generation for snapcache
//!
//! Wraps the external text generators (OpenAI-compatible and Anthropic)
//! together with the prompt builder, the response validator, and the
//! deterministic fallback summary behind a single [`CommentaryEngine`].

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod engine;
pub mod fallback;
pub mod prompt;
mod protocol;
pub mod provider;
pub mod response;

pub use engine::CommentaryEngine;
pub use fallback::deterministic_summary;
pub use prompt::{Prompt, build_prompt};
pub use provider::{Generator, RawCompletion, create_generator};
pub use response::{MAX_COMMENTARY_CHARS, parse_commentary};
