//! Validation of untrusted generator output

use serde::Deserialize;
use snapcache_core::{Commentary, GenerationError};

/// Upper bound on accepted commentary text, in characters
pub const MAX_COMMENTARY_CHARS: usize = 4000;

const MAX_LIST_ITEMS: usize = 8;

#[derive(Deserialize)]
struct WireCommentary {
    summary: Option<String>,
    #[serde(default)]
    highlights: Vec<String>,
    #[serde(default)]
    next_steps: Vec<String>,
}

/// Parse generator text into commentary
///
/// The generator is asked for a JSON object; markdown code fences around it
/// are tolerated. Anything else is rejected.
pub fn parse_commentary(text: &str) -> Result<Commentary, GenerationError> {
    let body = strip_code_fence(text.trim());

    let wire: WireCommentary = serde_json::from_str(body)
        .map_err(|e| GenerationError::Malformed(format!("response is not a commentary object: {e}")))?;

    let summary = wire.summary.map(|s| s.trim().to_owned()).unwrap_or_default();
    if summary.is_empty() {
        return Err(GenerationError::Malformed("summary is empty".to_owned()));
    }

    let highlights = clean_list(wire.highlights);
    let next_steps = clean_list(wire.next_steps);

    let total: usize = summary.chars().count()
        + highlights.iter().chain(&next_steps).map(|s| s.chars().count()).sum::<usize>();
    if total > MAX_COMMENTARY_CHARS {
        return Err(GenerationError::Malformed(format!(
            "commentary is {total} characters, limit is {MAX_COMMENTARY_CHARS}"
        )));
    }

    Ok(Commentary {
        text: summary,
        highlights,
        next_steps,
    })
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .take(MAX_LIST_ITEMS)
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // Drop an optional language tag on the opening fence
    let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
