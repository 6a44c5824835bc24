//! Deterministic commentary used when the generator is unavailable
//!
//! The wording is intentionally plain. Every number in the output comes
//! straight from the analytics; nothing is inferred.

use serde_json::Value;
use snapcache_core::{AnalyticsSnapshot, Audience, Commentary};

struct Topic<'a> {
    name: &'a str,
    score: f64,
}

/// Build a summary from the recognised analytics fields
///
/// Unknown or missing fields are skipped, so this never fails.
pub fn deterministic_summary(analytics: &AnalyticsSnapshot, audience: Audience) -> Commentary {
    let subject = match audience {
        Audience::Student => "You",
        Audience::Parent => "Your child",
        Audience::Teacher => "The student",
    };

    let mut sentences = Vec::new();

    match (analytics.number("score"), analytics.number("max_score"), percentage(analytics)) {
        (Some(score), Some(max), Some(pct)) => {
            sentences.push(format!("{subject} scored {} out of {} ({pct:.0}%).", fmt(score), fmt(max)));
        }
        (Some(score), Some(max), None) => {
            sentences.push(format!("{subject} scored {} out of {}.", fmt(score), fmt(max)));
        }
        (_, _, Some(pct)) => sentences.push(format!("{subject} scored {pct:.0}%.")),
        (Some(score), None, None) => sentences.push(format!("{subject} scored {}.", fmt(score))),
        (None, _, None) => sentences.push(format!("{subject} completed the exam.")),
    }

    if let Some(percentile) = analytics.number("percentile").filter(|p| (0.0..=100.0).contains(p)) {
        sentences.push(format!("That places {} in the {} percentile.", object(audience), ordinal(percentile)));
    }

    let mut topics = topics(analytics);
    topics.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.name.cmp(b.name)));

    let mut highlights = Vec::new();
    let mut next_steps = Vec::new();

    if let Some(best) = topics.first() {
        highlights.push(format!("Strongest topic: {} ({})", best.name, fmt(best.score)));
    }
    if topics.len() > 1
        && let Some(weakest) = topics.last()
    {
        highlights.push(format!("Weakest topic: {} ({})", weakest.name, fmt(weakest.score)));
        next_steps.push(format!("Review {} before the next assessment.", weakest.name));
    }

    Commentary {
        text: sentences.join(" "),
        highlights,
        next_steps,
    }
}

fn percentage(analytics: &AnalyticsSnapshot) -> Option<f64> {
    if let Some(pct) = analytics.number("percentage") {
        return Some(pct);
    }
    match (analytics.number("score"), analytics.number("max_score")) {
        (Some(score), Some(max)) if max > 0.0 => Some(score / max * 100.0),
        _ => None,
    }
}

fn topics(analytics: &AnalyticsSnapshot) -> Vec<Topic<'_>> {
    analytics
        .get("topics")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|topic| {
            Some(Topic {
                name: topic.get("name")?.as_str().filter(|n| !n.trim().is_empty())?,
                score: topic.get("score")?.as_f64().filter(|s| s.is_finite())?,
            })
        })
        .collect()
}

const fn object(audience: Audience) -> &'static str {
    match audience {
        Audience::Student => "you",
        Audience::Parent | Audience::Teacher => "them",
    }
}

/// At most two decimals, no trailing zeros
fn fmt(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{rounded:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_owned()
}

fn ordinal(value: f64) -> String {
    let text = format!("{value:.0}");
    let suffix = match (text.len() >= 2 && text[text.len() - 2..].starts_with('1'), text.chars().last()) {
        (true, _) => "th",
        (false, Some('1')) => "st",
        (false, Some('2')) => "nd",
        (false, Some('3')) => "rd",
        _ => "th",
    };
    format!("{text}{suffix}")
}
