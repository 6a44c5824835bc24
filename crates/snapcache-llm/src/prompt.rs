//! Prompt construction for commentary requests

use snapcache_core::{AnalyticsSnapshot, Audience};

/// A system/user prompt pair ready to send to a generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const RESPONSE_SHAPE: &str = "Respond with a single JSON object and nothing else, shaped as \
{\"summary\": string, \"highlights\": [string], \"next_steps\": [string]}. \
Keep the summary under 120 words. Use at most three highlights and three next steps. \
Only refer to numbers that appear in the analytics.";

/// Build the prompt for one analytics snapshot and audience
pub fn build_prompt(analytics: &AnalyticsSnapshot, audience: Audience) -> Prompt {
    let system = format!("{}\n\n{RESPONSE_SHAPE}", audience_instructions(audience));

    // Pretty-printing a `Value` cannot fail
    let body = serde_json::to_string_pretty(analytics.as_value()).unwrap_or_default();
    let user = format!("Exam analytics for this {}:\n\n{body}", subject_noun(audience));

    Prompt { system, user }
}

const fn audience_instructions(audience: Audience) -> &'static str {
    match audience {
        Audience::Student => {
            "You are an encouraging tutor writing feedback directly to a student about their exam. \
             Address the student as \"you\". Be specific, honest about weak areas, and motivating."
        }
        Audience::Parent => {
            "You are a teacher writing to a parent about their child's exam. \
             Refer to the student as \"your child\". Avoid jargon and suggest ways to help at home."
        }
        Audience::Teacher => {
            "You are an assessment specialist briefing a teacher on one student's exam. \
             Refer to \"the student\". Be concise and focus on diagnostic patterns and instructional next steps."
        }
    }
}

const fn subject_noun(audience: Audience) -> &'static str {
    match audience {
        Audience::Student => "attempt",
        Audience::Parent | Audience::Teacher => "student",
    }
}
