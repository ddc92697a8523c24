//! Heuristic confidence for an execution response
//!
//! Scores the shape of the text, not its truth: structure and length raise
//! the score, very short or hedging answers lower it. The model's own
//! certainty is captured separately by the reflection verdict.

const BASE: f64 = 0.5;

const HEDGES: &[&str] = &[
    "i'm not sure",
    "i am not sure",
    "i don't know",
    "i do not know",
    "i cannot",
    "i can't",
    "unable to",
    "not enough information",
];

/// Score a response between 0.0 and 1.0
pub fn score(response: &str) -> f64 {
    let text = response.trim();
    let len = text.chars().count();
    let mut confidence = BASE;

    if len < 50 {
        confidence -= 0.3;
    }
    if len >= 200 {
        confidence += 0.1;
    }
    if len >= 800 {
        confidence += 0.1;
    }

    let list_lines = text
        .lines()
        .map(str::trim_start)
        .filter(|l| {
            l.starts_with("- ")
                || l.starts_with("* ")
                || l.split_once(". ")
                    .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
        .count();
    if list_lines >= 2 {
        confidence += 0.1;
    }

    if text.lines().any(|l| l.trim_start().starts_with('#')) || text.contains("**") {
        confidence += 0.05;
    }

    if serde_json::from_str::<serde_json::Value>(text).is_ok_and(|v| v.is_object() || v.is_array())
    {
        confidence += 0.1;
    }

    let lower = text.to_lowercase();
    if HEDGES.iter().any(|h| lower.contains(h)) {
        confidence -= 0.2;
    }

    confidence.clamp(0.0, 1.0)
}
