//! Prompt templates for the reasoning loop
//!
//! The intent picks a template family by pattern. Each family has its own
//! system prompt and reasoning scaffold; execution and reflection prompts
//! are shared.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::OnceLock;

use super::{PromptStep, StepKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Planning,
    Booking,
    Analysis,
    Support,
    General,
}

impl TemplateKind {
    pub fn as_str(&self) -> &str {
        match self {
            TemplateKind::Planning => "planning",
            TemplateKind::Booking => "booking",
            TemplateKind::Analysis => "analysis",
            TemplateKind::Support => "support",
            TemplateKind::General => "general",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            TemplateKind::Planning => {
                "You are a meticulous travel planner. Produce day-by-day plans with \
                 concrete places, timings and transport between them."
            }
            TemplateKind::Booking => {
                "You are a booking specialist. Be exact about dates, fares, fare rules \
                 and the steps needed to complete a reservation."
            }
            TemplateKind::Analysis => {
                "You are a travel pricing analyst. Compare options on cost, convenience \
                 and value, and state the figures you rely on."
            }
            TemplateKind::Support => {
                "You are a patient customer support agent. Answer clearly and list the \
                 next steps the traveller should take."
            }
            TemplateKind::General => {
                "You are a helpful travel concierge. Give accurate, well-structured answers."
            }
        }
    }

    fn approach(&self) -> &'static str {
        match self {
            TemplateKind::Planning => {
                "1. Identify destination, dates, budget and interests.\n\
                 2. Group activities by area to reduce travel time.\n\
                 3. Lay out each day with morning, afternoon and evening."
            }
            TemplateKind::Booking => {
                "1. Confirm origin, destination, dates and passengers.\n\
                 2. List suitable options with prices.\n\
                 3. State what is needed to complete the booking."
            }
            TemplateKind::Analysis => {
                "1. Restate the offer being evaluated.\n\
                 2. Weigh it against typical market prices.\n\
                 3. Give a clear recommendation with reasons."
            }
            TemplateKind::Support => {
                "1. Restate the traveller's problem.\n\
                 2. Explain the applicable policy.\n\
                 3. Give concrete next steps."
            }
            TemplateKind::General => {
                "1. Work out what is being asked.\n\
                 2. Answer directly.\n\
                 3. Add anything the traveller must know."
            }
        }
    }
}

fn patterns() -> &'static [(Regex, TemplateKind)] {
    static PATTERNS: OnceLock<Vec<(Regex, TemplateKind)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                r"plan(?:s|ned|ning)?|itinerar(?:y|ies)|schedul(?:e|es|ed|ing)|rout(?:e|es|ing)|trips?",
                TemplateKind::Planning,
            ),
            (
                r"book(?:s|ed|ing)?|reserv(?:e|ed|ation|ations)|tickets?|check.?in",
                TemplateKind::Booking,
            ),
            (
                r"analy[sz](?:e|es|ed|is|ing)|compar(?:e|es|ed|ing|ison)|deals?|pric(?:e|es|ed|ing)|offers?|evaluat(?:e|es|ed|ing|ion)",
                TemplateKind::Analysis,
            ),
            (
                r"help|support|refunds?|complain(?:s|ed|t|ts)?|issues?|problems?|cancel(?:s|led|ling|lation)?",
                TemplateKind::Support,
            ),
        ]
        .into_iter()
        // whole words only; `_` separates words in intent names
        .filter_map(|(words, kind)| {
            Regex::new(&format!(r"(?i)(?:^|[^a-z0-9])(?:{})(?:[^a-z0-9]|$)", words))
                .ok()
                .map(|re| (re, kind))
        })
        .collect()
    })
}

/// Pick the template family for an intent
///
/// The keyword appearing earliest in the intent decides, so the leading
/// verb outweighs the nouns after it. Families are tried in declaration
/// order when two keywords start at the same place.
pub fn select(intent: &str) -> TemplateKind {
    patterns()
        .iter()
        .filter_map(|(re, kind)| re.find(intent).map(|m| (m.start(), *kind)))
        .min_by_key(|(start, _)| *start)
        .map(|(_, kind)| kind)
        .unwrap_or(TemplateKind::General)
}

/// Prompt for one reasoning step
///
/// Includes prior execution responses and the improvements the last
/// reflection asked for.
pub fn reasoning_prompt(
    kind: TemplateKind,
    intent: &str,
    context: &serde_json::Value,
    history: &[PromptStep],
    improvements: &[String],
) -> String {
    let mut prompt = format!("Request: {}\n", intent);

    if !context.is_null() && context != &serde_json::json!({}) {
        let _ = writeln!(prompt, "Context: {}", context);
    }

    let _ = write!(prompt, "\nApproach:\n{}\n", kind.approach());

    let previous: Vec<&PromptStep> = history
        .iter()
        .filter(|s| s.kind == StepKind::Execution)
        .collect();
    if let Some(last) = previous.last() {
        if let Some(response) = &last.response {
            let _ = write!(prompt, "\nYour previous answer:\n{}\n", response);
        }
    }

    if !improvements.is_empty() {
        prompt.push_str("\nImprove on it as follows:\n");
        for item in improvements {
            let _ = writeln!(prompt, "- {}", item);
        }
    }

    prompt.push_str("\nRespond with the complete answer.");
    prompt
}

pub const REFLECTION_SYSTEM_PROMPT: &str =
    "You review answers written by another assistant. Reply with JSON only.";

/// Prompt asking the model to judge an answer against the request
pub fn reflection_prompt(intent: &str, response: &str) -> String {
    format!(
        "Request: {}\n\nAnswer to review:\n{}\n\n\
         Judge whether the answer fully and correctly addresses the request. \
         Reply with a JSON object:\n\
         {{\"isValid\": bool, \"confidence\": number between 0 and 1, \
         \"improvements\": [string], \"shouldRetry\": bool}}",
        intent, response
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_selection() {
        assert_eq!(select("plan a weekend in Porto"), TemplateKind::Planning);
        assert_eq!(select("book_flight"), TemplateKind::Booking);
        assert_eq!(select("analyze_deal"), TemplateKind::Analysis);
        assert_eq!(select("I need a refund"), TemplateKind::Support);
        assert_eq!(select("what's the weather"), TemplateKind::General);
        assert_eq!(select("compare_prices"), TemplateKind::Analysis);
        assert_eq!(select("check-in for tomorrow"), TemplateKind::Booking);
    }

    #[test]
    fn test_leading_keyword_decides() {
        assert_eq!(
            select("analyze the convenience of this deal: schedule, connections and flexibility"),
            TemplateKind::Analysis
        );
        assert_eq!(select("plan around the cheapest price"), TemplateKind::Planning);
        assert_eq!(select("help me book a table"), TemplateKind::Support);
    }

    #[test]
    fn test_keywords_match_whole_words() {
        assert_eq!(select("reset the router"), TemplateKind::General);
        assert_eq!(select("which planet is closest"), TemplateKind::General);
        assert_eq!(select("bookmark this page"), TemplateKind::General);
        assert_eq!(select("routing via Madrid"), TemplateKind::Planning);
    }

    #[test]
    fn test_reasoning_prompt_carries_improvements() {
        let prompt = reasoning_prompt(
            TemplateKind::Planning,
            "plan_trip",
            &json!({"destination": "Kyoto"}),
            &[],
            &["add travel times".to_string()],
        );
        assert!(prompt.contains("Kyoto"));
        assert!(prompt.contains("- add travel times"));
    }

    #[test]
    fn test_reflection_prompt_asks_for_json() {
        let prompt = reflection_prompt("plan_trip", "Day 1: temples");
        assert!(prompt.contains("\"shouldRetry\""));
        assert!(prompt.contains("Day 1: temples"));
    }
}
