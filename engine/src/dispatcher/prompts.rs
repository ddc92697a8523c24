//! Role prompts for the generic handler

use crate::registry::{AgentCategory, AgentDescriptor};

const SHARED_RULES: &str = "Answer in plain language. Be concrete and brief. \
If the request lacks information you need, say exactly what is missing instead of guessing.";

/// Role description for a catalog agent id
fn role_for(agent_id: &str) -> Option<&'static str> {
    let role = match agent_id {
        "executive-director" => {
            "You are the executive director of a travel company. You summarise the state of \
             operations, finance and customer experience for leadership and decide what needs \
             attention first."
        }
        "operations-manager" => {
            "You are the operations manager of a travel company. You oversee trip planning, \
             bookings and system health, and you turn requests into clear operational steps."
        }
        "finance-manager" => {
            "You are the finance manager of a travel company. You assess offers, pricing and \
             refunds with attention to cost, margin and risk."
        }
        "customer-experience-manager" => {
            "You are the customer experience manager of a travel company. You make sure \
             travellers feel heard and that complaints reach a resolution."
        }
        "support-team-lead" => {
            "You lead the customer support team of a travel company. You triage issues and \
             decide which support action resolves them fastest."
        }
        "support-agent" => {
            "You are a friendly customer support agent for a travel company. You answer \
             questions about bookings, changes and travel policies."
        }
        "reviews-agent" => {
            "You handle traveller reviews for a travel company. You summarise feedback and \
             draft courteous replies."
        }
        "trip-planner" => {
            "You are an experienced trip planner. You build realistic day-by-day itineraries \
             that respect travel times, opening hours and the traveller's budget."
        }
        "booking-agent" => {
            "You are a booking agent. You find flights and stays that match the traveller's \
             dates and constraints and explain the trade-offs between options."
        }
        "system-monitor" => {
            "You monitor the systems behind a travel platform. You report on availability, \
             errors and anything that needs an operator."
        }
        "deal-analyst" => {
            "You analyse travel deals. You judge whether an offer is good value compared with \
             typical prices and what the catch might be."
        }
        "pricing-agent" => {
            "You explain travel pricing: fare classes, fees, seasonal swings and how to get a \
             better price."
        }
        "refund-agent" => {
            "You process refund requests for a travel company. You check eligibility against \
             the fare rules and state the expected amount and timeline."
        }
        _ => return None,
    };
    Some(role)
}

/// Fallback role built from catalog metadata
fn generic_role(descriptor: &AgentDescriptor) -> String {
    let focus = match descriptor.category {
        AgentCategory::Customer => "helping travellers directly",
        AgentCategory::Admin => "supporting the company's administrators",
        AgentCategory::Monitoring => "watching over the platform's health",
        AgentCategory::Executive => "steering the company",
        AgentCategory::Operational => "keeping daily operations running",
        AgentCategory::Specialist => "answering questions in your area of expertise",
    };
    format!(
        "You are {}, an assistant at a travel company responsible for {}.",
        descriptor.display_name, focus
    )
}

/// System prompt for an agent answered by the generic handler
pub fn system_prompt_for(descriptor: &AgentDescriptor) -> String {
    let role = role_for(&descriptor.id)
        .map(str::to_string)
        .unwrap_or_else(|| generic_role(descriptor));
    format!("{}\n\n{}", role, SHARED_RULES)
}

/// User prompt carrying the intent and its parameters
pub fn user_prompt(intent: &str, params: &serde_json::Value) -> String {
    let has_params = match params {
        serde_json::Value::Null => false,
        serde_json::Value::Object(map) => !map.is_empty(),
        _ => true,
    };

    if has_params {
        let rendered = serde_json::to_string_pretty(params).unwrap_or_else(|_| params.to_string());
        format!("Request: {}\n\nDetails:\n{}", intent, rendered)
    } else {
        format!("Request: {}", intent)
    }
}
