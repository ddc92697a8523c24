use proptest::prelude::*;
use sdk::errors::{ConciergeErrorExt, OrchestrationError};
use sdk::{AccessTier, HandlerRequest};

fn tier() -> impl Strategy<Value = AccessTier> {
    prop_oneof![
        Just(AccessTier::Guest),
        Just(AccessTier::Premium),
        Just(AccessTier::Admin),
    ]
}

// Every error carries a hint and a stable code, whatever its payload
proptest! {
    #[test]
    fn test_error_hint_and_code_completeness(detail in "\\PC*", a in tier(), b in tier()) {
        let errs = vec![
            OrchestrationError::UnknownAgent(detail.clone()),
            OrchestrationError::AccessDenied { agent_id: detail.clone(), required: a, actual: b },
            OrchestrationError::Validation(detail.clone()),
            OrchestrationError::NotSupervised { manager: detail.clone(), subordinate: detail.clone() },
            OrchestrationError::HandlerFailure(detail.clone()),
            OrchestrationError::Timeout(detail.clone()),
            OrchestrationError::Parse(detail.clone()),
            OrchestrationError::Completion(detail.clone()),
            OrchestrationError::TaskNotFound(detail.clone()),
            OrchestrationError::Database(detail.clone()),
            OrchestrationError::Config(detail.clone()),
        ];

        for err in errs {
            prop_assert!(!err.user_hint().is_empty());
            let code = err.code();
            prop_assert!(!code.is_empty());
            prop_assert!(code.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}

// Tier checks form a total order: a caller satisfies exactly the tiers at or
// below its own
proptest! {
    #[test]
    fn test_tier_satisfaction_is_ordered(caller in tier(), required in tier()) {
        prop_assert_eq!(caller.satisfies(required), caller >= required);
        prop_assert!(caller.satisfies(caller));
        prop_assert!(caller.satisfies(AccessTier::Guest));
        if caller.satisfies(required) && required.satisfies(caller) {
            prop_assert_eq!(caller, required);
        }
        let parsed: AccessTier = caller.as_str().to_uppercase().parse().unwrap();
        prop_assert_eq!(parsed, caller);
    }
}

// Re-targeting a request keeps the task and requester it belongs to
proptest! {
    #[test]
    fn test_for_agent_keeps_task_identity(
        task_id in "[a-f0-9]{8}",
        requester in "[a-z]{1,12}",
        target in "[a-z]{3,10}-agent",
    ) {
        let request = HandlerRequest {
            task_id: task_id.clone(),
            requester_id: requester.clone(),
            agent_id: "operations-manager".to_string(),
            intent: "status".to_string(),
            params: serde_json::json!({}),
        };

        let delegated = request.for_agent(target.clone(), "check", serde_json::json!({"a": 1}));

        prop_assert_eq!(delegated.task_id, task_id);
        prop_assert_eq!(delegated.requester_id, requester);
        prop_assert_eq!(delegated.agent_id, target);
        prop_assert_eq!(delegated.intent, "check");
    }
}
