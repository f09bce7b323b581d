//! Decision router behavior against a scripted model.

use std::sync::Arc;

use capability_registry::fakes::MemoryCapabilityRegistry;
use forge_core::fakes::ScriptedGateway;
use forge_core::{
    tools_from_registry, Approval, Decision, DecisionRouter, ForgeProposal, GenerationError,
    PromptRole, RouterError, ToolDescriptor,
};

fn tools() -> Vec<ToolDescriptor> {
    vec![ToolDescriptor::new("lamp", "turns lamps on and off")]
}

fn router(gateway: &Arc<ScriptedGateway>) -> DecisionRouter {
    DecisionRouter::new(gateway.clone())
}

#[tokio::test]
async fn conversational_text_is_a_reply() {
    let gateway = Arc::new(ScriptedGateway::new().respond(PromptRole::Router, "Sure, it is sunny."));
    let decision = router(&gateway)
        .route("how is the weather?", None, &tools())
        .await
        .unwrap();

    assert_eq!(
        decision,
        Decision::Reply {
            text: "Sure, it is sunny.".to_string()
        }
    );
    assert_eq!(gateway.calls(PromptRole::RouterRepair), 0);
}

#[tokio::test]
async fn tool_call_carries_parameters_and_prompt_lists_tools() {
    let gateway = Arc::new(ScriptedGateway::new().respond(
        PromptRole::Router,
        r#"{"intent": "call_tool", "tool": "lamp", "parameters": {"room": "kitchen"}}"#,
    ));
    let decision = router(&gateway)
        .route("  kitchen lights on  ", Some("user: hi\nassistant: hello"), &tools())
        .await
        .unwrap();

    match decision {
        Decision::CallTool { tool, parameters } => {
            assert_eq!(tool, "lamp");
            assert_eq!(parameters["room"], "kitchen");
        }
        other => panic!("expected tool call, got {other:?}"),
    }

    let vars = gateway.last_vars(PromptRole::Router).unwrap();
    assert_eq!(vars.get("user_input"), Some("kitchen lights on"));
    assert!(vars.get("tools").unwrap().contains("turns lamps on and off"));
    assert!(vars.get("context").unwrap().contains("assistant: hello"));
}

#[tokio::test]
async fn malformed_json_is_repaired_once() {
    let broken = r#"{"intent": "propose_new_tool", "name": "sqrt" "description": "roots"}"#;
    let gateway = Arc::new(
        ScriptedGateway::new()
            .respond(PromptRole::Router, broken)
            .respond(
                PromptRole::RouterRepair,
                r#"{"intent": "propose_new_tool", "name": "sqrt", "description": "square roots"}"#,
            ),
    );
    let decision = router(&gateway)
        .route("what is the square root of 2?", None, &tools())
        .await
        .unwrap();

    assert_eq!(
        decision,
        Decision::ProposeForge(ForgeProposal {
            name: "sqrt".to_string(),
            description: "square roots".to_string()
        })
    );
    assert_eq!(gateway.calls(PromptRole::RouterRepair), 1);
    let repair_vars = gateway.last_vars(PromptRole::RouterRepair).unwrap();
    assert_eq!(repair_vars.keys().collect::<Vec<_>>(), vec!["broken_output"]);
    assert_eq!(repair_vars.get("broken_output"), Some(broken));
}

#[tokio::test]
async fn repair_that_is_not_a_tool_decision_fails() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .respond(PromptRole::Router, r#"{"intent": "call_tool", "tool": lamp}"#)
            .respond(PromptRole::RouterRepair, "Sorry, I cannot fix that."),
    );
    let err = router(&gateway)
        .route("lights", None, &tools())
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::RepairFailed { .. }));
    assert_eq!(gateway.calls(PromptRole::Router), 1);
    assert_eq!(gateway.calls(PromptRole::RouterRepair), 1);
}

#[tokio::test]
async fn valid_json_matching_nothing_is_not_repaired() {
    let gateway = Arc::new(
        ScriptedGateway::new().respond(PromptRole::Router, r#"{"intent": "dance", "style": "waltz"}"#),
    );
    let err = router(&gateway)
        .route("dance", None, &tools())
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::SchemaMismatch { .. }));
    assert_eq!(gateway.calls(PromptRole::RouterRepair), 0);
}

#[tokio::test]
async fn off_schema_json_with_reply_key_is_a_reply() {
    let gateway = Arc::new(
        ScriptedGateway::new().respond(PromptRole::Router, r#"{"message": "Hello there!"}"#),
    );
    let decision = router(&gateway).route("hi", None, &[]).await.unwrap();
    assert_eq!(
        decision,
        Decision::Reply {
            text: "Hello there!".to_string()
        }
    );
}

#[tokio::test]
async fn gateway_failure_surfaces_as_generation_error() {
    let gateway = Arc::new(
        ScriptedGateway::new().fail(PromptRole::Router, GenerationError::Timeout { seconds: 5 }),
    );
    let err = router(&gateway).route("hi", None, &[]).await.unwrap_err();
    assert!(matches!(
        err,
        RouterError::Generation(GenerationError::Timeout { seconds: 5 })
    ));
}

#[tokio::test]
async fn proposal_becomes_request_that_still_needs_approval() {
    let gateway = Arc::new(ScriptedGateway::new().respond(
        PromptRole::Router,
        r#"{"intent": "propose_new_tool", "name": "weather", "description": "fetch local weather"}"#,
    ));
    let Decision::ProposeForge(proposal) = router(&gateway)
        .route("what's the weather?", None, &tools())
        .await
        .unwrap()
    else {
        panic!("expected a proposal");
    };

    let request = proposal.into_request(Approval::Withheld).unwrap();
    assert_eq!(request.requirement.label(), "weather");
    assert!(!request.approval.is_granted());
}

#[tokio::test]
async fn tools_are_listed_from_registry() {
    let registry = MemoryCapabilityRegistry::with_modules([("lamp", "// a"), ("clock", "// b")]);
    let tools = tools_from_registry(&registry).await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["clock", "lamp"]);
}
