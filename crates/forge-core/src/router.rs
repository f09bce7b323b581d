//! Decision router: classifies one user input as a tool call, a plain reply
//! or a proposal to forge a new capability.
//!
//! Output handling:
//! - text not starting with `{` is a conversational reply
//! - a JSON object matching a decision schema is that decision; a truncated
//!   object is retried locally with a closing `}` appended
//! - an off-schema object with a `response`/`answer`/`message`/`text`/`reply`
//!   string is a reply
//! - malformed JSON gets exactly one repair generation, with only the broken
//!   output in the prompt, and the repair must yield a tool decision

use std::sync::Arc;

use capability_registry::{CapabilityRegistry, RegistryResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::domain::{Approval, ForgeRequest, GenerationError, Requirement, Result};
use crate::gateway::{LanguageModel, PromptRole, PromptVars};
use crate::stages::extract::truncate;

const FALLBACK_REPLY_KEYS: [&str; 5] = ["response", "answer", "message", "text", "reply"];

/// A tool the router may pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Tools for every installed capability.
pub async fn tools_from_registry(
    registry: &dyn CapabilityRegistry,
) -> RegistryResult<Vec<ToolDescriptor>> {
    Ok(registry
        .list()
        .await?
        .into_iter()
        .map(|name| ToolDescriptor::new(name.as_str(), "installed capability module"))
        .collect())
}

/// Proposal to forge a missing capability. Never executed by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeProposal {
    pub name: String,
    pub description: String,
}

impl ForgeProposal {
    /// Turn the proposal into a forge request carrying `approval`.
    pub fn into_request(self, approval: Approval) -> Result<ForgeRequest> {
        let requirement = Requirement::new(self.description)?.with_name(self.name);
        Ok(ForgeRequest::new(requirement, approval))
    }
}

/// What the router decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    CallTool {
        tool: String,
        parameters: Map<String, Value>,
    },
    Reply {
        text: String,
    },
    ProposeForge(ForgeProposal),
}

impl Decision {
    fn is_tool_decision(&self) -> bool {
        matches!(self, Decision::CallTool { .. } | Decision::ProposeForge(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("router generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("router output is valid JSON but matches no decision schema: {output}")]
    SchemaMismatch { output: String },

    #[error("router output was malformed JSON and the repair did not yield a tool decision (original: {original:?}, repaired: {repaired:?})")]
    RepairFailed { original: String, repaired: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallToolFields {
    tool: String,
    #[serde(default)]
    parameters: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProposeFields {
    name: String,
    description: String,
}

/// Parsed router output before any repair.
#[derive(Debug, PartialEq)]
enum Parsed {
    Decision(Decision),
    Malformed,
}

fn parse_object(cleaned: &str) -> Option<Value> {
    serde_json::from_str::<Value>(cleaned)
        .or_else(|_| serde_json::from_str::<Value>(&format!("{cleaned}}}")))
        .ok()
}

fn match_schema(mut object: Map<String, Value>) -> Option<Decision> {
    let intent = object.remove("intent")?;
    match intent.as_str()? {
        "call_tool" => {
            let fields: CallToolFields = serde_json::from_value(Value::Object(object)).ok()?;
            Some(Decision::CallTool {
                tool: fields.tool,
                parameters: fields.parameters,
            })
        }
        "propose_new_tool" => {
            let fields: ProposeFields = serde_json::from_value(Value::Object(object)).ok()?;
            Some(Decision::ProposeForge(ForgeProposal {
                name: fields.name,
                description: fields.description,
            }))
        }
        _ => None,
    }
}

fn parse_output(raw: &str) -> std::result::Result<Parsed, RouterError> {
    let cleaned = raw.trim();
    if !cleaned.starts_with('{') {
        return Ok(Parsed::Decision(Decision::Reply {
            text: cleaned.to_string(),
        }));
    }

    let Some(value) = parse_object(cleaned) else {
        return Ok(Parsed::Malformed);
    };
    let Value::Object(object) = value else {
        return Err(RouterError::SchemaMismatch {
            output: cleaned.to_string(),
        });
    };

    if let Some(decision) = match_schema(object.clone()) {
        return Ok(Parsed::Decision(decision));
    }

    let fallback = FALLBACK_REPLY_KEYS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find(|text| !text.is_empty());
    if let Some(text) = fallback {
        warn!(
            keys = ?object.keys().collect::<Vec<_>>(),
            "router returned off-schema JSON, treating it as a reply"
        );
        return Ok(Parsed::Decision(Decision::Reply {
            text: text.to_string(),
        }));
    }

    Err(RouterError::SchemaMismatch {
        output: cleaned.to_string(),
    })
}

fn render_context(context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => format!("Recent conversation:\n{c}\n\nCurrent request:\n"),
        None => String::new(),
    }
}

/// Routes user input through a language model.
pub struct DecisionRouter {
    model: Arc<dyn LanguageModel>,
}

impl DecisionRouter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn route(
        &self,
        input: &str,
        context: Option<&str>,
        tools: &[ToolDescriptor],
    ) -> std::result::Result<Decision, RouterError> {
        let tools_json = serde_json::to_string_pretty(tools)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let vars = PromptVars::new()
            .with("tools", tools_json)
            .with("context", render_context(context))
            .with("user_input", input.trim());

        let raw = self.model.generate(PromptRole::Router, &vars).await?;
        match parse_output(&raw)? {
            Parsed::Decision(decision) => Ok(decision),
            Parsed::Malformed => {
                warn!("router returned malformed JSON, attempting one repair");
                let repair_vars = PromptVars::new().with("broken_output", raw.trim());
                let repaired = self
                    .model
                    .generate(PromptRole::RouterRepair, &repair_vars)
                    .await?;
                match parse_output(&repaired) {
                    Ok(Parsed::Decision(decision)) if decision.is_tool_decision() => {
                        info!("router repair produced a valid decision");
                        Ok(decision)
                    }
                    _ => Err(RouterError::RepairFailed {
                        original: truncate(raw.trim(), 200),
                        repaired: truncate(repaired.trim(), 200),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_reply() {
        assert_eq!(
            parse_output("  It is 4 o'clock.\n").unwrap(),
            Parsed::Decision(Decision::Reply {
                text: "It is 4 o'clock.".to_string()
            })
        );
    }

    #[test]
    fn test_call_tool_schema() {
        let parsed =
            parse_output(r#"{"intent": "call_tool", "tool": "lamp", "parameters": {"on": true}}"#)
                .unwrap();
        match parsed {
            Parsed::Decision(Decision::CallTool { tool, parameters }) => {
                assert_eq!(tool, "lamp");
                assert_eq!(parameters["on"], true);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_call_tool_parameters_default_empty() {
        let parsed = parse_output(r#"{"intent": "call_tool", "tool": "clock"}"#).unwrap();
        assert!(matches!(
            parsed,
            Parsed::Decision(Decision::CallTool { parameters, .. }) if parameters.is_empty()
        ));
    }

    #[test]
    fn test_truncated_object_repaired_locally() {
        let parsed =
            parse_output(r#"{"intent": "propose_new_tool", "name": "sqrt", "description": "roots""#)
                .unwrap();
        assert_eq!(
            parsed,
            Parsed::Decision(Decision::ProposeForge(ForgeProposal {
                name: "sqrt".to_string(),
                description: "roots".to_string()
            }))
        );
    }

    #[test]
    fn test_extra_fields_fall_back_or_fail() {
        let err = parse_output(r#"{"intent": "call_tool", "tool": "x", "extra": 1}"#).unwrap_err();
        assert!(matches!(err, RouterError::SchemaMismatch { .. }));

        let parsed = parse_output(r#"{"answer": "hello"}"#).unwrap();
        assert_eq!(
            parsed,
            Parsed::Decision(Decision::Reply {
                text: "hello".to_string()
            })
        );
    }

    #[test]
    fn test_unrecoverable_json_is_malformed() {
        assert_eq!(parse_output(r#"{"intent": call_tool"#).unwrap(), Parsed::Malformed);
    }

    #[test]
    fn test_proposal_into_request() {
        let proposal = ForgeProposal {
            name: "square_root".to_string(),
            description: "compute square roots".to_string(),
        };
        let request = proposal.into_request(Approval::Withheld).unwrap();
        assert_eq!(request.requirement.name.as_deref(), Some("square_root"));
        assert!(!request.approval.is_granted());

        let blank = ForgeProposal {
            name: "x".to_string(),
            description: " ".to_string(),
        };
        assert!(blank.into_request(Approval::Withheld).is_err());
    }

    #[test]
    fn test_render_context() {
        assert_eq!(render_context(None), "");
        assert_eq!(render_context(Some("  ")), "");
        assert!(render_context(Some("user: hi")).contains("user: hi"));
    }
}
