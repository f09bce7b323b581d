//! Capability contract shared by every capability module.
//!
//! A capability module is one Rust source file defining one type that
//! implements [`Capability`]. This file is copied verbatim into sandbox
//! scaffolds, so it may only depend on `serde`, `serde_json` and
//! `async_trait`.
//!
//! Every operation has a fallback body so a partial implementation still
//! compiles; the tester's interface check is what rejects it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A command addressed to a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl Command {
    pub fn new(action: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: target.into(),
            parameters: Map::new(),
            room: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Numeric parameter; numeric strings are accepted too.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        match self.parameters.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key)?.as_str()
    }
}

/// Outcome class of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Error,
    Pending,
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandStatus::Success => "success",
            CommandStatus::Error => "error",
            CommandStatus::Pending => "pending",
        };
        write!(f, "{s}")
    }
}

/// Response to a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: CommandStatus,
    pub action: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn success(command: &Command, message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            action: command.action.clone(),
            target: command.target.clone(),
            message: Some(message.into()),
            device_state: None,
            error: None,
        }
    }

    pub fn failure(command: &Command, error: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            action: command.action.clone(),
            target: command.target.clone(),
            message: None,
            device_state: None,
            error: Some(error.into()),
        }
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.device_state = Some(state);
        self
    }
}

/// Description of a device or resource a capability manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub entity_id: String,
    pub name: String,
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
}

/// The contract every capability module satisfies.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Execute a command.
    async fn execute_command(&self, command: &Command) -> CommandResponse {
        CommandResponse::failure(command, "execute_command is not implemented")
    }

    /// Describe one resource, `None` if unknown.
    async fn describe_resource(&self, _entity_id: &str) -> Option<ResourceInfo> {
        None
    }

    /// Enumerate discoverable resources.
    async fn discover_resources(&self) -> Vec<ResourceInfo> {
        Vec::new()
    }

    /// Whether the capability is ready to serve commands.
    async fn health_check(&self) -> bool {
        false
    }
}

/// Call shape of one required operation (receiver is always `&self`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationShape {
    pub name: &'static str,
    pub is_async: bool,
    /// Number of arguments besides the receiver.
    pub arity: usize,
    pub signature: &'static str,
}

/// Operations a capability must override, in contract order.
pub const REQUIRED_OPERATIONS: [OperationShape; 4] = [
    OperationShape {
        name: "execute_command",
        is_async: true,
        arity: 1,
        signature: "async fn execute_command(&self, command: &Command) -> CommandResponse",
    },
    OperationShape {
        name: "describe_resource",
        is_async: true,
        arity: 1,
        signature: "async fn describe_resource(&self, entity_id: &str) -> Option<ResourceInfo>",
    },
    OperationShape {
        name: "discover_resources",
        is_async: true,
        arity: 0,
        signature: "async fn discover_resources(&self) -> Vec<ResourceInfo>",
    },
    OperationShape {
        name: "health_check",
        is_async: true,
        arity: 0,
        signature: "async fn health_check(&self) -> bool",
    },
];

/// Normalize a user-facing target name into an entity id.
pub fn normalize_entity_id(target: &str) -> String {
    target.trim().to_lowercase().replace([' ', '-'], "_")
}
