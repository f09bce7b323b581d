//! Parsing helpers for free-form model output.
//!
//! Models wrap code in markdown fences and append a fenced JSON block with
//! metadata. These helpers pull the two apart.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::capability::{Command, CommandStatus};
use crate::domain::{Expectation, Scenario};

fn json_block_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

fn code_block_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:rust|rs)?[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

fn capability_impl_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"impl\s+(?:[A-Za-z_][A-Za-z0-9_]*::)*Capability\s+for\s+([A-Za-z_][A-Za-z0-9_]*)")
            .ok()
    })
    .as_ref()
}

/// Split `text` into (text without the last ```json block, parsed JSON).
///
/// Returns the text unchanged and `None` when there is no block or it does
/// not parse.
pub fn split_json_block(text: &str) -> (String, Option<Value>) {
    let Some(re) = json_block_re() else {
        return (text.to_string(), None);
    };
    let Some(caps) = re.captures_iter(text).last() else {
        return (text.to_string(), None);
    };
    let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
        return (text.to_string(), None);
    };
    match serde_json::from_str::<Value>(inner.as_str().trim()) {
        Ok(value) => {
            let mut rest = String::with_capacity(text.len());
            rest.push_str(&text[..whole.start()]);
            rest.push_str(&text[whole.end()..]);
            (rest, Some(value))
        }
        Err(e) => {
            debug!("ignoring unparseable json block: {}", e);
            (text.to_string(), None)
        }
    }
}

/// Strip markdown fences from generated code.
///
/// If the text contains a fenced rust block, its body is returned; otherwise
/// stray fence lines are dropped.
pub fn strip_code_fences(text: &str) -> String {
    if let Some(body) = code_block_re()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
    {
        return body.as_str().trim().to_string();
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Type named in the first `impl Capability for X` of `source`.
pub fn declared_capability_type(source: &str) -> Option<String> {
    capability_impl_re()?
        .captures(source)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

/// Scenario shape models are asked to emit.
#[derive(Debug, Deserialize)]
struct RawScenario {
    #[serde(default)]
    name: Option<String>,
    action: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    expected_status: Option<CommandStatus>,
    #[serde(default)]
    expected_result_contains: Option<Value>,
}

impl RawScenario {
    fn into_scenario(self, fallback_name: String) -> Scenario {
        let contains = self.expected_result_contains.and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });
        Scenario {
            name: self.name.filter(|n| !n.trim().is_empty()).unwrap_or(fallback_name),
            command: Command {
                action: self.action,
                target: self.target.unwrap_or_else(|| "system".to_string()),
                parameters: self.parameters,
                room: None,
            },
            expect: Expectation {
                status: self.expected_status.unwrap_or(CommandStatus::Success),
                contains,
            },
        }
    }
}

/// Scenarios from a metadata object's `test_scenarios` array or single
/// `test_scenario` object. Malformed entries are skipped.
pub fn scenarios_from_metadata(meta: &Value, prefix: &str) -> Vec<Scenario> {
    let entries: Vec<Value> = match (meta.get("test_scenarios"), meta.get("test_scenario")) {
        (Some(Value::Array(items)), _) => items.clone(),
        (_, Some(single @ Value::Object(_))) => vec![single.clone()],
        _ => Vec::new(),
    };
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| match serde_json::from_value::<RawScenario>(entry) {
            Ok(raw) => Some(raw.into_scenario(format!("{prefix}_{}", i + 1))),
            Err(e) => {
                debug!("skipping malformed scenario {}: {}", i + 1, e);
                None
            }
        })
        .collect()
}

/// Truncate to at most `max` chars, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODER_OUTPUT: &str = r#"Here is the module:
```rust
use crate::capability::{Capability, Command, CommandResponse};

#[derive(Default)]
pub struct SquareRoot;
```

```json
{
  "capability": "SquareRoot",
  "test_scenario": {
    "action": "sqrt",
    "parameters": {"number": 16},
    "expected_result_contains": "4"
  }
}
```
"#;

    #[test]
    fn test_split_json_block_removes_metadata() {
        let (rest, meta) = split_json_block(CODER_OUTPUT);
        let meta = meta.unwrap();
        assert_eq!(meta["capability"], "SquareRoot");
        assert!(!rest.contains("test_scenario"));
        assert!(rest.contains("pub struct SquareRoot"));
    }

    #[test]
    fn test_split_json_block_ignores_invalid_json() {
        let text = "code\n```json\n{not json\n```\n";
        let (rest, meta) = split_json_block(text);
        assert!(meta.is_none());
        assert_eq!(rest, text);
    }

    #[test]
    fn test_strip_code_fences_prefers_rust_block() {
        let (rest, _) = split_json_block(CODER_OUTPUT);
        let code = strip_code_fences(&rest);
        assert!(code.starts_with("use crate::capability"));
        assert!(!code.contains("```"));
        assert!(!code.contains("Here is the module"));
    }

    #[test]
    fn test_strip_code_fences_passes_raw_code() {
        assert_eq!(strip_code_fences("pub struct A;\n"), "pub struct A;");
    }

    #[test]
    fn test_declared_capability_type() {
        let src = "#[async_trait]\nimpl crate::capability::Capability for Lamp {}";
        assert_eq!(declared_capability_type(src).as_deref(), Some("Lamp"));
        assert_eq!(declared_capability_type("struct Lamp;"), None);
    }

    #[test]
    fn test_single_scenario_is_accepted() {
        let (_, meta) = split_json_block(CODER_OUTPUT);
        let scenarios = scenarios_from_metadata(&meta.unwrap(), "coder");
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].name, "coder_1");
        assert_eq!(scenarios[0].command.action, "sqrt");
        assert_eq!(scenarios[0].command.target, "system");
        assert_eq!(scenarios[0].expect.contains.as_deref(), Some("4"));
    }

    #[test]
    fn test_numeric_expectation_is_stringified_and_bad_entries_skipped() {
        let meta = serde_json::json!({
            "test_scenarios": [
                {"name": "sum", "action": "add", "expected_result_contains": 5},
                {"parameters": {}}
            ]
        });
        let scenarios = scenarios_from_metadata(&meta, "brief");
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].name, "sum");
        assert_eq!(scenarios[0].expect.contains.as_deref(), Some("5"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
