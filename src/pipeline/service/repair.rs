use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use super::client::{generate_with_timeout, LlmClient};
use super::prompt::{build_repair_prompt, REPAIR_SYSTEM_PROMPT};
use super::sanitize::strip_model_artifacts;
use crate::pipeline::IngestError;

/// Service output that is not valid JSON after cleanup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed JSON: {reason}")]
pub struct Malformed {
    pub reason: String,
}

/// Isolate the JSON document inside raw service output.
///
/// A ```json fence wins; otherwise everything from the first `{` or `[`
/// (whichever comes first) through the last matching closer.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let after_fence = &text[start + 7..];
        let end = after_fence.find("```").unwrap_or(after_fence.len());
        let block = after_fence[..end].trim();
        if !block.is_empty() {
            return Some(block);
        }
    }

    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (start < end).then(|| &text[start..=end])
}

/// Parse raw service output as JSON after stripping model artifacts.
pub fn try_parse(raw: &str) -> Result<Value, Malformed> {
    let cleaned = strip_model_artifacts(raw);
    let block = extract_json_block(&cleaned).ok_or_else(|| Malformed {
        reason: "no JSON object or array found".into(),
    })?;
    serde_json::from_str(block).map_err(|e| Malformed {
        reason: e.to_string(),
    })
}

/// Issues at most one repair request per payload, bounded by a timeout.
pub struct ResponseRepairer {
    client: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl ResponseRepairer {
    pub fn new(client: Arc<dyn LlmClient>, model: &str, timeout: Duration) -> Self {
        Self {
            client,
            model: model.to_string(),
            timeout,
        }
    }

    /// Ask the service to correct `raw`. The wait resolves exactly once: on
    /// the repaired text, a service error, or the deadline.
    pub fn repair(&self, raw: &str) -> Result<Value, IngestError> {
        let prompt = build_repair_prompt(raw);
        let repaired = generate_with_timeout(
            &self.client,
            &self.model,
            &prompt,
            REPAIR_SYSTEM_PROMPT,
            self.timeout,
        )?;

        try_parse(&repaired).map_err(|e| IngestError::MalformedStructure(e.reason))
    }

    /// Local parse first; a repair request only when that fails.
    pub fn parse_or_repair(&self, raw: &str) -> Result<Value, IngestError> {
        match try_parse(raw) {
            Ok(value) => Ok(value),
            Err(malformed) => {
                tracing::debug!(reason = %malformed.reason, "Response malformed, requesting repair");
                self.repair(raw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::service::{LlmError, MockLlmClient};
    use serde_json::json;

    #[test]
    fn fenced_json_wins() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\ntrailing {\"b\": 2}";
        assert_eq!(try_parse(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn bare_object_with_prose() {
        let raw = "Sure! {\"title\": \"A\", \"tags\": [\"x\"]} Hope this helps.";
        assert_eq!(try_parse(raw).unwrap()["title"], "A");
    }

    #[test]
    fn array_before_object() {
        let raw = "[{\"title\": \"A\"}, {\"title\": \"B\"}]";
        assert_eq!(try_parse(raw).unwrap().as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn think_block_is_ignored() {
        let raw = "<think>maybe {\"wrong\": true}</think>{\"right\": true}";
        assert_eq!(try_parse(raw).unwrap(), json!({"right": true}));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(try_parse("no json here").is_err());
        assert!(try_parse("{\"title\": \"A\",").is_err());
        assert!(try_parse("} backwards {").is_err());
    }

    #[test]
    fn repair_parses_corrected_payload() {
        let client = Arc::new(MockLlmClient::new("```json\n{\"title\": \"Fixed\"}\n```"));
        let repairer = ResponseRepairer::new(client.clone(), "m", Duration::from_secs(2));
        let value = repairer.parse_or_repair("{\"title\": \"Fixed\"").unwrap();
        assert_eq!(value["title"], "Fixed");
        assert_eq!(client.call_count(), 1);
        assert!(client.prompts()[0].contains("{\"title\": \"Fixed\""));
    }

    #[test]
    fn valid_payload_needs_no_request() {
        let client = Arc::new(MockLlmClient::new("unused"));
        let repairer = ResponseRepairer::new(client.clone(), "m", Duration::from_secs(2));
        assert!(repairer.parse_or_repair("{\"ok\": 1}").is_ok());
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn unrepairable_payload_is_malformed_structure() {
        let client = Arc::new(MockLlmClient::new("still broken"));
        let repairer = ResponseRepairer::new(client, "m", Duration::from_secs(2));
        let err = repairer.repair("{").unwrap_err();
        assert!(matches!(err, IngestError::MalformedStructure(_)));
    }

    #[test]
    fn repair_times_out() {
        let client = Arc::new(MockLlmClient::new("{}").with_delay(Duration::from_millis(400)));
        let repairer = ResponseRepairer::new(client, "m", Duration::from_millis(40));
        let err = repairer.repair("{").unwrap_err();
        assert!(matches!(err, IngestError::ChunkExtraction(LlmError::Timeout(_))));
    }

    #[test]
    fn repair_service_error_surfaces() {
        let client = Arc::new(MockLlmClient::from_fn(|_| {
            Err(LlmError::Service { status: 500, body: "down".into() })
        }));
        let repairer = ResponseRepairer::new(client, "m", Duration::from_secs(2));
        let err = repairer.repair("{").unwrap_err();
        assert!(matches!(err, IngestError::ChunkExtraction(LlmError::Service { .. })));
    }
}
