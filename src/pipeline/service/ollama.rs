use std::io::{BufRead, BufReader};
use std::sync::mpsc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::client::LlmClient;
use super::LlmError;
use crate::pipeline::CancelFlag;

/// Ollama HTTP client for local text generation.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Only establishing the connection is bounded by `connect_timeout_secs`;
    /// a generation may stream for as long as the model needs.
    pub fn new(base_url: &str, connect_timeout_secs: u64) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: connect_timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let response = self.check_status(response)?;

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    pub fn is_model_available(&self, model: &str) -> Result<bool, LlmError> {
        Ok(self.list_models()?.iter().any(|m| m.starts_with(model)))
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_connect() {
            LlmError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else {
            LlmError::HttpClient(e.to_string())
        }
    }

    fn check_status(
        &self,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(LlmError::Service {
            status: status.as_u16(),
            body,
        })
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

/// Response body from Ollama /api/generate; one per NDJSON line when streaming.
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

/// Fold NDJSON stream lines into the full response, forwarding each token.
fn read_stream(
    reader: impl BufRead,
    token_tx: &mpsc::Sender<String>,
    cancel: &CancelFlag,
) -> Result<String, LlmError> {
    let mut full = String::new();
    for line in reader.lines() {
        if cancel.is_cancelled() {
            return Err(LlmError::Aborted);
        }
        let line = line.map_err(|e| LlmError::HttpClient(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let part: OllamaGenerateResponse = serde_json::from_str(&line)
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;
        if let Some(error) = part.error {
            return Err(LlmError::Service { status: 200, body: error });
        }
        if !part.response.is_empty() {
            full.push_str(&part.response);
            // Receiver may be gone after an abort; the flag check above ends the loop.
            let _ = token_tx.send(part.response);
        }
        if part.done {
            break;
        }
    }
    Ok(full)
}

impl LlmClient for OllamaClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let response = self.check_status(response)?;

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;
        Ok(parsed.response)
    }

    fn generate_streaming(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        token_tx: mpsc::Sender<String>,
        cancel: &CancelFlag,
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let response = self.check_status(response)?;

        read_stream(BufReader::new(response), &token_tx, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn constructor_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 30).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn timeout_bounds_connection_setup_only() {
        let client = OllamaClient::new("http://localhost:11434", 10).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.timeout_secs, 10);
    }

    #[test]
    fn stream_concatenates_and_forwards_tokens() {
        let ndjson = "{\"response\":\"{\\\"a\\\"\",\"done\":false}\n\n{\"response\":\": 1}\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n";
        let (tx, rx) = mpsc::channel();
        let text = read_stream(Cursor::new(ndjson), &tx, &CancelFlag::new()).unwrap();
        assert_eq!(text, "{\"a\": 1}");
        drop(tx);
        let tokens: Vec<String> = rx.iter().collect();
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn stream_stops_when_cancelled() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::channel();
        let result = read_stream(Cursor::new("{\"response\":\"x\"}\n"), &tx, &cancel);
        assert_eq!(result, Err(LlmError::Aborted));
    }

    #[test]
    fn stream_surfaces_inline_errors() {
        let (tx, _rx) = mpsc::channel();
        let result = read_stream(
            Cursor::new("{\"error\":\"model not found\"}\n"),
            &tx,
            &CancelFlag::new(),
        );
        assert!(matches!(result, Err(LlmError::Service { .. })));
    }

    #[test]
    fn unreachable_server_is_a_connection_error() {
        let client = OllamaClient::new("http://127.0.0.1:9", 2).unwrap();
        let err = client.generate("m", "p", "").unwrap_err();
        assert!(matches!(err, LlmError::Connection(_) | LlmError::HttpClient(_) | LlmError::Timeout(_)));
    }
}
