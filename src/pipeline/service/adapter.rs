use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::client::LlmClient;
use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::LlmError;
use crate::pipeline::{CancelFlag, Chunk};

/// Events delivered for one in-flight extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// Streamed fragment, for progress display only.
    Partial(String),
    Finished(String),
    Failed(LlmError),
}

/// Handle to one outstanding extraction request.
pub struct ExtractionCall {
    label: String,
    events: Receiver<AdapterEvent>,
    cancel: CancelFlag,
    worker: Option<JoinHandle<()>>,
}

impl ExtractionCall {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<AdapterEvent, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Stop the request. No terminal event is delivered afterwards.
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ExtractionCall {
    fn drop(&mut self) {
        // An abandoned call must not keep streaming in the background.
        if self.worker.as_ref().is_some_and(|w| !w.is_finished()) {
            self.cancel.cancel();
        }
        self.worker.take();
    }
}

/// Sends chunks to the text-generation service on a worker thread.
/// Never retries; retry policy belongs to the caller.
pub struct ExtractionAdapter {
    client: Arc<dyn LlmClient>,
    model: String,
    requested_cases: usize,
}

impl ExtractionAdapter {
    pub fn new(client: Arc<dyn LlmClient>, model: &str, requested_cases: usize) -> Self {
        Self {
            client,
            model: model.to_string(),
            requested_cases,
        }
    }

    pub fn dispatch(&self, chunk: &Chunk) -> ExtractionCall {
        let label = chunk.label();
        let prompt = build_extraction_prompt(&chunk.content, &label, self.requested_cases);
        let (event_tx, event_rx) = mpsc::channel();
        let cancel = CancelFlag::new();

        let client = Arc::clone(&self.client);
        let model = self.model.clone();
        let flag = cancel.clone();

        let worker = std::thread::spawn(move || {
            let (token_tx, token_rx) = mpsc::channel::<String>();

            let result = std::thread::scope(|scope| {
                let call = scope.spawn(|| {
                    client.generate_streaming(&model, &prompt, EXTRACTION_SYSTEM_PROMPT, token_tx, &flag)
                });

                for token in token_rx {
                    if flag.is_cancelled() {
                        break;
                    }
                    if event_tx.send(AdapterEvent::Partial(token)).is_err() {
                        flag.cancel();
                        break;
                    }
                }

                call.join()
                    .unwrap_or_else(|_| Err(LlmError::HttpClient("Service worker panicked".into())))
            });

            if flag.is_cancelled() {
                return;
            }
            let event = match result {
                Ok(text) => AdapterEvent::Finished(text),
                Err(e) => AdapterEvent::Failed(e),
            };
            let _ = event_tx.send(event);
        });

        ExtractionCall {
            label,
            events: event_rx,
            cancel,
            worker: Some(worker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::service::MockLlmClient;
    use crate::pipeline::Chunker;

    fn chunk(text: &str) -> Chunk {
        Chunker::default().split("algo.md", text).remove(0)
    }

    fn terminal(call: &ExtractionCall) -> AdapterEvent {
        loop {
            match call.recv_timeout(Duration::from_secs(5)) {
                Ok(AdapterEvent::Partial(_)) => continue,
                Ok(other) => return other,
                Err(e) => panic!("no terminal event: {e}"),
            }
        }
    }

    #[test]
    fn finished_event_carries_full_text() {
        let client = Arc::new(MockLlmClient::new("{\"questions\": []}"));
        let adapter = ExtractionAdapter::new(client.clone(), "m", 5);
        let call = adapter.dispatch(&chunk("# Two Sum"));
        assert_eq!(call.label(), "algo.md chunk 1/1");
        assert_eq!(terminal(&call), AdapterEvent::Finished("{\"questions\": []}".into()));

        let prompt = &client.prompts()[0];
        assert!(prompt.contains("# Two Sum"));
        assert!(prompt.contains("algo.md chunk 1/1"));
    }

    #[test]
    fn partial_events_precede_terminal() {
        let client = Arc::new(MockLlmClient::new("[]"));
        let adapter = ExtractionAdapter::new(client, "m", 5);
        let call = adapter.dispatch(&chunk("x"));
        let first = call.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first, AdapterEvent::Partial("[]".into()));
        assert_eq!(terminal(&call), AdapterEvent::Finished("[]".into()));
    }

    #[test]
    fn errors_surface_as_failed() {
        let client = Arc::new(MockLlmClient::from_fn(|_| {
            Err(LlmError::Connection("http://localhost:11434".into()))
        }));
        let adapter = ExtractionAdapter::new(client.clone(), "m", 5);
        let call = adapter.dispatch(&chunk("x"));
        assert!(matches!(terminal(&call), AdapterEvent::Failed(LlmError::Connection(_))));
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn abort_suppresses_late_result() {
        let client = Arc::new(MockLlmClient::new("[]").with_delay(Duration::from_millis(200)));
        let adapter = ExtractionAdapter::new(client, "m", 5);
        let call = adapter.dispatch(&chunk("x"));
        call.abort();
        match call.recv_timeout(Duration::from_millis(800)) {
            Err(RecvTimeoutError::Disconnected) => {}
            other => panic!("expected no event after abort, got {other:?}"),
        }
    }
}
