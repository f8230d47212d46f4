use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::LlmError;
use crate::pipeline::CancelFlag;

/// Text-generation backend. Implementations must be shareable with the
/// adapter's worker thread.
pub trait LlmClient: Send + Sync {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, LlmError>;

    /// Stream partial output through `token_tx` and return the full text.
    /// Stops with `LlmError::Aborted` once `cancel` is set.
    fn generate_streaming(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        token_tx: mpsc::Sender<String>,
        cancel: &CancelFlag,
    ) -> Result<String, LlmError> {
        let text = self.generate(model, prompt, system)?;
        if cancel.is_cancelled() {
            return Err(LlmError::Aborted);
        }
        let _ = token_tx.send(text.clone());
        Ok(text)
    }
}

/// Blocking call bounded by `timeout`. The call runs on its own thread; a
/// result arriving after the deadline is discarded.
pub fn generate_with_timeout(
    client: &Arc<dyn LlmClient>,
    model: &str,
    prompt: &str,
    system: &str,
    timeout: Duration,
) -> Result<String, LlmError> {
    let (tx, rx) = mpsc::channel();
    let client = Arc::clone(client);
    let (model, prompt, system) = (model.to_string(), prompt.to_string(), system.to_string());

    std::thread::spawn(move || {
        let _ = tx.send(client.generate(&model, &prompt, &system));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(LlmError::Timeout(timeout.as_secs())),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(LlmError::HttpClient(
            "Service worker exited without a result".into(),
        )),
    }
}

type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

/// Scriptable client for tests: a fixed response, a queue, or a function of
/// the prompt. Every prompt is recorded.
pub struct MockLlmClient {
    responder: Responder,
    queue: Mutex<VecDeque<Result<String, LlmError>>>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        let response = response.to_string();
        Self::from_fn(move |_| Ok(response.clone()))
    }

    pub fn from_fn(f: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(f),
            queue: Mutex::new(VecDeque::new()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queued results are returned first, in order; the responder answers
    /// once the queue is empty.
    pub fn with_sequence(self, results: Vec<Result<String, LlmError>>) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(results);
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, prompt: &str, _system: &str) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match queued {
            Some(result) => result,
            None => (self.responder)(prompt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_configured_response() {
        let client = MockLlmClient::new("{}");
        assert_eq!(client.generate("m", "p", "s").unwrap(), "{}");
        assert_eq!(client.prompts(), vec!["p"]);
    }

    #[test]
    fn mock_sequence_then_fallback() {
        let client = MockLlmClient::new("fallback")
            .with_sequence(vec![Err(LlmError::Connection("x".into())), Ok("first".into())]);
        assert!(client.generate("m", "a", "").is_err());
        assert_eq!(client.generate("m", "b", "").unwrap(), "first");
        assert_eq!(client.generate("m", "c", "").unwrap(), "fallback");
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn default_streaming_sends_whole_text() {
        let client = MockLlmClient::new("hello");
        let (tx, rx) = mpsc::channel();
        let text = client
            .generate_streaming("m", "p", "", tx, &CancelFlag::new())
            .unwrap();
        assert_eq!(text, "hello");
        assert_eq!(rx.recv().unwrap(), "hello");
    }

    #[test]
    fn default_streaming_honors_cancel() {
        let client = MockLlmClient::new("hello");
        let cancel = CancelFlag::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::channel();
        assert_eq!(
            client.generate_streaming("m", "p", "", tx, &cancel),
            Err(LlmError::Aborted)
        );
    }

    #[test]
    fn timeout_bounds_slow_calls() {
        let client: Arc<dyn LlmClient> =
            Arc::new(MockLlmClient::new("late").with_delay(Duration::from_millis(300)));
        let result = generate_with_timeout(&client, "m", "p", "", Duration::from_millis(30));
        assert!(matches!(result, Err(LlmError::Timeout(_))));
    }

    #[test]
    fn fast_calls_complete_within_timeout() {
        let client: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new("ok"));
        let result = generate_with_timeout(&client, "m", "p", "", Duration::from_secs(2));
        assert_eq!(result.unwrap(), "ok");
    }
}
