//! The execution backend boundary.
//!
//! The suite only requires the [`Target`] contract: one call per probe,
//! returning the raw response text or an error. The adapter below wraps each
//! call with timeout enforcement and duration accounting, so a backend
//! failure becomes per-probe data instead of a run-level error.

use crate::{ExecutionRecord, SuiteResult};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::{Duration, Instant};

#[async_trait]
pub trait Target: Send + Sync {
    /// Sends a probe's text to the backend and returns the raw string response.
    async fn execute(&self, probe_text: &str) -> SuiteResult<String>;
}

/// Runs one probe through the backend under a timeout budget.
///
/// Never returns an error: backend failures set `backend_failed`, and a call
/// that outruns the budget comes back with an empty response and a recorded
/// duration at or past `timeout_ms` (classified downstream as an
/// infrastructure failure with a `timeout` termination mode).
pub async fn execute_probe(target: &dyn Target, probe_text: &str, timeout_ms: u64) -> ExecutionRecord {
    let started = Instant::now();
    let call = tokio::time::timeout(Duration::from_millis(timeout_ms), target.execute(probe_text));
    match call.await {
        Ok(Ok(response_text)) => ExecutionRecord {
            response_text,
            duration_ms: started.elapsed().as_millis() as u64,
            backend_failed: false,
            backend_error: None,
        },
        Ok(Err(e)) => ExecutionRecord {
            response_text: String::new(),
            duration_ms: started.elapsed().as_millis() as u64,
            backend_failed: true,
            backend_error: Some(e.to_string()),
        },
        Err(_elapsed) => ExecutionRecord {
            response_text: String::new(),
            // The budget is the floor here; elapsed() can round below it.
            duration_ms: (started.elapsed().as_millis() as u64).max(timeout_ms + 1),
            backend_failed: false,
            backend_error: None,
        },
    }
}

/// OpenAI-compatible chat backend.
pub struct OpenAITarget {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAITarget {
    pub fn new(api_key: String, model: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);
        Self { client, model }
    }

    /// Points the client at a custom base URL, for mocking or for
    /// OpenAI-compatible local servers.
    pub fn new_with_base_url(api_key: String, model: String, base_url: String) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        let client = Client::with_config(config);
        Self { client, model }
    }
}

#[async_trait]
impl Target for OpenAITarget {
    async fn execute(&self, probe_text: &str) -> SuiteResult<String> {
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(probe_text)
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .build()?;

        let response = self.client.chat().create(request).await?;

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}
