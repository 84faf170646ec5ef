pub mod adapter;
pub mod discovery;
pub mod http;
pub mod registry;

use std::future::Future;
use std::sync::Arc;

use crate::dispatch::registry::ProviderId;
use crate::error::CallError;

/// Who to call and with which secret. Supplied per invocation, never persisted.
#[derive(Clone)]
pub struct Credentials {
    pub provider: ProviderId,
    pub api_key: String,
    /// Overrides the provider's base URL. Required for `custom`.
    pub api_url: Option<String>,
    /// Overrides the provider's default model. Required for `custom`.
    pub model: Option<String>,
}

impl Credentials {
    pub fn new(provider: ProviderId, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            api_url: None,
            model: None,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// The caller's URL override, if it holds anything besides whitespace.
    pub fn api_url(&self) -> Option<&str> {
        self.api_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// The caller's model override, if it holds anything besides whitespace.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Provider-agnostic description of one chat-completion call.
#[derive(Clone)]
pub struct CallDescription {
    pub credentials: Credentials,
    pub prompt: String,
    /// Falls back to the executor's configured system prompt.
    pub system_prompt: Option<String>,
    /// Falls back to 0.7.
    pub temperature: Option<f64>,
    /// Falls back to 2000.
    pub max_tokens: Option<u64>,
}

impl CallDescription {
    pub fn new(credentials: Credentials, prompt: impl Into<String>) -> Self {
        Self {
            credentials,
            prompt: prompt.into(),
            system_prompt: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn provider(&self) -> ProviderId {
        self.credentials.provider
    }
}

impl std::fmt::Debug for CallDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallDescription")
            .field("credentials", &self.credentials)
            .field("prompt_chars", &self.prompt.chars().count())
            .field("system_prompt", &self.system_prompt.is_some())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Normalized outcome of a successful call.
#[derive(Debug, Clone)]
pub struct CallResult {
    /// Trimmed completion text. Never empty.
    pub content: String,
    /// The decoded response exactly as the provider sent it.
    pub raw: serde_json::Value,
}

/// Anything that can turn a [`CallDescription`] into completion text.
///
/// `HttpDispatch` is the production implementation; the organizer is generic
/// over this trait so batches can be driven against scripted clients.
pub trait ChatClient: Send + Sync {
    fn complete(
        &self,
        call: &CallDescription,
    ) -> impl Future<Output = Result<CallResult, CallError>> + Send;
}

impl<T: ChatClient> ChatClient for Arc<T> {
    fn complete(
        &self,
        call: &CallDescription,
    ) -> impl Future<Output = Result<CallResult, CallError>> + Send {
        (**self).complete(call)
    }
}
