use std::time::{Duration, Instant};

use reqwest::{Client, Response};
use serde::Serialize;

use crate::config::ExecutorConfig;
use crate::dispatch::adapter;
use crate::dispatch::{CallDescription, CallResult, ChatClient, Credentials};
use crate::error::{CallError, truncate_chars};

/// Prompt used by the connectivity probe.
const PROBE_PROMPT: &str = "Reply with the single word OK.";
const PROBE_MAX_TOKENS: u64 = 5;

/// Largest success body accepted before decoding.
pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Outcome of [`HttpDispatch::test_connection`]. Never an error.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Issues chat-completion calls over HTTP.
pub struct HttpDispatch {
    client: Client,
    config: ExecutorConfig,
}

impl Default for HttpDispatch {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl HttpDispatch {
    pub fn new(config: ExecutorConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("falling back to default HTTP client: {e}");
                Client::new()
            });

        Self { client, config }
    }

    /// Send one call and normalize the answer to plain text.
    pub async fn call(&self, call: &CallDescription) -> Result<CallResult, CallError> {
        let provider = call.provider();
        let format = provider.api_format();
        let spec = adapter::build_request(call, &self.config.system_prompt)?;
        let timeout_ms = self.config.timeout.as_millis() as u64;
        let limit = self.config.error_body_limit;

        let mut request = self
            .client
            .post(&spec.url)
            .timeout(self.config.timeout)
            .json(&spec.body);
        for (name, value) in &spec.headers {
            request = request.header(*name, value);
        }

        let start = Instant::now();
        let mut response = request
            .send()
            .await
            .map_err(|e| classify(e, timeout_ms))?;
        let status = response.status();

        if !status.is_success() {
            let text = read_error_prefix(&mut response, limit).await;
            tracing::warn!(%provider, status = status.as_u16(), "provider returned an error status");
            return Err(CallError::Http {
                status: status.as_u16(),
                body: truncate_chars(text.trim(), limit),
            });
        }

        let (bytes, overflow) = read_capped(&mut response, MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| classify(e, timeout_ms))?;
        if overflow {
            return Err(CallError::ResponseFormat(format!(
                "response too large (max {MAX_RESPONSE_BYTES} bytes)"
            )));
        }

        let raw: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
            let text = String::from_utf8_lossy(&bytes);
            CallError::ResponseFormat(format!(
                "invalid JSON ({e}): {}",
                truncate_chars(text.trim(), limit)
            ))
        })?;

        let content = adapter::extract_content(format, &raw).ok_or_else(|| {
            CallError::ResponseFormat(format!(
                "no content in response: {}",
                truncate_chars(&raw.to_string(), limit)
            ))
        })?;

        tracing::debug!(
            %provider,
            latency_ms = start.elapsed().as_millis() as u64,
            chars = content.chars().count(),
            "provider call succeeded"
        );

        Ok(CallResult { content, raw })
    }

    /// Cheap round-trip used to validate freshly entered credentials.
    pub async fn test_connection(&self, credentials: &Credentials) -> ConnectionTest {
        let probe = CallDescription::new(credentials.clone(), PROBE_PROMPT)
            .with_system_prompt("You are a connectivity check.")
            .with_max_tokens(PROBE_MAX_TOKENS);

        let start = Instant::now();
        let outcome = self.call(&probe).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(_) => ConnectionTest {
                success: true,
                latency_ms,
                error: None,
            },
            Err(e) => {
                tracing::info!(provider = %credentials.provider, "connection test failed: {e}");
                ConnectionTest {
                    success: false,
                    latency_ms,
                    error: Some(e.user_message()),
                }
            }
        }
    }
}

impl ChatClient for HttpDispatch {
    async fn complete(&self, call: &CallDescription) -> Result<CallResult, CallError> {
        self.call(call).await
    }
}

/// Read at most `cap` bytes of the body, chunk by chunk.
/// The flag is true when the body went past `cap`; the rest is never read.
pub(crate) async fn read_capped(
    response: &mut Response,
    cap: usize,
) -> Result<(Vec<u8>, bool), reqwest::Error> {
    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = cap - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}

/// Enough of an error body to quote `limit` characters, decoded lossily.
pub(crate) async fn read_error_prefix(response: &mut Response, limit: usize) -> String {
    // 4 bytes per char, plus one more char so truncation is visible
    let cap = limit.saturating_mul(4).saturating_add(4);
    let bytes = read_capped(response, cap)
        .await
        .map(|(bytes, _)| bytes)
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Map a transport failure onto the call error taxonomy.
pub(crate) fn classify(e: reqwest::Error, timeout_ms: u64) -> CallError {
    if e.is_timeout() {
        CallError::Timeout(timeout_ms)
    } else {
        // Strip the URL: custom endpoints may embed tokens in query strings.
        CallError::Network(e.without_url().to_string())
    }
}
