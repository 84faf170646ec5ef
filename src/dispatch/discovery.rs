//! Listing callable models from providers that expose `GET /models`.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;

use crate::dispatch::http::{MAX_RESPONSE_BYTES, read_capped, read_error_prefix};
use crate::dispatch::registry::{ApiFormat, ProviderId};
use crate::error::{DiscoveryError, ERROR_BODY_LIMIT, truncate_chars};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelItem>,
}

#[derive(Deserialize)]
struct ModelItem {
    id: Option<String>,
}

/// Strip whitespace, a trailing `/chat/completions`, and trailing slashes.
///
/// Idempotent: the output of one pass is a fixed point of the next.
pub fn sanitize_base_url(url: &str) -> String {
    let mut current = url.trim();
    loop {
        let next = current.trim_end_matches('/');
        let next = next.strip_suffix(CHAT_COMPLETIONS_PATH).unwrap_or(next);
        if next == current {
            return current.to_string();
        }
        current = next;
    }
}

fn is_http_url(url: &str) -> bool {
    Url::parse(url.trim()).is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
}

/// True when `provider` supports model listing with the given URL override.
pub fn can_list(provider: ProviderId, api_url: Option<&str>) -> bool {
    match provider.api_format() {
        ApiFormat::Anthropic => false,
        ApiFormat::OpenAi if provider == ProviderId::Custom => api_url.is_some_and(is_http_url),
        ApiFormat::OpenAi => true,
    }
}

/// Fetches model identifiers for selection. Not used on the organize path.
pub struct ModelDiscovery {
    client: Client,
    timeout: Duration,
}

impl Default for ModelDiscovery {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ModelDiscovery {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// List callable model ids, sorted and deduplicated.
    ///
    /// Configuration problems are reported before any request is sent.
    pub async fn list_models(
        &self,
        provider: ProviderId,
        api_key: &str,
        api_url: Option<&str>,
    ) -> Result<Vec<String>, DiscoveryError> {
        if provider.api_format() != ApiFormat::OpenAi {
            return Err(DiscoveryError::NotSupported(provider.to_string()));
        }
        let override_url = api_url.map(str::trim).filter(|u| !u.is_empty());
        let base = match (provider, override_url) {
            (ProviderId::Custom, None) => return Err(DiscoveryError::MissingApiUrl),
            (ProviderId::Custom, Some(url)) if !is_http_url(url) => {
                return Err(DiscoveryError::MissingApiUrl);
            }
            (_, Some(url)) => sanitize_base_url(url),
            (_, None) => sanitize_base_url(provider.info().base_url),
        };
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(DiscoveryError::MissingApiKey);
        }

        let timeout_ms = self.timeout.as_millis() as u64;
        let mut response = self
            .client
            .get(format!("{base}/models"))
            .header("Authorization", format!("Bearer {api_key}"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            let text = read_error_prefix(&mut response, ERROR_BODY_LIMIT).await;
            return Err(DiscoveryError::Http {
                status: status.as_u16(),
                body: truncate_chars(text.trim(), ERROR_BODY_LIMIT),
            });
        }

        let (bytes, overflow) = read_capped(&mut response, MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| classify(e, timeout_ms))?;
        if overflow {
            tracing::warn!(%provider, "model list larger than {MAX_RESPONSE_BYTES} bytes");
            return Err(DiscoveryError::EmptyOrInvalidResponse);
        }
        let list: ModelList =
            serde_json::from_slice(&bytes).map_err(|_| DiscoveryError::EmptyOrInvalidResponse)?;

        let mut models: Vec<String> = list
            .data
            .into_iter()
            .filter_map(|m| m.id)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        models.sort();
        models.dedup();

        if models.is_empty() {
            return Err(DiscoveryError::EmptyOrInvalidResponse);
        }
        tracing::debug!(%provider, count = models.len(), "listed models");
        Ok(models)
    }
}

fn classify(e: reqwest::Error, timeout_ms: u64) -> DiscoveryError {
    if e.is_timeout() {
        DiscoveryError::Timeout(timeout_ms)
    } else {
        DiscoveryError::Network(e.without_url().to_string())
    }
}
