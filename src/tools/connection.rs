use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::registry::ProviderId;

/// Validate credentials with a minimal call before running a paid job.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TestConnectionRequest {
    /// Provider id (see `providers`). Defaults to the configured provider.
    pub provider: Option<ProviderId>,
    /// API key. Falls back to the provider's environment variable.
    pub api_key: Option<String>,
    /// Base URL override. Required for `custom`.
    pub api_url: Option<String>,
    /// Model override. Required for `custom`.
    pub model: Option<String>,
}
