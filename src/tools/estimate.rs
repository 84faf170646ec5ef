use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dispatch::registry::ProviderId;

/// Pre-flight token and cost hint for an organize run.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct EstimateRequest {
    /// Provider id (see `providers`). Defaults to the configured provider.
    pub provider: Option<ProviderId>,
    /// Number of bookmarks that would be organized.
    pub count: usize,
    /// Whether descriptions would be generated (costs 1.5x).
    pub generate_description: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub provider: ProviderId,
    pub count: usize,
    pub batches: usize,
    pub estimated_tokens: u64,
    pub estimated_cost_usd: f64,
}
