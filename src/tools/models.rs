use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dispatch::discovery::can_list;
use crate::dispatch::registry::{ApiFormat, ProviderId};
use crate::organize::estimate::PriceTable;

/// Fetch the callable model ids from an OpenAI-compatible provider.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListModelsRequest {
    /// Provider id (see `providers`). Defaults to the configured provider.
    pub provider: Option<ProviderId>,
    /// API key. Falls back to the provider's environment variable.
    pub api_key: Option<String>,
    /// Base URL override. Required for `custom`.
    pub api_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListModelsResponse {
    pub provider: ProviderId,
    pub models: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProviderSummary {
    pub id: ProviderId,
    pub display_name: &'static str,
    pub api_format: ApiFormat,
    pub base_url: &'static str,
    pub default_model: &'static str,
    pub models: &'static [&'static str],
    pub doc_url: &'static str,
    pub can_list_models: bool,
    pub price_per_million_tokens: f64,
    pub has_configured_key: bool,
}

impl ProviderSummary {
    pub fn new(id: ProviderId, prices: &PriceTable, has_configured_key: bool) -> Self {
        let info = id.info();
        Self {
            id,
            display_name: info.display_name,
            api_format: info.api_format,
            base_url: info.base_url,
            default_model: info.default_model,
            models: info.models,
            doc_url: info.doc_url,
            // custom only once the caller supplies a URL
            can_list_models: can_list(id, None),
            price_per_million_tokens: prices.price_per_million(id),
            has_configured_key,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderSummary>,
}
