use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::discovery::ModelDiscovery;
use crate::dispatch::http::HttpDispatch;
use crate::dispatch::registry::ProviderId;
use crate::dispatch::Credentials;
use crate::organize::Organizer;
use crate::organize::estimate::{estimate_cost, estimate_tokens_for};
use crate::response::{ToolMetadata, ToolResponse};
use crate::tools::connection::TestConnectionRequest;
use crate::tools::estimate::{EstimateRequest, EstimateResponse};
use crate::tools::models::{ListModelsRequest, ListModelsResponse, ProviderSummary, ProvidersResponse};
use crate::tools::organize::{MAX_BOOKMARKS, OrganizeRequest, OrganizeResponse};

#[derive(Clone)]
pub struct MarksortServer {
    dispatch: Arc<HttpDispatch>,
    discovery: Arc<ModelDiscovery>,
    config: Arc<Config>,
    tool_router: ToolRouter<Self>,
}

fn metadata(tool_name: &str, provider: ProviderId, start: Instant) -> ToolMetadata {
    ToolMetadata {
        tool_name: tool_name.to_string(),
        provider_used: provider.to_string(),
        duration_seconds: start.elapsed().as_secs_f64(),
    }
}

#[tool_router]
impl MarksortServer {
    pub fn new(config: Config) -> Self {
        let dispatch = Arc::new(HttpDispatch::new(config.executor.clone()));
        let discovery = Arc::new(ModelDiscovery::new(config.executor.timeout));
        Self {
            dispatch,
            discovery,
            config: Arc::new(config),
            tool_router: Self::tool_router(),
        }
    }

    fn provider_or_default(&self, provider: Option<ProviderId>) -> ProviderId {
        provider
            .or(self.config.defaults.provider)
            .unwrap_or(ProviderId::OpenAi)
    }

    /// Fill gaps in a request's credentials from config and environment.
    /// The key may come back empty; downstream checks report that.
    fn credentials(
        &self,
        provider: ProviderId,
        api_key: Option<String>,
        api_url: Option<String>,
        model: Option<String>,
    ) -> Credentials {
        let defaults = &self.config.defaults;
        let use_defaults = defaults.provider.is_none_or(|p| p == provider);
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.config.api_key(provider).map(str::to_string))
            .unwrap_or_default();

        Credentials {
            provider,
            api_key,
            api_url: api_url.or_else(|| defaults.api_url.clone().filter(|_| use_defaults)),
            model: model.or_else(|| defaults.model.clone().filter(|_| use_defaults)),
        }
    }

    #[tool(
        name = "providers",
        description = "List supported AI providers with base URLs, default and known models, dialect, and approximate price.",
        annotations(read_only_hint = true)
    )]
    async fn providers(&self) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let providers = ProviderId::ALL
            .into_iter()
            .map(|id| {
                ProviderSummary::new(id, &self.config.pricing, self.config.api_key(id).is_some())
            })
            .collect();
        let response = ToolResponse::json(
            &ProvidersResponse { providers },
            ToolMetadata {
                tool_name: "providers".to_string(),
                provider_used: "none".to_string(),
                duration_seconds: start.elapsed().as_secs_f64(),
            },
        );
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "test_connection",
        description = "Send a tiny request to check that an API key, URL, and model work before organizing. Reports success and latency.",
        annotations(read_only_hint = true)
    )]
    async fn test_connection(
        &self,
        Parameters(req): Parameters<TestConnectionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let provider = self.provider_or_default(req.provider);
        let credentials = self.credentials(provider, req.api_key, req.api_url, req.model);
        let outcome = self.dispatch.test_connection(&credentials).await;
        let response = ToolResponse::json(&outcome, metadata("test_connection", provider, start));
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "list_models",
        description = "List model ids an OpenAI-compatible provider exposes via GET /models. Not available for Anthropic.",
        annotations(read_only_hint = true)
    )]
    async fn list_models(
        &self,
        Parameters(req): Parameters<ListModelsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let provider = self.provider_or_default(req.provider);
        let credentials = self.credentials(provider, req.api_key, req.api_url, None);

        let response = match self
            .discovery
            .list_models(provider, &credentials.api_key, credentials.api_url())
            .await
        {
            Ok(models) => ToolResponse::json(
                &ListModelsResponse { provider, models },
                metadata("list_models", provider, start),
            ),
            Err(e) => {
                tracing::warn!(%provider, "list_models failed: {e}");
                ToolResponse::error(e.user_message(), metadata("list_models", provider, start))
            }
        };
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "estimate",
        description = "Estimate tokens and USD cost of organizing `count` bookmarks with a provider. Advisory only.",
        annotations(read_only_hint = true)
    )]
    async fn estimate(
        &self,
        Parameters(req): Parameters<EstimateRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let provider = self.provider_or_default(req.provider);
        let tokens = estimate_tokens_for(req.count, req.generate_description.unwrap_or(false));
        let payload = EstimateResponse {
            provider,
            count: req.count,
            batches: req.count.div_ceil(self.config.organize.batch_size.max(1)),
            estimated_tokens: tokens,
            estimated_cost_usd: estimate_cost(tokens, provider, &self.config.pricing),
        };
        let response = ToolResponse::json(&payload, metadata("estimate", provider, start));
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "organize",
        description = "Tag (and optionally describe) bookmarks with an AI provider, in batches. A failed batch leaves its bookmarks without AI tags instead of failing the run. Returns every bookmark in input order with ai_tags, original_tags, new_tags, and a token estimate.",
        annotations(read_only_hint = true)
    )]
    async fn organize(
        &self,
        Parameters(req): Parameters<OrganizeRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.bookmarks.len() > MAX_BOOKMARKS {
            return Err(McpError::invalid_params(
                format!("at most {MAX_BOOKMARKS} bookmarks per call"),
                None,
            ));
        }
        if req.batch_size == Some(0) {
            return Err(McpError::invalid_params("batch_size must be at least 1", None));
        }

        let start = Instant::now();
        let options = req.options();
        let provider = self.provider_or_default(req.provider);
        let credentials = self.credentials(provider, req.api_key, req.api_url, req.model);

        let organizer = Organizer::new(self.dispatch.clone(), self.config.organize.clone());
        // Dropping this future (client cancelled the request) drops the job
        // before its next batch.
        let job = organizer.organize(req.bookmarks, credentials, options, CancellationToken::new());

        let mut progress = Vec::new();
        let outcome = job
            .run(|snapshot| {
                tracing::info!(
                    status = ?snapshot.status,
                    current = snapshot.current,
                    total = snapshot.total,
                    message = snapshot.message.as_deref().unwrap_or(""),
                    "organize progress"
                );
                progress.push(snapshot.clone());
            })
            .await;

        let response = match outcome {
            Ok(result) => ToolResponse::json(
                &OrganizeResponse { result, progress },
                metadata("organize", provider, start),
            ),
            Err(e) => {
                tracing::warn!(%provider, "organize failed: {e}");
                ToolResponse::error(e.to_string(), metadata("organize", provider, start))
            }
        };
        Ok(response.into_call_tool_result())
    }
}

#[tool_handler]
impl ServerHandler for MarksortServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "marksort".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "marksort: AI-assisted bookmark tagging.\n\n\
                 Workflow:\n\
                 1. Call `providers` to pick a provider and model.\n\
                 2. Call `test_connection` to validate the API key before a paid run.\n\
                 3. Optionally call `list_models` (OpenAI-compatible providers) and `estimate`.\n\
                 4. Call `organize` with the bookmarks and the user's existing tags.\n\n\
                 API keys may be passed per call or set via provider environment variables \
                 (OPENAI_API_KEY, ANTHROPIC_API_KEY, ...). Keys are never stored."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
