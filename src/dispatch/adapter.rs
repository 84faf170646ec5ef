//! Request building and content extraction for the two provider dialects.

use reqwest::Url;
use serde_json::{Map, Value, json};

use crate::dispatch::CallDescription;
use crate::dispatch::registry::{ApiFormat, BodyExtras, ProviderId};
use crate::error::CallError;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u64 = 2000;
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const MESSAGES_PATH: &str = "/messages";

/// A fully formed POST, ready to send.
pub struct HttpRequestSpec {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl std::fmt::Debug for HttpRequestSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| *name).collect();
        f.debug_struct("HttpRequestSpec")
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("model", &self.body.get("model"))
            .finish()
    }
}

impl HttpRequestSpec {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Resolve the completion endpoint for `provider`, honouring a caller override.
///
/// Fails for `custom` without an override, before any network access.
pub fn resolve_endpoint(provider: ProviderId, api_url: Option<&str>) -> Result<String, CallError> {
    let info = provider.info();
    let base = api_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(info.base_url);
    if base.is_empty() {
        return Err(CallError::Configuration(format!(
            "{provider} requires an explicit API URL"
        )));
    }
    Ok(match info.api_format {
        ApiFormat::OpenAi => ensure_path_suffix(base, CHAT_COMPLETIONS_PATH),
        ApiFormat::Anthropic => ensure_path_suffix(base, MESSAGES_PATH),
    })
}

/// Append `suffix` to the path of `url` unless the path already contains it.
/// Query and fragment are kept verbatim. Idempotent.
pub fn ensure_path_suffix(url: &str, suffix: &str) -> String {
    let url = url.trim();
    match Url::parse(url) {
        Ok(mut parsed) if parsed.has_host() => {
            let path = with_suffix(&collapse_slashes(parsed.path()), suffix);
            parsed.set_path(&path);
            parsed.to_string()
        }
        // Not an absolute URL: treat everything before `?`/`#` as the path.
        _ => {
            let split = url.find(['?', '#']).unwrap_or(url.len());
            let (path, tail) = url.split_at(split);
            let path = match path.find("://") {
                Some(pos) => {
                    let (scheme, rest) = path.split_at(pos + 3);
                    format!("{scheme}{}", collapse_slashes(rest))
                }
                None => collapse_slashes(path),
            };
            format!("{}{tail}", with_suffix(&path, suffix))
        }
    }
}

fn with_suffix(path: &str, suffix: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.ends_with(suffix) || path.contains(&format!("{suffix}/")) {
        path.to_string()
    } else {
        format!("{path}{suffix}")
    }
}

/// Collapse repeated slashes in a URL path.
fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        out.push(c);
    }
    out
}

/// Translate a call description into a provider-specific HTTP request.
pub fn build_request(
    call: &CallDescription,
    default_system_prompt: &str,
) -> Result<HttpRequestSpec, CallError> {
    let credentials = &call.credentials;
    let provider = credentials.provider;
    let info = provider.info();

    if credentials.api_key.trim().is_empty() {
        return Err(CallError::Configuration(format!("{provider} requires an API key")));
    }
    let url = resolve_endpoint(provider, credentials.api_url())?;
    let model = credentials
        .model()
        .unwrap_or(info.default_model)
        .to_string();
    if model.is_empty() {
        return Err(CallError::Configuration(format!(
            "{provider} requires an explicit model"
        )));
    }

    let system = call
        .system_prompt
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_system_prompt);
    let temperature = call.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    let max_tokens = call.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    let api_key = credentials.api_key.trim();

    let spec = match info.api_format {
        ApiFormat::OpenAi => {
            let mut body = json!({
                "model": model,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": call.prompt},
                ],
                "temperature": temperature,
                "max_tokens": max_tokens,
            });
            if let Some(obj) = body.as_object_mut() {
                apply_extras(obj, info.extras);
            }
            HttpRequestSpec {
                url,
                headers: vec![
                    ("Content-Type", "application/json".to_string()),
                    ("Authorization", format!("Bearer {api_key}")),
                ],
                body,
            }
        }
        ApiFormat::Anthropic => HttpRequestSpec {
            url,
            headers: vec![
                ("Content-Type", "application/json".to_string()),
                ("x-api-key", api_key.to_string()),
                ("anthropic-version", ANTHROPIC_VERSION.to_string()),
            ],
            body: json!({
                "model": model,
                "system": system,
                "max_tokens": max_tokens,
                "temperature": temperature,
                "messages": [{"role": "user", "content": call.prompt}],
            }),
        },
    };

    tracing::debug!(?spec, "built provider request");
    Ok(spec)
}

fn apply_extras(body: &mut Map<String, Value>, extras: BodyExtras) {
    if extras.json_mode {
        body.insert("response_format".into(), json!({"type": "json_object"}));
    }
    if extras.disable_stream {
        body.insert("stream".into(), Value::Bool(false));
    }
    if extras.message_result_format {
        body.insert("result_format".into(), Value::String("message".into()));
    }
}

/// Pull the completion text out of a decoded response.
///
/// Returns `None` when the expected path is missing or holds only whitespace.
pub fn extract_content(format: ApiFormat, response: &Value) -> Option<String> {
    let text = match format {
        ApiFormat::OpenAi => response
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()?,
        ApiFormat::Anthropic => response.get("content")?.get(0)?.get("text")?.as_str()?,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Credentials;

    fn call(provider: ProviderId) -> CallDescription {
        CallDescription::new(Credentials::new(provider, "sk-test"), "tag these")
    }

    #[test]
    fn openai_request_shape() {
        let spec = build_request(&call(ProviderId::OpenAi), "be helpful").unwrap();
        assert_eq!(spec.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(spec.header("authorization"), Some("Bearer sk-test"));
        assert_eq!(spec.header("content-type"), Some("application/json"));
        assert_eq!(spec.body["model"], "gpt-4o-mini");
        assert_eq!(spec.body["messages"][0]["role"], "system");
        assert_eq!(spec.body["messages"][0]["content"], "be helpful");
        assert_eq!(spec.body["messages"][1]["content"], "tag these");
        assert_eq!(spec.body["temperature"], 0.7);
        assert_eq!(spec.body["max_tokens"], 2000);
        assert_eq!(spec.body["response_format"]["type"], "json_object");
        assert!(spec.body.get("stream").is_none());
    }

    #[test]
    fn anthropic_request_shape() {
        let c = call(ProviderId::Anthropic)
            .with_system_prompt("sort bookmarks")
            .with_temperature(0.3)
            .with_max_tokens(512);
        let spec = build_request(&c, "unused").unwrap();
        assert_eq!(spec.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(spec.header("x-api-key"), Some("sk-test"));
        assert_eq!(spec.header("anthropic-version"), Some(ANTHROPIC_VERSION));
        assert!(spec.header("authorization").is_none());
        assert_eq!(spec.body["system"], "sort bookmarks");
        assert_eq!(spec.body["max_tokens"], 512);
        assert_eq!(spec.body["temperature"], 0.3);
        assert_eq!(spec.body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(spec.body["messages"][0]["role"], "user");
    }

    #[test]
    fn extras_are_attached_per_provider() {
        let deepseek = build_request(&call(ProviderId::DeepSeek), "s").unwrap();
        assert_eq!(deepseek.body["stream"], false);
        assert_eq!(deepseek.body["response_format"]["type"], "json_object");

        let qwen = build_request(&call(ProviderId::Qwen), "s").unwrap();
        assert_eq!(qwen.body["result_format"], "message");
        assert!(qwen.body.get("response_format").is_none());

        let moonshot = build_request(&call(ProviderId::Moonshot), "s").unwrap();
        let keys: Vec<&String> = moonshot.body.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4, "plain OpenAI-compatible body: {keys:?}");
    }

    #[test]
    fn custom_without_url_is_a_configuration_error() {
        let c = CallDescription::new(
            Credentials::new(ProviderId::Custom, "k").with_model("llama3"),
            "p",
        );
        let err = build_request(&c, "s").unwrap_err();
        assert!(matches!(err, CallError::Configuration(_)));
    }

    #[test]
    fn custom_without_model_is_a_configuration_error() {
        let c = CallDescription::new(
            Credentials::new(ProviderId::Custom, "k").with_api_url("http://localhost:8080/v1"),
            "p",
        );
        assert!(matches!(build_request(&c, "s"), Err(CallError::Configuration(_))));
    }

    #[test]
    fn blank_api_key_is_a_configuration_error() {
        let c = CallDescription::new(Credentials::new(ProviderId::OpenAi, "  "), "p");
        assert!(matches!(build_request(&c, "s"), Err(CallError::Configuration(_))));
    }

    #[test]
    fn endpoint_resolution_is_idempotent() {
        let once = resolve_endpoint(ProviderId::Custom, Some("http://host:1234/v1/")).unwrap();
        assert_eq!(once, "http://host:1234/v1/chat/completions");
        let twice = resolve_endpoint(ProviderId::Custom, Some(&once)).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn endpoint_with_query_string_keeps_path_and_query() {
        let gateway = "https://gw.example/openai/v1/chat/completions?api-version=2024-06-01";
        let url = resolve_endpoint(ProviderId::Custom, Some(gateway)).unwrap();
        assert_eq!(url, gateway);

        let url = resolve_endpoint(ProviderId::Custom, Some("https://gw.example/v1?sig=a//b")).unwrap();
        assert_eq!(url, "https://gw.example/v1/chat/completions?sig=a//b");
        assert_eq!(resolve_endpoint(ProviderId::Custom, Some(&url)).unwrap(), url);
    }

    #[test]
    fn endpoint_containing_completion_path_is_used_as_is() {
        let url = "https://gw.example/v1/chat/completions/deployments/tagger";
        assert_eq!(resolve_endpoint(ProviderId::Custom, Some(url)).unwrap(), url);
    }

    #[test]
    fn endpoint_resolution_collapses_duplicate_slashes() {
        let url = resolve_endpoint(ProviderId::OpenAi, Some("https://proxy.example//v1//")).unwrap();
        assert_eq!(url, "https://proxy.example/v1/chat/completions");
        let url = resolve_endpoint(ProviderId::Anthropic, Some("https://proxy.example/v1/messages")).unwrap();
        assert_eq!(url, "https://proxy.example/v1/messages");
    }

    #[test]
    fn extract_openai_content_trims() {
        let v = json!({"choices": [{"message": {"content": "  {\"results\":[]}  "}}]});
        assert_eq!(
            extract_content(ApiFormat::OpenAi, &v).as_deref(),
            Some("{\"results\":[]}")
        );
    }

    #[test]
    fn extract_anthropic_content() {
        let v = json!({"content": [{"type": "text", "text": "\nhello\n"}, {"type": "text", "text": "ignored"}]});
        assert_eq!(extract_content(ApiFormat::Anthropic, &v).as_deref(), Some("hello"));
    }

    #[test]
    fn extract_reports_missing_content() {
        assert!(extract_content(ApiFormat::OpenAi, &json!({"choices": []})).is_none());
        assert!(extract_content(ApiFormat::OpenAi, &json!({"error": "x"})).is_none());
        assert!(
            extract_content(ApiFormat::OpenAi, &json!({"choices": [{"message": {"content": null}}]}))
                .is_none()
        );
        assert!(
            extract_content(ApiFormat::OpenAi, &json!({"choices": [{"message": {"content": "   "}}]}))
                .is_none()
        );
        assert!(extract_content(ApiFormat::Anthropic, &json!({"content": []})).is_none());
    }
}
