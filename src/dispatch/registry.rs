use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Request/response family a provider speaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    /// OpenAI-compatible chat completions (default for most providers).
    #[default]
    OpenAi,
    /// Anthropic Messages API (different headers and body layout).
    Anthropic,
}

/// Supported AI backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    DeepSeek,
    Moonshot,
    Zhipu,
    Qwen,
    SiliconFlow,
    OpenRouter,
    /// User-supplied OpenAI-compatible endpoint. Needs an explicit URL and model.
    Custom,
}

/// Provider-specific additions to the OpenAI-compatible body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BodyExtras {
    /// `response_format: {"type": "json_object"}`
    pub json_mode: bool,
    /// `stream: false`
    pub disable_stream: bool,
    /// `result_format: "message"`
    pub message_result_format: bool,
}

/// Static description of one provider.
#[derive(Clone, Debug, Serialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub display_name: &'static str,
    /// Empty for `custom`.
    pub base_url: &'static str,
    /// Empty for `custom`.
    pub default_model: &'static str,
    pub models: &'static [&'static str],
    pub doc_url: &'static str,
    pub api_format: ApiFormat,
    #[serde(skip)]
    pub extras: BodyExtras,
}

impl ProviderId {
    pub const ALL: [ProviderId; 9] = [
        ProviderId::OpenAi,
        ProviderId::Anthropic,
        ProviderId::DeepSeek,
        ProviderId::Moonshot,
        ProviderId::Zhipu,
        ProviderId::Qwen,
        ProviderId::SiliconFlow,
        ProviderId::OpenRouter,
        ProviderId::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::DeepSeek => "deepseek",
            Self::Moonshot => "moonshot",
            Self::Zhipu => "zhipu",
            Self::Qwen => "qwen",
            Self::SiliconFlow => "siliconflow",
            Self::OpenRouter => "openrouter",
            Self::Custom => "custom",
        }
    }

    /// Environment variable consulted for a default key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::Moonshot => "MOONSHOT_API_KEY",
            Self::Zhipu => "ZHIPU_API_KEY",
            Self::Qwen => "DASHSCOPE_API_KEY",
            Self::SiliconFlow => "SILICONFLOW_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Custom => "MARKSORT_CUSTOM_API_KEY",
        }
    }

    pub fn api_format(&self) -> ApiFormat {
        self.info().api_format
    }

    pub fn info(&self) -> ProviderInfo {
        match self {
            Self::OpenAi => ProviderInfo {
                id: *self,
                display_name: "OpenAI",
                base_url: "https://api.openai.com/v1",
                default_model: "gpt-4o-mini",
                models: &["gpt-4o-mini", "gpt-4o", "gpt-4.1-mini", "gpt-4.1"],
                doc_url: "https://platform.openai.com/docs/api-reference/chat",
                api_format: ApiFormat::OpenAi,
                extras: BodyExtras {
                    json_mode: true,
                    ..BodyExtras::default()
                },
            },
            Self::Anthropic => ProviderInfo {
                id: *self,
                display_name: "Anthropic",
                base_url: "https://api.anthropic.com/v1",
                default_model: "claude-3-5-haiku-latest",
                models: &[
                    "claude-3-5-haiku-latest",
                    "claude-3-5-sonnet-latest",
                    "claude-3-7-sonnet-latest",
                ],
                doc_url: "https://docs.anthropic.com/en/api/messages",
                api_format: ApiFormat::Anthropic,
                extras: BodyExtras::default(),
            },
            Self::DeepSeek => ProviderInfo {
                id: *self,
                display_name: "DeepSeek",
                base_url: "https://api.deepseek.com/v1",
                default_model: "deepseek-chat",
                models: &["deepseek-chat", "deepseek-reasoner"],
                doc_url: "https://api-docs.deepseek.com",
                api_format: ApiFormat::OpenAi,
                extras: BodyExtras {
                    json_mode: true,
                    disable_stream: true,
                    ..BodyExtras::default()
                },
            },
            Self::Moonshot => ProviderInfo {
                id: *self,
                display_name: "Moonshot AI",
                base_url: "https://api.moonshot.cn/v1",
                default_model: "moonshot-v1-8k",
                models: &["moonshot-v1-8k", "moonshot-v1-32k", "moonshot-v1-128k"],
                doc_url: "https://platform.moonshot.cn/docs",
                api_format: ApiFormat::OpenAi,
                extras: BodyExtras::default(),
            },
            Self::Zhipu => ProviderInfo {
                id: *self,
                display_name: "Zhipu GLM",
                base_url: "https://open.bigmodel.cn/api/paas/v4",
                default_model: "glm-4-flash",
                models: &["glm-4-flash", "glm-4-air", "glm-4-plus"],
                doc_url: "https://open.bigmodel.cn/dev/api",
                api_format: ApiFormat::OpenAi,
                extras: BodyExtras {
                    disable_stream: true,
                    ..BodyExtras::default()
                },
            },
            Self::Qwen => ProviderInfo {
                id: *self,
                display_name: "Qwen (DashScope)",
                base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
                default_model: "qwen-turbo",
                models: &["qwen-turbo", "qwen-plus", "qwen-max"],
                doc_url: "https://help.aliyun.com/zh/model-studio/",
                api_format: ApiFormat::OpenAi,
                extras: BodyExtras {
                    message_result_format: true,
                    ..BodyExtras::default()
                },
            },
            Self::SiliconFlow => ProviderInfo {
                id: *self,
                display_name: "SiliconFlow",
                base_url: "https://api.siliconflow.cn/v1",
                default_model: "Qwen/Qwen2.5-7B-Instruct",
                models: &[
                    "Qwen/Qwen2.5-7B-Instruct",
                    "Qwen/Qwen2.5-72B-Instruct",
                    "deepseek-ai/DeepSeek-V3",
                ],
                doc_url: "https://docs.siliconflow.cn",
                api_format: ApiFormat::OpenAi,
                extras: BodyExtras {
                    disable_stream: true,
                    ..BodyExtras::default()
                },
            },
            Self::OpenRouter => ProviderInfo {
                id: *self,
                display_name: "OpenRouter",
                base_url: "https://openrouter.ai/api/v1",
                default_model: "openai/gpt-4o-mini",
                models: &[
                    "openai/gpt-4o-mini",
                    "anthropic/claude-3.5-haiku",
                    "google/gemini-2.0-flash-001",
                ],
                doc_url: "https://openrouter.ai/docs",
                api_format: ApiFormat::OpenAi,
                extras: BodyExtras::default(),
            },
            Self::Custom => ProviderInfo {
                id: *self,
                display_name: "Custom (OpenAI-compatible)",
                base_url: "",
                default_model: "",
                models: &[],
                doc_url: "https://platform.openai.com/docs/api-reference/chat",
                api_format: ApiFormat::OpenAi,
                extras: BodyExtras::default(),
            },
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| format!("unknown provider: {s}"))
    }
}
