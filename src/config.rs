use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::registry::ProviderId;
use crate::error::ERROR_BODY_LIMIT;
use crate::organize::estimate::PriceTable;
use crate::organize::types::DEFAULT_BATCH_SIZE;

/// Instruction used when a call carries no system prompt of its own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a bookmark organizing assistant. \
You categorize web bookmarks with short, reusable tags and concise descriptions. \
Always answer with a single valid JSON object and nothing else.";

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default config file looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "marksort.toml";

/// Settings for a single chat-completion call.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub timeout: Duration,
    pub system_prompt: String,
    /// Characters of an upstream body kept in errors.
    pub error_body_limit: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALL_TIMEOUT,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            error_body_limit: ERROR_BODY_LIMIT,
        }
    }
}

/// Knobs of the batch orchestrator.
#[derive(Clone, Debug)]
pub struct OrganizeSettings {
    pub batch_size: usize,
    /// Existing tags quoted in each prompt are capped at this many.
    pub max_existing_tags: usize,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl Default for OrganizeSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_existing_tags: 100,
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

/// Fallbacks the tool surface uses when a request leaves them out.
#[derive(Clone, Debug, Default)]
pub struct ProviderDefaults {
    pub provider: Option<ProviderId>,
    pub model: Option<String>,
    pub api_url: Option<String>,
}

pub struct Config {
    pub executor: ExecutorConfig,
    pub organize: OrganizeSettings,
    pub pricing: PriceTable,
    pub defaults: ProviderDefaults,
    api_keys: HashMap<ProviderId, String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<&ProviderId> = self.api_keys.keys().collect();
        providers.sort();
        f.debug_struct("Config")
            .field("executor", &self.executor)
            .field("organize", &self.organize)
            .field("defaults", &self.defaults)
            .field("keys_for", &providers)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_sources(FileConfig::default(), |_| None)
    }
}

/// On-disk TOML layout. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub executor: ExecutorSection,
    pub organize: OrganizeSection,
    /// USD per million tokens, keyed by provider id.
    pub pricing: HashMap<String, f64>,
    pub defaults: DefaultsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorSection {
    pub timeout_secs: Option<u64>,
    pub system_prompt: Option<String>,
    pub error_body_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrganizeSection {
    pub batch_size: Option<usize>,
    pub max_existing_tags: Option<usize>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsSection {
    pub provider: Option<ProviderId>,
    pub model: Option<String>,
    pub api_url: Option<String>,
}

impl Config {
    /// Load `MARKSORT_CONFIG` (or `./marksort.toml` if present), then overlay
    /// environment variables. A broken file is reported and ignored.
    pub fn load() -> Self {
        let path = env::var("MARKSORT_CONFIG")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let file = if path.exists() {
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| FileConfig::parse(&text))
            {
                Ok(file) => {
                    tracing::info!(path = %path.display(), "loaded config file");
                    file
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "ignoring config file: {e}");
                    FileConfig::default()
                }
            }
        } else {
            FileConfig::default()
        };

        Self::from_sources(file, |name| env::var(name).ok())
    }

    /// Merge a parsed file with an environment lookup. Environment wins.
    pub fn from_sources(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut executor = ExecutorConfig::default();
        if let Some(secs) = file.executor.timeout_secs {
            executor.timeout = Duration::from_secs(secs);
        }
        if let Some(prompt) = file.executor.system_prompt.filter(|p| !p.trim().is_empty()) {
            executor.system_prompt = prompt;
        }
        if let Some(limit) = file.executor.error_body_limit {
            executor.error_body_limit = limit;
        }
        if let Some(secs) = parse_env::<u64>(lookup("MARKSORT_TIMEOUT_SECS"), "MARKSORT_TIMEOUT_SECS") {
            executor.timeout = Duration::from_secs(secs);
        }

        let mut organize = OrganizeSettings::default();
        if let Some(n) = file.organize.batch_size {
            organize.batch_size = n;
        }
        if let Some(n) = file.organize.max_existing_tags {
            organize.max_existing_tags = n;
        }
        if let Some(t) = file.organize.temperature {
            organize.temperature = t;
        }
        if let Some(n) = file.organize.max_tokens {
            organize.max_tokens = n;
        }
        if let Some(n) = parse_env::<usize>(lookup("MARKSORT_BATCH_SIZE"), "MARKSORT_BATCH_SIZE") {
            organize.batch_size = n;
        }
        if organize.batch_size == 0 {
            tracing::warn!("batch_size 0 is invalid, using 20");
            organize.batch_size = DEFAULT_BATCH_SIZE;
        }

        let mut pricing = PriceTable::default();
        for (name, price) in file.pricing {
            match name.parse::<ProviderId>() {
                Ok(provider) => pricing.set(provider, price),
                Err(e) => tracing::warn!("ignoring price override: {e}"),
            }
        }

        let mut defaults = ProviderDefaults {
            provider: file.defaults.provider,
            model: file.defaults.model,
            api_url: file.defaults.api_url,
        };
        if let Some(provider) = parse_env::<ProviderId>(lookup("MARKSORT_PROVIDER"), "MARKSORT_PROVIDER") {
            defaults.provider = Some(provider);
        }
        if let Some(model) = lookup("MARKSORT_MODEL") {
            defaults.model = Some(model);
        }
        if let Some(url) = lookup("MARKSORT_API_URL") {
            defaults.api_url = Some(url);
        }

        let mut api_keys = HashMap::new();
        for provider in ProviderId::ALL {
            if let Some(key) = lookup(provider.api_key_env()) {
                api_keys.insert(provider, key);
            }
        }
        if api_keys.is_empty() {
            tracing::warn!("no provider API keys in environment; callers must pass api_key");
        }

        Config {
            executor,
            organize,
            pricing,
            defaults,
            api_keys,
        }
    }

    /// Key from the environment for `provider`, if one was configured.
    pub fn api_key(&self, provider: ProviderId) -> Option<&str> {
        self.api_keys.get(&provider).map(String::as_str)
    }
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}

fn parse_env<T: std::str::FromStr>(value: Option<String>, name: &str) -> Option<T> {
    let value = value?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("{name}={value:?} is not valid, ignoring");
            None
        }
    }
}
