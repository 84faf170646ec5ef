//! Pre-flight token and cost hints. Advisory only.

use std::collections::HashMap;

use crate::dispatch::registry::ProviderId;
use crate::organize::types::{BookmarkRecord, OrganizeOptions};

pub const TOKENS_PER_BOOKMARK: f64 = 80.0;
pub const DESCRIPTION_FACTOR: f64 = 1.5;

/// Rough tokens-per-character ratio used for observed traffic.
pub const CHARS_PER_TOKEN: f64 = 4.0;

pub fn estimate_tokens(records: &[BookmarkRecord], options: &OrganizeOptions) -> u64 {
    estimate_tokens_for(records.len(), options.generate_description)
}

pub fn estimate_tokens_for(count: usize, generate_description: bool) -> u64 {
    let factor = if generate_description { DESCRIPTION_FACTOR } else { 1.0 };
    (count as f64 * TOKENS_PER_BOOKMARK * factor).round() as u64
}

/// Token estimate for text that was actually sent or received.
pub fn estimate_text_tokens(text: &str) -> f64 {
    text.chars().count() as f64 / CHARS_PER_TOKEN
}

/// USD per million tokens, per provider.
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<ProviderId, f64>,
}

impl Default for PriceTable {
    fn default() -> Self {
        let prices = ProviderId::ALL
            .into_iter()
            .map(|p| (p, default_price(p)))
            .collect();
        Self { prices }
    }
}

/// Blended input/output list prices for each provider's default model.
fn default_price(provider: ProviderId) -> f64 {
    match provider {
        ProviderId::OpenAi => 0.6,
        ProviderId::Anthropic => 4.0,
        ProviderId::DeepSeek => 1.1,
        ProviderId::Moonshot => 1.7,
        ProviderId::Zhipu => 0.1,
        ProviderId::Qwen => 0.6,
        ProviderId::SiliconFlow => 0.1,
        ProviderId::OpenRouter => 0.6,
        ProviderId::Custom => 0.0,
    }
}

impl PriceTable {
    pub fn set(&mut self, provider: ProviderId, price_per_million: f64) {
        if price_per_million.is_finite() && price_per_million >= 0.0 {
            self.prices.insert(provider, price_per_million);
        } else {
            tracing::warn!(%provider, "ignoring invalid price {price_per_million}");
        }
    }

    pub fn with_price(mut self, provider: ProviderId, price_per_million: f64) -> Self {
        self.set(provider, price_per_million);
        self
    }

    pub fn price_per_million(&self, provider: ProviderId) -> f64 {
        self.prices.get(&provider).copied().unwrap_or(0.0)
    }
}

pub fn estimate_cost(tokens: u64, provider: ProviderId, prices: &PriceTable) -> f64 {
    tokens as f64 / 1_000_000.0 * prices.price_per_million(provider)
}
