// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deployment pricing and token extraction.
//!
//! Prices are configured in EUR per 1000 tokens and converted once into
//! integer micro-EUR per 1000 tokens, so per-exchange costs are computed in
//! integer arithmetic:
//!
//! `cost = round((prompt * input + completion * output) / 1000)` micro-EUR.

use std::collections::{BTreeMap, HashMap};

use proxylog_config::model::PricingTier;
use proxylog_core::{Cost, ProxylogError, TokenUsage};
use serde_json::Value;
use tracing::warn;

/// Price of one deployment in micro-EUR per 1000 tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelPrice {
    pub input_per_1k: Cost,
    pub output_per_1k: Cost,
}

impl ModelPrice {
    /// Zero price, used for deployments without configured pricing.
    pub const FREE: ModelPrice = ModelPrice {
        input_per_1k: Cost::ZERO,
        output_per_1k: Cost::ZERO,
    };

    /// Convert a configured tier. `None` if either price is negative or not finite.
    pub fn from_tier(tier: &PricingTier) -> Option<Self> {
        Some(Self {
            input_per_1k: Cost::from_decimal(tier.input)?,
            output_per_1k: Cost::from_decimal(tier.output)?,
        })
    }
}

/// Cost of `usage` at `price`, rounded to the nearest micro-EUR.
pub fn calculate_cost(usage: &TokenUsage, price: &ModelPrice) -> Cost {
    let scaled = (u128::from(usage.prompt) * u128::from(price.input_per_1k.micros()))
        .saturating_add(u128::from(usage.completion) * u128::from(price.output_per_1k.micros()));
    let micros = scaled.saturating_add(500) / 1000;
    Cost::from_micros(u64::try_from(micros).unwrap_or(u64::MAX))
}

/// Deployment name to price lookup.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
}

impl PriceTable {
    /// Build the table from the `[pricing]` config section.
    pub fn from_config(pricing: &BTreeMap<String, PricingTier>) -> Result<Self, ProxylogError> {
        let prices = pricing
            .iter()
            .map(|(model, tier)| {
                ModelPrice::from_tier(tier)
                    .map(|price| (model.clone(), price))
                    .ok_or_else(|| {
                        ProxylogError::Config(format!(
                            "pricing.{model} must use non-negative finite prices"
                        ))
                    })
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self { prices })
    }

    pub fn insert(&mut self, deployment: impl Into<String>, price: ModelPrice) {
        self.prices.insert(deployment.into(), price);
    }

    /// Price for `deployment`.
    ///
    /// Unknown deployments are priced at zero with a warning so the request
    /// still proceeds.
    pub fn price_for(&self, deployment: &str) -> ModelPrice {
        match self.prices.get(deployment) {
            Some(price) => *price,
            None => {
                warn!(deployment, "no pricing configured for deployment, using zero cost");
                ModelPrice::FREE
            }
        }
    }

    /// Cost of `usage` on `deployment`.
    pub fn cost_for(&self, deployment: &str, usage: &TokenUsage) -> Cost {
        calculate_cost(usage, &self.price_for(deployment))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

fn usage_field(usage: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| usage.get(*key).and_then(Value::as_u64))
}

/// Token counts from a chat/completions or responses body.
///
/// Reads `usage.prompt_tokens`/`usage.completion_tokens`, falling back to the
/// Responses API names `input_tokens`/`output_tokens`. Missing counts are zero.
pub fn extract_token_counts(body: &Value) -> TokenUsage {
    let Some(usage) = body.get("usage") else {
        return TokenUsage::default();
    };
    let prompt = usage_field(usage, &["prompt_tokens", "input_tokens"]).unwrap_or(0);
    let completion = usage_field(usage, &["completion_tokens", "output_tokens"]).unwrap_or(0);
    TokenUsage::new(prompt, completion)
}

/// Token counts from an embeddings body: `prompt_tokens`, else `total_tokens`.
pub fn extract_embedding_tokens(body: &Value) -> TokenUsage {
    let prompt = body
        .get("usage")
        .and_then(|usage| usage_field(usage, &["prompt_tokens", "total_tokens"]))
        .unwrap_or(0);
    TokenUsage::new(prompt, 0)
}
