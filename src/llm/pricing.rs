// src/llm/pricing.rs
// LLM pricing configuration for cost estimation
//
// Pricing last updated: 2026-01-26
// Source: https://www.anthropic.com/pricing

use super::Provider;

/// Cost per million tokens (input, output)
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    /// Cost per 1M input tokens (cache miss)
    pub input_per_million: f64,
    /// Cost per 1M output tokens
    pub output_per_million: f64,
    /// Cost per 1M cached input tokens (if supported)
    pub cached_input_per_million: Option<f64>,
}

impl ModelPricing {
    const fn new(input: f64, output: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
            cached_input_per_million: None,
        }
    }

    const fn with_cache(input: f64, output: f64, cached: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
            cached_input_per_million: Some(cached),
        }
    }

    /// Calculate cost for a given usage
    pub fn calculate_cost(
        &self,
        prompt_tokens: u32,
        completion_tokens: u32,
        cache_hit_tokens: Option<u32>,
    ) -> f64 {
        let cache_hit = cache_hit_tokens.unwrap_or(0) as f64;
        let cache_miss = (prompt_tokens as f64) - cache_hit;

        let input_cost = if let Some(cached_price) = self.cached_input_per_million {
            (cache_hit * cached_price / 1_000_000.0)
                + (cache_miss * self.input_per_million / 1_000_000.0)
        } else {
            (prompt_tokens as f64) * self.input_per_million / 1_000_000.0
        };

        let output_cost = (completion_tokens as f64) * self.output_per_million / 1_000_000.0;

        input_cost + output_cost
    }
}

/// Get pricing for a provider/model combination.
pub fn get_pricing(provider: Provider, model: &str) -> Option<ModelPricing> {
    match provider {
        Provider::Anthropic => get_anthropic_pricing(model),
        Provider::Labor => get_labor_pricing(model),
    }
}

/// Anthropic pricing (as of 2026-01-26)
fn get_anthropic_pricing(model: &str) -> Option<ModelPricing> {
    match model {
        m if m.contains("opus") => Some(ModelPricing::with_cache(15.00, 75.00, 1.50)),
        m if m.contains("sonnet") => Some(ModelPricing::with_cache(3.00, 15.00, 0.30)),
        m if m.contains("haiku") => Some(ModelPricing::with_cache(0.80, 4.00, 0.08)),
        // Unknown Claude model defaults to sonnet-tier pricing.
        m if m.starts_with("claude") => Some(ModelPricing::with_cache(3.00, 15.00, 0.30)),
        _ => None,
    }
}

/// Pricing for haiku-class labor-tier providers. Specific vendors are not
/// distinguished beyond a DeepSeek-class default — operators pointing
/// `FORGE_LABOR_PROVIDER` at a different vendor get this conservative
/// estimate until pricing is known.
fn get_labor_pricing(model: &str) -> Option<ModelPricing> {
    match model {
        "deepseek-reasoner" | "deepseek-chat" => Some(ModelPricing::with_cache(0.28, 0.42, 0.028)),
        _ if model.starts_with("deepseek") => Some(ModelPricing::with_cache(0.28, 0.42, 0.028)),
        _ => Some(ModelPricing::with_cache(0.28, 0.42, 0.028)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opus_pricing() {
        let pricing = get_pricing(Provider::Anthropic, "claude-opus-4-6").unwrap();
        let cost = pricing.calculate_cost(1_000_000, 1_000_000, None);
        assert!((cost - 90.0).abs() < 0.01); // $15 input + $75 output
    }

    #[test]
    fn test_sonnet_pricing_with_cache() {
        let pricing = get_pricing(Provider::Anthropic, "claude-sonnet-4-6").unwrap();
        let cost = pricing.calculate_cost(1_000_000, 1_000_000, Some(500_000));
        // $0.15 (500K cached) + $1.50 (500K miss) + $15 (output) = $16.65
        assert!((cost - 16.65).abs() < 0.01);
    }

    #[test]
    fn test_labor_default_pricing() {
        let pricing = get_pricing(Provider::Labor, "some-other-model").unwrap();
        let cost = pricing.calculate_cost(1000, 500, None);
        assert!((cost - 0.00049).abs() < 0.0001);
    }

    #[test]
    fn test_unknown_anthropic_model_falls_back_to_sonnet_rate() {
        let pricing = get_pricing(Provider::Anthropic, "claude-future-model").unwrap();
        assert_eq!(pricing.input_per_million, 3.00);
    }
}
