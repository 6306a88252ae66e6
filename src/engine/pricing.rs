// Kilo Engine — Model pricing & cost computation
// Static per-model $/Mtok table with a conservative fallback, plus the
// cost function the usage tracker calls at insert time. Costs are
// rounded to six decimals once, at computation — stored records are
// immutable.

use crate::atoms::types::ModelPrice;

/// Look up the price for a model id. Provider prefixes ("anthropic/…")
/// are stripped before matching.
pub fn model_price(model: &str) -> ModelPrice {
    let m = model.split('/').next_back().unwrap_or(model);
    match m {
        // Anthropic
        s if s.starts_with("claude-3-haiku") => price(0.25, 1.25),
        s if s.starts_with("claude-haiku") => price(1.00, 5.00),
        s if s.starts_with("claude-sonnet") || s.starts_with("claude-3-5-sonnet") => {
            price(3.00, 15.00)
        }
        s if s.starts_with("claude-opus") || s.starts_with("claude-3-opus") => {
            price(15.00, 75.00)
        }
        // OpenAI
        s if s.starts_with("gpt-4o-mini") || s.starts_with("gpt-4.1-mini") => price(0.15, 0.60),
        s if s.starts_with("gpt-4o") || s.starts_with("gpt-4.1") => price(2.50, 10.00),
        s if s.starts_with("o4-mini") || s.starts_with("o3-mini") => price(1.10, 4.40),
        s if s.starts_with("o3") || s.starts_with("o1") => price(10.00, 40.00),
        // Fallback: assume a cheap model.
        _ => price(0.50, 2.00),
    }
}

/// Infer the provider family from a model id, for usage attribution when
/// the response does not carry one.
pub fn provider_for_model(model: &str) -> &'static str {
    let m = model.split('/').next_back().unwrap_or(model);
    if m.starts_with("claude") {
        "anthropic"
    } else if m.starts_with("gpt") || m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4") {
        "openai"
    } else {
        "unknown"
    }
}

const fn price(input: f64, output: f64) -> ModelPrice {
    ModelPrice {
        input_cost_per_m: input,
        output_cost_per_m: output,
    }
}

/// USD cost for one completion, rounded to six decimals.
pub fn calculate_cost(prompt_tokens: u64, completion_tokens: u64, pricing: &ModelPrice) -> f64 {
    let raw = prompt_tokens as f64 * pricing.input_cost_per_m / 1_000_000.0
        + completion_tokens as f64 * pricing.output_cost_per_m / 1_000_000.0;
    (raw * 1_000_000.0).round() / 1_000_000.0
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sonnet_cost_example() {
        let sonnet = price(3.0, 15.0);
        let cost = calculate_cost(1000, 500, &sonnet);
        assert_eq!(cost, 0.0105);
    }

    #[test]
    fn million_tokens_within_a_penny() {
        let sonnet = price(3.0, 15.0);
        let cost = calculate_cost(1_000_000, 1_000_000, &sonnet);
        assert!((cost - 18.0).abs() <= 0.01);
    }

    #[test]
    fn prefix_matching_with_provider_path() {
        let p = model_price("anthropic/claude-sonnet-4-20250514");
        assert_eq!(p.input_cost_per_m, 3.0);
        assert_eq!(p.output_cost_per_m, 15.0);
    }

    #[test]
    fn unknown_models_get_fallback() {
        let p = model_price("some-local-model");
        assert_eq!(p.input_cost_per_m, 0.50);
    }

    #[test]
    fn provider_detection() {
        assert_eq!(provider_for_model("claude-sonnet-4"), "anthropic");
        assert_eq!(provider_for_model("gpt-4o-mini"), "openai");
        assert_eq!(provider_for_model("o3-mini"), "openai");
        assert_eq!(provider_for_model("mystery"), "unknown");
    }
}
