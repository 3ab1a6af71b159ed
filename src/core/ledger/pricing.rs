/// Per-model token rates in dollars per **1M tokens**, matching the
/// price sheet the Claude stats cache is costed against.
#[derive(Debug, Clone)]
pub struct ModelRates {
    pub model: &'static str,
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

static RATE_TABLE: &[ModelRates] = &[
    ModelRates {
        model: "claude-opus-4-5-20251101",
        input: 15.0,
        output: 75.0,
        cache_read: 1.5,
        cache_write: 18.75,
    },
    ModelRates {
        model: "claude-sonnet-4-5-20250929",
        input: 3.0,
        output: 15.0,
        cache_read: 0.3,
        cache_write: 3.75,
    },
];

/// Applied to any model id not in the table (sonnet-tier rates).
static DEFAULT_RATES: ModelRates = ModelRates {
    model: "default",
    input: 3.0,
    output: 15.0,
    cache_read: 0.3,
    cache_write: 3.75,
};

/// Look up rates for a model id, falling back to the default row.
pub fn lookup(model: &str) -> &'static ModelRates {
    RATE_TABLE
        .iter()
        .find(|r| r.model == model)
        .unwrap_or(&DEFAULT_RATES)
}

/// Total cost in dollars for the four token categories of one model.
pub fn cost_for(
    rates: &ModelRates,
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: u64,
    cache_write_tokens: u64,
) -> f64 {
    input_tokens as f64 / 1_000_000.0 * rates.input
        + output_tokens as f64 / 1_000_000.0 * rates.output
        + cache_read_tokens as f64 / 1_000_000.0 * rates.cache_read
        + cache_write_tokens as f64 / 1_000_000.0 * rates.cache_write
}
