/// Built-in model capability table

use super::ModelProfile;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// (id, max context, temperature, reserved response, $/1k input, $/1k output)
const BUILTIN_PROFILES: &[(&str, usize, f32, usize, f64, f64)] = &[
    ("gpt-3.5-turbo", 4096, 0.7, 1000, 0.001, 0.002),
    ("gpt-3.5-turbo-1106", 16385, 0.7, 1000, 0.001, 0.002),
    ("gpt-4", 8192, 0.7, 1000, 0.03, 0.06),
    ("gpt-4-1106-preview", 128000, 0.7, 1000, 0.01, 0.03),
    ("gpt-4o", 128000, 0.7, 1000, 0.005, 0.015),
    ("gpt-4o-mini", 128000, 0.7, 1000, 0.00015, 0.0006),
];

pub fn builtin_profiles() -> Vec<ModelProfile> {
    BUILTIN_PROFILES
        .iter()
        .map(|(id, max_context, temperature, reserved, input, output)| ModelProfile {
            id: id.to_string(),
            max_context_tokens: *max_context,
            temperature: *temperature,
            reserved_response_tokens: *reserved,
            price_per_1k_input: *input,
            price_per_1k_output: *output,
        })
        .collect()
}
