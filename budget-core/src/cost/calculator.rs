use crate::context::Conversation;
use crate::registry::ModelRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cost in USD, each field rounded to 6 decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

pub struct CostEstimator {
    registry: Arc<ModelRegistry>,
}

impl CostEstimator {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn estimate(
        &self,
        input_tokens: usize,
        output_tokens: usize,
        model: Option<&str>,
    ) -> CostBreakdown {
        let profile = self.registry.profile_for(model);

        let input_cost = (input_tokens as f64 / 1000.0) * profile.price_per_1k_input;
        let output_cost = (output_tokens as f64 / 1000.0) * profile.price_per_1k_output;

        CostBreakdown {
            input_cost: round6(input_cost),
            output_cost: round6(output_cost),
            total_cost: round6(input_cost + output_cost),
        }
    }

    /// Cost of a conversation's aggregate totals. Without an explicit model
    /// the conversation's last used model is priced.
    pub fn estimate_conversation(
        &self,
        conversation: &Conversation,
        model: Option<&str>,
    ) -> CostBreakdown {
        self.estimate(
            conversation.total_input_tokens(),
            conversation.total_output_tokens(),
            model.or(conversation.model_used()),
        )
    }
}

impl Default for CostEstimator {
    fn default() -> Self {
        Self::new(Arc::new(ModelRegistry::new()))
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-12, "{} != {}", actual, expected);
    }

    #[test]
    fn test_zero_tokens_cost_nothing() {
        let estimator = CostEstimator::default();
        for model in [None, Some("gpt-4"), Some("not-a-model")] {
            assert_eq!(estimator.estimate(0, 0, model), CostBreakdown::default());
        }
    }

    #[test]
    fn test_estimate_uses_profile_prices() {
        let estimator = CostEstimator::default();
        let cost = estimator.estimate(1000, 2000, Some("gpt-4o"));
        assert_close(cost.input_cost, 0.005);
        assert_close(cost.output_cost, 0.03);
        assert_close(cost.total_cost, 0.035);
    }

    #[test]
    fn test_estimate_rounds_to_six_places() {
        let estimator = CostEstimator::default();
        let cost = estimator.estimate(1234, 0, Some("gpt-4o-mini"));
        // 1.234 * 0.00015 = 0.0001851
        assert_close(cost.input_cost, 0.000185);
        assert_close(cost.total_cost, 0.000185);
    }

    #[test]
    fn test_unknown_model_priced_as_default() {
        let estimator = CostEstimator::default();
        assert_eq!(
            estimator.estimate(5000, 5000, Some("typo")),
            estimator.estimate(5000, 5000, None)
        );
    }

    #[test]
    fn test_estimate_conversation_uses_model_used() {
        let estimator = CostEstimator::default();
        let mut conversation = Conversation::new();
        conversation.push_user("hi").unwrap().record_token_count(1000);
        conversation.push_assistant("hello").unwrap().record_token_count(1000);
        conversation.recompute_totals();
        conversation.set_model_used("gpt-4");

        let cost = estimator.estimate_conversation(&conversation, None);
        assert_close(cost.input_cost, 0.03);
        assert_close(cost.output_cost, 0.06);
        assert_close(cost.total_cost, 0.09);

        let explicit = estimator.estimate_conversation(&conversation, Some("gpt-3.5-turbo"));
        assert_close(explicit.total_cost, 0.003);
    }
}
