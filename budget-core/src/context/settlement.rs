/// Token write-back after a completed exchange

use crate::context::token_counter::TokenCounter;
use crate::context::{Conversation, Role, Turn};
use crate::cost::{CostBreakdown, CostEstimator};
use crate::dispatch::CompletionOutcome;
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

pub struct Settlement {
    token_counter: Arc<TokenCounter>,
    estimator: Arc<CostEstimator>,
}

impl Settlement {
    pub fn new(token_counter: Arc<TokenCounter>, estimator: Arc<CostEstimator>) -> Self {
        Self {
            token_counter,
            estimator,
        }
    }

    /// Appends the assistant reply and settles the exchange's tokens.
    ///
    /// Only usage-bearing outcomes are settled: the latest user turn gets a
    /// local count unless it already has one, the reply takes the provider's
    /// output count, and the aggregates are re-summed from the counted turns.
    /// Rejected and failed exchanges leave their turns uncounted and the
    /// totals untouched.
    pub fn settle(
        &self,
        conversation: &mut Conversation,
        outcome: &CompletionOutcome,
        model: &str,
    ) -> Result<CostBreakdown> {
        let mut reply = Turn::assistant(outcome.content.clone())?;

        let Some(usage) = outcome.usage else {
            conversation.push_turn(reply);
            info!(
                conversation_id = %conversation.id,
                status = outcome.status.label(),
                "No usage recorded"
            );
            return Ok(self.estimator.estimate_conversation(conversation, Some(model)));
        };

        let user_tokens = conversation
            .last_turn_mut(Role::User)
            .map(|turn| turn.ensure_token_count(&self.token_counter, model))
            .unwrap_or(0);

        reply.record_token_count(usage.output_tokens);
        conversation.push_turn(reply);
        conversation.recompute_totals();

        let cost = self.estimator.estimate_conversation(conversation, Some(model));
        info!(
            conversation_id = %conversation.id,
            user = user_tokens,
            assistant = usage.output_tokens,
            api_input = usage.input_tokens,
            api_output = usage.output_tokens,
            "Token usage settled"
        );
        info!(
            conversation_id = %conversation.id,
            total_cost = cost.total_cost,
            input_cost = cost.input_cost,
            output_cost = cost.output_cost,
            "Estimated conversation cost"
        );

        Ok(cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token_counter::testing::word_counter;
    use crate::dispatch::{FailureKind, TokenUsage};
    use crate::registry::ModelRegistry;

    fn settlement() -> Settlement {
        Settlement::new(
            Arc::new(word_counter()),
            Arc::new(CostEstimator::new(Arc::new(ModelRegistry::new()))),
        )
    }

    #[test]
    fn test_settle_with_usage() {
        let mut conversation = Conversation::new();
        conversation.push_user("what is a lifetime").unwrap();

        let outcome = CompletionOutcome::succeeded("a region of code", TokenUsage::new(40, 12));
        let cost = settlement().settle(&mut conversation, &outcome, "gpt-4").unwrap();

        let turns = conversation.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].input_tokens(), Some(4));
        assert_eq!(turns[1].role(), Role::Assistant);
        assert_eq!(turns[1].output_tokens(), Some(12));
        assert_eq!(conversation.total_input_tokens(), 4);
        assert_eq!(conversation.total_output_tokens(), 12);
        assert_eq!(conversation.total_tokens(), 16);
        assert!(cost.total_cost > 0.0);
    }

    #[test]
    fn test_settle_rejected_records_no_usage() {
        let settlement = settlement();
        let mut conversation = Conversation::new();
        conversation.push_user("first").unwrap();
        settlement
            .settle(&mut conversation, &CompletionOutcome::succeeded("ok", TokenUsage::new(9, 1)), "gpt-4")
            .unwrap();
        let before = conversation.clone();

        conversation.push_user("hello there").unwrap();
        let outcome = CompletionOutcome::rejected(FailureKind::RateLimited);
        let cost = settlement.settle(&mut conversation, &outcome, "gpt-4").unwrap();

        assert_eq!(conversation.len(), 4);
        let reply = &conversation.turns()[3];
        assert_eq!(reply.content(), outcome.content);
        assert!(!reply.is_counted());
        assert!(!conversation.turns()[2].is_counted());
        assert_eq!(conversation.total_output_tokens(), before.total_output_tokens());
        assert_eq!(conversation.total_input_tokens(), before.total_input_tokens());
        assert_eq!(conversation.total_tokens(), 2);
        assert_eq!(
            cost,
            CostEstimator::new(Arc::new(ModelRegistry::new())).estimate_conversation(&before, Some("gpt-4"))
        );
    }

    #[test]
    fn test_settle_failed_on_fresh_conversation_costs_nothing() {
        let mut conversation = Conversation::new();
        conversation.push_user("hello there").unwrap();

        let outcome = CompletionOutcome::failed(FailureKind::TransportFailure);
        let cost = settlement().settle(&mut conversation, &outcome, "gpt-4").unwrap();

        assert_eq!(conversation.total_tokens(), 0);
        assert_eq!(cost.total_cost, 0.0);
    }

    #[test]
    fn test_settle_keeps_recorded_user_count() {
        let mut conversation = Conversation::new();
        conversation.push_user("what is a lifetime").unwrap().record_token_count(7);

        let outcome = CompletionOutcome::succeeded("a region", TokenUsage::new(40, 2));
        settlement().settle(&mut conversation, &outcome, "gpt-4").unwrap();

        assert_eq!(conversation.turns()[0].input_tokens(), Some(7));
        assert_eq!(conversation.total_tokens(), 9);
    }

    #[test]
    fn test_settle_keeps_earlier_counts() {
        let mut conversation = Conversation::new();
        conversation.push_user("first").unwrap().record_token_count(100);
        conversation.push_assistant("reply").unwrap().record_token_count(200);
        conversation.push_user("second question").unwrap();

        let outcome = CompletionOutcome::degraded("ok", TokenUsage::new(310, 1));
        settlement().settle(&mut conversation, &outcome, "gpt-4").unwrap();

        assert_eq!(conversation.turns()[0].total_tokens(), Some(100));
        assert_eq!(conversation.turns()[2].total_tokens(), Some(2));
        assert_eq!(conversation.total_tokens(), 100 + 200 + 2 + 1);
    }
}
