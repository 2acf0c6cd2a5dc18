use crate::cost::CostBreakdown;
use crate::dispatch::CompletionOutcome;
use crate::error::{EngineError, Result};
use prometheus::{Counter, Encoder, Histogram, IntCounterVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct DispatchMetrics {
    registry: Arc<Registry>,
    dispatch_counter: IntCounterVec,
    dispatch_duration: Histogram,
    dispatch_cost: Counter,
    tokens_input: Counter,
    tokens_output: Counter,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let dispatch_counter = IntCounterVec::new(
            prometheus::Opts::new("budget_dispatch_total", "Completion dispatches by outcome")
                .const_label("component", "dispatcher"),
            &["status", "kind"],
        )?;

        let dispatch_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new("budget_dispatch_duration_seconds", "Dispatch duration in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
        )?;

        let dispatch_cost = Counter::with_opts(
            prometheus::Opts::new("budget_dispatch_cost_usd_total", "Estimated cost in USD")
        )?;

        let tokens_input = Counter::with_opts(
            prometheus::Opts::new("budget_tokens_input_total", "Input tokens sent")
        )?;

        let tokens_output = Counter::with_opts(
            prometheus::Opts::new("budget_tokens_output_total", "Output tokens received")
        )?;

        registry.register(Box::new(dispatch_counter.clone()))?;
        registry.register(Box::new(dispatch_duration.clone()))?;
        registry.register(Box::new(dispatch_cost.clone()))?;
        registry.register(Box::new(tokens_input.clone()))?;
        registry.register(Box::new(tokens_output.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            dispatch_counter,
            dispatch_duration,
            dispatch_cost,
            tokens_input,
            tokens_output,
        })
    }

    pub fn record(&self, outcome: &CompletionOutcome, cost: Option<&CostBreakdown>, elapsed: Duration) {
        let kind = outcome.failure_kind().map(|k| k.as_str()).unwrap_or("none");
        self.dispatch_counter
            .with_label_values(&[outcome.status.label(), kind])
            .inc();
        self.dispatch_duration.observe(elapsed.as_secs_f64());

        if let Some(usage) = outcome.usage {
            self.tokens_input.inc_by(usage.input_tokens as f64);
            self.tokens_output.inc_by(usage.output_tokens as f64);
        }

        if let Some(cost) = cost {
            self.dispatch_cost.inc_by(cost.total_cost);
        }
    }

    pub fn dispatch_count(&self, status: &str, kind: &str) -> u64 {
        self.dispatch_counter.with_label_values(&[status, kind]).get()
    }

    pub fn input_tokens(&self) -> f64 {
        self.tokens_input.get()
    }

    pub fn output_tokens(&self) -> f64 {
        self.tokens_output.get()
    }

    pub fn total_cost(&self) -> f64 {
        self.dispatch_cost.get()
    }

    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| EngineError::Unknown(e.to_string()))
    }
}
