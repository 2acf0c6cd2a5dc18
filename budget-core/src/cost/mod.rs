pub mod calculator;

pub use calculator::{CostBreakdown, CostEstimator};
