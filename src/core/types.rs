use serde::Serialize;

use super::returns::InstrumentMetadata;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub horizon_months: usize,
    pub investment_samples: usize,
    pub bank_samples: usize,
    pub example_count: usize,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon_months: 50 * 12,
            investment_samples: 1024,
            bank_samples: 256,
            example_count: 64,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BandResult {
    pub scenario_id: String,
    pub probability: f64,
    pub months_to_goal: Option<usize>,
    pub years_to_goal: Option<usize>,
    pub trajectory: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationResult {
    #[serde(flatten)]
    pub instrument: InstrumentMetadata,
    pub current_fraction: f64,
    pub current_amount: f64,
    pub monthly_fraction: f64,
    pub monthly_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    pub strata: Vec<BandResult>,
    pub bank_variant: BandResult,
    pub example_evolutions: Vec<Vec<f64>>,
    pub allocation: Vec<AllocationResult>,
}
