use rand::SeedableRng;
use rand::rngs::SmallRng;
use rayon::prelude::*;
use serde::Serialize;

use super::error::{ModelError, ModelResult};
use super::trajectory::{self, Trajectory};

/// Per-month quantile of many sampled trajectories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTrajectory {
    pub scenario_id: String,
    pub quantile: f64,
    pub savings: Vec<f64>,
}

impl AggregateTrajectory {
    /// Reduces `samples` month by month to their `quantile`.
    ///
    /// A quantile of exactly 0 yields the zero-growth floor (start amount plus additions):
    /// sampled paths can dip below it by chance, the floor cannot.
    pub fn from_samples(
        scenario_id: impl Into<String>,
        samples: &[Trajectory],
        quantile: f64,
    ) -> ModelResult<Self> {
        if !(0.0..=1.0).contains(&quantile) {
            return Err(ModelError::InvalidInput(format!(
                "quantile must be within [0, 1], got {quantile}"
            )));
        }
        let Some(first) = samples.first() else {
            return Err(ModelError::InvalidInput(
                "cannot aggregate an empty sample set".to_string(),
            ));
        };
        let months = first.savings().len();
        if let Some(odd) = samples.iter().find(|s| s.savings().len() != months) {
            return Err(ModelError::LengthMismatch {
                what: "sample savings",
                expected: months,
                actual: odd.savings().len(),
            });
        }

        let savings = if quantile == 0.0 {
            first.contributions()
        } else {
            let mut column = Vec::with_capacity(samples.len());
            (0..months)
                .map(|month| {
                    column.clear();
                    column.extend(samples.iter().map(|s| s.savings()[month]));
                    quantile_of(&mut column, quantile)
                })
                .collect()
        };

        Ok(Self {
            scenario_id: scenario_id.into(),
            quantile,
            savings,
        })
    }

    /// Chance of doing at least as well as this band.
    pub fn probability(&self) -> f64 {
        1.0 - self.quantile
    }

    pub fn months_to_goal(&self, goal: f64) -> Option<usize> {
        trajectory::months_to_goal(&self.savings, goal)
    }

    pub fn years_to_goal(&self, goal: f64) -> Option<usize> {
        trajectory::years_to_goal(&self.savings, goal)
    }
}

/// Draws `num_samples` independent trajectories in parallel.
///
/// Sample `i` of `stream` always receives the same generator for a given `base_seed`,
/// so the result does not depend on how rayon schedules the work.
pub fn sample_trajectories<F>(
    num_samples: usize,
    base_seed: u64,
    stream: u32,
    sample: F,
) -> ModelResult<Vec<Trajectory>>
where
    F: Fn(&mut SmallRng) -> ModelResult<Trajectory> + Sync,
{
    if num_samples == 0 {
        return Err(ModelError::InvalidInput(
            "number of samples must be > 0".to_string(),
        ));
    }
    (0..num_samples)
        .into_par_iter()
        .map(|sample_id| {
            let mut rng = SmallRng::seed_from_u64(derive_seed(base_seed, stream, sample_id as u64));
            sample(&mut rng)
        })
        .collect()
}

/// Linear interpolation between order statistics, `q` in `[0, 1]`.
pub fn quantile_of(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = q * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let (a, b) = (values[lower], values[upper]);
        (a + (b - a) * (rank - lower as f64)).min(b).max(a)
    }
}

pub fn derive_seed(base_seed: u64, stream: u32, sample_id: u64) -> u64 {
    let mixed = base_seed ^ ((stream as u64) << 32) ^ sample_id;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
