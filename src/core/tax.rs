use serde::{Deserialize, Serialize};

use super::error::{ModelError, ModelResult};
use super::trajectory::Trajectory;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaxSystem {
    /// Gains above the money put in are taxed as if sold every month; losses are not refunded.
    CapitalGains { rate: f64 },
    /// Yearly tax on holdings, charged as a constant monthly drag on returns.
    Wealth { annual_rate: f64 },
}

impl TaxSystem {
    pub fn validate(&self) -> ModelResult<()> {
        let rate = match self {
            Self::CapitalGains { rate } => *rate,
            Self::Wealth { annual_rate } => *annual_rate,
        };
        if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
            return Err(ModelError::InvalidInput(format!(
                "tax rate must be within [0, 1), got {rate}"
            )));
        }
        Ok(())
    }

    pub fn apply(&self, trajectory: &Trajectory) -> ModelResult<Trajectory> {
        match *self {
            Self::CapitalGains { rate } => {
                let post_tax: Vec<f64> = trajectory
                    .savings()
                    .iter()
                    .zip(trajectory.contributions())
                    .map(|(&saved, contributed)| {
                        let excess = saved - contributed;
                        contributed + excess.min(0.0) + excess.max(0.0) * (1.0 - rate)
                    })
                    .collect();
                Trajectory::infer_returns(&post_tax, trajectory.additions())
            }
            Self::Wealth { annual_rate } => {
                let monthly_tax = monthly_wealth_tax(annual_rate);
                let taxed_returns: Vec<f64> =
                    trajectory.returns().iter().map(|r| r - monthly_tax).collect();
                Trajectory::infer_savings(
                    trajectory.start_amount(),
                    trajectory.additions(),
                    &taxed_returns,
                )
            }
        }
    }
}

pub fn monthly_wealth_tax(annual_rate: f64) -> f64 {
    1.0 - (1.0 - annual_rate).powf(1.0 / 12.0)
}
