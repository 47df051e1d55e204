use super::error::{ModelError, ModelResult};

const MIN_MAGNITUDE: f64 = 1e-12;
const RELATIVE_TOLERANCE: f64 = 1e-9;

/// Month-by-month savings together with the additions and returns that explain them.
///
/// `additions[i]` and `returns[i]` both happen between `savings[i]` and `savings[i + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    savings: Vec<f64>,
    additions: Vec<f64>,
    returns: Vec<f64>,
}

impl Trajectory {
    fn from_parts(savings: Vec<f64>, additions: Vec<f64>, returns: Vec<f64>) -> ModelResult<Self> {
        if savings.is_empty() {
            return Err(ModelError::InvalidInput(
                "a trajectory needs at least a start amount".to_string(),
            ));
        }
        check_len("additions", savings.len() - 1, additions.len())?;
        check_len("returns", savings.len() - 1, returns.len())?;
        Ok(Self {
            savings,
            additions,
            returns,
        })
    }

    /// Compounds `start_amount` and `additions` through `returns`.
    pub fn infer_savings(start_amount: f64, additions: &[f64], returns: &[f64]) -> ModelResult<Self> {
        check_len("returns", additions.len(), returns.len())?;

        let mut cumulative_growth = 1.0;
        let mut discounted_sum = start_amount;
        let mut savings = Vec::with_capacity(additions.len() + 1);
        savings.push(start_amount);

        for (month, (&addition, &ret)) in additions.iter().zip(returns).enumerate() {
            cumulative_growth *= 1.0 + ret;
            if !cumulative_growth.is_finite() || cumulative_growth.abs() < MIN_MAGNITUDE {
                return Err(ModelError::NumericalDomain {
                    operation: "infer_savings",
                    month: month + 1,
                });
            }
            discounted_sum += addition / cumulative_growth;
            savings.push(discounted_sum * cumulative_growth);
        }

        Self::from_parts(savings, additions.to_vec(), returns.to_vec())
    }

    /// Recovers the monthly returns implied by observed `savings` and `additions`.
    pub fn infer_returns(savings: &[f64], additions: &[f64]) -> ModelResult<Self> {
        if savings.is_empty() {
            return Err(ModelError::InvalidInput(
                "a trajectory needs at least a start amount".to_string(),
            ));
        }
        check_len("additions", savings.len() - 1, additions.len())?;

        let mut returns = Vec::with_capacity(additions.len());
        for (month, window) in savings.windows(2).enumerate() {
            let grown = window[1] - additions[month];
            let previous = window[0];
            if previous.abs() < MIN_MAGNITUDE {
                // an empty account has nothing to grow; leftovers are rounding of the addition
                let scale = window[1].abs().max(additions[month].abs()).max(1.0);
                if grown.abs() <= RELATIVE_TOLERANCE * scale {
                    returns.push(0.0);
                    continue;
                }
                return Err(ModelError::NumericalDomain {
                    operation: "infer_returns",
                    month: month + 1,
                });
            }
            returns.push(grown / previous - 1.0);
        }

        Self::from_parts(savings.to_vec(), additions.to_vec(), returns)
    }

    pub fn start_amount(&self) -> f64 {
        self.savings[0]
    }

    pub fn savings(&self) -> &[f64] {
        &self.savings
    }

    pub fn additions(&self) -> &[f64] {
        &self.additions
    }

    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    pub fn num_months(&self) -> usize {
        self.additions.len()
    }

    /// Start amount plus additions so far, i.e. the savings with zero growth.
    pub fn contributions(&self) -> Vec<f64> {
        cumulative_contributions(self.start_amount(), &self.additions)
    }

    pub fn months_to_goal(&self, goal: f64) -> Option<usize> {
        months_to_goal(&self.savings, goal)
    }

    pub fn years_to_goal(&self, goal: f64) -> Option<usize> {
        years_to_goal(&self.savings, goal)
    }

    pub fn into_savings(self) -> Vec<f64> {
        self.savings
    }
}

pub fn cumulative_contributions(start_amount: f64, additions: &[f64]) -> Vec<f64> {
    let mut total = start_amount;
    let mut out = Vec::with_capacity(additions.len() + 1);
    out.push(total);
    for addition in additions {
        total += addition;
        out.push(total);
    }
    out
}

/// First month whose savings reach `goal`, or `None` if that never happens.
pub fn months_to_goal(savings: &[f64], goal: f64) -> Option<usize> {
    savings.iter().position(|&value| value >= goal)
}

pub fn years_to_goal(savings: &[f64], goal: f64) -> Option<usize> {
    months_to_goal(savings, goal).map(|months| months.div_ceil(12))
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> ModelResult<()> {
    if expected != actual {
        return Err(ModelError::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
