use rand::Rng;
use serde::Serialize;

use super::error::{ModelError, ModelResult};
use super::trajectory::Trajectory;

/// Display facts about a purchasable instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_url: Option<String>,
}

impl InstrumentMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            isin: None,
            buy_url: None,
        }
    }
}

/// A composable generator of monthly fractional returns.
///
/// Sources form a tree: composite variants own their children and never share them.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnSource {
    Riskless {
        monthly_return: f64,
    },
    /// Replays contiguous blocks of an empirical pool, each block anchored at a random month.
    Risky {
        example_returns: Vec<f64>,
        autocorrelation_months: usize,
    },
    Delayed {
        upcoming_returns: Vec<f64>,
        source: Box<ReturnSource>,
    },
    /// Turns a real-return source into a nominal one using the supplied inflation.
    InflationPremium {
        premium_source: Box<ReturnSource>,
    },
    Sum {
        sources: Vec<ReturnSource>,
    },
    Annotated {
        metadata: InstrumentMetadata,
        source: Box<ReturnSource>,
    },
}

impl ReturnSource {
    pub fn riskless(monthly_return: f64) -> Self {
        Self::Riskless { monthly_return }
    }

    pub fn risky(example_returns: Vec<f64>, autocorrelation_months: usize) -> ModelResult<Self> {
        if example_returns.is_empty() {
            return Err(ModelError::InvalidInput(
                "risky return source needs at least one example return".to_string(),
            ));
        }
        if autocorrelation_months == 0 {
            return Err(ModelError::InvalidInput(
                "autocorrelation block must span at least one month".to_string(),
            ));
        }
        if example_returns.iter().any(|r| !r.is_finite()) {
            return Err(ModelError::InvalidInput(
                "example returns must be finite".to_string(),
            ));
        }
        Ok(Self::Risky {
            example_returns,
            autocorrelation_months,
        })
    }

    /// Historical month-over-month returns, shifted so that their mean is `expected_return`.
    pub fn from_historical_prices(
        prices: &[f64],
        expected_return: f64,
        autocorrelation_months: usize,
    ) -> ModelResult<Self> {
        let historical = prices_to_returns(prices)?;
        let mean = historical.iter().sum::<f64>() / historical.len() as f64;
        let shifted = historical
            .into_iter()
            .map(|r| r - mean + expected_return)
            .collect();
        Self::risky(shifted, autocorrelation_months)
    }

    pub fn delayed(upcoming_returns: Vec<f64>, source: ReturnSource) -> Self {
        Self::Delayed {
            upcoming_returns,
            source: Box::new(source),
        }
    }

    pub fn inflation_premium(premium_source: ReturnSource) -> Self {
        Self::InflationPremium {
            premium_source: Box::new(premium_source),
        }
    }

    pub fn sum(sources: Vec<ReturnSource>) -> Self {
        Self::Sum { sources }
    }

    pub fn annotated(metadata: InstrumentMetadata, source: ReturnSource) -> Self {
        Self::Annotated {
            metadata,
            source: Box::new(source),
        }
    }

    /// Samples exactly `num_months` returns.
    ///
    /// `inflation`, when given, must cover the same months; it is only consumed by
    /// inflation-linked nodes and otherwise handed down unchanged.
    pub fn sample_returns<R: Rng + ?Sized>(
        &self,
        num_months: usize,
        inflation: Option<&[f64]>,
        rng: &mut R,
    ) -> ModelResult<Vec<f64>> {
        match self {
            Self::Riskless { monthly_return } => Ok(vec![*monthly_return; num_months]),
            Self::Risky {
                example_returns,
                autocorrelation_months,
            } => Ok(sample_blocks(
                example_returns,
                *autocorrelation_months,
                num_months,
                rng,
            )),
            Self::Delayed {
                upcoming_returns,
                source,
            } => {
                let (mut result, remaining) = split_upcoming(upcoming_returns, num_months);
                let trimmed = inflation.map(|values| trim_for_delay(values, upcoming_returns.len()));
                result.extend(source.sample_returns(remaining, trimmed, rng)?);
                Ok(result)
            }
            Self::InflationPremium { premium_source } => {
                let inflation = inflation.ok_or(ModelError::MissingInflation)?;
                let premium = premium_source.sample_returns(num_months, Some(inflation), rng)?;
                add_inflation(&premium, inflation)
            }
            Self::Sum { sources } => {
                let mut total = vec![0.0; num_months];
                for source in sources {
                    let part = source.sample_returns(num_months, inflation, rng)?;
                    for (t, p) in total.iter_mut().zip(part) {
                        *t += p;
                    }
                }
                Ok(total)
            }
            Self::Annotated { source, .. } => source.sample_returns(num_months, inflation, rng),
        }
    }

    /// The deterministic path of this source with every empirical pool replaced by its mean.
    pub fn expected_returns(
        &self,
        num_months: usize,
        inflation: Option<&[f64]>,
    ) -> ModelResult<Vec<f64>> {
        match self {
            Self::Riskless { monthly_return } => Ok(vec![*monthly_return; num_months]),
            Self::Risky {
                example_returns, ..
            } => {
                let mean = example_returns.iter().sum::<f64>() / example_returns.len() as f64;
                Ok(vec![mean; num_months])
            }
            Self::Delayed {
                upcoming_returns,
                source,
            } => {
                let (mut result, remaining) = split_upcoming(upcoming_returns, num_months);
                let trimmed = inflation.map(|values| trim_for_delay(values, upcoming_returns.len()));
                result.extend(source.expected_returns(remaining, trimmed)?);
                Ok(result)
            }
            Self::InflationPremium { premium_source } => {
                let inflation = inflation.ok_or(ModelError::MissingInflation)?;
                let premium = premium_source.expected_returns(num_months, Some(inflation))?;
                add_inflation(&premium, inflation)
            }
            Self::Sum { sources } => {
                let mut total = vec![0.0; num_months];
                for source in sources {
                    let part = source.expected_returns(num_months, inflation)?;
                    for (t, p) in total.iter_mut().zip(part) {
                        *t += p;
                    }
                }
                Ok(total)
            }
            Self::Annotated { source, .. } => source.expected_returns(num_months, inflation),
        }
    }

    pub fn sample_trajectory<R: Rng + ?Sized>(
        &self,
        start_amount: f64,
        additions: &[f64],
        inflation: Option<&[f64]>,
        rng: &mut R,
    ) -> ModelResult<Trajectory> {
        let returns = self.sample_returns(additions.len(), inflation, rng)?;
        Trajectory::infer_savings(start_amount, additions, &returns)
    }

    pub fn metadata(&self) -> Option<&InstrumentMetadata> {
        match self {
            Self::Annotated { metadata, .. } => Some(metadata),
            Self::Delayed { source, .. } => source.metadata(),
            _ => None,
        }
    }
}

fn sample_blocks<R: Rng + ?Sized>(
    pool: &[f64],
    block: usize,
    num_months: usize,
    rng: &mut R,
) -> Vec<f64> {
    let mut out = Vec::with_capacity(num_months);
    let mut anchor = 0;
    for month in 0..num_months {
        if month % block == 0 {
            anchor = rng.random_range(0..pool.len());
        }
        out.push(pool[(anchor + month) % pool.len()]);
    }
    out
}

fn split_upcoming(upcoming: &[f64], num_months: usize) -> (Vec<f64>, usize) {
    let fixed = &upcoming[..upcoming.len().min(num_months)];
    let mut result = Vec::with_capacity(num_months);
    result.extend_from_slice(fixed);
    (result, num_months - fixed.len())
}

// Drops the last `delay` months of inflation, so the delegated source sees the earlier window.
fn trim_for_delay(inflation: &[f64], delay: usize) -> &[f64] {
    if delay == 0 {
        return inflation;
    }
    &inflation[..inflation.len().saturating_sub(delay)]
}

fn add_inflation(premium: &[f64], inflation: &[f64]) -> ModelResult<Vec<f64>> {
    if premium.len() != inflation.len() {
        return Err(ModelError::LengthMismatch {
            what: "inflation",
            expected: premium.len(),
            actual: inflation.len(),
        });
    }
    Ok(premium
        .iter()
        .zip(inflation)
        .map(|(p, i)| (1.0 + p) * (1.0 + i) - 1.0)
        .collect())
}

pub fn annual_to_monthly(annual_return: f64) -> f64 {
    (1.0 + annual_return).powf(1.0 / 12.0) - 1.0
}

pub fn prices_to_returns(prices: &[f64]) -> ModelResult<Vec<f64>> {
    if prices.len() < 2 {
        return Err(ModelError::InvalidInput(
            "need at least two prices to compute a return".to_string(),
        ));
    }
    prices
        .windows(2)
        .enumerate()
        .map(|(idx, pair)| {
            if pair[0] <= 0.0 || !pair[0].is_finite() || !pair[1].is_finite() {
                Err(ModelError::InvalidInput(format!(
                    "price series has a non-positive or non-finite value near index {idx}"
                )))
            } else {
                Ok(pair[1] / pair[0] - 1.0)
            }
        })
        .collect()
}
