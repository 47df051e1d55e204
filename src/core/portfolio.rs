use rand::Rng;

use super::error::{ModelError, ModelResult};
use super::returns::ReturnSource;

const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub weight: f64,
    pub source: ReturnSource,
}

/// Fixed-weight blend of return sources, rebalanced back to its weights every month.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    components: Vec<Component>,
}

impl Portfolio {
    pub fn new(components: Vec<Component>) -> ModelResult<Self> {
        if components.is_empty() {
            return Err(ModelError::InvalidWeights(0.0));
        }
        if let Some(bad) = components
            .iter()
            .find(|c| !c.weight.is_finite() || !(0.0..=1.0).contains(&c.weight))
        {
            return Err(ModelError::InvalidInput(format!(
                "portfolio weight must be within [0, 1], got {}",
                bad.weight
            )));
        }
        let total: f64 = components.iter().map(|c| c.weight).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ModelError::InvalidWeights(total));
        }
        Ok(Self { components })
    }

    /// Splits savings between a safe and a risky instrument by a 0-100 risk preference.
    pub fn from_risk_preference(
        risk_preference: f64,
        safe: ReturnSource,
        risky: ReturnSource,
    ) -> ModelResult<Self> {
        if !(0.0..=100.0).contains(&risk_preference) {
            return Err(ModelError::InvalidInput(format!(
                "risk preference must be between 0 and 100, got {risk_preference}"
            )));
        }
        let risky_weight = risk_preference / 100.0;
        Self::new(vec![
            Component {
                weight: 1.0 - risky_weight,
                source: safe,
            },
            Component {
                weight: risky_weight,
                source: risky,
            },
        ])
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn sample_returns<R: Rng + ?Sized>(
        &self,
        num_months: usize,
        inflation: Option<&[f64]>,
        rng: &mut R,
    ) -> ModelResult<Vec<f64>> {
        let mut blended = vec![0.0; num_months];
        for component in &self.components {
            let returns = component.source.sample_returns(num_months, inflation, rng)?;
            for (b, r) in blended.iter_mut().zip(returns) {
                *b += component.weight * r;
            }
        }
        Ok(blended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn two_riskless(weight: f64) -> ModelResult<Portfolio> {
        Portfolio::new(vec![
            Component {
                weight,
                source: ReturnSource::riskless(0.01),
            },
            Component {
                weight: 1.0 - weight,
                source: ReturnSource::riskless(0.03),
            },
        ])
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = Portfolio::new(vec![Component {
            weight: 0.7,
            source: ReturnSource::riskless(0.0),
        }])
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidWeights(total) if (total - 0.7).abs() < 1e-12));
        assert!(Portfolio::new(Vec::new()).is_err());
    }

    #[test]
    fn weights_outside_unit_interval_are_rejected() {
        assert!(two_riskless(1.5).is_err());
        assert!(two_riskless(-0.2).is_err());
    }

    #[test]
    fn sample_returns_blends_by_weight() {
        let portfolio = two_riskless(0.25).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let returns = portfolio.sample_returns(3, None, &mut rng).unwrap();
        for r in returns {
            assert!((r - (0.25 * 0.01 + 0.75 * 0.03)).abs() < 1e-12);
        }
    }

    #[test]
    fn risk_preference_sets_risky_weight() {
        let portfolio = Portfolio::from_risk_preference(
            36.0,
            ReturnSource::riskless(0.0),
            ReturnSource::riskless(0.1),
        )
        .unwrap();
        let weights: Vec<f64> = portfolio.components().iter().map(|c| c.weight).collect();
        assert!((weights[0] - 0.64).abs() < 1e-12);
        assert!((weights[1] - 0.36).abs() < 1e-12);

        assert!(
            Portfolio::from_risk_preference(
                101.0,
                ReturnSource::riskless(0.0),
                ReturnSource::riskless(0.1)
            )
            .is_err()
        );
    }
}
