use std::collections::BTreeMap;

use rand::Rng;

use super::error::{ModelError, ModelResult};
use super::portfolio::Portfolio;
use super::returns::{InstrumentMetadata, ReturnSource};
use super::tax::TaxSystem;
use super::trajectory::Trajectory;

pub const BANK_ACCOUNT_NAME: &str = "Bank account";

#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub name: String,
    pub tax_system: TaxSystem,
    /// Months to maturity mapped to the annotated source of that bond.
    pub bonds: BTreeMap<u32, ReturnSource>,
    pub inflation: ReturnSource,
    pub five_year_default_probability: f64,
}

impl Country {
    pub fn monthly_default_probability(&self) -> f64 {
        1.0 - (1.0 - self.five_year_default_probability).powf(1.0 / 60.0)
    }

    /// Chance that the banking system fails at some point within `num_months`.
    pub fn default_probability(&self, num_months: usize) -> f64 {
        1.0 - (1.0 - self.monthly_default_probability()).powf(num_months as f64)
    }

    /// Deterministic inflation path used when no randomness is wanted.
    pub fn expected_inflation(&self, num_months: usize) -> ModelResult<Vec<f64>> {
        self.inflation.expected_returns(num_months, None)
    }

    /// Longest bond whose riskless path reaches `goal_price` strictly before it matures.
    ///
    /// Falls back to a zero-yield bank account when no maturity qualifies.
    pub fn select_bond(
        &self,
        current_savings: f64,
        monthly_savings: f64,
        goal_price: f64,
        horizon_months: usize,
    ) -> ModelResult<ReturnSource> {
        let inflation = self.expected_inflation(horizon_months)?;
        let additions = vec![monthly_savings; horizon_months];
        for (&maturity, bond) in self.bonds.iter().rev() {
            let returns = bond.expected_returns(horizon_months, Some(&inflation))?;
            let trajectory = Trajectory::infer_savings(current_savings, &additions, &returns)?;
            match trajectory.months_to_goal(goal_price) {
                Some(months) if months < maturity as usize => {
                    log::debug!(
                        "{}: selected {maturity}-month bond, goal expected after {months} months",
                        self.name
                    );
                    return Ok(bond.clone());
                }
                _ => continue,
            }
        }
        log::debug!("{}: no bond matures after the goal, using bank account", self.name);
        Ok(bank_account())
    }
}

pub fn bank_account() -> ReturnSource {
    ReturnSource::annotated(
        InstrumentMetadata::named(BANK_ACCOUNT_NAME),
        ReturnSource::riskless(0.0),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub current_savings: f64,
    pub monthly_savings: f64,
    pub goal_price: f64,
    pub risk_preference: f64,
    pub tax_system: TaxSystem,
    pub country: Country,
}

impl User {
    pub fn new(
        current_savings: f64,
        monthly_savings: f64,
        goal_price: f64,
        risk_preference: f64,
        country: Country,
    ) -> ModelResult<Self> {
        let user = Self {
            current_savings,
            monthly_savings,
            goal_price,
            risk_preference,
            tax_system: country.tax_system,
            country,
        };
        user.validate()?;
        Ok(user)
    }

    pub fn with_tax_system(mut self, tax_system: TaxSystem) -> ModelResult<Self> {
        tax_system.validate()?;
        self.tax_system = tax_system;
        Ok(self)
    }

    fn validate(&self) -> ModelResult<()> {
        for (name, value) in [
            ("current_savings", self.current_savings),
            ("monthly_savings", self.monthly_savings),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ModelError::InvalidInput(format!("{name} must be >= 0")));
            }
        }
        if !self.goal_price.is_finite() || self.goal_price <= 0.0 {
            return Err(ModelError::InvalidInput(
                "goal_price must be > 0".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.risk_preference) {
            return Err(ModelError::InvalidInput(
                "risk_preference must be between 0 and 100".to_string(),
            ));
        }
        self.tax_system.validate()
    }

    pub fn stock_allocation(&self) -> f64 {
        self.risk_preference / 100.0
    }

    pub fn safe_allocation(&self) -> f64 {
        1.0 - self.stock_allocation()
    }

    pub fn safe_investment(&self, horizon_months: usize) -> ModelResult<ReturnSource> {
        self.country.select_bond(
            self.current_savings,
            self.monthly_savings,
            self.goal_price,
            horizon_months,
        )
    }

    pub fn portfolio(&self, stocks: &ReturnSource, horizon_months: usize) -> ModelResult<Portfolio> {
        Portfolio::from_risk_preference(
            self.risk_preference,
            self.safe_investment(horizon_months)?,
            stocks.clone(),
        )
    }

    fn additions(&self, num_months: usize) -> Vec<f64> {
        vec![self.monthly_savings; num_months]
    }

    /// One post-tax future of the user's portfolio.
    pub fn sample_trajectory<R: Rng + ?Sized>(
        &self,
        portfolio: &Portfolio,
        num_months: usize,
        rng: &mut R,
    ) -> ModelResult<Trajectory> {
        let inflation = self.country.inflation.sample_returns(num_months, None, rng)?;
        let returns = portfolio.sample_returns(num_months, Some(&inflation), rng)?;
        let pre_tax = Trajectory::infer_savings(
            self.current_savings,
            &self.additions(num_months),
            &returns,
        )?;
        self.tax_system.apply(&pre_tax)
    }

    /// One post-tax future of keeping everything in a zero-yield bank account.
    pub fn sample_bank_trajectory<R: Rng + ?Sized>(
        &self,
        num_months: usize,
        rng: &mut R,
    ) -> ModelResult<Trajectory> {
        let inflation = self.country.inflation.sample_returns(num_months, None, rng)?;
        let pre_tax = bank_account().sample_trajectory(
            self.current_savings,
            &self.additions(num_months),
            Some(&inflation),
            rng,
        )?;
        self.tax_system.apply(&pre_tax)
    }
}
