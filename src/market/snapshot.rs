use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::{BondOffer, EquityQuote, MarketDataProvider};
use crate::core::{ModelError, ModelResult, TaxSystem};

/// Market data frozen into a JSON document.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSnapshot {
    pub global_cape_ratio: f64,
    pub equity: EquityQuote,
    pub countries: Vec<CountrySnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountrySnapshot {
    pub name: String,
    pub tax_system: TaxSystem,
    pub five_year_default_probability: f64,
    /// Yearly inflation keyed by calendar year.
    pub historical_inflation: BTreeMap<i32, f64>,
    /// Expected monthly inflation for the coming months.
    #[serde(default)]
    pub inflation_forecast: Vec<f64>,
    #[serde(default)]
    pub bonds: Vec<BondOffer>,
}

impl MarketSnapshot {
    pub fn from_json(json: &str) -> ModelResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ModelError::MarketData(format!("invalid market snapshot: {e}")))
    }

    pub fn from_path(path: &Path) -> ModelResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ModelError::MarketData(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    fn country(&self, name: &str) -> ModelResult<&CountrySnapshot> {
        self.countries
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ModelError::UnknownCountry(name.to_string()))
    }
}

impl MarketDataProvider for MarketSnapshot {
    fn global_cape_ratio(&self) -> ModelResult<f64> {
        Ok(self.global_cape_ratio)
    }

    fn equity(&self) -> ModelResult<EquityQuote> {
        Ok(self.equity.clone())
    }

    fn country_names(&self) -> ModelResult<Vec<String>> {
        Ok(self.countries.iter().map(|c| c.name.clone()).collect())
    }

    fn tax_system(&self, country: &str) -> ModelResult<TaxSystem> {
        Ok(self.country(country)?.tax_system)
    }

    fn historical_inflation(&self, country: &str) -> ModelResult<BTreeMap<i32, f64>> {
        Ok(self.country(country)?.historical_inflation.clone())
    }

    fn bond_offers(&self, country: &str) -> ModelResult<Vec<BondOffer>> {
        Ok(self.country(country)?.bonds.clone())
    }

    fn inflation_forecast(&self, country: &str) -> ModelResult<Vec<f64>> {
        Ok(self.country(country)?.inflation_forecast.clone())
    }

    fn default_probability(&self, country: &str) -> ModelResult<f64> {
        Ok(self.country(country)?.five_year_default_probability)
    }
}
