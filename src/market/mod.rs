//! Market data boundary.
//!
//! Providers answer raw questions (prices, yields, inflation); [`Market::build`] turns the
//! answers into return sources once, and [`MarketCache`] decides when to do it again.

mod cache;
mod snapshot;

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::core::{
    Country, InstrumentMetadata, ModelError, ModelResult, ReturnSource, TaxSystem,
    annual_to_monthly,
};

pub use cache::MarketCache;
pub use snapshot::{CountrySnapshot, MarketSnapshot};
#[cfg(test)]
pub(crate) use snapshot::tests::SNAPSHOT_JSON;

const INFLATION_HISTORY_START: i32 = 2000;
const STOCK_AUTOCORRELATION_MONTHS: usize = 24;
const INFLATION_AUTOCORRELATION_MONTHS: usize = 36;
const INFLATION_LINKED_FIXED_MONTHS: usize = 12;

#[derive(Debug, Clone, Deserialize)]
pub struct EquityQuote {
    pub name: String,
    #[serde(default)]
    pub isin: Option<String>,
    #[serde(default)]
    pub buy_url: Option<String>,
    pub expense_ratio: f64,
    /// Month-end prices, oldest first.
    pub monthly_prices: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BondYield {
    Fixed {
        annual_rate: f64,
    },
    /// A fixed first year, then inflation plus a premium.
    InflationLinked {
        first_year: f64,
        inflation_premium: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct BondOffer {
    pub months_to_maturity: u32,
    pub name: String,
    #[serde(default)]
    pub buy_url: Option<String>,
    #[serde(rename = "yield")]
    pub terms: BondYield,
}

pub trait MarketDataProvider: Send + Sync {
    fn global_cape_ratio(&self) -> ModelResult<f64>;
    fn equity(&self) -> ModelResult<EquityQuote>;
    fn country_names(&self) -> ModelResult<Vec<String>>;
    fn tax_system(&self, country: &str) -> ModelResult<TaxSystem>;
    /// Yearly inflation keyed by calendar year.
    fn historical_inflation(&self, country: &str) -> ModelResult<BTreeMap<i32, f64>>;
    fn bond_offers(&self, country: &str) -> ModelResult<Vec<BondOffer>>;
    /// Monthly inflation expected for the coming months.
    fn inflation_forecast(&self, country: &str) -> ModelResult<Vec<f64>>;
    fn default_probability(&self, country: &str) -> ModelResult<f64>;
}

/// Return sources resolved from one provider snapshot; read-only afterwards.
#[derive(Debug, Clone)]
pub struct Market {
    pub stocks: ReturnSource,
    pub countries: BTreeMap<String, Country>,
}

impl Market {
    pub fn build(provider: &dyn MarketDataProvider) -> ModelResult<Self> {
        let stocks = stocks(provider)?;
        let mut countries = BTreeMap::new();
        for name in provider.country_names()? {
            let country = country(provider, &name)?;
            countries.insert(name, country);
        }
        Ok(Self { stocks, countries })
    }

    pub fn country(&self, name: &str) -> ModelResult<&Country> {
        self.countries
            .get(name)
            .ok_or_else(|| ModelError::UnknownCountry(name.to_string()))
    }
}

/// Real return from the CAPE earnings yield (Shiller), shaped by historical volatility.
fn stocks(provider: &dyn MarketDataProvider) -> ModelResult<ReturnSource> {
    let cape = provider.global_cape_ratio()?;
    if !cape.is_finite() || cape <= 0.0 {
        return Err(ModelError::MarketData(format!(
            "CAPE ratio must be positive, got {cape}"
        )));
    }
    let equity = provider.equity()?;
    let premium = ReturnSource::from_historical_prices(
        &equity.monthly_prices,
        annual_to_monthly(1.0 / cape),
        STOCK_AUTOCORRELATION_MONTHS,
    )
    .map_err(|e| ModelError::MarketData(format!("equity history: {e}")))?;

    Ok(ReturnSource::annotated(
        InstrumentMetadata {
            name: equity.name,
            isin: equity.isin,
            buy_url: equity.buy_url,
        },
        ReturnSource::sum(vec![
            ReturnSource::inflation_premium(premium),
            ReturnSource::riskless(annual_to_monthly(-equity.expense_ratio)),
        ]),
    ))
}

fn country(provider: &dyn MarketDataProvider, name: &str) -> ModelResult<Country> {
    let tax_system = provider.tax_system(name)?;
    tax_system
        .validate()
        .map_err(|e| ModelError::MarketData(format!("{name} tax system: {e}")))?;

    let five_year_default_probability = provider.default_probability(name)?;
    if !(0.0..1.0).contains(&five_year_default_probability) {
        return Err(ModelError::MarketData(format!(
            "{name} default probability must be within [0, 1), got {five_year_default_probability}"
        )));
    }

    let bonds = provider
        .bond_offers(name)?
        .into_iter()
        .map(|offer| (offer.months_to_maturity, bond(offer)))
        .collect();

    Ok(Country {
        name: name.to_string(),
        tax_system,
        bonds,
        inflation: inflation(provider, name)?,
        five_year_default_probability,
    })
}

fn bond(offer: BondOffer) -> ReturnSource {
    let metadata = InstrumentMetadata {
        name: offer.name,
        isin: None,
        buy_url: offer.buy_url,
    };
    let source = match offer.terms {
        BondYield::Fixed { annual_rate } => ReturnSource::riskless(annual_to_monthly(annual_rate)),
        BondYield::InflationLinked {
            first_year,
            inflation_premium,
        } => ReturnSource::delayed(
            vec![annual_to_monthly(first_year); INFLATION_LINKED_FIXED_MONTHS],
            ReturnSource::inflation_premium(ReturnSource::riskless(annual_to_monthly(
                inflation_premium,
            ))),
        ),
    };
    ReturnSource::annotated(metadata, source)
}

/// Forecast first, then whole years of history replayed in multi-year blocks.
fn inflation(provider: &dyn MarketDataProvider, name: &str) -> ModelResult<ReturnSource> {
    let monthly: Vec<f64> = provider
        .historical_inflation(name)?
        .range(INFLATION_HISTORY_START..)
        .flat_map(|(_, &yearly)| std::iter::repeat_n(annual_to_monthly(yearly), 12))
        .collect();
    let history = ReturnSource::risky(monthly, INFLATION_AUTOCORRELATION_MONTHS)
        .map_err(|e| ModelError::MarketData(format!("{name} inflation history: {e}")))?;
    Ok(ReturnSource::delayed(
        provider.inflation_forecast(name)?,
        history,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn market() -> Market {
        Market::build(&MarketSnapshot::from_json(SNAPSHOT_JSON).unwrap()).unwrap()
    }

    #[test]
    fn builds_every_country_with_its_ladder() {
        let market = market();
        assert_eq!(market.countries.len(), 2);
        let poland = market.country("poland").unwrap();
        assert_eq!(poland.bonds.keys().copied().collect::<Vec<_>>(), vec![3, 48]);
        assert_eq!(poland.tax_system, TaxSystem::CapitalGains { rate: 0.19 });
        assert!(market.country("netherlands").unwrap().bonds.is_empty());
        assert!(matches!(
            market.country("atlantis"),
            Err(ModelError::UnknownCountry(_))
        ));
    }

    #[test]
    fn stocks_mean_real_return_is_earnings_yield_minus_fees() {
        let market = market();
        let inflation = vec![0.0; 5];
        let expected = market.stocks.expected_returns(5, Some(&inflation)).unwrap();
        let target = annual_to_monthly(1.0 / 20.0) + annual_to_monthly(-0.0022);
        for r in expected {
            assert!((r - target).abs() < 1e-12, "expected {target}, got {r}");
        }
        assert_eq!(
            market.stocks.metadata().map(|m| m.isin.as_deref()),
            Some(Some("IE00TEST0001"))
        );
    }

    #[test]
    fn inflation_starts_with_forecast_and_skips_old_history() {
        let market = market();
        let poland = market.country("poland").unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let sampled = poland.inflation.sample_returns(40, None, &mut rng).unwrap();
        assert_eq!(&sampled[..3], &[0.004, 0.004, 0.003]);
        let allowed = [0.1, 0.055, 0.019].map(annual_to_monthly);
        assert!(sampled[3..].iter().all(|v| allowed.contains(v)));
    }

    #[test]
    fn inflation_linked_bond_fixes_first_year() {
        let market = market();
        let bond = &market.country("poland").unwrap().bonds[&48];
        let inflation = vec![0.01; 24];
        let returns = bond.expected_returns(24, Some(&inflation)).unwrap();
        assert!(returns[..12].iter().all(|&r| r == annual_to_monthly(0.065)));
        let linked = (1.0 + annual_to_monthly(0.0125)) * 1.01 - 1.0;
        assert!(returns[12..].iter().all(|r| (r - linked).abs() < 1e-12));
        assert_eq!(bond.metadata().unwrap().name, "4-year indexed bond");
    }

    #[test]
    fn bundled_snapshot_builds() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("data/market_snapshot.json");
        let market = Market::build(&MarketSnapshot::from_path(&path).unwrap()).unwrap();
        assert_eq!(
            market.country("poland").unwrap().bonds.keys().copied().collect::<Vec<_>>(),
            vec![3, 24, 48, 120]
        );
        assert!(market.country("netherlands").is_ok());
    }

    #[test]
    fn invalid_cape_is_a_market_data_error() {
        let mut snapshot = MarketSnapshot::from_json(SNAPSHOT_JSON).unwrap();
        snapshot.global_cape_ratio = 0.0;
        assert!(matches!(
            Market::build(&snapshot),
            Err(ModelError::MarketData(_))
        ));
    }
}
