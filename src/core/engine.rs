use super::country::User;
use super::error::{ModelError, ModelResult};
use super::monte_carlo::{AggregateTrajectory, sample_trajectories};
use super::returns::{InstrumentMetadata, ReturnSource};
use super::types::{AllocationResult, BandResult, Projection, SimulationConfig};

const BANK_STREAM: u32 = 0;
const PORTFOLIO_STREAM: u32 = 1;

/// Projects the user's savings: percentile bands, the bank alternative, example paths
/// and how the money should be split.
pub fn run_projection(
    user: &User,
    stocks: &ReturnSource,
    config: &SimulationConfig,
) -> ModelResult<Projection> {
    if config.horizon_months == 0 {
        return Err(ModelError::InvalidInput(
            "horizon must be at least one month".to_string(),
        ));
    }
    let horizon = config.horizon_months;
    let goal = user.goal_price;
    let portfolio = user.portfolio(stocks, horizon)?;

    let bank_samples = sample_trajectories(config.bank_samples, config.seed, BANK_STREAM, |rng| {
        user.sample_bank_trajectory(horizon, rng)
    })?;
    let bank = AggregateTrajectory::from_samples("bank", &bank_samples, 0.5)?;

    // A goal met from the start still carries a default risk over the whole horizon.
    let default_window = bank
        .months_to_goal(goal)
        .filter(|&months| months > 0)
        .unwrap_or(horizon);
    let worst_quantile = user.country.default_probability(default_window);

    let samples = sample_trajectories(
        config.investment_samples,
        config.seed,
        PORTFOLIO_STREAM,
        |rng| user.sample_trajectory(&portfolio, horizon, rng),
    )?;
    let bands = [
        AggregateTrajectory::from_samples("average", &samples, 0.5)?,
        AggregateTrajectory::from_samples("pessimistic", &samples, 0.25)?,
        AggregateTrajectory::from_samples("worst", &samples, worst_quantile)?,
    ];

    let relevant_months = relevant_months(&bands, goal, horizon);
    log::info!(
        "projection for {}: goal {goal:.2}, bank arrival {:?}, worst-case quantile {worst_quantile:.4}, relevant months {relevant_months}",
        user.country.name,
        bank.months_to_goal(goal),
    );

    let strata = bands
        .iter()
        .map(|band| band_result(band, goal, relevant_months))
        .collect();
    let bank_variant = band_result(&bank, goal, relevant_months);

    let example_evolutions = samples
        .into_iter()
        .take(config.example_count)
        .map(|sample| sample.into_savings())
        .collect();

    let components = portfolio.components();
    let allocation = components
        .iter()
        .map(|component| {
            let instrument = component
                .source
                .metadata()
                .cloned()
                .unwrap_or_else(|| InstrumentMetadata::named("Unnamed instrument"));
            AllocationResult {
                instrument,
                current_fraction: component.weight,
                current_amount: user.current_savings * component.weight,
                monthly_fraction: component.weight,
                monthly_amount: user.monthly_savings * component.weight,
            }
        })
        .collect();

    Ok(Projection {
        strata,
        bank_variant,
        example_evolutions,
        allocation,
    })
}

/// Latest goal arrival across the bands, or the full horizon if any band never arrives.
fn relevant_months(bands: &[AggregateTrajectory], goal: f64, horizon: usize) -> usize {
    bands
        .iter()
        .map(|band| band.months_to_goal(goal))
        .collect::<Option<Vec<_>>>()
        .and_then(|months| months.into_iter().max())
        .unwrap_or(horizon)
}

fn band_result(band: &AggregateTrajectory, goal: f64, relevant_months: usize) -> BandResult {
    let keep = (relevant_months + 1).min(band.savings.len());
    BandResult {
        scenario_id: band.scenario_id.clone(),
        probability: band.probability(),
        months_to_goal: band.months_to_goal(goal),
        years_to_goal: band.years_to_goal(goal),
        trajectory: band.savings[..keep].to_vec(),
    }
}
