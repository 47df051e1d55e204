mod country;
mod engine;
mod error;
mod monte_carlo;
mod portfolio;
mod returns;
mod tax;
mod trajectory;
mod types;

pub use country::{BANK_ACCOUNT_NAME, Country, User, bank_account};
pub use engine::run_projection;
pub use error::{ModelError, ModelResult};
pub use monte_carlo::{AggregateTrajectory, derive_seed, quantile_of, sample_trajectories};
pub use portfolio::{Component, Portfolio};
pub use returns::{InstrumentMetadata, ReturnSource, annual_to_monthly, prices_to_returns};
pub use tax::{TaxSystem, monthly_wealth_tax};
pub use trajectory::{Trajectory, cumulative_contributions, months_to_goal, years_to_goal};
pub use types::{AllocationResult, BandResult, Projection, SimulationConfig};
