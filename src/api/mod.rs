use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::core::{ModelError, ModelResult, SimulationConfig, TaxSystem, User, run_projection};
use crate::market::{Market, MarketCache, MarketSnapshot};

#[derive(Parser, Debug)]
#[command(
    name = "hypofin",
    about = "Monte Carlo savings projector (stocks + bond ladder + bank account, after tax)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve projections over HTTP.
    Serve(ServeArgs),
    /// Run a single projection and print it as JSON.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    #[arg(long, default_value = "data/market_snapshot.json")]
    pub snapshot: PathBuf,
    #[arg(long, default_value = "poland")]
    pub default_country: String,
    #[arg(long, default_value_t = 600, help = "Projection horizon in months")]
    pub horizon_months: usize,
    #[arg(long, default_value_t = 1024)]
    pub samples: usize,
    #[arg(long, default_value_t = 256)]
    pub bank_samples: usize,
    #[arg(long, default_value_t = 64, help = "Sampled paths returned as examples")]
    pub examples: usize,
    #[arg(long, help = "Fixed base seed; a fresh one is drawn per projection when absent")]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[arg(long, default_value_t = 24, help = "Hours before market data is rebuilt")]
    pub cache_ttl_hours: u64,
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(long)]
    pub current_savings: f64,
    #[arg(long)]
    pub monthly_savings: f64,
    #[arg(long)]
    pub goal_price: f64,
    #[arg(long, help = "Share of stocks in percent, 0 to 100")]
    pub risk_preference: f64,
    #[arg(long)]
    pub country: Option<String>,
    #[arg(
        long,
        conflicts_with = "wealth_tax",
        help = "Override with a capital gains tax, in percent"
    )]
    pub capital_gains_tax: Option<f64>,
    #[arg(long, help = "Override with a yearly wealth tax, in percent")]
    pub wealth_tax: Option<f64>,
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SimulatePayload {
    current_savings: Option<f64>,
    monthly_savings: Option<f64>,
    goal_price: Option<f64>,
    risk_preference: Option<f64>,
    country: Option<String>,
    tax_system: Option<TaxSystem>,
}

/// A projection request with every field resolved.
#[derive(Debug, Clone, PartialEq)]
struct UserRequest {
    current_savings: f64,
    monthly_savings: f64,
    goal_price: f64,
    risk_preference: f64,
    country: String,
    tax_system: Option<TaxSystem>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    cache: Arc<MarketCache<MarketSnapshot>>,
    config: SimulationConfig,
    seed: Option<u64>,
    default_country: Arc<str>,
}

impl AppState {
    fn request_config(&self) -> SimulationConfig {
        with_seed(self.config, self.seed)
    }
}

fn with_seed(config: SimulationConfig, seed: Option<u64>) -> SimulationConfig {
    SimulationConfig {
        seed: seed.unwrap_or_else(rand::random),
        ..config
    }
}

fn simulation_config(args: &EngineArgs) -> Result<SimulationConfig, String> {
    if args.horizon_months == 0 {
        return Err("--horizon-months must be > 0".to_string());
    }
    if args.samples == 0 {
        return Err("--samples must be > 0".to_string());
    }
    if args.bank_samples == 0 {
        return Err("--bank-samples must be > 0".to_string());
    }
    Ok(SimulationConfig {
        horizon_months: args.horizon_months,
        investment_samples: args.samples,
        bank_samples: args.bank_samples,
        example_count: args.examples,
        seed: args.seed.unwrap_or_default(),
    })
}

fn request_from_args(args: &SimulateArgs) -> Result<UserRequest, String> {
    let tax_system = match (args.capital_gains_tax, args.wealth_tax) {
        (Some(rate), None) => Some(TaxSystem::CapitalGains { rate: rate / 100.0 }),
        (None, Some(rate)) => Some(TaxSystem::Wealth {
            annual_rate: rate / 100.0,
        }),
        (None, None) => None,
        (Some(_), Some(_)) => {
            return Err("--capital-gains-tax and --wealth-tax are exclusive".to_string());
        }
    };
    Ok(UserRequest {
        current_savings: args.current_savings,
        monthly_savings: args.monthly_savings,
        goal_price: args.goal_price,
        risk_preference: args.risk_preference,
        country: args
            .country
            .clone()
            .unwrap_or_else(|| args.engine.default_country.clone()),
        tax_system,
    })
}

fn request_from_json(json: &str, default_country: &str) -> Result<UserRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid JSON payload: {e}"))?;
    request_from_payload(payload, default_country)
}

fn request_from_payload(
    payload: SimulatePayload,
    default_country: &str,
) -> Result<UserRequest, String> {
    let required = |value: Option<f64>, name: &str| value.ok_or(format!("{name} is required"));
    Ok(UserRequest {
        current_savings: required(payload.current_savings, "current_savings")?,
        monthly_savings: required(payload.monthly_savings, "monthly_savings")?,
        goal_price: required(payload.goal_price, "goal_price")?,
        risk_preference: required(payload.risk_preference, "risk_preference")?,
        country: payload
            .country
            .unwrap_or_else(|| default_country.to_string()),
        tax_system: payload.tax_system,
    })
}

fn build_user(request: &UserRequest, market: &Market) -> ModelResult<User> {
    let country = market.country(&request.country)?.clone();
    let user = User::new(
        request.current_savings,
        request.monthly_savings,
        request.goal_price,
        request.risk_preference,
        country,
    )?;
    match request.tax_system {
        Some(tax_system) => user.with_tax_system(tax_system),
        None => Ok(user),
    }
}

fn status_for(err: &ModelError) -> StatusCode {
    match err {
        ModelError::InvalidInput(_) | ModelError::UnknownCountry(_) => StatusCode::BAD_REQUEST,
        ModelError::MarketData(_) => StatusCode::SERVICE_UNAVAILABLE,
        ModelError::LengthMismatch { .. }
        | ModelError::MissingInflation
        | ModelError::InvalidWeights(_)
        | ModelError::NumericalDomain { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Runs one projection from the command line and renders it as pretty JSON.
pub fn run_simulation(args: SimulateArgs) -> Result<String, String> {
    let config = with_seed(simulation_config(&args.engine)?, args.engine.seed);
    let request = request_from_args(&args)?;
    let snapshot = MarketSnapshot::from_path(&args.engine.snapshot).map_err(|e| e.to_string())?;
    let market = Market::build(&snapshot).map_err(|e| e.to_string())?;
    let user = build_user(&request, &market).map_err(|e| e.to_string())?;
    let projection =
        run_projection(&user, &market.stocks, &config).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&projection).map_err(|e| e.to_string())
}

pub async fn run_http_server(args: ServeArgs) -> std::io::Result<()> {
    let config = simulation_config(&args.engine).map_err(std::io::Error::other)?;
    let snapshot = MarketSnapshot::from_path(&args.engine.snapshot)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let cache = MarketCache::new(snapshot, Duration::from_secs(args.cache_ttl_hours * 3600));
    let market = cache
        .current()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    if market.country(&args.engine.default_country).is_err() {
        return Err(std::io::Error::other(format!(
            "default country {} is not in the market snapshot",
            args.engine.default_country
        )));
    }

    let state = AppState {
        cache: Arc::new(cache),
        config,
        seed: args.engine.seed,
        default_country: args.engine.default_country.as_str().into(),
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    log::info!("hypofin HTTP API listening on http://{addr}");
    log::info!("Local access: http://127.0.0.1:{}/", args.port);

    axum::serve(listener, router(state)).await
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(projection_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn projection_handler(State(state): State<AppState>, body: String) -> Response {
    let request = match request_from_json(&body, &state.default_country) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let config = state.request_config();
    let cache = Arc::clone(&state.cache);
    let outcome = tokio::task::spawn_blocking(move || {
        let market = cache.current()?;
        let user = build_user(&request, &market)?;
        run_projection(&user, &market.stocks, &config)
    })
    .await;

    match outcome {
        Ok(Ok(projection)) => json_response(StatusCode::OK, projection),
        Ok(Err(err)) => {
            let status = status_for(&err);
            if status.is_server_error() {
                log::error!("projection failed: {err}");
            } else {
                log::warn!("rejected projection request: {err}");
            }
            error_response(status, &err.to_string())
        }
        Err(join_error) => {
            log::error!("projection task did not complete: {join_error}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Projection failed")
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::SNAPSHOT_JSON;
    use serde_json::Value;

    fn market() -> Market {
        Market::build(&MarketSnapshot::from_json(SNAPSHOT_JSON).unwrap()).unwrap()
    }

    fn state() -> AppState {
        AppState {
            cache: Arc::new(MarketCache::new(
                MarketSnapshot::from_json(SNAPSHOT_JSON).unwrap(),
                Duration::from_secs(3600),
            )),
            config: SimulationConfig {
                horizon_months: 60,
                investment_samples: 32,
                bank_samples: 8,
                example_count: 4,
                seed: 0,
            },
            seed: Some(11),
            default_country: "poland".into(),
        }
    }

    fn sample_args() -> SimulateArgs {
        SimulateArgs {
            current_savings: 1_000.0,
            monthly_savings: 100.0,
            goal_price: 5_000.0,
            risk_preference: 40.0,
            country: None,
            capital_gains_tax: None,
            wealth_tax: None,
            engine: EngineArgs {
                snapshot: PathBuf::from("data/market_snapshot.json"),
                default_country: "netherlands".to_string(),
                horizon_months: 600,
                samples: 1024,
                bank_samples: 256,
                examples: 64,
                seed: None,
            },
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn request_from_json_parses_fields_and_tax_override() {
        let request = request_from_json(
            r#"{"current_savings": 1000, "monthly_savings": 150.5, "goal_price": 20000,
                "risk_preference": 35, "country": "netherlands",
                "tax_system": {"type": "capital_gains", "rate": 0.1}}"#,
            "poland",
        )
        .unwrap();
        assert_eq!(
            request,
            UserRequest {
                current_savings: 1_000.0,
                monthly_savings: 150.5,
                goal_price: 20_000.0,
                risk_preference: 35.0,
                country: "netherlands".to_string(),
                tax_system: Some(TaxSystem::CapitalGains { rate: 0.1 }),
            }
        );
    }

    #[test]
    fn request_from_json_uses_default_country() {
        let request = request_from_json(
            r#"{"current_savings": 0, "monthly_savings": 10, "goal_price": 100, "risk_preference": 0}"#,
            "poland",
        )
        .unwrap();
        assert_eq!(request.country, "poland");
        assert_eq!(request.tax_system, None);
    }

    #[test]
    fn request_from_json_rejects_missing_and_malformed_fields() {
        let err = request_from_json(
            r#"{"current_savings": 0, "monthly_savings": 10, "risk_preference": 0}"#,
            "poland",
        )
        .unwrap_err();
        assert_eq!(err, "goal_price is required");
        assert!(
            request_from_json(r#"{"current_savings": "lots"}"#, "poland")
                .unwrap_err()
                .starts_with("Invalid JSON payload")
        );
    }

    #[test]
    fn request_from_args_converts_percent_tax_override() {
        let mut args = sample_args();
        args.wealth_tax = Some(1.2);
        let request = request_from_args(&args).unwrap();
        assert_eq!(request.country, "netherlands");
        match request.tax_system {
            Some(TaxSystem::Wealth { annual_rate }) => assert!((annual_rate - 0.012).abs() < 1e-12),
            other => panic!("expected wealth tax, got {other:?}"),
        }
    }

    #[test]
    fn simulation_config_rejects_empty_runs() {
        let mut args = sample_args();
        args.engine.samples = 0;
        assert!(simulation_config(&args.engine).is_err());
        args.engine.samples = 10;
        args.engine.horizon_months = 0;
        assert!(simulation_config(&args.engine).is_err());
    }

    #[test]
    fn build_user_applies_country_and_override() {
        let market = market();
        let mut request = request_from_args(&sample_args()).unwrap();
        request.country = "poland".to_string();
        let user = build_user(&request, &market).unwrap();
        assert_eq!(user.tax_system, TaxSystem::CapitalGains { rate: 0.19 });

        request.tax_system = Some(TaxSystem::Wealth { annual_rate: 0.01 });
        let user = build_user(&request, &market).unwrap();
        assert_eq!(user.tax_system, TaxSystem::Wealth { annual_rate: 0.01 });

        request.country = "atlantis".to_string();
        assert_eq!(
            build_user(&request, &market).unwrap_err(),
            ModelError::UnknownCountry("atlantis".to_string())
        );
    }

    #[test]
    fn errors_map_to_status_codes() {
        assert_eq!(
            status_for(&ModelError::InvalidInput("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ModelError::UnknownCountry("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ModelError::MarketData("down".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&ModelError::NumericalDomain {
                operation: "compounding",
                month: 3
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn projection_response_contains_expected_fields() {
        let body = r#"{"current_savings": 1000, "monthly_savings": 200, "goal_price": 6000, "risk_preference": 50}"#;
        let response = projection_handler(State(state()), body.to_string()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CACHE_CONTROL)
                .unwrap()
                .to_str()
                .unwrap(),
            "no-store"
        );

        let json = body_json(response).await;
        assert_eq!(json["strata"].as_array().unwrap().len(), 3);
        assert_eq!(json["strata"][0]["scenario_id"], "average");
        assert_eq!(json["bank_variant"]["scenario_id"], "bank");
        assert!(json["bank_variant"]["probability"].is_number());
        assert_eq!(json["example_evolutions"].as_array().unwrap().len(), 4);
        let allocation = json["allocation"].as_array().unwrap();
        assert_eq!(allocation.len(), 2);
        assert_eq!(allocation[1]["name"], "World equity ETF");
        assert_eq!(allocation[1]["isin"], "IE00TEST0001");
        assert!(allocation[0]["current_fraction"].is_number());
    }

    #[tokio::test]
    async fn invalid_requests_get_json_errors() {
        let response = projection_handler(
            State(state()),
            r#"{"current_savings": 1000, "monthly_savings": 200, "goal_price": 6000, "risk_preference": 150}"#
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(
            body_json(response).await["error"]
                .as_str()
                .unwrap()
                .contains("risk_preference")
        );

        let response = projection_handler(State(state()), "not json".to_string()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fixed_seed_gives_identical_responses() {
        let body = r#"{"current_savings": 500, "monthly_savings": 50, "goal_price": 3000, "risk_preference": 80, "country": "netherlands"}"#;
        let a = body_json(projection_handler(State(state()), body.to_string()).await).await;
        let b = body_json(projection_handler(State(state()), body.to_string()).await).await;
        assert_eq!(a, b);
    }
}
