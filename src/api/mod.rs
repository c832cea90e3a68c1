use axum::{
    Router,
    extract::{
        Json, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Datelike;
use clap::{Parser, error::ErrorKind};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::core::{FiresResult, Parameters, simulate};

pub const DEFAULT_YEARS_DURATION: i64 = 30;
pub const DEFAULT_PORTFOLIO_PERCENTAGE: f64 = 10.0;
pub const DEFAULT_INFLATION_PERCENTAGE: f64 = 2.0;
pub const DEFAULT_MAX_WITHDRAWAL_PERCENTAGE: f64 = 4.0;

const MIN_BIRTH_YEAR: i64 = 1900;
const MAX_BIRTH_YEAR: i64 = 2021;
const MAX_YEARS_DURATION: i64 = 99;
const MIN_WITHDRAWAL_PERCENTAGE: f64 = 1.0;
const MAX_WITHDRAWAL_PERCENTAGE: f64 = 10.0;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("{field} {message}")]
    InvalidRange {
        field: &'static str,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidPayload(_)
            | ApiError::MissingField { .. }
            | ApiError::InvalidRange { .. } => {
                tracing::warn!(error = %self, "rejected calculation request");
                StatusCode::BAD_REQUEST
            }
            ApiError::Serialization(_) => {
                tracing::error!(error = %self, "failed to serialize response");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, &self.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CalculatePayload {
    birth_year: Option<i64>,
    years_duration: Option<i64>,
    currency: Option<String>,
    income_gross_per_year: Option<i64>,
    expenses_per_year: Option<i64>,
    portfolio_value: Option<i64>,
    portfolio_percentage_per_year: Option<f64>,
    inflation_percentage_per_year: Option<f64>,
    max_withdrawal_percentage_per_year: Option<f64>,
}

#[derive(Parser, Debug)]
#[command(
    name = "fires calculate",
    about = "Find the month a growing portfolio covers inflating expenses at a safe withdrawal rate"
)]
pub struct Cli {
    #[arg(long, help = "Year of birth, 1900 through 2021")]
    birth_year: i64,
    #[arg(
        long,
        default_value_t = DEFAULT_YEARS_DURATION,
        help = "Years of retirement to keep simulating for the graphs"
    )]
    years_duration: i64,
    #[arg(long, help = "Three-letter currency code, carried through unchanged")]
    currency: String,
    #[arg(long, allow_negative_numbers = true)]
    income_gross_per_year: i64,
    #[arg(long, allow_negative_numbers = true)]
    expenses_per_year: i64,
    #[arg(long, allow_negative_numbers = true)]
    portfolio_value: i64,
    #[arg(
        long,
        allow_negative_numbers = true,
        default_value_t = DEFAULT_PORTFOLIO_PERCENTAGE,
        help = "Expected annual portfolio return in percent"
    )]
    portfolio_percentage_per_year: f64,
    #[arg(
        long,
        allow_negative_numbers = true,
        default_value_t = DEFAULT_INFLATION_PERCENTAGE,
        help = "Expected annual inflation in percent"
    )]
    inflation_percentage_per_year: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_WITHDRAWAL_PERCENTAGE,
        help = "Safe withdrawal rate in percent per year"
    )]
    max_withdrawal_percentage_per_year: f64,
    #[arg(long, help = "Year used for the age calculation; defaults to the current year")]
    current_year: Option<i32>,
}

#[derive(Debug, Serialize)]
struct CalculateResponse {
    #[serde(flatten)]
    parameters: Parameters,
    fires_calculate_result: FiresResult,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn build_parameters(cli: &Cli) -> Result<Parameters, ApiError> {
    let birth_year = int_in_range("birth_year", cli.birth_year, MIN_BIRTH_YEAR, MAX_BIRTH_YEAR)?;
    let years_duration =
        int_in_range("years_duration", cli.years_duration, 1, MAX_YEARS_DURATION)?;
    let currency = cli.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApiError::InvalidRange {
            field: "currency",
            message: "must be a three-letter code".to_string(),
        });
    }
    for (field, rate) in [
        ("portfolio_percentage_per_year", cli.portfolio_percentage_per_year),
        ("inflation_percentage_per_year", cli.inflation_percentage_per_year),
    ] {
        if !(-100.0..=100.0).contains(&rate) {
            return Err(ApiError::InvalidRange {
                field,
                message: "must be between -100 and 100".to_string(),
            });
        }
    }
    if !(MIN_WITHDRAWAL_PERCENTAGE..=MAX_WITHDRAWAL_PERCENTAGE)
        .contains(&cli.max_withdrawal_percentage_per_year)
    {
        return Err(ApiError::InvalidRange {
            field: "max_withdrawal_percentage_per_year",
            message: format!(
                "must be between {MIN_WITHDRAWAL_PERCENTAGE} and {MAX_WITHDRAWAL_PERCENTAGE}"
            ),
        });
    }

    Ok(Parameters {
        birth_year: birth_year as i32,
        years_duration: years_duration as u32,
        currency: currency.to_string(),
        income_gross_per_year: non_negative("income_gross_per_year", cli.income_gross_per_year)?,
        expenses_per_year: non_negative("expenses_per_year", cli.expenses_per_year)?,
        portfolio_value: non_negative("portfolio_value", cli.portfolio_value)?,
        portfolio_percentage_per_year: cli.portfolio_percentage_per_year,
        inflation_percentage_per_year: cli.inflation_percentage_per_year,
        max_withdrawal_percentage_per_year: cli.max_withdrawal_percentage_per_year,
    })
}

fn int_in_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<i64, ApiError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::InvalidRange {
            field,
            message: format!("must be between {min} and {max}"),
        })
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, ApiError> {
    u64::try_from(value).map_err(|_| ApiError::InvalidRange {
        field,
        message: "must be >= 0".to_string(),
    })
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, ApiError> {
    value.ok_or(ApiError::MissingField { field })
}

/// Runs one calculation from command-line arguments and returns the response JSON.
pub fn run_cli<I, T>(args: I) -> Result<String, ApiError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => ApiError::InvalidPayload(e.to_string()),
    })?;
    let parameters = build_parameters(&cli)?;
    let year = cli.current_year.unwrap_or_else(current_year);
    let response = calculate(parameters, year);
    Ok(serde_json::to_string_pretty(&response)?)
}

pub fn app() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/fires/calculate",
            get(calculate_get_handler).post(calculate_post_handler),
        )
        .route(
            "/api/fires/calculate/",
            get(calculate_get_handler).post(calculate_post_handler),
        )
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "FIRES HTTP API listening");
    tracing::info!("Local access: http://127.0.0.1:{port}/api/fires/calculate/");
    axum::serve(listener, app()).await
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn calculate_get_handler(
    payload: Result<Query<CalculatePayload>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(payload) = payload.map_err(|e| ApiError::InvalidPayload(e.body_text()))?;
    calculate_handler_impl(payload)
}

async fn calculate_post_handler(
    payload: Result<Json<CalculatePayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::InvalidPayload(e.body_text()))?;
    calculate_handler_impl(payload)
}

fn calculate_handler_impl(payload: CalculatePayload) -> Result<Response, ApiError> {
    let parameters = parameters_from_payload(payload)?;
    let response = calculate(parameters, current_year());
    Ok(json_response(StatusCode::OK, response))
}

fn calculate(parameters: Parameters, current_year: i32) -> CalculateResponse {
    let result = simulate(&parameters, current_year);
    tracing::info!(
        currency = %parameters.currency,
        months = ?result.months,
        age = ?result.age,
        pension_started = result.pension_started,
        graph_months = result.graph_months.len(),
        graph_years = result.graph_years.len(),
        "calculation finished"
    );
    CalculateResponse {
        parameters,
        fires_calculate_result: result,
    }
}

fn current_year() -> i32 {
    chrono::Local::now().year()
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
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
fn parameters_from_json(json: &str) -> Result<Parameters, ApiError> {
    let payload = serde_json::from_str::<CalculatePayload>(json)
        .map_err(|e| ApiError::InvalidPayload(format!("Invalid API JSON payload: {e}")))?;
    parameters_from_payload(payload)
}

fn parameters_from_payload(payload: CalculatePayload) -> Result<Parameters, ApiError> {
    let cli = Cli {
        birth_year: required(payload.birth_year, "birth_year")?,
        years_duration: payload.years_duration.unwrap_or(DEFAULT_YEARS_DURATION),
        currency: required(payload.currency, "currency")?,
        income_gross_per_year: required(payload.income_gross_per_year, "income_gross_per_year")?,
        expenses_per_year: required(payload.expenses_per_year, "expenses_per_year")?,
        portfolio_value: required(payload.portfolio_value, "portfolio_value")?,
        portfolio_percentage_per_year: payload
            .portfolio_percentage_per_year
            .unwrap_or(DEFAULT_PORTFOLIO_PERCENTAGE),
        inflation_percentage_per_year: payload
            .inflation_percentage_per_year
            .unwrap_or(DEFAULT_INFLATION_PERCENTAGE),
        max_withdrawal_percentage_per_year: payload
            .max_withdrawal_percentage_per_year
            .unwrap_or(DEFAULT_MAX_WITHDRAWAL_PERCENTAGE),
        current_year: None,
    };
    build_parameters(&cli)
}
