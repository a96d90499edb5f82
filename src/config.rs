use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub order_queue_size: usize,
    pub dispatch: DispatchConfig,
}

/// Tuning knobs for the matching engine itself, separate from server wiring
/// so tests can construct an engine without touching the environment.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Search radii in km, tried in order until a candidate is found.
    pub search_radii_km: Vec<f64>,
    /// Wait before retrying at the next radius, giving drivers time to
    /// come online or finish trips.
    pub radius_wait: Duration,
    /// How long a driver has to answer an offer before the sweep reclaims it.
    pub offer_timeout: chrono::Duration,
    /// Interval of the periodic timeout sweep.
    pub sweep_interval: Duration,
    /// Run radius retries without the wait (single code path, no queue).
    pub inline_retries: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            search_radii_km: vec![5.0, 10.0, 15.0, 20.0],
            radius_wait: Duration::from_secs(10),
            offer_timeout: chrono::Duration::seconds(300),
            sweep_interval: Duration::from_secs(5),
            inline_retries: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = DispatchConfig::default();

        let search_radii_km = match env::var("SEARCH_RADII_KM") {
            Ok(raw) => parse_radii(&raw)?,
            Err(_) => defaults.search_radii_km,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            order_queue_size: parse_or_default("ORDER_QUEUE_SIZE", 1024)?,
            dispatch: DispatchConfig {
                search_radii_km,
                radius_wait: Duration::from_secs(parse_or_default("RADIUS_WAIT_SECS", 10)?),
                offer_timeout: chrono::Duration::seconds(parse_or_default(
                    "OFFER_TIMEOUT_SECS",
                    300,
                )?),
                sweep_interval: Duration::from_secs(parse_or_default("SWEEP_INTERVAL_SECS", 5)?),
                inline_retries: parse_or_default("INLINE_RETRIES", false)?,
            },
        })
    }
}

fn parse_radii(raw: &str) -> Result<Vec<f64>, AppError> {
    let radii = raw
        .split(',')
        .map(|item| {
            item.trim()
                .parse::<f64>()
                .map_err(|err| AppError::Internal(format!("invalid SEARCH_RADII_KM: {err}")))
        })
        .collect::<Result<Vec<f64>, AppError>>()?;

    if radii.is_empty() || radii.iter().any(|radius| *radius <= 0.0) {
        return Err(AppError::Internal(
            "SEARCH_RADII_KM must be a non-empty list of positive numbers".to_string(),
        ));
    }

    Ok(radii)
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
