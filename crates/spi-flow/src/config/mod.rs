use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::cases::{AnalysisPolicy, PricingPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: EngineConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Pricing and document-analysis dials consumed by the case engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub pricing: PricingPolicy,
    pub analysis: AnalysisPolicy,
}

impl EngineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let deadline_window_days =
            env_number("APP_DEADLINE_WINDOW_DAYS", defaults.pricing.deadline_window_days)?;
        let early_discount_percent =
            env_number("APP_EARLY_DISCOUNT_PERCENT", defaults.pricing.early_discount_percent)?;
        let early_window_fraction =
            env_number("APP_EARLY_WINDOW_FRACTION", defaults.pricing.early_window_fraction)?;
        let late_surcharge_flat =
            env_number("APP_LATE_SURCHARGE_FLAT", defaults.pricing.late_surcharge_flat)?;

        if deadline_window_days <= 0 {
            return Err(ConfigError::InvalidSetting {
                key: "APP_DEADLINE_WINDOW_DAYS",
                reason: "must be at least one day",
            });
        }
        if early_discount_percent > 100 {
            return Err(ConfigError::InvalidSetting {
                key: "APP_EARLY_DISCOUNT_PERCENT",
                reason: "must be between 0 and 100",
            });
        }
        if !(0.0..=1.0).contains(&early_window_fraction) {
            return Err(ConfigError::InvalidSetting {
                key: "APP_EARLY_WINDOW_FRACTION",
                reason: "must be between 0.0 and 1.0",
            });
        }

        let min_confidence =
            env_number("APP_ANALYSIS_MIN_CONFIDENCE", defaults.analysis.min_confidence)?;
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(ConfigError::InvalidSetting {
                key: "APP_ANALYSIS_MIN_CONFIDENCE",
                reason: "must be between 0.0 and 1.0",
            });
        }

        let timeout_ms = env_number(
            "APP_ANALYSIS_TIMEOUT_MS",
            defaults.analysis.timeout.as_millis() as u64,
        )?;
        let max_attempts =
            env_number("APP_ANALYSIS_MAX_ATTEMPTS", defaults.analysis.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "APP_ANALYSIS_MAX_ATTEMPTS",
                reason: "must allow at least one attempt",
            });
        }
        let backoff_ms = env_number(
            "APP_ANALYSIS_BACKOFF_MS",
            defaults.analysis.initial_backoff.as_millis() as u64,
        )?;

        Ok(Self {
            pricing: PricingPolicy {
                deadline_window_days,
                early_discount_percent,
                early_window_fraction,
                late_surcharge_flat,
            },
            analysis: AnalysisPolicy {
                min_confidence,
                timeout: Duration::from_millis(timeout_ms),
                max_attempts,
                initial_backoff: Duration::from_millis(backoff_ms),
            },
        })
    }
}

fn env_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidSetting { key: &'static str, reason: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => write!(f, "{key} must be a number"),
            ConfigError::InvalidSetting { key, reason } => write!(f, "{key} {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidSetting { .. } => None,
        }
    }
}
