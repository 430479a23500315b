use std::env;
use std::time::Duration;

use crate::animation::spring::SpringConfig;
use crate::engine::reconciler::RetryPolicy;
use crate::error::AppError;
use crate::routing::google::DEFAULT_DIRECTIONS_URL;
use crate::state::EngineSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub directions_api_key: String,
    pub directions_base_url: String,
    pub tick_interval_ms: u64,
    pub simulation_speed: f64,
    pub completion_retry_attempts: u32,
    pub completion_retry_backoff_ms: u64,
    pub marker_frame_ms: u64,
    pub spring_mass: f64,
    pub spring_stiffness: f64,
    pub spring_damping: Option<f64>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            directions_api_key: env::var("DIRECTIONS_API_KEY")
                .map_err(|_| AppError::Internal("DIRECTIONS_API_KEY is required".to_string()))?,
            directions_base_url: env::var("DIRECTIONS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_DIRECTIONS_URL.to_string()),
            tick_interval_ms: parse_or_default("TICK_INTERVAL_MS", 1000)?,
            simulation_speed: parse_or_default("SIMULATION_SPEED", 1.0)?,
            completion_retry_attempts: parse_or_default("COMPLETION_RETRY_ATTEMPTS", 3)?,
            completion_retry_backoff_ms: parse_or_default("COMPLETION_RETRY_BACKOFF_MS", 250)?,
            marker_frame_ms: parse_or_default("MARKER_FRAME_MS", 50)?,
            spring_mass: parse_or_default("SPRING_MASS", 1.0)?,
            spring_stiffness: parse_or_default("SPRING_STIFFNESS", 50.0)?,
            spring_damping: parse_optional("SPRING_DAMPING")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.tick_interval_ms == 0 || self.marker_frame_ms == 0 {
            return Err(AppError::Internal(
                "TICK_INTERVAL_MS and MARKER_FRAME_MS must be positive".to_string(),
            ));
        }
        if self.completion_retry_attempts == 0 {
            return Err(AppError::Internal(
                "COMPLETION_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if !(self.spring_mass > 0.0 && self.spring_stiffness > 0.0) {
            return Err(AppError::Internal(
                "SPRING_MASS and SPRING_STIFFNESS must be positive".to_string(),
            ));
        }
        if self.spring_damping.is_some_and(|damping| !(damping > 0.0)) {
            return Err(AppError::Internal("SPRING_DAMPING must be positive".to_string()));
        }
        crate::engine::simulation::validate_speed(self.simulation_speed)
            .map_err(|err| AppError::Internal(format!("invalid SIMULATION_SPEED: {err}")))?;
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let spring = match self.spring_damping {
            Some(damping) => SpringConfig {
                mass: self.spring_mass,
                damping,
                stiffness: self.spring_stiffness,
            },
            None => SpringConfig::critically_damped(self.spring_mass, self.spring_stiffness),
        };

        EngineSettings {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            default_speed: self.simulation_speed,
            completion_retry: RetryPolicy {
                attempts: self.completion_retry_attempts,
                backoff: Duration::from_millis(self.completion_retry_backoff_ms),
            },
            marker_frame_interval: Duration::from_millis(self.marker_frame_ms),
            spring,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}
