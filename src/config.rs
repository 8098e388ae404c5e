use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::error::AppError;
use crate::models::driver::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub data_dir: PathBuf,
    pub service_timezone: Tz,
    pub payment_cutoff: NaiveTime,
    pub admin_ids: HashSet<Identity>,
    pub event_buffer_size: usize,
    pub notification_queue_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            data_dir: PathBuf::from("data"),
            service_timezone: chrono_tz::America::Bogota,
            payment_cutoff: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or(NaiveTime::MIN),
            admin_ids: HashSet::new(),
            event_buffer_size: 1024,
            notification_queue_size: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: match env::var("LOG_FORMAT") {
                Ok(raw) => parse_log_format(&raw)?,
                Err(_) => defaults.log_format,
            },
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            service_timezone: parse_or_default("SERVICE_TIMEZONE", defaults.service_timezone)?,
            payment_cutoff: match env::var("PAYMENT_CUTOFF") {
                Ok(raw) => parse_cutoff(&raw)?,
                Err(_) => defaults.payment_cutoff,
            },
            admin_ids: env::var("ADMIN_IDS")
                .map(|raw| parse_admin_ids(&raw))
                .unwrap_or(defaults.admin_ids),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            notification_queue_size: parse_or_default(
                "NOTIFICATION_QUEUE_SIZE",
                defaults.notification_queue_size,
            )?,
        })
    }
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

fn parse_log_format(raw: &str) -> Result<LogFormat, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "compact" => Ok(LogFormat::Compact),
        "json" => Ok(LogFormat::Json),
        other => Err(AppError::Internal(format!(
            "invalid LOG_FORMAT: {other}, expected compact/json"
        ))),
    }
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_cutoff(raw: &str) -> Result<NaiveTime, AppError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|err| AppError::Internal(format!("invalid PAYMENT_CUTOFF {raw:?}: {err}")))
}

pub fn parse_admin_ids(raw: &str) -> HashSet<Identity> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(Identity::from)
        .collect()
}
