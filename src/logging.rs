use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::Result;

static SUBSCRIBER: OnceLock<std::result::Result<(), String>> = OnceLock::new();

#[derive(Debug, Serialize)]
pub struct LogEvent<'a> {
    pub filename: &'a str,
    pub timestamp: DateTime<Utc>,
    pub component: &'a str,
    pub operation: &'a str,
    pub section: &'a str,
    pub line_num: u32,
    pub message: &'a str,
    pub error: Option<&'a str>,
    pub product: Option<i64>,
}

/// Install the JSON tracing subscriber.
///
/// Safe to call repeatedly; only the first call installs anything, later calls
/// report the outcome of that first attempt.
pub fn init_logging() -> Result<()> {
    let result = SUBSCRIBER.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| error.to_string())?;

        Ok(())
    });

    match result {
        Ok(()) => Ok(()),
        Err(message) => Err(anyhow!(message.clone())),
    }
}

/// Emit one structured record for a data-access operation.
///
/// Records carrying an `error` are logged at WARN, everything else at INFO.
#[allow(clippy::too_many_arguments)]
pub fn log_event(
    filename: &str,
    component: &str,
    operation: &str,
    section: &str,
    line_num: u32,
    message: &str,
    error: Option<&str>,
    product: Option<i64>,
) {
    let event = LogEvent {
        filename,
        timestamp: Utc::now(),
        component,
        operation,
        section,
        line_num,
        message,
        error,
        product,
    };

    match (serde_json::to_string(&event), error) {
        (Ok(serialized), None) => info!(target: "dsfut", json = %serialized),
        (Ok(serialized), Some(_)) => warn!(target: "dsfut", json = %serialized),
        (Err(_), None) => info!(target: "dsfut", message),
        (Err(_), Some(error)) => warn!(target: "dsfut", message, error),
    }
}
