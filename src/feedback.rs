//! User-visible feedback sinks.
//!
//! The crate reports every success and failure transition through
//! [`UserFeedback`]; the hosting application decides how to show it.

use chrono::{DateTime, Local};
use tracing::{error, info};

use crate::data::Reading;

/// Severity of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Progress or success.
    Status,
    /// Failure requiring attention.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status => write!(f, "Status"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Receiver of status messages and readings.
///
/// Both methods may be called from the notification task and must not
/// block; implementations marshal to their own display context.
pub trait UserFeedback: Send + Sync {
    /// Show a fire-and-forget message.
    fn notify_user(&self, message: &str, severity: Severity);

    /// Show the newest reading.
    fn display_reading(&self, reading: &Reading, at: DateTime<Local>);
}

/// Feedback sink that writes to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFeedback;

impl UserFeedback for TracingFeedback {
    fn notify_user(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Status => info!("{}", message),
            Severity::Error => error!("{}", message),
        }
    }

    fn display_reading(&self, reading: &Reading, at: DateTime<Local>) {
        info!(
            "{} heart rate {} bpm, SpO2 {}%",
            at.format("%I:%M:%S"),
            reading.heart_rate,
            reading.spo2
        );
    }
}
