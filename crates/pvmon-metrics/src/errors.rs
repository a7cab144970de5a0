//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metric line encoding and time-series export sinks."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("metrics transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("metrics endpoint answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("metrics write failed: {0}")]
    Write(#[from] std::io::Error),
    #[error("publish cancelled by shutdown")]
    Cancelled,
}

impl SinkError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Transport(_) | SinkError::Write(_) => true,
            SinkError::Status { status, .. } => *status == 429 || *status >= 500,
            SinkError::Cancelled => false,
        }
    }
}
