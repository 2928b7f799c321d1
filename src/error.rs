// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Invalid statsd address: {0}")]
    InvalidAddress(String),

    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("Statsd client error: {0}")]
    Metric(#[from] cadence::MetricError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
