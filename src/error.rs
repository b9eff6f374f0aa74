use thiserror::Error;

/// Failures talking to the brokerage collaborator. Connectivity problems are
/// surfaced to the caller; reconnecting is the collaborator's job.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Connectivity(String),

    #[error("broker protocol error: {0}")]
    Protocol(String),

    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
}

impl From<reqwest::Error> for BrokerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            BrokerError::Connectivity(e.to_string())
        } else {
            BrokerError::Protocol(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}
