//! Inbound trade alerts.

pub mod json_lines;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use json_lines::JsonLinesSource;

/// One message posted in a monitored channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl ChannelMessage {
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// A stream of channel messages. `Ok(None)` means the source is exhausted.
#[async_trait]
pub trait MessageSource: Send {
    async fn next_message(&mut self) -> Result<Option<ChannelMessage>>;
}
