use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tracing::warn;

use crate::messaging::{ChannelMessage, MessageSource};

/// Channel name given to lines that are plain text rather than JSON.
pub const PLAIN_TEXT_CHANNEL: &str = "stdin";

/// Reads one message per line: either `{"channel": .., "text": ..}` or plain
/// text. Message text may contain `\n` escapes in the JSON form.
pub struct JsonLinesSource<R> {
    lines: Lines<BufReader<R>>,
}

impl JsonLinesSource<tokio::io::Stdin> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> MessageSource for JsonLinesSource<R> {
    async fn next_message(&mut self) -> Result<Option<ChannelMessage>> {
        while let Some(line) = self
            .lines
            .next_line()
            .await
            .context("reading message stream")?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !line.starts_with('{') {
                return Ok(Some(ChannelMessage::new(PLAIN_TEXT_CHANNEL, line)));
            }
            match serde_json::from_str::<ChannelMessage>(line) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => warn!("Skipping malformed message line: {}", e),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_json_and_plain_lines() {
        let input = concat!(
            "{\"channel\": \"Gold VIP\", \"text\": \"XAUUSD BUY NOW 3340\\nTP 3345\\nSL 3330\"}\n",
            "\n",
            "{not json\n",
            "EURUSD sell 1.0850\n",
        );
        let mut source = JsonLinesSource::new(input.as_bytes());

        let first = source.next_message().await.unwrap().unwrap();
        assert_eq!(first.channel, "Gold VIP");
        assert_eq!(first.text.lines().count(), 3);

        let second = source.next_message().await.unwrap().unwrap();
        assert_eq!(second.channel, PLAIN_TEXT_CHANNEL);
        assert_eq!(second.text, "EURUSD sell 1.0850");

        assert!(source.next_message().await.unwrap().is_none());
    }
}
