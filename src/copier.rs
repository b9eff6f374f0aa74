use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SharedConfig;
use crate::messaging::json_lines::PLAIN_TEXT_CHANNEL;
use crate::messaging::ChannelMessage;
use crate::parsing::{is_useful_message, normalize, SignalParser};
use crate::trading::{RetryCoordinator, SignalJournal};

/// What the copier did with one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyOutcome {
    InactiveChannel,
    Filtered,
    NotASignal,
    /// Parsed and journaled; automatic trading is switched off.
    Recorded,
    Executed { ticket: u64 },
    Failed { error: String },
    /// Operator command that resubmitted queued trades.
    Retried { succeeded: usize },
}

/// Console commands accepted on the plain-text channel.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    /// `/retry`
    RetryAll,
    /// `/retry SYMBOL`
    Retry(String),
}

impl OperatorCommand {
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        if !words.next()?.eq_ignore_ascii_case("/retry") {
            return None;
        }
        match words.next() {
            Some(symbol) => Some(OperatorCommand::Retry(normalize(symbol))),
            None => Some(OperatorCommand::RetryAll),
        }
    }
}

/// Takes messages one at a time from the feed to the broker: screen, parse,
/// journal, submit.
pub struct SignalCopier {
    config: SharedConfig,
    parser: SignalParser,
    journal: Arc<SignalJournal>,
    retry: Arc<RetryCoordinator>,
}

impl SignalCopier {
    pub fn new(config: SharedConfig, journal: Arc<SignalJournal>, retry: Arc<RetryCoordinator>) -> Self {
        Self {
            config,
            parser: SignalParser::new(),
            journal,
            retry,
        }
    }

    pub async fn handle(&self, msg: &ChannelMessage) -> CopyOutcome {
        if msg.channel == PLAIN_TEXT_CHANNEL {
            if let Some(command) = OperatorCommand::parse(&msg.text) {
                return self.run_command(command).await;
            }
        }

        let (active, auto_trade, lot_size) = {
            let cfg = self.config.read().await;
            (
                cfg.is_active_channel(&msg.channel),
                cfg.settings.auto_trade,
                cfg.settings.default_lot_size,
            )
        };
        if !active {
            debug!("Ignoring message from inactive channel {}", msg.channel);
            return CopyOutcome::InactiveChannel;
        }
        if !is_useful_message(&msg.text) {
            debug!("Filtered message from {}", msg.channel);
            return CopyOutcome::Filtered;
        }
        let Some(signal) = self.parser.parse(&msg.text, Some(&msg.channel)) else {
            return CopyOutcome::NotASignal;
        };

        info!("{}", "=".repeat(60));
        info!("Signal from {}: {}", msg.channel, signal.summary());
        let index = self.journal.record(&signal);

        if !auto_trade {
            info!("Auto trading is off; signal recorded only");
            info!("{}", "=".repeat(60));
            return CopyOutcome::Recorded;
        }

        let result = self.retry.submit(&signal, lot_size).await;
        let outcome = match (result.success, result.ticket) {
            (true, Some(ticket)) => {
                self.journal.mark_executed(index, ticket);
                CopyOutcome::Executed { ticket }
            }
            _ => {
                let error = result.error.unwrap_or_else(|| "unknown error".to_string());
                warn!("Signal for {} not executed: {}", signal.symbol(), error);
                self.journal.mark_failed(index, error.clone());
                CopyOutcome::Failed { error }
            }
        };
        info!("{}", "=".repeat(60));
        outcome
    }

    async fn run_command(&self, command: OperatorCommand) -> CopyOutcome {
        let succeeded = match command {
            OperatorCommand::RetryAll => self.retry.retry_all().await,
            OperatorCommand::Retry(symbol) => match self.retry.manual_retry(&symbol).await {
                Some(result) if result.success => 1,
                Some(_) => 0,
                None => {
                    warn!("No pending trade for {}", symbol);
                    0
                }
            },
        };
        info!("Operator retry: {} submitted", succeeded);
        CopyOutcome::Retried { succeeded }
    }
}
