pub mod bridge;
pub mod paper;
pub mod retcode;
pub mod types;

pub use bridge::BridgeBroker;
pub use paper::PaperBroker;
pub use retcode::{RetCode, RetryClass};
pub use types::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BrokerError;

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Operations consumed from the brokerage terminal.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Names of every symbol in the broker's catalog.
    async fn symbol_names(&self) -> BrokerResult<Vec<String>>;
    async fn symbol_info(&self, symbol: &str) -> BrokerResult<Option<SymbolInfo>>;
    /// Adds or removes a symbol from the terminal's market watch.
    async fn symbol_select(&self, symbol: &str, enable: bool) -> BrokerResult<bool>;
    async fn symbol_tick(&self, symbol: &str) -> BrokerResult<Option<Tick>>;
    async fn terminal_info(&self) -> BrokerResult<TerminalInfo>;
    async fn order_send(&self, request: &OrderRequest) -> BrokerResult<OrderResult>;
    async fn position(&self, ticket: u64) -> BrokerResult<Option<Position>>;
    /// A pending order that has not been triggered yet.
    async fn order(&self, ticket: u64) -> BrokerResult<Option<PendingOrder>>;
    async fn positions(&self) -> BrokerResult<Vec<Position>>;
    async fn history_deals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BrokerResult<Vec<Deal>>;
    async fn account_info(&self) -> BrokerResult<AccountInfo>;
}
