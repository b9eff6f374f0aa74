pub mod executor;
pub mod journal;
pub mod position_book;
pub mod retry;
pub mod statistics;
pub mod symbol_properties;
pub mod symbol_resolver;
pub mod trade_record;
pub mod trailing_stop;
pub mod validator;

pub use executor::{ExecutionResult, OrderExecutor};
pub use journal::SignalJournal;
pub use position_book::PositionBook;
pub use retry::{RetryCoordinator, RetryDecision};
pub use symbol_resolver::SymbolResolver;
pub use trade_record::{PendingTrade, TradeRecord};
pub use trailing_stop::{next_stop_loss, TrailingStopEngine};
pub use validator::{TradeValidator, ValidationRequest, ValidationResult};
