pub mod message_filter;
pub mod signal_parser;
pub mod symbols;

pub use message_filter::is_useful_message;
pub use signal_parser::{ParseRejection, SignalParser};
pub use symbols::normalize;
