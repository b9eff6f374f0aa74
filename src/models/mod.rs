pub mod direction;
pub mod signal;

pub use direction::*;
pub use signal::{Entry, Signal, SignalEntry};
