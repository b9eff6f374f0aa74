pub mod broker;
pub mod config;
pub mod copier;
pub mod error;
pub mod messaging;
pub mod models;
pub mod parsing;
pub mod shutdown;
#[cfg(test)]
pub mod test_helpers;
pub mod trading;
