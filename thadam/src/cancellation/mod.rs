//! Cooperative shutdown for the consumer loop.

mod token;

pub use token::{ShutdownCallback, ShutdownToken};
