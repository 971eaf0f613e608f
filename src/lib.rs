pub mod config;
pub mod core;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod log;
pub mod registry;
pub mod report;
pub mod runner;
pub mod template;
pub mod transport;

pub use error::{Error, Result};
pub use runner::Runner;
