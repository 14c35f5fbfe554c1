pub mod ambient;
pub mod config;
pub mod error;
pub mod naming;
pub mod telemetry;

pub use error::{CoreError, Result};
