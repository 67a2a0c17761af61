//! Domain layer: keys, the correlation table, errors, config and types.

pub mod config;
pub mod correlation;
pub mod error;
pub mod pending;
pub mod types;

pub use config::*;
pub use correlation::*;
pub use error::*;
pub use pending::*;
pub use types::*;
