//! Layered configuration: compiled-in defaults, optional config file, then environment
//! variable overrides. See [`loader::load`] for the precedence order.
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`store`]: Coordination store connection settings
//! - [`gateway`]: Client-facing gateway settings
//! - [`matchmaker`]: Batch sizing and lock timing for the matchmaker role
//! - [`session`]: Session runner identity and polling settings
//! - [`reaper`]: Queue/player hygiene pass settings
//! - [`capacity`]: Session pool bounds and scale up/down policy
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Cross-field configuration validation

pub mod capacity;
pub mod defaults;
pub mod gateway;
pub mod loader;
pub mod logging;
pub mod matchmaker;
pub mod reaper;
pub mod session;
pub mod store;
pub mod types;
pub mod validation;

pub use capacity::CapacityConfig;
pub use gateway::GatewayConfig;
pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use matchmaker::MatchmakerConfig;
pub use reaper::ReaperConfig;
pub use session::SessionConfig;
pub use store::StoreConfig;
pub use types::Config;
pub use validation::validate_config;
