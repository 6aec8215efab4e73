//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → loader.rs (PORT / APP_ENV overrides)
//!     → CLI flags (main.rs)
//!     → ServerConfig (immutable for the life of the process)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow running without a config file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load_config, parse_config, ConfigError};
pub use schema::{ListenerConfig, ObservabilityConfig, ServerConfig, StartupConfig, TimeoutConfig};
pub use validation::{validate_config, ValidationError};
