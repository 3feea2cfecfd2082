pub mod config;
pub mod keys;
pub mod types;

pub use config::{ConfigError, FleetConfig};
pub use keys::{agent_config_key, agent_lock_key, agent_record_key, registration_secret_key};
pub use types::*;
