// Configuration loading

pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{RunSettings, SelectorSettings, Settings, SourceSettings, StoreSettings, MAX_INTERVAL_MINS};
