//! Command line and configuration file handling

mod args;
mod settings;

pub use args::{Args, Command};
pub use settings::{parse_auto, AppConfig, ConfigError, NamedSource, SourceSettings};
