pub mod cli;
pub mod env;
pub mod toml_config;

pub use cli::LocalStorage;
pub use toml_config::{HttpSettings, PrepConfig, TemplateSettings};
