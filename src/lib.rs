pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod geodata;
pub mod utils;

pub use config::{LocalStorage, PrepConfig};
pub use core::etl::EtlEngine;
pub use utils::error::{PrepError, Result};
