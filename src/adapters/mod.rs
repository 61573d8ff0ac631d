// Adapters: clients and servers for external systems.

pub mod commons;
pub mod companies_house;
pub mod http;
pub mod proxy;
pub mod sketchfab;

pub use proxy::{router, ProxySettings, ProxyState};
