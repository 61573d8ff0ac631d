// Core models and ports shared by every utility.

pub mod model;
pub mod ports;
