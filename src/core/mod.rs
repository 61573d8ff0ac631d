pub mod etl;
pub mod geometry;
pub mod icon_crop;
pub mod reproject;
pub mod template;

pub use crate::domain::model::{Graph, LatLon, Row};
pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
