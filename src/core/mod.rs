pub mod admin;
pub mod loader;
pub mod query;

pub use crate::domain::model::{Image, NewPlace, Place, PlaceWithImages};
pub use crate::domain::ports::ImageStore;
pub use crate::utils::error::Result;
