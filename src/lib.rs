pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{Cli, Command};

pub use adapters::{sqlite::Database, storage::LocalImageStore};
pub use config::AppConfig;
pub use core::{admin::PlaceAdmin, loader::PlaceLoader, query::QueryService};
pub use utils::error::{PlacesError, Result};
