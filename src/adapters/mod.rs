// Adapters layer: concrete implementations for external systems (database, blob storage, http).

pub mod http;
pub mod sqlite;
pub mod storage;
