//! Key-value store implementations

pub mod file_store;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod database;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use file_store::JsonFileKvStore;
pub use memory::MemoryKvStore;
#[cfg(feature = "postgres")]
pub use database::{create_pool, run_migrations, DatabaseConfig};
#[cfg(feature = "postgres")]
pub use postgres::PgKvStore;
