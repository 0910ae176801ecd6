//! Durable link storage backends.

pub mod memory;
pub mod mysql;

pub use memory::InMemoryRepository;
pub use mysql::MySqlRepository;
pub use snaplink_core::repository::{ReadRepository, Repository, Result};
pub use snaplink_core::StorageError;

/// Schema of the `links` table, for tests and bootstrap tooling.
pub const MYSQL_SCHEMA: &str = include_str!("../ddl/mysql/links.sql");
