//! Core types and traits for the snaplink URL shortener.
//!
//! This crate provides the shared vocabulary of the workspace: short codes,
//! link records, the cache and repository contracts, and the error taxonomy.

pub mod cache;
pub mod error;
pub mod expiration;
pub mod link;
pub mod normalize;
pub mod repository;
pub mod shortcode;
pub mod stats;

pub use cache::{CacheEntry, LinkCache};
pub use error::{CacheError, CoreError, ServiceError, StorageError};
pub use expiration::ExpirationStream;
pub use link::{LinkRecord, NewLink, OwnerId};
pub use normalize::normalize_url;
pub use repository::{ReadRepository, Repository};
pub use shortcode::ShortCode;
pub use stats::StatsEntry;
