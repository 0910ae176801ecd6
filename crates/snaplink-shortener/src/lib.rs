//! Short code allocation and link management.
//!
//! [`CodeAllocator`] reserves codes against the store's uniqueness constraint;
//! [`LinkService`] builds create, update, delete, stats, search and account
//! operations on top of it.

pub mod allocator;
pub mod error;
pub mod service;

pub use allocator::{AllocatorSettings, CodeAllocator, LinkDraft, DEFAULT_MAX_ATTEMPTS};
pub use error::ShortenerError;
pub use service::{CreateLink, LinkService, OwnerLinks};
