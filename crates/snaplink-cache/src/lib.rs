//! [`LinkCache`](snaplink_core::LinkCache) backends shared across snaplink services.

pub mod moka;
pub mod redis;

pub use crate::moka::{MokaCacheConfig, MokaLinkCache};
pub use crate::redis::RedisLinkCache;
