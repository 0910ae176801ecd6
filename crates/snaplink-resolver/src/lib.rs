//! Short code resolution.
//!
//! [`ResolutionEngine`] answers redirects cache-aside and counts every hit
//! through a [`StatsAccumulator`]; the counts reach the store later, through
//! the write-back pipeline or when an expired entry is flushed.

pub mod engine;
pub mod error;
pub mod stats;

pub use engine::{
    Resolution, ResolutionEngine, ResolverSettings, DEFAULT_CACHE_TTL, DEFAULT_STATS_TTL,
};
pub use error::ResolveError;
pub use stats::StatsAccumulator;
