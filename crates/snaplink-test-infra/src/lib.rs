//! Disposable containers for integration tests.
//!
//! Every fixture owns its container; dropping the fixture stops it.

mod error;
pub mod mysql;
pub mod redis;

pub use error::{Result, TestInfraError};
