pub mod random;

use snaplink_core::ShortCode;

pub use random::RandomGenerator;

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage.
/// They do not have to be unique: the store rejects duplicates and callers
/// retry with a fresh candidate.
pub trait Generator: Send + Sync + 'static {
    type Output: Into<ShortCode>;

    /// Generates a candidate short code.
    fn generate(&self) -> Self::Output;
}
