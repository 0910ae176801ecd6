use crate::Generator;
use rand::distributions::Alphanumeric;
use rand::Rng;
use snaplink_core::shortcode::{MAX_LENGTH, MIN_LENGTH};
use snaplink_core::{CoreError, ShortCode};
use typed_builder::TypedBuilder;

/// Default number of characters in a generated code.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Draws codes uniformly from `[A-Za-z0-9]`.
///
/// With the default length there are 62^8 (about 2.2e14) codes, so collisions
/// stay rare until the store holds billions of links.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RandomGenerator {
    #[builder(default = DEFAULT_CODE_LENGTH)]
    length: usize,
}

impl RandomGenerator {
    /// Creates a generator emitting codes of `length` characters.
    pub fn with_length(length: usize) -> Result<Self, CoreError> {
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
            return Err(CoreError::InvalidShortCode(format!(
                "generated code length must be between {MIN_LENGTH} and {MAX_LENGTH}, got {length}"
            )));
        }
        Ok(Self { length })
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Generator for RandomGenerator {
    type Output = ShortCode;

    fn generate(&self) -> Self::Output {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect();
        // Alphanumeric output of a checked length is always a valid code.
        ShortCode::new_unchecked(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_length_is_eight() {
        let code = RandomGenerator::default().generate();
        assert_eq!(code.as_str().len(), DEFAULT_CODE_LENGTH);
    }

    #[test]
    fn generated_codes_are_valid_short_codes() {
        let generator = RandomGenerator::with_length(12).unwrap();

        for _ in 0..100 {
            let code = generator.generate();
            assert_eq!(code.as_str().len(), 12);
            assert!(ShortCode::new(code.as_str()).is_ok());
        }
    }

    #[test]
    fn codes_are_not_repeated() {
        let generator = RandomGenerator::default();
        let codes: HashSet<String> = (0..1000)
            .map(|_| generator.generate().as_str().to_owned())
            .collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn rejects_lengths_outside_code_bounds() {
        assert!(RandomGenerator::with_length(2).is_err());
        assert!(RandomGenerator::with_length(33).is_err());
        assert!(RandomGenerator::with_length(3).is_ok());
    }
}
