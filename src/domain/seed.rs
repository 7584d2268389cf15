//! Edition seeds and the hashes derived from them.
//!
//! A seed is the only random input of an edition. Everything downstream (the
//! hash, the artifact document, and therefore the thumbnail) is a pure
//! function of it, which is what lets anyone re-derive an edition later.

use std::fmt;

use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::DomainError;

/// Length of generated seeds.
pub const SEED_LENGTH: usize = 20;

/// Seed used for previews when the caller does not supply one.
pub const DEFAULT_SEED: &str = "PressrunDefaultSeed0";

/// Length of an [`EditionHash`] in hexadecimal characters.
pub const HASH_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(String);

impl Seed {
    /// Draw a fresh alphanumeric seed from the thread-local RNG.
    pub fn generate() -> Self {
        let value: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SEED_LENGTH)
            .map(char::from)
            .collect();
        Self(value)
    }

    /// Accept a caller-supplied seed. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_seed("seed must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn default_seed() -> Self {
        Self(DEFAULT_SEED.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase hexadecimal SHA-256 digest of a [`Seed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditionHash(String);

impl EditionHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EditionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn derive_hash(seed: &Seed) -> EditionHash {
    EditionHash(hex::encode(Sha256::digest(seed.as_str().as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_hash_is_stable_for_a_seed() {
        let seed = Seed::parse("AbCdEfGhIjKlMnOpQrSt").expect("valid seed");

        let first = derive_hash(&seed);
        let second = derive_hash(&seed);

        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), HASH_LENGTH);
        assert!(
            first
                .as_str()
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
    }

    #[test]
    fn known_seed_hashes_to_sha256_hex() {
        let seed = Seed::parse("abc").expect("valid seed");
        assert_eq!(
            derive_hash(&seed).as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn distinct_seeds_produce_distinct_hashes() {
        let a = Seed::parse("seed-a").expect("valid seed");
        let b = Seed::parse("seed-b").expect("valid seed");
        assert_ne!(derive_hash(&a), derive_hash(&b));
    }

    #[test]
    fn generated_seeds_are_alphanumeric_and_fixed_length() {
        let seed = Seed::generate();
        assert_eq!(seed.as_str().len(), SEED_LENGTH);
        assert!(seed.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(seed, Seed::generate());
    }

    #[test]
    fn blank_seeds_are_rejected() {
        assert!(matches!(
            Seed::parse("   "),
            Err(DomainError::InvalidSeed { .. })
        ));
        assert!(matches!(Seed::parse(""), Err(DomainError::InvalidSeed { .. })));
    }

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let seed = Seed::parse("  padded\n").expect("valid seed");
        assert_eq!(seed.as_str(), "padded");
    }
}
