//! Public id obfuscation.
//!
//! Internal skin ids are random 32-bit draws pushed through a reversible
//! keyed permutation, so public ids are non-sequential and unguessable
//! without a lookup table.

use std::sync::Arc;

use rand::RngCore;
use thiserror::Error;
use tracing::{debug, warn};

use crate::repo::{RepoError, SkinRepository};

/// Odd multiplier, invertible modulo 2^32.
const MULTIPLIER: u32 = 0x9E37_79B1;
/// Modular inverse of [`MULTIPLIER`] modulo 2^32.
const INVERSE: u32 = 0x0E8B_2F51;

const MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Error)]
pub enum IdError {
    #[error("failed to allocate a collision-free id after {attempts} attempts")]
    FailedToCreateId { attempts: u32 },

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Reversible permutation over `u32`: XOR with a keyed seed, then
/// multiply by an odd constant. `decode(encode(x)) == x` for all x.
#[derive(Debug, Clone, Copy)]
pub struct ObfuscatedIdCipher {
    seed: u32,
}

impl ObfuscatedIdCipher {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Cipher keyed with a cryptographically random seed. Note that ids
    /// encoded with one seed only decode under the same seed, so a
    /// deployment must persist its seed.
    pub fn from_entropy() -> Self {
        Self {
            seed: rand::rngs::OsRng.next_u32(),
        }
    }

    pub fn encode(&self, value: u32) -> u32 {
        (value ^ self.seed).wrapping_mul(MULTIPLIER)
    }

    pub fn decode(&self, public: u32) -> u32 {
        public.wrapping_mul(INVERSE) ^ self.seed
    }
}

/// Allocates collision-free public skin ids.
pub struct IdAllocator {
    cipher: ObfuscatedIdCipher,
    skins: Arc<dyn SkinRepository>,
}

impl IdAllocator {
    pub fn new(cipher: ObfuscatedIdCipher, skins: Arc<dyn SkinRepository>) -> Self {
        Self { cipher, skins }
    }

    pub fn cipher(&self) -> &ObfuscatedIdCipher {
        &self.cipher
    }

    /// Draw a random id, permute it, and verify it is unused. Bounded
    /// retries; exhaustion is fatal.
    pub async fn allocate(&self) -> Result<u32, IdError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let raw = rand::rngs::OsRng.next_u32();
            let id = self.cipher.encode(raw);
            if !self.skins.exists(id).await? {
                debug!(id, attempt, "allocated public id");
                return Ok(id);
            }
            warn!(id, attempt, "public id collision, retrying");
        }
        Err(IdError::FailedToCreateId {
            attempts: MAX_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySkinRepository;

    #[test]
    fn cipher_roundtrips() {
        let cipher = ObfuscatedIdCipher::new(0x5DEE_CE66);
        for value in [0u32, 1, 42, 123_456_789, u32::MAX] {
            assert_eq!(cipher.decode(cipher.encode(value)), value);
        }
    }

    #[test]
    fn cipher_is_not_identity_or_sequential() {
        let cipher = ObfuscatedIdCipher::new(0x5DEE_CE66);
        let a = cipher.encode(1);
        let b = cipher.encode(2);
        assert_ne!(a, 1);
        assert_ne!(b, 2);
        assert_ne!(b.wrapping_sub(a), 1);
    }

    #[tokio::test]
    async fn allocate_returns_unused_id() {
        let skins = Arc::new(MemorySkinRepository::new());
        let allocator = IdAllocator::new(ObfuscatedIdCipher::from_entropy(), skins.clone());
        let id = allocator.allocate().await.unwrap();
        assert!(!skins.exists(id).await.unwrap());
    }
}
