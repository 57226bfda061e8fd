//! AES key derivation for KDBX 3: N rounds of AES-256-ECB over the 32-byte
//! composite key under a fixed seed, then SHA-256.

use openssl::symm::{Cipher, Crypter, Mode};
use rand::Rng;
use ring::digest::{Context, SHA256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub const DEFAULT_ROUNDS: u64 = 60000;

/// Parameters of the KDBX 3 AES key transform. The seed arrives in the
/// `TransformSeed` header field, the round count in `TransformRounds`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AesKdf {
    seed: [u8; 32],
    rounds: u64,
}

impl AesKdf {
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn set_seed(&mut self, seed: [u8; 32]) {
        self.seed = seed;
    }

    pub fn set_rounds(&mut self, rounds: u64) {
        self.rounds = rounds;
    }

    /// Replace the seed before saving so no two files share one.
    pub fn randomize_seed(&mut self) {
        rand::thread_rng().fill(&mut self.seed[..]);
    }

    /// Derive the transformed key from the composite key.
    pub fn transform_key(&self, composite_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        debug!("Calculating transformed key ({})", self.rounds);

        let mut transform_key = Zeroizing::new(composite_key.to_owned());
        let cipher = Cipher::aes_256_ecb();
        let mut c =
            Crypter::new(cipher, Mode::Encrypt, &self.seed, None).map_err(|_| Error::KeyTransform)?;
        c.pad(false);
        for _ in 0..cipher.block_size() {
            transform_key.push(0);
        }
        let mut out = Zeroizing::new(vec![0; 32 + cipher.block_size()]);
        for _ in 0..self.rounds {
            c.update(&transform_key[0..32], &mut out)
                .map_err(|_| Error::KeyTransform)?;
            std::mem::swap(&mut transform_key, &mut out);
        }
        transform_key.truncate(32);
        let mut context = Context::new(&SHA256);
        context.update(&transform_key);
        Ok(Zeroizing::new(context.finish().as_ref().to_owned()))
    }
}

impl Default for AesKdf {
    fn default() -> Self {
        Self {
            seed: [0; 32],
            rounds: DEFAULT_ROUNDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_is_deterministic() {
        let kdf = AesKdf {
            seed: [7; 32],
            rounds: 100,
        };
        let a = kdf.transform_key(&[1; 32]).unwrap();
        let b = kdf.transform_key(&[1; 32]).unwrap();
        assert_eq!(a.to_vec(), b.to_vec());
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_transform_depends_on_everything() {
        let kdf = AesKdf {
            seed: [7; 32],
            rounds: 100,
        };
        let base = kdf.transform_key(&[1; 32]).unwrap();

        let other_key = kdf.transform_key(&[2; 32]).unwrap();
        assert_ne!(base.to_vec(), other_key.to_vec());

        let mut other_seed = kdf.clone();
        other_seed.set_seed([8; 32]);
        assert_ne!(base.to_vec(), other_seed.transform_key(&[1; 32]).unwrap().to_vec());

        let mut other_rounds = kdf.clone();
        other_rounds.set_rounds(101);
        assert_ne!(base.to_vec(), other_rounds.transform_key(&[1; 32]).unwrap().to_vec());
    }

    #[test]
    fn test_randomize_seed() {
        let mut kdf = AesKdf::default();
        kdf.randomize_seed();
        assert_ne!(kdf.seed(), &[0; 32]);
    }
}
