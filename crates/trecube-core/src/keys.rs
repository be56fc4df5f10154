use std::fmt;
use trecube_types::{ChainParams, ReRandomization, Result, TrecubeError};
use zeroize::Zeroizing;

use crate::random::RandomSource;

pub const CIPHER_KEY_BYTES: usize = 32;
pub const CIPHER_IV_BYTES: usize = 16;

/// Shuffle round keys, one bit per round, least significant bit first.
#[derive(Clone)]
pub struct ShuffleKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl ShuffleKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ShuffleKey {
            bytes: Zeroizing::new(bytes),
        }
    }

    /// Fresh key of `len` random bytes, enough for `8 * len` rounds.
    pub fn random(len: usize, rng: &mut RandomSource) -> Self {
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn bit_len(&self) -> u64 {
        self.bytes.len() as u64 * 8
    }

    /// Round key bit `i`. Callers check `i < bit_len()` first.
    pub fn bit(&self, i: u64) -> bool {
        (self.bytes[(i / 8) as usize] >> (i % 8)) & 1 == 1
    }

    pub(crate) fn ensure_rounds(&self, rounds: u64) -> Result<()> {
        if self.bit_len() < rounds {
            return Err(TrecubeError::Configuration(format!(
                "shuffle key holds {} bits, {} rounds need one bit each",
                self.bit_len(),
                rounds
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for ShuffleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShuffleKey")
            .field("bits", &self.bit_len())
            .finish_non_exhaustive()
    }
}

/// AES-256 key plus the IV seeding the output-feedback keystream.
#[derive(Clone)]
pub struct CipherKey {
    key: Zeroizing<Vec<u8>>,
    iv: [u8; CIPHER_IV_BYTES],
}

impl CipherKey {
    /// The key length is checked when a cipher context is built from it.
    pub fn from_parts(key: Vec<u8>, iv: [u8; CIPHER_IV_BYTES]) -> Self {
        CipherKey {
            key: Zeroizing::new(key),
            iv,
        }
    }

    pub fn generate(rng: &mut RandomSource) -> Self {
        let mut key = vec![0u8; CIPHER_KEY_BYTES];
        rng.fill_bytes(&mut key);
        let mut iv = [0u8; CIPHER_IV_BYTES];
        rng.fill_bytes(&mut iv);
        Self::from_parts(key, iv)
    }

    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; CIPHER_IV_BYTES] {
        &self.iv
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKey")
            .field("key_len", &self.key.len())
            .finish_non_exhaustive()
    }
}

/// Key material for one delay/open pair; its variant follows the round count.
#[derive(Debug, Clone)]
pub enum RoundKey {
    Shuffle(ShuffleKey),
    Cipher(CipherKey),
}

impl RoundKey {
    pub fn generate(params: &ChainParams, rng: &mut RandomSource) -> Self {
        match params.re_randomization() {
            ReRandomization::Cipher => RoundKey::Cipher(CipherKey::generate(rng)),
            ReRandomization::Shuffle { .. } => {
                RoundKey::Shuffle(ShuffleKey::random(params.shuffle_key_len(), rng))
            }
        }
    }
}
