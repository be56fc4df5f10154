//! AES-256 adapter turning a 128-bit block cipher into permutations of
//! arbitrary-width integer domains.
//!
//! The wide-block construction encrypts the low `floor(w/128)` blocks, then
//! the high `floor(w/128)` blocks of the `w`-bit value, so every input bit
//! reaches the output of at least one pass. Cycle-walking restricts the
//! resulting permutation of `[0, 2^w)` to `[0, modulus)`. The OFB keystream
//! gives a masking function over the same domains.

use aes::{Aes256, Block};
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};
use rug::Integer;
use rug::integer::Order;
use tracing::warn;
use trecube_types::{Result, TrecubeError};

use crate::keys::{CIPHER_IV_BYTES, CipherKey};

pub const BLOCK_BYTES: usize = 16;
pub const MIN_WIDE_BLOCK_BITS: u32 = 128;

/// Walks longer than this are logged; the expected length is below 2.
const LONG_WALK: u64 = 32;

/// Byte geometry of a `bits`-wide value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WideLayout {
    /// Bytes covered by each encryption pass, a multiple of the block size.
    pass_bytes: usize,
    byte_size: usize,
    /// Start of the high pass.
    offset: usize,
    /// Unused high bits in the top byte.
    padding: u32,
}

impl WideLayout {
    fn new(bits: u32) -> Result<Self> {
        if bits < MIN_WIDE_BLOCK_BITS {
            return Err(TrecubeError::Configuration(format!(
                "wide-block permutation needs at least {} bits, got {}",
                MIN_WIDE_BLOCK_BITS, bits
            )));
        }
        let pass_bytes = (bits / 128) as usize * BLOCK_BYTES;
        let byte_size = bits.div_ceil(8) as usize;
        Ok(WideLayout {
            pass_bytes,
            byte_size,
            offset: byte_size - pass_bytes,
            padding: (8 - bits % 8) % 8,
        })
    }
}

pub struct CipherContext {
    cipher: Aes256,
    iv: [u8; CIPHER_IV_BYTES],
    max_walks: u64,
}

impl CipherContext {
    /// Keys the engine. A key of the wrong length is reported as an engine
    /// failure, since that is where it is detected.
    pub fn new(key: &CipherKey, max_walks: u64) -> Result<Self> {
        let cipher = Aes256::new_from_slice(key.key_bytes())
            .map_err(|e| TrecubeError::Engine(format!("AES-256 key setup failed: {}", e)))?;
        Ok(CipherContext {
            cipher,
            iv: *key.iv(),
            max_walks,
        })
    }

    pub fn wide_block_encrypt(&self, x: &Integer, bits: u32) -> Result<Integer> {
        let layout = WideLayout::new(bits)?;
        check_width(x, bits)?;

        let mut buf = to_le_bytes(x, layout.byte_size)?;
        self.encrypt_blocks(&mut buf[..layout.pass_bytes]);

        let mut shifted = from_le_bytes(&buf);
        shifted <<= layout.padding;
        let mut buf = to_le_bytes(&shifted, layout.byte_size)?;
        self.encrypt_blocks(&mut buf[layout.offset..]);

        let mut y = from_le_bytes(&buf);
        y >>= layout.padding;
        Ok(y)
    }

    pub fn wide_block_decrypt(&self, y: &Integer, bits: u32) -> Result<Integer> {
        let layout = WideLayout::new(bits)?;
        check_width(y, bits)?;

        let mut shifted = y.clone();
        shifted <<= layout.padding;
        let mut buf = to_le_bytes(&shifted, layout.byte_size)?;
        self.decrypt_blocks(&mut buf[layout.offset..]);

        let mut x = from_le_bytes(&buf);
        x >>= layout.padding;
        let mut buf = to_le_bytes(&x, layout.byte_size)?;
        self.decrypt_blocks(&mut buf[..layout.pass_bytes]);

        Ok(from_le_bytes(&buf))
    }

    /// Permutation of `[0, modulus)` by cycle-walking the wide-block cipher
    /// over `[0, 2^bits(modulus))`.
    pub fn cycle_encrypt(&self, x: &Integer, modulus: &Integer) -> Result<Integer> {
        let bits = modulus.significant_bits();
        self.cycle_walk(x, modulus, |v| self.wide_block_encrypt(v, bits))
    }

    pub fn cycle_decrypt(&self, y: &Integer, modulus: &Integer) -> Result<Integer> {
        let bits = modulus.significant_bits();
        self.cycle_walk(y, modulus, |v| self.wide_block_decrypt(v, bits))
    }

    /// Masks `x` with successive `bits(modulus)`-bit segments of the OFB
    /// keystream, one fresh segment per attempt, until the result falls
    /// below `modulus`.
    ///
    /// The result depends on which attempt landed in range, so this is a
    /// masking function rather than a permutation and has no inverse here.
    pub fn stream_cycle(&self, x: &Integer, modulus: &Integer) -> Result<Integer> {
        check_walk_domain(x, modulus)?;
        let bits = modulus.significant_bits();
        let mut block = Block::from(self.iv);

        for walks in 1..=self.max_walks {
            let mask = self.next_segment(&mut block, bits);
            let y = Integer::from(x ^ &mask);
            if y < *modulus {
                note_walk(walks, modulus);
                return Ok(y);
            }
        }
        Err(TrecubeError::SearchExhausted {
            what: "stream cycle",
            attempts: self.max_walks,
        })
    }

    fn cycle_walk<F>(&self, x: &Integer, modulus: &Integer, step: F) -> Result<Integer>
    where
        F: Fn(&Integer) -> Result<Integer>,
    {
        check_walk_domain(x, modulus)?;

        let mut y = x.clone();
        for walks in 1..=self.max_walks {
            y = step(&y)?;
            if y < *modulus {
                note_walk(walks, modulus);
                return Ok(y);
            }
        }
        Err(TrecubeError::SearchExhausted {
            what: "cycle walk",
            attempts: self.max_walks,
        })
    }

    /// Next `bits` bits of the output-feedback keystream. `block` carries the
    /// feedback state between segments; each segment starts on a block
    /// boundary.
    fn next_segment(&self, block: &mut Block, bits: u32) -> Integer {
        let byte_size = bits.div_ceil(8) as usize;
        let mut stream = Vec::with_capacity(byte_size.next_multiple_of(BLOCK_BYTES));
        while stream.len() < byte_size {
            self.cipher.encrypt_block(block);
            stream.extend_from_slice(block.as_slice());
        }
        let mut mask = from_le_bytes(&stream);
        mask.keep_bits_mut(bits);
        mask
    }

    fn encrypt_blocks(&self, bytes: &mut [u8]) {
        for chunk in bytes.chunks_exact_mut(BLOCK_BYTES) {
            self.cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
        }
    }

    fn decrypt_blocks(&self, bytes: &mut [u8]) {
        for chunk in bytes.chunks_exact_mut(BLOCK_BYTES) {
            self.cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
        }
    }
}

fn check_walk_domain(x: &Integer, modulus: &Integer) -> Result<()> {
    if *modulus < 1 {
        return Err(TrecubeError::Configuration(format!(
            "cycle-walk domain must be non-empty, got {}",
            modulus
        )));
    }
    if *x < 0 || x >= modulus {
        return Err(TrecubeError::InvalidMessage(format!(
            "value outside the cycle-walk domain of {} bits",
            modulus.significant_bits()
        )));
    }
    Ok(())
}

fn note_walk(walks: u64, modulus: &Integer) {
    if walks > LONG_WALK {
        warn!(walks, bits = modulus.significant_bits(), "long cycle walk");
    }
}

fn check_width(x: &Integer, bits: u32) -> Result<()> {
    if *x < 0 || x.significant_bits() > bits {
        return Err(TrecubeError::InvalidMessage(format!(
            "value does not fit in {} bits",
            bits
        )));
    }
    Ok(())
}

fn to_le_bytes(x: &Integer, len: usize) -> Result<Vec<u8>> {
    let mut bytes = x.to_digits::<u8>(Order::Lsf);
    if bytes.len() > len {
        return Err(TrecubeError::ArithmeticInvariant(format!(
            "{}-byte value overflows a {}-byte buffer",
            bytes.len(),
            len
        )));
    }
    bytes.resize(len, 0);
    Ok(bytes)
}

fn from_le_bytes(bytes: &[u8]) -> Integer {
    Integer::from_digits(bytes, Order::Lsf)
}
