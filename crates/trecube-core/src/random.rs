use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rug::Integer;
use rug::integer::Order;
use rug::rand::RandState;
use trecube_types::{Result, TrecubeError};

const MAX_UNIT_DRAWS: u64 = 10_000;

/// Caller-owned randomness: a ChaCha20 keystream for bits and bytes, and a
/// GMP random state (seeded from that keystream) for big-integer sampling.
///
/// One source per thread of evaluation; nothing here is shared process-wide.
pub struct RandomSource {
    stream: ChaCha20Rng,
    state: RandState<'static>,
    word: u64,
    bits_left: u32,
}

impl RandomSource {
    /// Deterministic source, for tests and reproducible runs.
    pub fn from_seed(seed: u64) -> Self {
        Self::with_stream(ChaCha20Rng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::with_stream(ChaCha20Rng::from_entropy())
    }

    fn with_stream(mut stream: ChaCha20Rng) -> Self {
        let mut seed_bytes = [0u8; 32];
        stream.fill_bytes(&mut seed_bytes);
        let mut state = RandState::new();
        state.seed(&Integer::from_digits(&seed_bytes, Order::Lsf));

        RandomSource {
            stream,
            state,
            word: 0,
            bits_left: 0,
        }
    }

    /// Next keystream bit. Bits are served from a buffered 64-bit word.
    pub fn next_bit(&mut self) -> bool {
        if self.bits_left == 0 {
            self.word = self.stream.next_u64();
            self.bits_left = 64;
        }
        let bit = self.word & 1 == 1;
        self.word >>= 1;
        self.bits_left -= 1;
        bit
    }

    pub fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.stream.fill_bytes(dest);
    }

    /// Uniform integer in `[0, bound)`.
    pub fn uniform_below(&mut self, bound: &Integer) -> Result<Integer> {
        if *bound <= 0 {
            return Err(TrecubeError::Configuration(format!(
                "sampling bound must be positive, got {}",
                bound
            )));
        }
        Ok(bound.clone().random_below(&mut self.state))
    }

    /// Uniform integer in `[0, 2^bits)`.
    pub fn random_bits(&mut self, bits: u32) -> Integer {
        Integer::from(Integer::random_bits(bits, &mut self.state))
    }

    /// Uniform message in `[1, modulus - 1]`.
    pub fn random_message(&mut self, modulus: &Integer) -> Result<Integer> {
        if *modulus <= 2 {
            return Err(TrecubeError::Configuration(format!(
                "modulus {} leaves no room for a message",
                modulus
            )));
        }
        let bound = Integer::from(modulus - 1u32);
        let mut message = self.uniform_below(&bound)?;
        message += 1;
        Ok(message)
    }

    /// Uniform unit of `Z/NZ` in `[1, modulus - 1]`.
    pub fn random_unit(&mut self, modulus: &Integer) -> Result<Integer> {
        for _ in 0..MAX_UNIT_DRAWS {
            let candidate = self.random_message(modulus)?;
            if Integer::from(candidate.gcd_ref(modulus)) == 1 {
                return Ok(candidate);
            }
        }
        Err(TrecubeError::SearchExhausted {
            what: "unit sampling",
            attempts: MAX_UNIT_DRAWS,
        })
    }
}
