use rug::Integer;
use tracing::{debug, instrument};
use trecube_types::{ChainParams, ReRandomization, Result, TrecubeError};

use crate::cancel::CancellationToken;
use crate::cipher::{CipherContext, MIN_WIDE_BLOCK_BITS};
use crate::config::PuzzleConfig;
use crate::fpe;
use crate::keys::{RoundKey, ShuffleKey};
use crate::modulus::{is_unit, pow_mod};

/// Time-lock puzzle over a public modulus: `chain_length` links, each a
/// keyed re-randomization of the residue followed by a modular cube.
///
/// Anyone can evaluate the chain forward with [`CubingPuzzle::delay`]; going
/// back needs either the trapdoor (see [`crate::opener::TrapdoorOpener`]) or
/// cube roots, which cost a full factoring of the modulus.
#[derive(Debug, Clone)]
pub struct CubingPuzzle {
    modulus: Integer,
    params: ChainParams,
    config: PuzzleConfig,
}

impl CubingPuzzle {
    pub fn new(modulus: &Integer, params: ChainParams, config: PuzzleConfig) -> Result<Self> {
        config.validate()?;
        if *modulus <= 2 {
            return Err(TrecubeError::Configuration(format!(
                "modulus {} has no room for messages",
                modulus
            )));
        }
        let domain_bits = Integer::from(modulus - 1u32).significant_bits();
        if params.re_randomization() == ReRandomization::Cipher
            && domain_bits < MIN_WIDE_BLOCK_BITS
        {
            return Err(TrecubeError::Configuration(format!(
                "cipher re-randomization needs a modulus of at least {} bits, got {}",
                MIN_WIDE_BLOCK_BITS + 1,
                modulus.significant_bits()
            )));
        }

        Ok(CubingPuzzle {
            modulus: modulus.clone(),
            params,
            config,
        })
    }

    pub fn modulus(&self) -> &Integer {
        &self.modulus
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn config(&self) -> &PuzzleConfig {
        &self.config
    }

    pub fn delay(&self, message: &Integer, key: &RoundKey) -> Result<Integer> {
        self.delay_with_cancel(message, key, &CancellationToken::new())
    }

    /// Evaluates the full chain on `message`, a unit in `[1, N)`.
    #[instrument(skip_all, fields(
        bits = self.modulus.significant_bits(),
        chain = self.params.chain_length(),
        rounds = self.params.rounds(),
    ))]
    pub fn delay_with_cancel(
        &self,
        message: &Integer,
        key: &RoundKey,
        cancelled: &CancellationToken,
    ) -> Result<Integer> {
        self.check_residue(message)?;
        let rerandomizer = Rerandomizer::new(self, key)?;
        let three = Integer::from(3);

        let mut r = message.clone();
        for link in 0..self.params.chain_length() {
            if cancelled.is_cancelled() {
                debug!(link, "delay cancelled");
                return Err(TrecubeError::Cancelled);
            }
            r = rerandomizer.forward(&r, self)?;
            r = pow_mod(&r, &three, &self.modulus)?;
        }
        Ok(r)
    }

    pub(crate) fn check_residue(&self, r: &Integer) -> Result<()> {
        if *r < 1 || *r >= self.modulus {
            return Err(TrecubeError::InvalidMessage(format!(
                "residue must lie in [1, N) for a {}-bit modulus",
                self.modulus.significant_bits()
            )));
        }
        if !is_unit(r, &self.modulus) {
            return Err(TrecubeError::InvalidMessage(
                "residue shares a factor with the modulus".into(),
            ));
        }
        Ok(())
    }
}

/// Per-link permutation of the units in `[1, N)`: the chosen permutation
/// runs over `[0, N - 1)` after shifting down by one, and is re-applied
/// until the shifted-back result is a unit.
pub(crate) enum Rerandomizer<'k> {
    Shuffle { rounds: u64, key: &'k ShuffleKey },
    Cipher(CipherContext),
}

impl<'k> Rerandomizer<'k> {
    pub(crate) fn new(puzzle: &'k CubingPuzzle, key: &'k RoundKey) -> Result<Self> {
        match (puzzle.params.re_randomization(), key) {
            (ReRandomization::Shuffle { rounds }, RoundKey::Shuffle(key)) => {
                key.ensure_rounds(rounds)?;
                Ok(Rerandomizer::Shuffle { rounds, key })
            }
            (ReRandomization::Cipher, RoundKey::Cipher(key)) => Ok(Rerandomizer::Cipher(
                CipherContext::new(key, puzzle.config.max_cycle_walks)?,
            )),
            (mode, _) => Err(TrecubeError::Configuration(format!(
                "round key does not match {:?} re-randomization",
                mode
            ))),
        }
    }

    fn permute(&self, x: &Integer, domain: &Integer) -> Result<Integer> {
        match self {
            Rerandomizer::Shuffle { rounds, key } => fpe::thorp(x, domain, *rounds, key),
            Rerandomizer::Cipher(ctx) => ctx.cycle_encrypt(x, domain),
        }
    }

    fn unpermute(&self, x: &Integer, domain: &Integer) -> Result<Integer> {
        match self {
            Rerandomizer::Shuffle { rounds, key } => fpe::inverse_thorp(x, domain, *rounds, key),
            Rerandomizer::Cipher(ctx) => ctx.cycle_decrypt(x, domain),
        }
    }

    pub(crate) fn forward(&self, r: &Integer, puzzle: &CubingPuzzle) -> Result<Integer> {
        self.walk_units(r, puzzle, |x, domain| self.permute(x, domain))
    }

    pub(crate) fn backward(&self, r: &Integer, puzzle: &CubingPuzzle) -> Result<Integer> {
        self.walk_units(r, puzzle, |x, domain| self.unpermute(x, domain))
    }

    fn walk_units<F>(&self, r: &Integer, puzzle: &CubingPuzzle, step: F) -> Result<Integer>
    where
        F: Fn(&Integer, &Integer) -> Result<Integer>,
    {
        let modulus = &puzzle.modulus;
        let domain = Integer::from(modulus - 1u32);
        let mut x = Integer::from(r - 1u32);
        for _ in 0..puzzle.config.max_cycle_walks {
            x = step(&x, &domain)?;
            let candidate = Integer::from(&x + 1u32);
            if is_unit(&candidate, modulus) {
                return Ok(candidate);
            }
        }
        Err(TrecubeError::SearchExhausted {
            what: "unit walk",
            attempts: puzzle.config.max_cycle_walks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::CipherKey;
    use crate::modulus::construct_safe_prime;
    use crate::random::RandomSource;

    fn safe_prime_puzzle(bits: u32, rounds: u64, chain: u64) -> CubingPuzzle {
        let config = PuzzleConfig::default();
        let modulus = construct_safe_prime(bits, &config).unwrap();
        CubingPuzzle::new(
            modulus.modulus(),
            ChainParams::new(rounds, chain).unwrap(),
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_puzzle_initialization() {
        let puzzle = safe_prime_puzzle(64, 10, 5);
        assert_eq!(puzzle.modulus().significant_bits(), 64);
        assert_eq!(puzzle.params().chain_length(), 5);
        assert_eq!(puzzle.params().rounds(), 10);
    }

    #[test]
    fn test_delay_is_deterministic() {
        let puzzle = safe_prime_puzzle(64, 10, 5);
        let mut rng = RandomSource::from_seed(42);
        let key = RoundKey::generate(puzzle.params(), &mut rng);
        let m = rng.random_message(puzzle.modulus()).unwrap();

        let c1 = puzzle.delay(&m, &key).unwrap();
        let c2 = puzzle.delay(&m, &key).unwrap();
        assert_eq!(c1, c2);
        assert!(c1 >= 1 && c1 < *puzzle.modulus());
    }

    #[test]
    fn test_single_link_by_hand() {
        let config = PuzzleConfig::default();
        let modulus = Integer::from(11);
        let puzzle = CubingPuzzle::new(&modulus, ChainParams::new(1, 1).unwrap(), config).unwrap();
        let key = RoundKey::Shuffle(ShuffleKey::from_bytes(vec![0]));
        // Key bit 0 is clear, so 3 shifts to 2, doubles to 4, shifts back to 5.
        let c = puzzle.delay(&Integer::from(3), &key).unwrap();
        assert_eq!(c, Integer::from(5u32.pow(3) % 11));
    }

    #[test]
    fn test_rejects_out_of_range_messages() {
        let puzzle = safe_prime_puzzle(64, 10, 2);
        let mut rng = RandomSource::from_seed(1);
        let key = RoundKey::generate(puzzle.params(), &mut rng);

        for bad in [Integer::new(), puzzle.modulus().clone(), Integer::from(-3)] {
            assert!(matches!(
                puzzle.delay(&bad, &key),
                Err(TrecubeError::InvalidMessage(_))
            ));
        }
    }

    #[test]
    fn test_rejects_mismatched_key() {
        let puzzle = safe_prime_puzzle(64, 10, 2);
        let mut rng = RandomSource::from_seed(1);
        let key = RoundKey::Cipher(CipherKey::generate(&mut rng));
        assert!(matches!(
            puzzle.delay(&Integer::from(5), &key),
            Err(TrecubeError::Configuration(_))
        ));

        let short = RoundKey::Shuffle(ShuffleKey::from_bytes(vec![0xFF]));
        assert!(matches!(
            puzzle.delay(&Integer::from(5), &short),
            Err(TrecubeError::Configuration(_))
        ));
    }

    #[test]
    fn test_cipher_mode_needs_wide_modulus() {
        let config = PuzzleConfig::default();
        let modulus = construct_safe_prime(100, &config).unwrap();
        let result = CubingPuzzle::new(modulus.modulus(), ChainParams::new(0, 1).unwrap(), config);
        assert!(matches!(result, Err(TrecubeError::Configuration(_))));
    }

    #[test]
    fn test_cancelled_delay() {
        let puzzle = safe_prime_puzzle(64, 10, 100);
        let mut rng = RandomSource::from_seed(42);
        let key = RoundKey::generate(puzzle.params(), &mut rng);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            puzzle.delay_with_cancel(&Integer::from(2), &key, &token),
            Err(TrecubeError::Cancelled)
        ));
    }
}
