use rug::Integer;
use tracing::{debug, instrument};
use trecube_types::{Result, TrecubeError};

use crate::cancel::CancellationToken;
use crate::keys::RoundKey;
use crate::modulus::pow_mod;
use crate::puzzle::{CubingPuzzle, Rerandomizer};

/// Opens puzzles with the trapdoor exponent, taking a cube root per link in
/// one exponentiation instead of redoing the delay.
pub struct TrapdoorOpener<'a> {
    puzzle: &'a CubingPuzzle,
    trapdoor: &'a Integer,
}

impl<'a> TrapdoorOpener<'a> {
    pub fn new(puzzle: &'a CubingPuzzle, trapdoor: &'a Integer) -> Self {
        TrapdoorOpener { puzzle, trapdoor }
    }

    pub fn open(&self, ciphertext: &Integer, key: &RoundKey) -> Result<Integer> {
        self.open_with_cancel(ciphertext, key, &CancellationToken::new())
    }

    /// Undoes the chain link by link: cube root, then the inverse
    /// re-randomization under the same key.
    #[instrument(skip_all, fields(
        bits = self.puzzle.modulus().significant_bits(),
        chain = self.puzzle.params().chain_length(),
    ))]
    pub fn open_with_cancel(
        &self,
        ciphertext: &Integer,
        key: &RoundKey,
        cancelled: &CancellationToken,
    ) -> Result<Integer> {
        self.puzzle.check_residue(ciphertext)?;
        let rerandomizer = Rerandomizer::new(self.puzzle, key)?;
        let modulus = self.puzzle.modulus();

        let mut r = ciphertext.clone();
        for link in 0..self.puzzle.params().chain_length() {
            if cancelled.is_cancelled() {
                debug!(link, "open cancelled");
                return Err(TrecubeError::Cancelled);
            }
            r = pow_mod(&r, self.trapdoor, modulus)?;
            r = rerandomizer.backward(&r, self.puzzle)?;
        }
        Ok(r)
    }

    /// Delays `message` and opens the result again, failing if the two
    /// disagree. A mismatch means the trapdoor does not belong to the modulus.
    pub fn seal_checked(&self, message: &Integer, key: &RoundKey) -> Result<Integer> {
        let ciphertext = self.puzzle.delay(message, key)?;
        if self.open(&ciphertext, key)? != *message {
            return Err(TrecubeError::ArithmeticInvariant(
                "opening the delayed message did not recover it".into(),
            ));
        }
        Ok(ciphertext)
    }
}
