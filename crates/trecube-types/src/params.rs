use crate::{Result, TrecubeError};

/// Re-randomization applied once per chain link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReRandomization {
    /// AES-256 wide-block encryption, cycle-walked into the domain.
    Cipher,
    /// Thorp shuffle with the given number of rounds.
    Shuffle { rounds: u64 },
}

/// Round count `R` and chain length `C` of one delay/open pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainParams {
    rounds: u64,
    chain_length: u64,
}

impl ChainParams {
    /// `rounds == 0` selects cipher re-randomization.
    pub fn new(rounds: u64, chain_length: u64) -> Result<Self> {
        if chain_length == 0 {
            return Err(TrecubeError::Configuration(
                "chain length must be at least 1".into(),
            ));
        }
        Ok(ChainParams {
            rounds,
            chain_length,
        })
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn chain_length(&self) -> u64 {
        self.chain_length
    }

    pub fn re_randomization(&self) -> ReRandomization {
        match self.rounds {
            0 => ReRandomization::Cipher,
            rounds => ReRandomization::Shuffle { rounds },
        }
    }

    /// Bytes of shuffle key material needed, one bit per round.
    pub fn shuffle_key_len(&self) -> usize {
        self.rounds.div_ceil(8) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rounds_selects_cipher() {
        let params = ChainParams::new(0, 10).unwrap();
        assert_eq!(params.re_randomization(), ReRandomization::Cipher);
        assert_eq!(params.shuffle_key_len(), 0);
    }

    #[test]
    fn test_shuffle_key_len_rounds_up() {
        let params = ChainParams::new(50, 1).unwrap();
        assert_eq!(
            params.re_randomization(),
            ReRandomization::Shuffle { rounds: 50 }
        );
        assert_eq!(params.shuffle_key_len(), 7);
        assert_eq!(ChainParams::new(8, 1).unwrap().shuffle_key_len(), 1);
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(matches!(
            ChainParams::new(3, 0),
            Err(TrecubeError::Configuration(_))
        ));
    }
}
