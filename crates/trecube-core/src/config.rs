use serde::{Deserialize, Serialize};
use std::path::Path;
use trecube_types::{Result, TrecubeError};

/// Limits and tuning knobs shared by the constructors and the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PuzzleConfig {
    /// Candidates tried by a single prime search before giving up.
    pub max_prime_candidates: u64,
    /// Permutation applications allowed for one cycle walk.
    pub max_cycle_walks: u64,
    /// Miller-Rabin repetitions for probable-prime tests.
    pub primality_reps: u32,
    /// Below this size, safe primes come from a direct probable-prime search.
    pub pocklington_min_bits: u32,
    /// Random units checked against the trapdoor after construction.
    pub trapdoor_checks: u32,
}

impl Default for PuzzleConfig {
    fn default() -> Self {
        Self {
            max_prime_candidates: 1_000_000,
            max_cycle_walks: 1000,
            primality_reps: 30,
            pocklington_min_bits: 64,
            trapdoor_checks: 4,
        }
    }
}

impl PuzzleConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PuzzleConfig = toml::from_str(content)
            .map_err(|e| TrecubeError::Configuration(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TrecubeError::Configuration(format!("TOML encode error: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_prime_candidates == 0 {
            return Err(TrecubeError::Configuration(
                "max_prime_candidates cannot be 0".into(),
            ));
        }
        if self.max_cycle_walks == 0 {
            return Err(TrecubeError::Configuration(
                "max_cycle_walks cannot be 0".into(),
            ));
        }
        if self.primality_reps == 0 {
            return Err(TrecubeError::Configuration(
                "primality_reps cannot be 0".into(),
            ));
        }
        // The recursive construction needs a base case it can reach.
        if self.pocklington_min_bits < 16 {
            return Err(TrecubeError::Configuration(
                "pocklington_min_bits must be at least 16".into(),
            ));
        }
        Ok(())
    }
}
