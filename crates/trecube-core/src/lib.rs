pub mod cancel;
pub mod cipher;
pub mod config;
pub mod fpe;
pub mod keys;
pub mod modulus;
pub mod opener;
pub mod puzzle;
pub mod random;

pub use cancel::CancellationToken;
pub use config::PuzzleConfig;
pub use keys::{CipherKey, RoundKey, ShuffleKey};
pub use modulus::{CubingModulus, ModulusKind, ModulusRequest};
pub use opener::TrapdoorOpener;
pub use puzzle::CubingPuzzle;
pub use random::RandomSource;
pub use trecube_types::{ChainParams, ReRandomization, Result, TrecubeError};
