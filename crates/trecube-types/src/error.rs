use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrecubeError {
    /// Unsupported bit length or parameter combination. Never retried.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The block cipher could not be keyed or failed to process a block.
    #[error("Cipher engine error: {0}")]
    Engine(String),

    /// A constructed modulus or a round trip broke an arithmetic invariant.
    #[error("Arithmetic invariant violated: {0}")]
    ArithmeticInvariant(String),

    #[error("{what} exhausted after {attempts} attempts")]
    SearchExhausted { what: &'static str, attempts: u64 },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrecubeError>;
