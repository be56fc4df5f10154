pub mod error;
pub mod params;

pub use error::{Result, TrecubeError};
pub use params::{ChainParams, ReRandomization};
