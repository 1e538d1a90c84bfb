pub mod clm;

pub use clm::{ClmApiClient, ClmConfig};
