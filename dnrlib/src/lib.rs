//! # Distribution Network Reconfiguration Library
//!
//! Radial topology maintenance, network aggregation and switch optimization for electrical
//! distribution networks. Common functionality for the command line interface.

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

pub mod aggregation;
pub mod criteria;
pub mod flow;
pub mod graph;
pub mod io;
pub mod optimizer;
pub mod search;
pub mod solution;
pub mod stop;
pub mod switches;
pub mod topology;
pub mod types;

/// Represents the reasons why an operation might fail.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, thiserror::Error)]
#[serde(tag = "type", content = "content")] // content will be used for the messages
pub enum DnrError {
    /// The input network, settings or problem is malformed.
    #[error("Bad input: {0}")]
    BadInput(String),
    /// A query or mutation was used outside of its contract.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// A configuration could not be repaired.
    #[error("Repair failed: {0}")]
    Repair(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DnrError {
    fn from(e: std::io::Error) -> Self {
        DnrError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for DnrError {
    fn from(e: serde_json::Error) -> Self {
        DnrError::BadInput(e.to_string())
    }
}

pub type DnrResult<T> = Result<T, DnrError>;

/// Create a random number generator, seeded if a seed is given.
pub fn create_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
