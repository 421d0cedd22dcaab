//! Error kinds surfaced by the core.
//!
//! Initialization errors abort the run; per-call errors are logged by the
//! driver and re-raised to the integrator. Numerical abnormalities (NaN,
//! Inf) are not detected here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A handler requires a cluster that the network does not contain.
    #[error("missing cluster {name} of size {size} in the reaction network")]
    MissingCluster { name: String, size: u32 },

    /// The X grid is non-monotone or contains a zero-width interval.
    #[error("invalid grid geometry at interval {index}: [{left}, {right}]")]
    InvalidGridGeometry { index: usize, left: f64, right: f64 },

    /// A buffer length does not match the network degrees of freedom.
    #[error("shape mismatch: expected stride {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Checkpoint read or write failure.
    #[error("checkpoint i/o failure: {0}")]
    IoFailure(#[from] std::io::Error),

    /// Unrecognized or inconsistent option.
    #[error("option error: {0}")]
    OptionError(String),

    /// The integrator asked for a point outside the owned box.
    #[error("point ({0}, {1}, {2}) is not owned by this process")]
    NotOwned(i64, i64, i64),
}

pub type Result<T> = std::result::Result<T, Error>;
