//! Result type for converge-core operations.

use crate::error::Error;

/// The standard Result type for converge-core operations.
pub type Result<T> = std::result::Result<T, Error>;
