//! # Bosun Core
//!
//! Core types and error handling shared by every bosun crate:
//! - Resolution results and source specifications
//! - Plugin metadata documents
//! - Fetched source artifacts
//! - Error types

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod artifact;
pub mod error;
pub mod types;

pub use artifact::{ArtifactFormat, SourceArtifact};
pub use error::{Error, Result};
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::artifact::{ArtifactFormat, SourceArtifact};
    pub use crate::error::{Error, Result};
    pub use crate::types::*;
}
