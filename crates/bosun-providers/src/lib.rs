//! # Bosun Providers
//!
//! Metadata and source providers used by resolver leaves:
//! - A uniform async [`Provider`] capability trait
//! - A [`ProviderRegistry`] mapping type selectors to constructors
//! - Built-in providers: `http` (metadata), `git` and `http_archive` (source)

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod archive;
pub mod git;
pub mod http;
pub mod provider;
pub mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use archive::HttpArchiveSourceProvider;
pub use git::GitSourceProvider;
pub use http::HttpMetadataProvider;
pub use provider::{Provider, ProviderContext, SharedProvider};
pub use registry::{ProviderFactory, ProviderRegistry};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::provider::{Provider, ProviderContext, SharedProvider};
    pub use crate::registry::ProviderRegistry;
}
