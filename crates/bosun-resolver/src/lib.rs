//! # Bosun Resolver
//!
//! Maps plugin names to source locations across an ordered tree of
//! backends:
//! - Meta-repo expansion of shorthand declarations
//! - Composite and leaf resolver nodes with first-match-wins precedence
//! - Table, depot and source-host lookup strategies
//! - Provider lifecycle owned by each leaf

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod context;
pub mod expand;
pub mod leaf;
pub mod node;
pub mod resolver;

pub use context::{DirectoryResources, ResolverContext, ResourceLoader, StaticResources};
pub use expand::expand;
pub use leaf::{LeafResolver, Lookup};
pub use node::{Resolved, ResolverNode};
pub use resolver::RepoResolver;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::context::ResolverContext;
    pub use crate::node::{Resolved, ResolverNode};
    pub use crate::resolver::RepoResolver;
}
