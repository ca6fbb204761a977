//! Fabric static core.
//!
//! ```text
//! AST → propagate (environments, names, queued demands) → demands by priority → Analysis
//!                                                                  ↓
//!                                          code generator ← ScopeResolver / LookupCache
//! ```
//!
//! Entry point: [`analyse`]. The returned [`Analysis`] answers type queries
//! for every classified name and node, and [`ScopeResolver`] binds names per
//! generated branch.

pub mod analysis;
pub mod config;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod names;
pub mod resolve;

pub use analysis::{analyse, Analysis, NodeFacts};
pub use config::AnalysisOptions;
pub use diagnostics::Diagnostics;
pub use env::{EnvId, Environment, Intrinsic, ScopeTree, Typeable};
pub use error::{ConfigError, ResolveError, ResolveResult};
pub use names::{NameId, NameInfo, NameKind};
pub use resolve::{Loadable, LoadedName, LookupCache, ScopeResolution, ScopeResolver, Special};
