//! Semantic version handling
//!
//! Pure computation over versions and constraints, shared by the catalog,
//! the resolution engine and the protocol layer. Holds no state.
//!
//! # Modules
//!
//! - [`semver`]: Parsing and the total order over versions
//! - [`constraint`]: Constraint expressions (`>=`, `~>`, comma conjunctions)
//! - [`resolver`]: Latest-satisfying selection with pre-release policy
//! - [`error`]: Error types for malformed versions and constraints

pub mod constraint;
pub mod error;
pub mod resolver;
pub mod semver;

pub use constraint::{Constraint, satisfies};
pub use error::VersionError;
pub use resolver::{PrereleasePolicy, latest_satisfying};
pub use self::semver::{compare, parse};
