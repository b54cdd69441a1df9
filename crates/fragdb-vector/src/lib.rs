//! fragdb-vector
//!
//! Persistent flat vector index for code fragments: append-only vector
//! rows, id⇄position bijection, condensed metadata side-store, filtered
//! exact search, and a versioned three-artifact persistence layout.

pub mod index;
pub mod persist;

pub use index::{FragmentIndex, Metric};
pub use persist::IndexPaths;
