//! Shared type definitions for the weld crate
//!
//! This module contains common types that are used across multiple pipeline
//! stages, ensuring consistency and avoiding circular dependencies.

use std::hash::BuildHasherDefault;

use indexmap::IndexSet;
use rustc_hash::FxHasher;

/// Insertion-ordered set with the Fx hasher
pub type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// Classification of an extracted segment
///
/// Brace-delimited kinds carry the well-formedness invariant checked by the
/// brace scanner; marker-based kinds are located by line or pattern match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// A single line declaring a named constant (`const INLINE_DATA = ...`)
    DataBlob,

    /// A head-level library `<script>` block or a pattern-delimited region
    LibraryBlock,

    /// A contiguous run of function declarations, possibly with skipped members
    FunctionGroup,

    /// One brace-delimited function declaration
    SingleFunction,
}

impl std::fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataBlob => write!(f, "data"),
            Self::LibraryBlock => write!(f, "library"),
            Self::FunctionGroup => write!(f, "function-group"),
            Self::SingleFunction => write!(f, "function"),
        }
    }
}
