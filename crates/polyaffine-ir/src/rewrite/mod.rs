//! Rewrite infrastructure.
//!
//! Patterns mutate the arena in place and record their structural edits
//! (replacement, erasure, in-place modification) on a [`PatternRewriter`]; the
//! [`PatternApplicator`] applies those edits and drives the fixpoint.

pub mod applicator;
pub mod helpers;
pub mod pattern;
pub mod rewriter;

pub use applicator::{ApplyResult, PatternApplicator};
pub use pattern::RewritePattern;
pub use rewriter::PatternRewriter;
