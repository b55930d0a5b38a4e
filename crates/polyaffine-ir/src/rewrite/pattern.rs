//! Rewrite pattern trait.

use super::rewriter::PatternRewriter;
use crate::context::IrContext;
use crate::refs::OpRef;

/// A pattern that can match and transform an operation.
///
/// # Arguments
///
/// - `ctx`: Mutable reference to the IR context for querying and mutation.
/// - `op`: The operation to match against.
/// - `rewriter`: Accumulates structural edits (insert, replace, erase) and
///   records in-place modification.
///
/// # Return Value
///
/// Return `true` if the pattern matched and recorded its change via the
/// rewriter. Return `false` if the pattern does not apply; in that case the
/// IR must be exactly as it was on entry.
pub trait RewritePattern {
    fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
