//! PatternRewriter: accumulates the structural edits of one pattern
//! application. Value replacement goes through RAUW on the context.

use crate::context::IrContext;
use crate::refs::{OpRef, ValueRef};

/// Accumulated mutations from a pattern rewrite.
pub(crate) struct Mutations {
    /// The replacement operation (if any).
    pub(crate) replacement: Option<OpRef>,
    /// If set, the operation is erased and its results mapped to these values.
    pub(crate) erase_values: Option<Vec<ValueRef>>,
}

/// Rewriter interface for patterns.
///
/// Structural edits are recorded here and applied by the
/// `PatternApplicator` after the pattern returns. Patterns that change an
/// operation's attributes or operands directly report it with
/// [`PatternRewriter::modify_op_in_place`].
#[derive(Default)]
pub struct PatternRewriter {
    replacement: Option<OpRef>,
    erase_values: Option<Vec<ValueRef>>,
    modified_in_place: bool,
}

impl PatternRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    // === Mutations ===

    /// Replace the current operation with a new one.
    ///
    /// The applicator will RAUW old results to new results (1:1 by index),
    /// then put the new op where the old one was and erase the old one.
    pub fn replace_op(&mut self, new_op: OpRef) {
        debug_assert!(
            self.replacement.is_none() && self.erase_values.is_none(),
            "replace_op called after replace_op or erase_op"
        );
        self.replacement = Some(new_op);
    }

    /// Erase the current operation, mapping its results to the given values.
    pub fn erase_op(&mut self, replacement_values: Vec<ValueRef>) {
        debug_assert!(
            self.replacement.is_none() && self.erase_values.is_none(),
            "erase_op called after replace_op or erase_op"
        );
        self.erase_values = Some(replacement_values);
    }

    /// Record that the pattern changed the current operation directly.
    pub fn modify_op_in_place(&mut self) {
        self.modified_in_place = true;
    }

    // === Query ===

    /// Check if any change was recorded.
    pub(crate) fn has_mutations(&self) -> bool {
        self.replacement.is_some() || self.erase_values.is_some() || self.modified_in_place
    }

    /// Consume the rewriter and return accumulated mutations.
    pub(crate) fn take_mutations(self) -> Mutations {
        Mutations {
            replacement: self.replacement,
            erase_values: self.erase_values,
        }
    }
}

/// Apply mutations to the IR context.
///
/// Called by the applicator after a pattern returns `true`.
pub(crate) fn apply_mutations(ctx: &mut IrContext, original_op: OpRef, mutations: Mutations) {
    let parent_block = ctx.op(original_op).parent_block;

    // Replacement is placed where the original was; erasure only remaps.
    if let Some(new_op) = mutations.replacement {
        let old_results: Vec<ValueRef> = ctx.op_results(original_op).to_vec();
        let new_results: Vec<ValueRef> = ctx.op_results(new_op).to_vec();
        debug_assert_eq!(
            old_results.len(),
            new_results.len(),
            "replace_op: result count mismatch ({} vs {})",
            old_results.len(),
            new_results.len()
        );
        for (old_v, new_v) in old_results.iter().zip(new_results.iter()) {
            ctx.replace_all_uses(*old_v, *new_v);
        }

        if let Some(block) = parent_block {
            ctx.insert_op_before(block, original_op, new_op);
        }
        ctx.erase_op(original_op);
    } else if let Some(erase_values) = mutations.erase_values {
        let old_results: Vec<ValueRef> = ctx.op_results(original_op).to_vec();
        debug_assert_eq!(
            old_results.len(),
            erase_values.len(),
            "erase_op: replacement value count mismatch ({} vs {})",
            old_results.len(),
            erase_values.len()
        );
        for (old_v, new_v) in old_results.iter().zip(erase_values.iter()) {
            ctx.replace_all_uses(*old_v, *new_v);
        }
        ctx.erase_op(original_op);
    }
}
