//! PatternApplicator: visitor-based fixpoint iteration that applies rewrite
//! patterns to all operations in a module. Uses snapshots of block
//! operations and checks `parent_block` validity to skip deleted ops.

use super::pattern::RewritePattern;
use super::rewriter::{self, PatternRewriter};
use crate::context::IrContext;
use crate::dialect::core::Module;
use crate::refs::{BlockRef, OpRef, RegionRef};

/// Result of applying rewrite patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyResult {
    /// Number of fixpoint iterations performed.
    pub iterations: usize,
    /// Total number of pattern matches (mutations applied).
    pub total_changes: usize,
    /// Whether the fixpoint was reached (no changes in last iteration).
    pub reached_fixpoint: bool,
}

/// Applies rewrite patterns using visitor-based fixpoint iteration.
pub struct PatternApplicator {
    patterns: Vec<Box<dyn RewritePattern>>,
    max_iterations: usize,
}

impl Default for PatternApplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternApplicator {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
            max_iterations: 10,
        }
    }

    /// Add a rewrite pattern.
    pub fn add_pattern(mut self, pattern: impl RewritePattern + 'static) -> Self {
        self.patterns.push(Box::new(pattern));
        self
    }

    /// Set maximum fixpoint iterations.
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    /// Apply patterns until nothing changes or the iteration cap is hit.
    pub fn apply_partial(&self, ctx: &mut IrContext, module: Module) -> ApplyResult {
        let mut total_changes = 0;
        let mut iterations = 0;

        for _ in 0..self.max_iterations {
            iterations += 1;
            let changes = self.run_one_iteration(ctx, module);
            total_changes += changes;
            tracing::debug!(iteration = iterations, changes, "pattern sweep finished");
            if changes == 0 {
                return ApplyResult {
                    iterations,
                    total_changes,
                    reached_fixpoint: true,
                };
            }
        }

        ApplyResult {
            iterations,
            total_changes,
            reached_fixpoint: false,
        }
    }

    /// Run a single iteration over all operations.
    fn run_one_iteration(&self, ctx: &mut IrContext, module: Module) -> usize {
        match module.body(ctx) {
            Some(body) => self.visit_region(ctx, body),
            None => 0,
        }
    }

    fn visit_region(&self, ctx: &mut IrContext, region: RegionRef) -> usize {
        let mut changes = 0;
        let blocks: Vec<BlockRef> = ctx.region(region).blocks.to_vec();
        for block in blocks {
            changes += self.visit_block(ctx, block);
        }
        changes
    }

    fn visit_block(&self, ctx: &mut IrContext, block: BlockRef) -> usize {
        let mut changes = 0;

        // Snapshot the ops in this block
        let ops: Vec<OpRef> = ctx.block(block).ops.to_vec();

        for op in ops {
            // Skip ops that have been removed from their block
            if ctx.op(op).parent_block != Some(block) {
                continue;
            }

            // First, recurse into nested regions
            let regions: Vec<RegionRef> = ctx.op(op).regions.to_vec();
            for region in regions {
                changes += self.visit_region(ctx, region);
            }

            // Skip ops that were removed during nested processing
            if ctx.op(op).parent_block != Some(block) {
                continue;
            }

            for pattern in &self.patterns {
                let mut rw = PatternRewriter::new();
                let matched = pattern.match_and_rewrite(ctx, op, &mut rw);
                if matched && rw.has_mutations() {
                    tracing::trace!(pattern = pattern.name(), %op, "pattern applied");
                    rewriter::apply_mutations(ctx, op, rw.take_mutations());
                    changes += 1;
                    break; // Only apply one pattern per op per iteration
                }
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OperationDataBuilder;
    use crate::parser::parse_test_module;
    use crate::printer::print_module;
    use crate::refs::TypeRef;
    use crate::symbol::Symbol;

    /// Pattern: rename test.source to test.target
    struct RenamePattern;

    impl RewritePattern for RenamePattern {
        fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
            let data = ctx.op(op);
            if !data.is("test", "source") {
                return false;
            }

            let loc = data.location;
            let result_types: Vec<TypeRef> = ctx.op_result_types(op).to_vec();

            let new_data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("target"))
                .results(result_types)
                .build(ctx);
            let new_op = ctx.create_op(new_data);
            rewriter.replace_op(new_op);
            true
        }
    }

    /// Pattern: tag every untagged test.target in place
    struct TagPattern;

    impl RewritePattern for TagPattern {
        fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
            let data = ctx.op(op);
            if !data.is("test", "target") || data.attributes.contains_key(&Symbol::new("tagged")) {
                return false;
            }
            ctx.op_mut(op)
                .attributes
                .insert(Symbol::new("tagged"), crate::types::Attribute::Bool(true));
            rewriter.modify_op_in_place();
            true
        }
    }

    #[test]
    fn applicator_renames_op_and_preserves_uses() {
        let (mut ctx, module) = parse_test_module(
            r#"core.module @test {
  %0 = test.source : core.i32
  test.use %0
}"#,
        );

        let applicator = PatternApplicator::new().add_pattern(RenamePattern);
        let result = applicator.apply_partial(&mut ctx, module);
        assert!(result.reached_fixpoint);
        assert_eq!(result.total_changes, 1);
        assert_eq!(result.iterations, 2);

        let ops = module.ops(&ctx);
        assert_eq!(ops.len(), 2);
        assert!(ctx.op(ops[0]).is("test", "target"));
        assert_eq!(ctx.op_operands(ops[1])[0], ctx.op_result(ops[0], 0));
    }

    #[test]
    fn in_place_changes_count_as_progress() {
        let (mut ctx, module) = parse_test_module(
            r#"core.module @test {
  %0 = test.source : core.i32
}"#,
        );

        let applicator = PatternApplicator::new()
            .add_pattern(RenamePattern)
            .add_pattern(TagPattern);
        let result = applicator.apply_partial(&mut ctx, module);
        assert!(result.reached_fixpoint);
        assert_eq!(result.total_changes, 2);
        assert_eq!(
            print_module(&ctx, module.op_ref()),
            "core.module @test {\n  %0 = test.target {tagged = true} : core.i32\n}\n"
        );
    }

    #[test]
    fn iteration_cap_is_respected() {
        struct Flip;
        impl RewritePattern for Flip {
            fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
                if !ctx.op(op).is("test", "flip") {
                    return false;
                }
                rewriter.modify_op_in_place();
                true
            }
        }

        let (mut ctx, module) = parse_test_module("core.module @test {\n  test.flip\n}");
        let result = PatternApplicator::new()
            .add_pattern(Flip)
            .with_max_iterations(3)
            .apply_partial(&mut ctx, module);
        assert_eq!(result.iterations, 3);
        assert!(!result.reached_fixpoint);
    }
}
