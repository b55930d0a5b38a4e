//! Dead Code Elimination (DCE).
//!
//! Removes operations whose results are never used and which have no side
//! effects. Use-chains make dead-op detection a constant-time check.

use crate::context::IrContext;
use crate::dialect::core::Module;
use crate::effects::OpEffects;
use crate::refs::{BlockRef, OpRef, RegionRef};

/// Configuration for dead code elimination.
#[derive(Debug, Clone)]
pub struct DceConfig {
    /// Maximum fixpoint iterations before giving up. Default: 100.
    pub max_iterations: usize,
    /// Whether to recursively process nested regions. Default: true.
    pub recursive: bool,
}

impl Default for DceConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            recursive: true,
        }
    }
}

/// Result of running dead code elimination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DceResult {
    /// Total number of operations removed.
    pub removed_count: usize,
    /// Number of fixpoint iterations performed.
    pub iterations: usize,
    /// Whether fixpoint was reached (no more changes possible).
    pub reached_fixpoint: bool,
}

/// Eliminate dead code from a module using default configuration.
pub fn eliminate_dead_code(ctx: &mut IrContext, module: Module) -> DceResult {
    eliminate_dead_code_with_config(ctx, module, DceConfig::default())
}

/// Eliminate dead code with custom configuration.
pub fn eliminate_dead_code_with_config(ctx: &mut IrContext, module: Module, config: DceConfig) -> DceResult {
    let max_iterations = if config.max_iterations == 0 {
        100
    } else {
        config.max_iterations
    };

    let mut total_removed = 0;

    for iteration in 0..max_iterations {
        let removed = match module.body(ctx) {
            Some(body) => sweep_region(ctx, body, &config),
            None => 0,
        };

        if removed == 0 {
            tracing::debug!(removed = total_removed, "dead code elimination reached fixpoint");
            return DceResult {
                removed_count: total_removed,
                iterations: iteration + 1,
                reached_fixpoint: true,
            };
        }

        total_removed += removed;
    }

    DceResult {
        removed_count: total_removed,
        iterations: max_iterations,
        reached_fixpoint: false,
    }
}

/// Sweep all blocks in a region. Returns the number of ops removed.
fn sweep_region(ctx: &mut IrContext, region: RegionRef, config: &DceConfig) -> usize {
    let blocks: Vec<BlockRef> = ctx.region(region).blocks.to_vec();
    let mut removed = 0;
    for block in blocks {
        removed += sweep_block(ctx, block, config);
    }
    removed
}

/// Sweep a single block in reverse order, removing dead ops.
///
/// Iterating in reverse maximizes cascade removal: if op C uses op B's
/// result and op B uses op A's result, removing C first frees B, then A.
fn sweep_block(ctx: &mut IrContext, block: BlockRef, config: &DceConfig) -> usize {
    let mut removed = 0;

    if config.recursive {
        let ops: Vec<OpRef> = ctx.block(block).ops.to_vec();
        for op in ops {
            let regions: Vec<RegionRef> = ctx.op(op).regions.to_vec();
            for region in regions {
                removed += sweep_region(ctx, region, config);
            }
        }
    }

    let ops: Vec<OpRef> = ctx.block(block).ops.to_vec();
    for &op in ops.iter().rev() {
        if is_dead(ctx, op) {
            ctx.erase_op(op);
            removed += 1;
        }
    }

    removed
}

/// Removable (pure with results) and no result is used.
fn is_dead(ctx: &IrContext, op: OpRef) -> bool {
    OpEffects::is_removable(ctx, op) && ctx.op_results(op).iter().all(|&r| !ctx.has_uses(r))
}
