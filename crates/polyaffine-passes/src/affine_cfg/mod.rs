//! Affine control-flow legalization.
//!
//! Raises generic index arithmetic, memory accesses and conditionals into
//! the affine dialect, and keeps the maps and sets already in the affine
//! dialect canonical. The pass is a greedy pattern rewrite:
//!
//! - `CanonicalizeAffineApply`: compose `affine.apply` chains into one map
//! - `CanonicalizeIndexCast`: fold casts of casts and index-typed constants
//! - `AffineFixup`: recompose the maps of affine memory accesses
//! - `CanonicalizeIfBounds`: recompose the condition of `affine.if`
//! - `MoveStoreToAffine` / `MoveLoadToAffine`: raise `mem` accesses
//! - `MoveIfToAffine`: raise `scf.if` with an affine guard
//! - `CanonicalizeForBounds`: recompose loop bounds, splitting min/max selects
//!
//! A rewrite either completes or leaves the IR untouched: every operation a
//! pattern materializes while normalizing is recorded in an [`EditLog`] and
//! rolled back on failure.

mod canonicalize;
mod classify;
mod compare;
mod normalize;
mod patterns;
mod promote;

#[cfg(test)]
mod tests;

use polyaffine_ir::dialect::core::Module;
use polyaffine_ir::rewrite::{ApplyResult, PatternApplicator};
use polyaffine_ir::transforms::dce::{DceResult, eliminate_dead_code};
use polyaffine_ir::IrContext;
use tracing::{debug, info_span, warn};

pub use canonicalize::{canonicalize_map_and_operands, canonicalize_set_and_operands};
pub use classify::{is_affine_loop_arg, is_top_level_value, is_valid_index, is_valid_symbol, legal_condition};
pub use normalize::{NormalizeError, fully_compose_map_and_operands, fully_compose_set_and_operands};
pub use promote::{EditLog, promote};

use patterns::{
    AffineFixup, CanonicalizeAffineApply, CanonicalizeForBounds, CanonicalizeIfBounds, CanonicalizeIndexCast,
    MoveIfToAffine, MoveLoadToAffine, MoveStoreToAffine,
};

/// Configuration for [`legalize_affine_cfg_with_config`].
#[derive(Debug, Clone)]
pub struct AffineCfgConfig {
    /// Maximum greedy rewrite sweeps over the module. Default: 10.
    pub max_iterations: usize,
    /// Whether to sweep dead operations after rewriting. Default: true.
    pub run_dce: bool,
    /// Maximum composition rounds per map or set. Default: 32.
    pub max_compose_steps: usize,
}

impl Default for AffineCfgConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            run_dce: true,
            max_compose_steps: 32,
        }
    }
}

/// Outcome of one legalization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffineCfgResult {
    pub apply: ApplyResult,
    /// `None` when dead-code elimination was disabled.
    pub dce: Option<DceResult>,
}

impl AffineCfgResult {
    /// Whether the run changed the module at all.
    pub fn changed(&self) -> bool {
        self.apply.total_changes > 0 || self.dce.is_some_and(|d| d.removed_count > 0)
    }
}

/// Legalize a module with the default configuration.
pub fn legalize_affine_cfg(ctx: &mut IrContext, module: Module) -> AffineCfgResult {
    legalize_affine_cfg_with_config(ctx, module, AffineCfgConfig::default())
}

/// Legalize a module.
pub fn legalize_affine_cfg_with_config(ctx: &mut IrContext, module: Module, config: AffineCfgConfig) -> AffineCfgResult {
    let _span = info_span!("affine_cfg").entered();
    let compose_limit = config.max_compose_steps;

    let applicator = PatternApplicator::new()
        .add_pattern(CanonicalizeAffineApply { compose_limit })
        .add_pattern(CanonicalizeIndexCast)
        .add_pattern(AffineFixup { compose_limit })
        .add_pattern(CanonicalizeIfBounds { compose_limit })
        .add_pattern(MoveStoreToAffine { compose_limit })
        .add_pattern(MoveIfToAffine { compose_limit })
        .add_pattern(MoveLoadToAffine { compose_limit })
        .add_pattern(CanonicalizeForBounds { compose_limit })
        .with_max_iterations(config.max_iterations);

    let apply = applicator.apply_partial(ctx, module);
    if !apply.reached_fixpoint {
        warn!(
            iterations = apply.iterations,
            changes = apply.total_changes,
            "affine legalization stopped before reaching a fixpoint"
        );
    }

    let dce = config.run_dce.then(|| eliminate_dead_code(ctx, module));
    debug!(
        changes = apply.total_changes,
        iterations = apply.iterations,
        removed = dce.map_or(0, |d| d.removed_count),
        "affine legalization finished"
    );

    AffineCfgResult { apply, dce }
}
