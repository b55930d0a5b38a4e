//! Rewrite patterns of the affine control-flow legalization.
//!
//! Every pattern that normalizes operands runs inside [`transactional`]: the
//! edits made while composing (hoisted computations, inserted casts) are
//! committed only when the pattern records a rewrite, and rolled back
//! otherwise.

use std::collections::VecDeque;

use polyaffine_ir::dialect::affine::{self, AccessKind};
use polyaffine_ir::dialect::{arith, core, mem, scf};
use polyaffine_ir::rewrite::helpers::{region_with_terminator, retarget_terminators};
use polyaffine_ir::rewrite::{PatternRewriter, RewritePattern};
use polyaffine_ir::{
    AffineMap, Attribute, DialectOp, IrContext, OpRef, OperationDataBuilder, RegionRef, Symbol, TypeRef, ValueRef,
};
use tracing::debug;

use super::canonicalize::{canonicalize_map_and_operands, canonicalize_set_and_operands};
use super::classify::is_valid_index;
use super::compare::{GuardBuilder, expand_min_max_select};
use super::normalize::{NormalizeError, fully_compose_map_and_operands, fully_compose_set_and_operands};
use super::promote::EditLog;

/// Run `body` with a fresh edit log. `Ok(true)` commits the log, anything
/// else rolls it back.
fn transactional(
    ctx: &mut IrContext,
    op: OpRef,
    pattern: &'static str,
    body: impl FnOnce(&mut IrContext, &mut EditLog) -> Result<bool, NormalizeError>,
) -> bool {
    let mut log = EditLog::new();
    match body(ctx, &mut log) {
        Ok(true) => {
            log.commit(ctx);
            true
        }
        Ok(false) => {
            log.rollback(ctx);
            false
        }
        Err(err) => {
            debug!(pattern, %op, %err, "operands are not affine");
            log.rollback(ctx);
            false
        }
    }
}

/// Compose and canonicalize a map for the operands of `anchor`.
fn normalize_map(
    ctx: &mut IrContext,
    log: &mut EditLog,
    anchor: OpRef,
    map: &AffineMap,
    operands: &[ValueRef],
    compose_limit: usize,
) -> Result<(AffineMap, Vec<ValueRef>), NormalizeError> {
    let (map, operands) = fully_compose_map_and_operands(ctx, log, anchor, map, operands, compose_limit)?;
    Ok(canonicalize_map_and_operands(ctx, &map, &operands))
}

// =============================================================================
// affine.apply
// =============================================================================

pub(crate) struct CanonicalizeAffineApply {
    pub(crate) compose_limit: usize,
}

impl RewritePattern for CanonicalizeAffineApply {
    fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
        let Ok(apply) = affine::Apply::from_op(ctx, op) else {
            return false;
        };
        let Some(map) = apply.map(ctx).cloned() else {
            return false;
        };
        let operands = apply.map_operands(ctx).to_vec();

        transactional(ctx, op, "CanonicalizeAffineApply", |ctx, log| {
            let (new_map, new_operands) = normalize_map(ctx, log, op, &map, &operands, self.compose_limit)?;
            let new_map = new_map.remove_duplicate_exprs();
            if new_map == map {
                return Ok(false);
            }
            let location = ctx.op(op).location;
            let ty = ctx.value_ty(apply.result(ctx));
            let replacement = affine::apply(ctx, location, new_map, &new_operands, ty);
            rewriter.replace_op(replacement.op_ref());
            Ok(true)
        })
    }
}

// =============================================================================
// arith.index_cast
// =============================================================================

/// `index_cast(index_cast(x))` back to the type of `x` is `x`; a cast of an
/// integer constant to `index` is an index constant.
pub(crate) struct CanonicalizeIndexCast;

impl RewritePattern for CanonicalizeIndexCast {
    fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
        let Ok(cast) = arith::IndexCast::from_op(ctx, op) else {
            return false;
        };
        let input = cast.input(ctx);
        let result_ty = ctx.value_ty(cast.result(ctx));
        let Some(def) = ctx.defining_op(input) else {
            return false;
        };

        if let Ok(inner) = arith::IndexCast::from_op(ctx, def) {
            let source = inner.input(ctx);
            if ctx.value_ty(source) == result_ty {
                rewriter.erase_op(vec![source]);
                return true;
            }
            return false;
        }

        if let Ok(constant) = arith::Const::from_op(ctx, def)
            && let Some(value) = constant.value(ctx)
            && core::is_index(ctx, result_ty)
            && !core::is_index(ctx, ctx.value_ty(input))
        {
            let location = ctx.op(op).location;
            let folded = arith::r#const(ctx, location, result_ty, value);
            rewriter.replace_op(folded.op_ref());
            return true;
        }
        false
    }
}

// =============================================================================
// mem.load / mem.store
// =============================================================================

pub(crate) struct MoveLoadToAffine {
    pub(crate) compose_limit: usize,
}

impl RewritePattern for MoveLoadToAffine {
    fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
        let Ok(load) = mem::Load::from_op(ctx, op) else {
            return false;
        };
        let indices = load.indices(ctx).to_vec();
        if !indices.iter().all(|&index| is_valid_index(ctx, index)) {
            return false;
        }
        let memref = load.memref(ctx);
        let Some(&ty) = ctx.op_result_types(op).first() else {
            return false;
        };

        transactional(ctx, op, "MoveLoadToAffine", |ctx, log| {
            let identity = AffineMap::symbol_identity(indices.len() as u32);
            let (map, operands) = normalize_map(ctx, log, op, &identity, &indices, self.compose_limit)?;
            let location = ctx.op(op).location;
            let replacement = affine::load(ctx, location, memref, map, &operands, ty);
            rewriter.replace_op(replacement.op_ref());
            Ok(true)
        })
    }
}

pub(crate) struct MoveStoreToAffine {
    pub(crate) compose_limit: usize,
}

impl RewritePattern for MoveStoreToAffine {
    fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
        let Ok(store) = mem::Store::from_op(ctx, op) else {
            return false;
        };
        let indices = store.indices(ctx).to_vec();
        if !indices.iter().all(|&index| is_valid_index(ctx, index)) {
            return false;
        }
        let (value, memref) = (store.value(ctx), store.memref(ctx));

        transactional(ctx, op, "MoveStoreToAffine", |ctx, log| {
            let identity = AffineMap::symbol_identity(indices.len() as u32);
            let (map, operands) = normalize_map(ctx, log, op, &identity, &indices, self.compose_limit)?;
            let location = ctx.op(op).location;
            let replacement = affine::store(ctx, location, value, memref, map, &operands);
            rewriter.replace_op(replacement.op_ref());
            Ok(true)
        })
    }
}

// =============================================================================
// Affine memory ops
// =============================================================================

/// Re-normalizes the access map of `affine.load`, `affine.store`,
/// `affine.prefetch`, `affine.vector_load` and `affine.vector_store`. The
/// op is rebuilt with the same name, leading operands and attributes.
pub(crate) struct AffineFixup {
    pub(crate) compose_limit: usize,
}

impl RewritePattern for AffineFixup {
    fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
        let Some(kind) = AccessKind::of(ctx, op) else {
            return false;
        };
        let Some(map) = affine::op_map(ctx, op).cloned() else {
            return false;
        };
        let all = ctx.op_operands(op).to_vec();
        let Some((prefix, operands)) = all.split_at_checked(kind.map_operand_start()) else {
            return false;
        };
        if map.num_inputs() != operands.len() {
            debug!(%op, %map, "access map arity does not match its operands");
            return false;
        }

        transactional(ctx, op, "AffineFixup", |ctx, log| {
            let (new_map, new_operands) = normalize_map(ctx, log, op, &map, operands, self.compose_limit)?;
            if new_map == map && new_operands == operands {
                return Ok(false);
            }
            let replacement = rebuild_access(ctx, op, prefix, new_map, &new_operands);
            rewriter.replace_op(replacement);
            Ok(true)
        })
    }
}

fn rebuild_access(ctx: &mut IrContext, op: OpRef, prefix: &[ValueRef], map: AffineMap, operands: &[ValueRef]) -> OpRef {
    let data = ctx.op(op);
    let (location, dialect, name) = (data.location, data.dialect, data.name);
    let attributes: Vec<(Symbol, Attribute)> = data.attributes.iter().map(|(k, v)| (*k, v.clone())).collect();
    let result_types: Vec<TypeRef> = ctx.op_result_types(op).to_vec();

    let mut builder = OperationDataBuilder::new(location, dialect, name)
        .operands(prefix.iter().copied())
        .operands(operands.iter().copied())
        .results(result_types);
    for (key, value) in attributes {
        builder = builder.attr(key, value);
    }
    let data = builder.build(ctx);
    let rebuilt = ctx.create_op(data);
    affine::set_op_map(ctx, rebuilt, map);
    rebuilt
}

// =============================================================================
// affine.for
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Bound {
    Lower,
    Upper,
}

/// Normalizes the lower and upper bound maps of `affine.for`. A bound that
/// is a single min (upper) or max (lower) select is first split into one
/// result per leaf.
pub(crate) struct CanonicalizeForBounds {
    pub(crate) compose_limit: usize,
}

impl CanonicalizeForBounds {
    fn normalize_bound(
        &self,
        ctx: &mut IrContext,
        log: &mut EditLog,
        anchor: OpRef,
        map: &AffineMap,
        operands: &[ValueRef],
        bound: Bound,
    ) -> Result<(AffineMap, Vec<ValueRef>), NormalizeError> {
        let (map, operands) = match expand_bound(ctx, map, operands, bound) {
            Some((map, operands)) => (map, operands),
            None => (map.clone(), operands.to_vec()),
        };
        let (map, operands) = normalize_map(ctx, log, anchor, &map, &operands, self.compose_limit)?;
        Ok((map.remove_duplicate_exprs(), operands))
    }
}

/// `()[s0] -> (s0)` over `min(a, b)` as an upper bound is
/// `()[s0, s1] -> (s0, s1)` over `[a, b]`, and likewise for a max as a
/// lower bound.
fn expand_bound(ctx: &IrContext, map: &AffineMap, operands: &[ValueRef], bound: Bound) -> Option<(AffineMap, Vec<ValueRef>)> {
    let [result] = map.results() else {
        return None;
    };
    let position = match (result.as_dim(), result.as_symbol()) {
        (Some(d), _) => d as usize,
        (None, Some(s)) => map.num_dims() as usize + s as usize,
        (None, None) => return None,
    };
    let leaves = expand_min_max_select(ctx, *operands.get(position)?)?;
    let expands = match bound {
        Bound::Upper => leaves.min,
        Bound::Lower => leaves.max,
    };
    if !expands || leaves.leaves.len() < 2 {
        return None;
    }
    let n = leaves.leaves.len() as u32;
    Some((AffineMap::symbol_identity(n), leaves.leaves.to_vec()))
}

impl RewritePattern for CanonicalizeForBounds {
    fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
        let Ok(for_op) = affine::For::from_op(ctx, op) else {
            return false;
        };
        let (Some(lb), Some(ub)) = (
            for_op.lower_bound_map(ctx).cloned(),
            for_op.upper_bound_map(ctx).cloned(),
        ) else {
            return false;
        };
        let lb_operands = for_op.lower_bound_operands(ctx).to_vec();
        let ub_operands = for_op.upper_bound_operands(ctx).to_vec();

        // Each bound commits or rolls back on its own.
        let lb_changed = transactional(ctx, op, "CanonicalizeForBounds", |ctx, log| {
            let (new_lb, new_operands) = self.normalize_bound(ctx, log, op, &lb, &lb_operands, Bound::Lower)?;
            if new_lb == lb && new_operands == lb_operands {
                return Ok(false);
            }
            for_op.set_lower_bound(ctx, new_lb, &new_operands);
            Ok(true)
        });
        let ub_changed = transactional(ctx, op, "CanonicalizeForBounds", |ctx, log| {
            let (new_ub, new_operands) = self.normalize_bound(ctx, log, op, &ub, &ub_operands, Bound::Upper)?;
            if new_ub == ub && new_operands == ub_operands {
                return Ok(false);
            }
            for_op.set_upper_bound(ctx, new_ub, &new_operands);
            Ok(true)
        });

        if lb_changed || ub_changed {
            rewriter.modify_op_in_place();
        }
        lb_changed || ub_changed
    }
}

// =============================================================================
// affine.if / scf.if
// =============================================================================

pub(crate) struct CanonicalizeIfBounds {
    pub(crate) compose_limit: usize,
}

impl RewritePattern for CanonicalizeIfBounds {
    fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
        let Ok(if_op) = affine::If::from_op(ctx, op) else {
            return false;
        };
        let Some(set) = if_op.condition(ctx).cloned() else {
            return false;
        };
        let operands = ctx.op_operands(op).to_vec();

        transactional(ctx, op, "CanonicalizeIfBounds", |ctx, log| {
            let (new_set, new_operands) =
                fully_compose_set_and_operands(ctx, log, op, &set, &operands, self.compose_limit)?;
            let (new_set, new_operands) = canonicalize_set_and_operands(ctx, &new_set, &new_operands);
            if new_set == set && new_operands == operands {
                return Ok(false);
            }
            if_op.set_condition(ctx, new_set, &new_operands);
            rewriter.modify_op_in_place();
            Ok(true)
        })
    }
}

/// Raises `scf.if` inside an affine loop to `affine.if` when its condition
/// is a conjunction of comparisons that lower to an integer set.
pub(crate) struct MoveIfToAffine {
    pub(crate) compose_limit: usize,
}

fn has_affine_loop_ancestor(ctx: &IrContext, op: OpRef) -> bool {
    let mut current = ctx.parent_op(op);
    while let Some(parent) = current {
        if affine::For::matches(ctx, parent) || affine::Parallel::matches(ctx, parent) {
            return true;
        }
        current = ctx.parent_op(parent);
    }
    false
}

/// Lower an AND-tree of comparisons, breadth first.
fn lower_condition(ctx: &IrContext, condition: ValueRef) -> Option<GuardBuilder> {
    let mut guard = GuardBuilder::new();
    let mut todo = VecDeque::from([condition]);
    while let Some(cur) = todo.pop_front() {
        let Some(def) = ctx.defining_op(cur) else {
            debug!(value = ?cur, "condition is not computed by a comparison");
            return None;
        };
        if let Ok(cmp) = arith::Cmp::from_op(ctx, def) {
            if !guard.handle(ctx, cmp) {
                return None;
            }
            continue;
        }
        if arith::And::matches(ctx, def) {
            todo.extend(ctx.op_operands(def).iter().copied());
            continue;
        }
        debug!(op = %def, "condition is not a conjunction of comparisons");
        return None;
    }
    Some(guard)
}

fn has_blocks(ctx: &IrContext, region: RegionRef) -> bool {
    !ctx.region(region).blocks.is_empty()
}

impl RewritePattern for MoveIfToAffine {
    fn match_and_rewrite(&self, ctx: &mut IrContext, op: OpRef, rewriter: &mut PatternRewriter) -> bool {
        let Ok(if_op) = scf::If::from_op(ctx, op) else {
            return false;
        };
        if ctx.op(op).regions.is_empty() || !has_affine_loop_ancestor(ctx, op) {
            return false;
        }
        let Some(guard) = lower_condition(ctx, if_op.condition(ctx)) else {
            return false;
        };
        let (set, operands) = guard.into_set();

        transactional(ctx, op, "MoveIfToAffine", |ctx, log| {
            let (set, operands) = fully_compose_set_and_operands(ctx, log, op, &set, &operands, self.compose_limit)?;
            let (set, operands) = canonicalize_set_and_operands(ctx, &set, &operands);

            let location = ctx.op(op).location;
            let result_types: Vec<TypeRef> = ctx.op_result_types(op).to_vec();
            let else_region = if_op.else_region(ctx).filter(|&region| has_blocks(ctx, region));
            let then_region = if_op.then_region(ctx);
            ctx.take_regions(op);

            retarget_terminators(ctx, then_region, ("scf", "yield"), ("affine", "yield"));
            let else_region = match else_region {
                Some(region) => {
                    retarget_terminators(ctx, region, ("scf", "yield"), ("affine", "yield"));
                    region
                }
                None => {
                    let terminator = affine::r#yield(ctx, location, []);
                    region_with_terminator(ctx, location, terminator.op_ref())
                }
            };

            let replacement = affine::r#if(ctx, location, set, &operands, result_types, then_region, else_region);
            rewriter.replace_op(replacement.op_ref());
            Ok(true)
        })
    }
}
