//! Composition of affine maps with the computations feeding their operands.
//!
//! A composition step looks at every operand bound to a map and folds
//! whatever structure it can see into the map itself: producer
//! `affine.apply` maps, `add`/`sub` chains, multiplication, division and
//! remainder by constants. Operands that remain opaque are bound as
//! dimensions (induction variables) or symbols, promoting them first when
//! they are not yet usable as symbols. Steps repeat until no operand has
//! anything left to fold.

use std::collections::HashMap;

use derive_more::{Display, Error};
use polyaffine_ir::dialect::arith::{self, ArithKind};
use polyaffine_ir::dialect::{affine, core};
use polyaffine_ir::dominance::{InsertPoint, value_dominates};
use polyaffine_ir::{AffineExpr, AffineMap, DialectOp, IntegerSet, IrContext, OpRef, ValueRef};
use smallvec::{SmallVec, smallvec};
use tracing::{debug, trace};

use super::canonicalize::canonicalize_map_and_operands;
use super::classify::{is_affine_loop_arg, is_valid_symbol, legal_condition, strip_casts};
use super::compare::is_known_non_negative;
use super::promote::{EditLog, promote};

/// Why an operand list could not be brought into affine form.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum NormalizeError {
    /// An operand needed to become a symbol but its computation could not
    /// be hoisted.
    #[display("cannot promote {value} to a symbol")]
    Unpromotable { value: ValueRef },
    /// An operand ended up in a position it is not valid for.
    #[display("{value} is neither an induction variable nor a symbol")]
    NotAffine { value: ValueRef },
}

/// Insertion-ordered, identity-deduplicated operand tables for one
/// composition step.
#[derive(Default)]
struct Renumbering {
    dims: Vec<ValueRef>,
    symbols: Vec<ValueRef>,
}

impl Renumbering {
    fn dim(&mut self, v: ValueRef) -> AffineExpr {
        AffineExpr::dim(position_or_push(&mut self.dims, v))
    }

    fn symbol(&mut self, v: ValueRef) -> AffineExpr {
        AffineExpr::symbol(position_or_push(&mut self.symbols, v))
    }
}

fn position_or_push(list: &mut Vec<ValueRef>, v: ValueRef) -> u32 {
    match list.iter().position(|&x| x == v) {
        Some(pos) => pos as u32,
        None => {
            list.push(v);
            (list.len() - 1) as u32
        }
    }
}

/// `(expr over s0, s1, ..., operands bound to those symbols)`
type AuxForm = (AffineExpr, SmallVec<[ValueRef; 2]>);

/// The affine shape of a single arithmetic op, if it has one.
fn arith_form(ctx: &IrContext, v: ValueRef) -> Option<AuxForm> {
    if let Some(c) = arith::constant_value(ctx, v) {
        return Some((AffineExpr::constant(c), smallvec![]));
    }
    let op = ctx.defining_op(v)?;
    let kind = ArithKind::of(ctx, op)?;
    let &[lhs, rhs] = ctx.op_operands(op) else {
        return None;
    };
    let s0 = AffineExpr::symbol(0);
    let positive = |c: i64| (c > 0).then(|| AffineExpr::constant(c));
    match kind {
        ArithKind::Add => Some((s0.add(AffineExpr::symbol(1)), smallvec![lhs, rhs])),
        ArithKind::Sub => Some((s0.sub(AffineExpr::symbol(1)), smallvec![lhs, rhs])),
        ArithKind::Mul => match (arith::constant_value(ctx, lhs), arith::constant_value(ctx, rhs)) {
            (_, Some(c)) => Some((s0.mul(AffineExpr::constant(c)), smallvec![lhs])),
            (Some(c), None) => Some((s0.mul(AffineExpr::constant(c)), smallvec![rhs])),
            (None, None) => None,
        },
        // `floordiv` and `mod` round toward negative infinity while `divs`
        // and `rems` truncate, so the signed forms only fold over dividends
        // that cannot be negative.
        ArithKind::DivS | ArithKind::RemS if !is_known_non_negative(ctx, lhs) => None,
        ArithKind::DivS | ArithKind::DivU => {
            let c = positive(arith::constant_value(ctx, rhs)?)?;
            Some((s0.floor_div(c), smallvec![lhs]))
        }
        ArithKind::RemS | ArithKind::RemU => {
            let c = positive(arith::constant_value(ctx, rhs)?)?;
            Some((s0.modulo(c), smallvec![lhs]))
        }
        _ => None,
    }
}

/// Decide whether the operand `t` (with casts stripped: `decast`) is
/// folded into the map as an auxiliary expression.
fn inline_form(ctx: &IrContext, t: ValueRef, decast: ValueRef) -> Option<AuxForm> {
    if !is_valid_symbol(ctx, t, false)
        && let Some(form) = arith_form(ctx, t)
    {
        return Some(form);
    }
    let op = ctx.defining_op(decast)?;
    let foldable = matches!(
        ArithKind::of(ctx, op)?,
        ArithKind::Add | ArithKind::Sub | ArithKind::Mul | ArithKind::RemS | ArithKind::RemU
    ) && ctx
        .op_operands(op)
        .get(1)
        .is_some_and(|&rhs| arith::constant_value(ctx, rhs).is_some());
    if foldable { arith_form(ctx, decast) } else { None }
}

/// Expression replacing one operand position, renumbering whatever it
/// depends on.
fn compose_operand(
    ctx: &mut IrContext,
    log: &mut EditLog,
    renumbering: &mut Renumbering,
    operand: ValueRef,
    is_dim: bool,
) -> Result<AffineExpr, NormalizeError> {
    let decast = strip_casts(ctx, operand);
    let t = if is_valid_symbol(ctx, operand, false) {
        operand
    } else {
        decast
    };

    if let Some((aux, inputs)) = inline_form(ctx, t, decast) {
        let syms: Vec<AffineExpr> = inputs.iter().map(|&v| renumbering.symbol(v)).collect();
        return Ok(aux.replace_dims_and_symbols(&[], &syms));
    }

    if is_affine_loop_arg(ctx, t) {
        return Ok(renumbering.dim(t));
    }

    if let Some(def) = ctx.defining_op(t)
        && let Ok(apply) = affine::Apply::from_op(ctx, def)
        && let Some(map) = apply.map(ctx)
        && let [result] = map.results()
        && map.num_inputs() == apply.map_operands(ctx).len()
    {
        let (dim_operands, sym_operands) = apply.map_operands(ctx).split_at(map.num_dims() as usize);
        let dims: Vec<AffineExpr> = dim_operands.iter().map(|&v| renumbering.dim(v)).collect();
        let syms: Vec<AffineExpr> = sym_operands.iter().map(|&v| renumbering.symbol(v)).collect();
        return Ok(result.replace_dims_and_symbols(&dims, &syms));
    }

    let t = if is_valid_symbol(ctx, t, false) {
        t
    } else {
        match promote(ctx, log, t, false) {
            Some(promoted) if is_valid_symbol(ctx, promoted, false) => promoted,
            _ => {
                debug!(value = ?t, "operand could not be promoted to a symbol");
                return Err(NormalizeError::Unpromotable { value: t });
            }
        }
    };
    Ok(if is_dim {
        renumbering.dim(t)
    } else {
        renumbering.symbol(t)
    })
}

/// One composition step over a map. The result is canonicalized.
fn compose_step(
    ctx: &mut IrContext,
    log: &mut EditLog,
    map: &AffineMap,
    operands: &[ValueRef],
) -> Result<(AffineMap, Vec<ValueRef>), NormalizeError> {
    let num_dims = map.num_dims() as usize;
    let mut renumbering = Renumbering::default();
    let mut dims = Vec::with_capacity(num_dims);
    let mut syms = Vec::with_capacity(operands.len().saturating_sub(num_dims));
    for (i, &operand) in operands.iter().enumerate() {
        let is_dim = i < num_dims;
        let expr = compose_operand(ctx, log, &mut renumbering, operand, is_dim)?;
        if is_dim {
            dims.push(expr);
        } else {
            syms.push(expr);
        }
    }

    let composed = map.replace_dims_and_symbols(
        &dims,
        &syms,
        renumbering.dims.len() as u32,
        renumbering.symbols.len() as u32,
    );
    let mut new_operands = renumbering.dims;
    new_operands.extend(renumbering.symbols);
    Ok(canonicalize_map_and_operands(ctx, &composed, &new_operands))
}

fn needs_composition(ctx: &IrContext, num_dims: u32, operands: &[ValueRef]) -> bool {
    operands
        .iter()
        .enumerate()
        .any(|(i, &v)| legal_condition(ctx, v, i < num_dims as usize))
}

/// Compose `map` with everything its operands compute until no operand has
/// foldable structure left, or `max_steps` steps have run.
///
/// `anchor` is the op the result will be attached to; index casts created
/// for non-index operands are placed where they dominate it. Every IR edit
/// is recorded in `log`.
pub fn fully_compose_map_and_operands(
    ctx: &mut IrContext,
    log: &mut EditLog,
    anchor: OpRef,
    map: &AffineMap,
    operands: &[ValueRef],
    max_steps: usize,
) -> Result<(AffineMap, Vec<ValueRef>), NormalizeError> {
    let mut map = map.clone();
    let mut operands = operands.to_vec();
    let mut steps = 0;
    while needs_composition(ctx, map.num_dims(), &operands) {
        if steps == max_steps {
            debug!(%map, steps, "composition step limit reached");
            break;
        }
        steps += 1;
        let (next_map, next_operands) = compose_step(ctx, log, &map, &operands)?;
        if next_map == map && next_operands == operands {
            break;
        }
        map = next_map;
        operands = next_operands;
        trace!(%map, step = steps, "composed map");
    }

    check_positions(ctx, map.num_dims(), &operands)?;
    let operands = index_operands(ctx, log, anchor, operands)?;
    Ok((map.simplify(), operands))
}

/// [`fully_compose_map_and_operands`] for the constraints of an integer set.
pub fn fully_compose_set_and_operands(
    ctx: &mut IrContext,
    log: &mut EditLog,
    anchor: OpRef,
    set: &IntegerSet,
    operands: &[ValueRef],
    max_steps: usize,
) -> Result<(IntegerSet, Vec<ValueRef>), NormalizeError> {
    let as_map = AffineMap::new(set.num_dims(), set.num_symbols(), set.constraints().to_vec());
    let (map, operands) = fully_compose_map_and_operands(ctx, log, anchor, &as_map, operands, max_steps)?;
    let set = IntegerSet::new(
        map.num_dims(),
        map.num_symbols(),
        map.results().to_vec(),
        set.eq_flags().to_vec(),
    );
    Ok((set, operands))
}

/// Dimensions must be induction variables or symbols; symbols must be
/// symbols.
fn check_positions(ctx: &IrContext, num_dims: u32, operands: &[ValueRef]) -> Result<(), NormalizeError> {
    for (i, &v) in operands.iter().enumerate() {
        let is_dim = i < num_dims as usize;
        let valid = is_valid_symbol(ctx, v, false) || (is_dim && is_affine_loop_arg(ctx, v));
        if !valid {
            debug!(value = ?v, is_dim, "operand left in an invalid map position");
            return Err(NormalizeError::NotAffine { value: v });
        }
    }
    Ok(())
}

/// Replace every non-index operand with an `arith.index_cast` of it.
fn index_operands(
    ctx: &mut IrContext,
    log: &mut EditLog,
    anchor: OpRef,
    operands: Vec<ValueRef>,
) -> Result<Vec<ValueRef>, NormalizeError> {
    let index = core::index(ctx);
    let mut casts: HashMap<ValueRef, ValueRef> = HashMap::new();
    let mut out = Vec::with_capacity(operands.len());
    for v in operands {
        if core::is_index(ctx, ctx.value_ty(v)) {
            out.push(v);
            continue;
        }
        if let Some(&cast) = casts.get(&v) {
            out.push(cast);
            continue;
        }
        let cast = match existing_index_cast(ctx, v, anchor) {
            Some(cast) => cast,
            None => {
                let point = InsertPoint::after_definition(ctx, v).ok_or(NormalizeError::NotAffine { value: v })?;
                let location = ctx.op(anchor).location;
                let cast = arith::index_cast(ctx, location, v, index);
                point.insert(ctx, cast.op_ref());
                log.record_inserted(cast.op_ref());
                cast.result(ctx)
            }
        };
        casts.insert(v, cast);
        out.push(cast);
    }
    Ok(out)
}

/// A cast of `v` to `index` that is already visible at `anchor` and usable
/// as a symbol.
fn existing_index_cast(ctx: &IrContext, v: ValueRef, anchor: OpRef) -> Option<ValueRef> {
    ctx.uses(v).iter().find_map(|u| {
        let cast = arith::IndexCast::from_op(ctx, u.user).ok()?;
        let result = cast.result(ctx);
        let usable = core::is_index(ctx, ctx.value_ty(result))
            && ctx.op(u.user).parent_block.is_some()
            && is_valid_symbol(ctx, result, false)
            && value_dominates(ctx, result, anchor);
        usable.then_some(result)
    })
}
