//! Lowering of comparison guards to integer-set constraints.
//!
//! A guard is accepted when it is a conjunction: every comparison side is a
//! valid index or a `select`-encoded min/max of valid indices, and the
//! min/max sits on the side where it distributes into a conjunction
//! (`x < min(a, b)` is `x < a && x < b`, while `min(a, b) < x` is not).

use polyaffine_ir::dialect::affine;
use polyaffine_ir::dialect::arith::{self, ArithKind, CmpPredicate};
use polyaffine_ir::{AffineExpr, DialectOp, IntegerSet, IrContext, ValueDef, ValueRef};
use smallvec::SmallVec;
use tracing::debug;

use super::classify::valid_index;

/// The leaves of a min/max tree and which reductions it used.
#[derive(Debug, Default)]
pub(crate) struct MinMax {
    pub(crate) leaves: SmallVec<[ValueRef; 4]>,
    pub(crate) min: bool,
    pub(crate) max: bool,
}

/// `(l, r, is_min)` if `v` is `select(cmp(l, r), l, r)` with an ordering
/// predicate.
fn min_max_select(ctx: &IrContext, v: ValueRef) -> Option<(ValueRef, ValueRef, bool)> {
    let select = arith::Select::from_op(ctx, ctx.defining_op(v)?).ok()?;
    let cmp = arith::Cmp::from_op(ctx, ctx.defining_op(select.condition(ctx))?).ok()?;
    let (lhs, rhs) = (cmp.lhs(ctx), cmp.rhs(ctx));
    if lhs != select.true_value(ctx) || rhs != select.false_value(ctx) {
        return None;
    }
    match cmp.predicate(ctx)? {
        CmpPredicate::Sle | CmpPredicate::Slt => Some((lhs, rhs, true)),
        CmpPredicate::Sge | CmpPredicate::Sgt => Some((lhs, rhs, false)),
        _ => None,
    }
}

/// Flatten `start` into valid-index leaves, looking through selects of the
/// form `select(cmp(l, r), l, r)`. Fails on any other shape, and on trees
/// that mix min and max.
pub(crate) fn handle_min_max(ctx: &IrContext, start: ValueRef) -> Option<MinMax> {
    let mut out = MinMax::default();
    let mut todo = vec![start];
    while let Some(cur) = todo.pop() {
        if valid_index(ctx, cur) {
            out.leaves.push(cur);
            continue;
        }
        let (lhs, rhs, is_min) = min_max_select(ctx, cur)?;
        if is_min {
            out.min = true;
        } else {
            out.max = true;
        }
        todo.push(rhs);
        todo.push(lhs);
    }
    (!(out.min && out.max)).then_some(out)
}

/// Like [`handle_min_max`], but `v` itself must be a min/max select and is
/// expanded even when it is already a valid index.
pub(crate) fn expand_min_max_select(ctx: &IrContext, v: ValueRef) -> Option<MinMax> {
    let (lhs, rhs, is_min) = min_max_select(ctx, v)?;
    let (lhs, rhs) = (handle_min_max(ctx, lhs)?, handle_min_max(ctx, rhs)?);
    let mut leaves = lhs.leaves;
    leaves.extend(rhs.leaves);
    let out = MinMax {
        leaves,
        min: is_min || lhs.min || rhs.min,
        max: !is_min || lhs.max || rhs.max,
    };
    (!(out.min && out.max)).then_some(out)
}

/// Whether `v` is provably non-negative.
pub(crate) fn is_known_non_negative(ctx: &IrContext, v: ValueRef) -> bool {
    if let Some(c) = arith::constant_value(ctx, v) {
        return c >= 0;
    }
    match ctx.value_def(v) {
        ValueDef::BlockArg(block, index) => {
            let Some(owner) = ctx.block_parent_op(block) else {
                return false;
            };
            if let Ok(for_op) = affine::For::from_op(ctx, owner) {
                return index == 0
                    && for_op
                        .lower_bound_map(ctx)
                        .and_then(|map| map.single_constant_result())
                        .is_some_and(|lb| lb >= 0);
            }
            if let Ok(parallel) = affine::Parallel::from_op(ctx, owner) {
                return parallel
                    .lower_bound_map(ctx)
                    .and_then(|map| map.results().get(index as usize))
                    .and_then(AffineExpr::as_constant)
                    .is_some_and(|lb| lb >= 0);
            }
            false
        }
        ValueDef::OpResult(op, _) => match ArithKind::of(ctx, op) {
            Some(ArithKind::ExtU) => true,
            Some(ArithKind::IndexCast | ArithKind::Add | ArithKind::Mul | ArithKind::DivS | ArithKind::RemS) => ctx
                .op_operands(op)
                .iter()
                .all(|&operand| is_known_non_negative(ctx, operand)),
            _ => false,
        },
    }
}

/// Accumulates the constraints of a conjunction of comparisons. Each
/// constraint reads two fresh symbols: pair `k` binds `s{2k}` and
/// `s{2k+1}`.
#[derive(Debug, Default)]
pub(crate) struct GuardBuilder {
    constraints: Vec<AffineExpr>,
    eq_flags: Vec<bool>,
    operands: Vec<ValueRef>,
}

impl GuardBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, lhs: ValueRef, rhs: ValueRef, eq: bool, build: impl FnOnce(AffineExpr, AffineExpr) -> AffineExpr) {
        let k = self.constraints.len() as u32;
        let (l, r) = (AffineExpr::symbol(2 * k), AffineExpr::symbol(2 * k + 1));
        self.constraints.push(build(l, r));
        self.eq_flags.push(eq);
        self.operands.push(lhs);
        self.operands.push(rhs);
    }

    /// Add the constraints of one comparison. Returns `false` if it is not
    /// expressible as a conjunction, leaving the builder unchanged.
    pub(crate) fn handle(&mut self, ctx: &IrContext, cmp: arith::Cmp) -> bool {
        let (Some(lhs), Some(rhs)) = (handle_min_max(ctx, cmp.lhs(ctx)), handle_min_max(ctx, cmp.rhs(ctx))) else {
            debug!(op = %cmp.op_ref(), "comparison side is not a min/max of indices");
            return false;
        };
        let Some(predicate) = cmp.predicate(ctx) else {
            return false;
        };

        if predicate.is_unsigned() {
            let unknown = lhs
                .leaves
                .iter()
                .chain(&rhs.leaves)
                .find(|&&leaf| !is_known_non_negative(ctx, leaf));
            if let Some(leaf) = unknown {
                debug!(op = %cmp.op_ref(), leaf = ?leaf, "unsigned comparison of a possibly negative value");
                return false;
            }
        }

        match predicate.to_signed() {
            CmpPredicate::Eq => {
                if lhs.min || lhs.max || rhs.min || rhs.max {
                    debug!(op = %cmp.op_ref(), "equality against a min/max");
                    return false;
                }
                self.push(lhs.leaves[0], rhs.leaves[0], true, |l, r| l.sub(r));
            }
            signed @ (CmpPredicate::Sge | CmpPredicate::Sgt) => {
                if lhs.max || rhs.min {
                    debug!(op = %cmp.op_ref(), "greater-than comparison is a disjunction");
                    return false;
                }
                let strict = signed == CmpPredicate::Sgt;
                for &l in &lhs.leaves {
                    for &r in &rhs.leaves {
                        self.push(l, r, false, |l, r| strict_offset(l.sub(r), strict));
                    }
                }
            }
            signed @ (CmpPredicate::Sle | CmpPredicate::Slt) => {
                if lhs.min || rhs.max {
                    debug!(op = %cmp.op_ref(), "less-than comparison is a disjunction");
                    return false;
                }
                let strict = signed == CmpPredicate::Slt;
                for &l in &lhs.leaves {
                    for &r in &rhs.leaves {
                        self.push(l, r, false, |l, r| strict_offset(r.sub(l), strict));
                    }
                }
            }
            _ => {
                debug!(op = %cmp.op_ref(), "inequality guards are not representable");
                return false;
            }
        }
        true
    }

    /// The accumulated set over `2 * constraints` symbols, and the operands
    /// bound to them.
    pub(crate) fn into_set(self) -> (IntegerSet, Vec<ValueRef>) {
        let set = IntegerSet::new(0, self.operands.len() as u32, self.constraints, self.eq_flags);
        (set, self.operands)
    }
}

fn strict_offset(expr: AffineExpr, strict: bool) -> AffineExpr {
    if strict {
        expr.sub(AffineExpr::constant(1))
    } else {
        expr
    }
}
