//! Dominance over structured regions.
//!
//! Every region here holds a single straight-line block, so dominance
//! reduces to the region tree plus in-block order: a point dominates
//! another when it sits in an enclosing block at or before the operation
//! that (transitively) contains the other. Queries read the IR directly and
//! never go stale after an edit.

use std::cmp::Ordering;

use crate::context::IrContext;
use crate::refs::{BlockRef, OpRef, ValueDef, ValueRef};

/// A position inside a block: before `before`, or at the end when `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InsertPoint {
    pub block: BlockRef,
    pub before: Option<OpRef>,
}

impl InsertPoint {
    /// Immediately before `op`.
    ///
    /// Returns `None` if `op` is not attached to a block.
    pub fn before(ctx: &IrContext, op: OpRef) -> Option<InsertPoint> {
        Some(InsertPoint {
            block: ctx.op(op).parent_block?,
            before: Some(op),
        })
    }

    /// Immediately after `op`.
    pub fn after(ctx: &IrContext, op: OpRef) -> Option<InsertPoint> {
        Some(InsertPoint {
            block: ctx.op(op).parent_block?,
            before: ctx.next_op(op),
        })
    }

    pub fn block_start(ctx: &IrContext, block: BlockRef) -> InsertPoint {
        InsertPoint {
            block,
            before: ctx.block(block).ops.first().copied(),
        }
    }

    /// The earliest point at which `v` is available.
    pub fn after_definition(ctx: &IrContext, v: ValueRef) -> Option<InsertPoint> {
        match ctx.value_def(v) {
            ValueDef::OpResult(op, _) => InsertPoint::after(ctx, op),
            ValueDef::BlockArg(block, _) => Some(InsertPoint::block_start(ctx, block)),
        }
    }

    fn index(self, ctx: &IrContext) -> usize {
        let ops = &ctx.block(self.block).ops;
        match self.before {
            Some(op) => ops.iter().position(|&o| o == op).unwrap_or(ops.len()),
            None => ops.len(),
        }
    }

    /// Attach `op` at this point.
    pub fn insert(self, ctx: &mut IrContext, op: OpRef) {
        ctx.insert_op(self.block, self.before, op);
    }
}

/// The operation in `block` that is `op` or encloses it.
pub fn ancestor_in_block(ctx: &IrContext, block: BlockRef, op: OpRef) -> Option<OpRef> {
    let mut cur = op;
    loop {
        let parent = ctx.op(cur).parent_block?;
        if parent == block {
            return Some(cur);
        }
        cur = ctx.block_parent_op(parent)?;
    }
}

/// Whether code at `a` is visible from `b`: `a`'s block encloses `b` and
/// `a` is at or before `b`'s position in that block.
pub fn point_dominates(ctx: &IrContext, a: InsertPoint, b: InsertPoint) -> bool {
    if a.block == b.block {
        return a.index(ctx) <= b.index(ctx);
    }
    let Some(holder) = ctx.block_parent_op(b.block) else {
        return false;
    };
    match ancestor_in_block(ctx, a.block, holder) {
        Some(anchor) => ctx.op_position(anchor).is_some_and(|pos| a.index(ctx) <= pos),
        None => false,
    }
}

/// Order two points on the same enclosing chain; `None` if neither
/// dominates the other.
pub fn compare_points(ctx: &IrContext, a: InsertPoint, b: InsertPoint) -> Option<Ordering> {
    match (point_dominates(ctx, a, b), point_dominates(ctx, b, a)) {
        (true, true) => Some(Ordering::Equal),
        (true, false) => Some(Ordering::Less),
        (false, true) => Some(Ordering::Greater),
        (false, false) => None,
    }
}

/// The point dominated by every other candidate.
pub fn latest_point(ctx: &IrContext, points: impl IntoIterator<Item = InsertPoint>) -> Option<InsertPoint> {
    let mut latest: Option<InsertPoint> = None;
    for p in points {
        latest = match latest {
            None => Some(p),
            Some(cur) => match compare_points(ctx, cur, p)? {
                Ordering::Less => Some(p),
                _ => Some(cur),
            },
        };
    }
    latest
}

/// Whether `v` is defined before, and visible at, `user`.
pub fn value_dominates(ctx: &IrContext, v: ValueRef, user: OpRef) -> bool {
    let Some(block) = ctx.value_block(v) else {
        return false;
    };
    let Some(anchor) = ancestor_in_block(ctx, block, user) else {
        return false;
    };
    match ctx.value_def(v) {
        ValueDef::BlockArg(..) => true,
        ValueDef::OpResult(def, _) => {
            def != anchor
                && match (ctx.op_position(def), ctx.op_position(anchor)) {
                    (Some(d), Some(a)) => d < a,
                    _ => false,
                }
        }
    }
}

/// Whether `v` is usable by an op inserted at `point`.
pub fn value_available_at(ctx: &IrContext, v: ValueRef, point: InsertPoint) -> bool {
    InsertPoint::after_definition(ctx, v).is_some_and(|def| point_dominates(ctx, def, point))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::func;
    use crate::ops::DialectOp;
    use crate::parser::parse_test_module;
    use crate::walk::collect_ops;

    const NEST: &str = r#"core.module @test {
  func.func @f(%0: core.index) -> core.nil {
    %1 = arith.const {value = 1} : core.index
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (4)>} {
      ^bb0(%2: core.index):
        %3 = arith.add %2, %1 : core.index
        affine.yield
    }
    %4 = arith.const {value = 2} : core.index
    func.return
  }
}"#;

    fn find(ctx: &IrContext, root: OpRef, dialect: &str, name: &str) -> Vec<OpRef> {
        collect_ops(ctx, root)
            .into_iter()
            .filter(|&op| ctx.op(op).is(dialect, name))
            .collect()
    }

    #[test]
    fn values_dominate_nested_users() {
        let (ctx, module) = parse_test_module(NEST);
        let root = module.op_ref();
        let consts = find(&ctx, root, "arith", "const");
        let add = find(&ctx, root, "arith", "add")[0];
        let for_op = find(&ctx, root, "affine", "for")[0];
        let c1 = ctx.op_result(consts[0], 0);
        let c2 = ctx.op_result(consts[1], 0);
        let arg = func::Func::from_op(&ctx, module.ops(&ctx)[0])
            .ok()
            .and_then(|f| f.entry_block(&ctx))
            .map(|b| ctx.block_arg(b, 0))
            .expect("function argument");

        assert!(value_dominates(&ctx, c1, add));
        assert!(value_dominates(&ctx, arg, add));
        assert!(!value_dominates(&ctx, c2, add));
        let add_result = ctx.op_result(add, 0);
        assert!(!value_dominates(&ctx, add_result, for_op));
    }

    #[test]
    fn points_order_along_the_region_tree() {
        let (ctx, module) = parse_test_module(NEST);
        let root = module.op_ref();
        let consts = find(&ctx, root, "arith", "const");
        let add = find(&ctx, root, "arith", "add")[0];

        let outer = InsertPoint::after(&ctx, consts[0]).expect("attached");
        let inner = InsertPoint::before(&ctx, add).expect("attached");
        let late = InsertPoint::before(&ctx, consts[1]).expect("attached");

        assert!(point_dominates(&ctx, outer, inner));
        assert!(!point_dominates(&ctx, inner, outer));
        assert!(!point_dominates(&ctx, late, inner));
        assert_eq!(latest_point(&ctx, [inner, outer]), Some(inner));
        assert_eq!(compare_points(&ctx, inner, late), None);

        let iv_block = ctx.op(add).parent_block.expect("attached");
        let iv = ctx.block_arg(iv_block, 0);
        assert!(value_available_at(&ctx, iv, inner));
        assert!(!value_available_at(&ctx, iv, outer));
    }
}
