//! Recursive operation traversal.

use std::ops::ControlFlow;

use crate::context::IrContext;
use crate::ops::DialectOp;
use crate::refs::{BlockRef, OpRef, RegionRef};

/// Controls whether to descend into children during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Continue walking and descend into nested regions.
    Advance,
    /// Skip the nested regions of the current operation.
    Skip,
}

/// Walk all operations in a region recursively, in pre-order.
pub fn walk_region<B>(
    ctx: &IrContext,
    region: RegionRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &block in &ctx.region(region).blocks {
        walk_block(ctx, block, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk all operations in a block recursively, in pre-order.
pub fn walk_block<B>(
    ctx: &IrContext,
    block: BlockRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &op in &ctx.block(block).ops {
        walk_op(ctx, op, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk an operation and its nested regions recursively, in pre-order.
pub fn walk_op<B>(
    ctx: &IrContext,
    op: OpRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    match f(op) {
        ControlFlow::Break(b) => return ControlFlow::Break(b),
        ControlFlow::Continue(WalkAction::Skip) => return ControlFlow::Continue(()),
        ControlFlow::Continue(WalkAction::Advance) => {}
    }
    for &region in &ctx.op(op).regions {
        walk_region(ctx, region, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk operations of a specific dialect type nested under `root`.
pub fn walk_typed<T, B>(
    ctx: &IrContext,
    root: OpRef,
    f: &mut dyn FnMut(T) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()>
where
    T: DialectOp,
{
    walk_op(ctx, root, &mut |op| {
        if let Ok(typed) = T::from_op(ctx, op) {
            f(typed)
        } else {
            ControlFlow::Continue(WalkAction::Advance)
        }
    })
}

/// Every operation under `root` (including `root`), in pre-order.
pub fn collect_ops(ctx: &IrContext, root: OpRef) -> Vec<OpRef> {
    let mut out = Vec::new();
    let _ = walk_op::<()>(ctx, root, &mut |op| {
        out.push(op);
        ControlFlow::Continue(WalkAction::Advance)
    });
    out
}

/// Operations nested inside `op`'s regions, excluding `op` itself.
pub fn nested_ops(ctx: &IrContext, op: OpRef) -> Vec<OpRef> {
    let mut out = Vec::new();
    for &region in &ctx.op(op).regions {
        let _ = walk_region::<()>(ctx, region, &mut |nested| {
            out.push(nested);
            ControlFlow::Continue(WalkAction::Advance)
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::affine;
    use crate::parser::parse_test_module;

    const NEST: &str = r#"core.module @test {
  func.func @f(%0: core.index) -> core.nil {
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (4)>} {
      ^bb0(%1: core.index):
        %2 = affine.apply %1 {map = affine_map<(d0) -> (d0 + 1)>} : core.index
        affine.yield
    }
    func.return
  }
}"#;

    #[test]
    fn collect_ops_is_preorder() {
        let (ctx, module) = parse_test_module(NEST);
        let names: Vec<String> = collect_ops(&ctx, module.op_ref())
            .into_iter()
            .map(|op| format!("{}.{}", ctx.op(op).dialect, ctx.op(op).name))
            .collect();
        assert_eq!(
            names,
            [
                "core.module",
                "func.func",
                "affine.for",
                "affine.apply",
                "affine.yield",
                "func.return"
            ]
        );
    }

    #[test]
    fn skip_prunes_nested_regions() {
        let (ctx, module) = parse_test_module(NEST);
        let mut seen = 0;
        let _ = walk_op::<()>(&ctx, module.op_ref(), &mut |op| {
            seen += 1;
            if ctx.op(op).is("affine", "for") {
                ControlFlow::Continue(WalkAction::Skip)
            } else {
                ControlFlow::Continue(WalkAction::Advance)
            }
        });
        assert_eq!(seen, 4);
    }

    #[test]
    fn walk_typed_breaks_early() {
        let (ctx, module) = parse_test_module(NEST);
        let found = walk_typed::<affine::Apply, _>(&ctx, module.op_ref(), &mut |apply| {
            ControlFlow::Break(apply.op_ref())
        });
        let ControlFlow::Break(op) = found else {
            panic!("expected an affine.apply");
        };
        assert!(ctx.op(op).is("affine", "apply"));
    }
}
