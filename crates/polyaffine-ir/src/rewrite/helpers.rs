//! Free helper functions for compound IR mutations.

use smallvec::SmallVec;

use crate::context::{BlockData, IrContext, OperationDataBuilder, RegionData};
use crate::location::Location;
use crate::refs::{BlockRef, OpRef, RegionRef, ValueRef};
use crate::symbol::Symbol;

/// Swap each block terminator named `from` in `region` for an op named `to`
/// carrying the same operands.
///
/// Returns the number of terminators rewritten.
pub fn retarget_terminators(
    ctx: &mut IrContext,
    region: RegionRef,
    from: (&str, &str),
    to: (&'static str, &'static str),
) -> usize {
    let mut rewritten = 0;
    let blocks: SmallVec<[BlockRef; 4]> = ctx.region(region).blocks.clone();
    for block in blocks {
        let Some(&term) = ctx.block(block).ops.last() else {
            continue;
        };
        if !ctx.op(term).is(from.0, from.1) {
            continue;
        }
        let location = ctx.op(term).location;
        let operands: SmallVec<[ValueRef; 4]> = ctx.op_operands(term).into();
        let data = OperationDataBuilder::new(location, Symbol::new(to.0), Symbol::new(to.1))
            .operands(operands)
            .build(ctx);
        let replacement = ctx.create_op(data);
        ctx.insert_op_before(block, term, replacement);
        ctx.erase_op(term);
        rewritten += 1;
    }
    rewritten
}

/// A fresh single-block region holding only `terminator`.
pub fn region_with_terminator(ctx: &mut IrContext, location: Location, terminator: OpRef) -> RegionRef {
    let block = ctx.create_block(BlockData {
        location,
        args: vec![],
        ops: SmallVec::new(),
        parent_region: None,
    });
    ctx.push_op(block, terminator);
    ctx.create_region(RegionData {
        location,
        blocks: smallvec::smallvec![block],
        parent_op: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::scf;
    use crate::ops::DialectOp;
    use crate::parser::parse_test_module;
    use crate::printer::print_module;
    use crate::walk::collect_ops;

    #[test]
    fn terminators_are_retargeted_with_operands() {
        let (mut ctx, module) = parse_test_module(
            r#"core.module @test {
  func.func @f(%0: core.i1, %1: core.index) -> core.nil {
    %2 = scf.if %0 : core.index {
        scf.yield %1
    } {
        scf.yield %1
    }
    func.return
  }
}"#,
        );
        let if_op = collect_ops(&ctx, module.op_ref())
            .into_iter()
            .find(|&op| scf::If::matches(&ctx, op))
            .expect("scf.if");
        let regions: Vec<RegionRef> = ctx.op(if_op).regions.to_vec();
        for region in regions {
            assert_eq!(retarget_terminators(&mut ctx, region, ("scf", "yield"), ("affine", "yield")), 1);
        }

        let printed = print_module(&ctx, module.op_ref());
        assert!(printed.contains("affine.yield %1"));
        assert!(!printed.contains("scf.yield"));
        let arg = ctx.block_args(ctx.op(if_op).parent_block.expect("attached"))[1];
        assert_eq!(ctx.uses(arg).len(), 2);
    }
}
