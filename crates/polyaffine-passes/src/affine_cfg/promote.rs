//! Operand promotion: hoisting closed computations so they become symbols.
//!
//! Every edit made here goes through an [`EditLog`]. A pattern that gives
//! up after promoting rolls the log back, which restores the IR exactly;
//! a pattern that succeeds commits it, which erases the hoisted originals.

use std::collections::HashMap;

use polyaffine_ir::dialect::arith;
use polyaffine_ir::dominance::{InsertPoint, latest_point};
use polyaffine_ir::effects::OpEffects;
use polyaffine_ir::walk::nested_ops;
use polyaffine_ir::{BlockRef, DialectOp, IrContext, OpRef, ValueRef};
use tracing::trace;

use super::classify::{is_affine_loop_arg, is_valid_symbol};

#[derive(Debug)]
enum Edit {
    /// `original` was detached from `block` (before `before`) and `clone`
    /// took over its uses.
    Hoisted {
        original: OpRef,
        block: BlockRef,
        before: Option<OpRef>,
        clone: OpRef,
    },
    /// A fresh op was attached to the IR.
    Inserted { op: OpRef },
}

/// Undo journal for the IR edits a single pattern invocation performs
/// before it knows whether it will succeed.
#[derive(Debug, Default)]
#[must_use = "an edit log must be committed or rolled back"]
pub struct EditLog {
    edits: Vec<Edit>,
}

impl EditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Record an op the caller attached to the IR.
    pub fn record_inserted(&mut self, op: OpRef) {
        self.edits.push(Edit::Inserted { op });
    }

    /// Keep every edit and free the ops that were hoisted away.
    pub fn commit(self, ctx: &mut IrContext) {
        for edit in self.edits {
            if let Edit::Hoisted { original, .. } = edit {
                ctx.erase_op(original);
            }
        }
    }

    /// Undo every edit, newest first.
    pub fn rollback(self, ctx: &mut IrContext) {
        for edit in self.edits.into_iter().rev() {
            match edit {
                Edit::Hoisted {
                    original,
                    block,
                    before,
                    clone,
                } => {
                    let pairs: Vec<(ValueRef, ValueRef)> = ctx
                        .op_results(clone)
                        .iter()
                        .copied()
                        .zip(ctx.op_results(original).iter().copied())
                        .collect();
                    for (new, old) in pairs {
                        ctx.replace_all_uses(new, old);
                    }
                    ctx.insert_op(block, before, original);
                    ctx.erase_op(clone);
                }
                Edit::Inserted { op } => ctx.erase_op(op),
            }
        }
    }
}

/// Try to turn `v` into a symbol by moving a clone of its (read-only)
/// computation to the earliest point at which all its inputs exist.
///
/// With `for_index`, affine induction variables are accepted as inputs.
/// Returns `None` if the computation writes memory or depends on a value
/// that cannot be promoted itself.
pub fn promote(ctx: &mut IrContext, log: &mut EditLog, v: ValueRef, for_index: bool) -> Option<ValueRef> {
    if is_valid_symbol(ctx, v, false) || (for_index && is_affine_loop_arg(ctx, v)) {
        return Some(v);
    }
    let def = ctx.defining_op(v)?;
    if arith::Const::matches(ctx, def) {
        return Some(v);
    }
    if !OpEffects::is_read_only(ctx, def) {
        trace!(op = ?def, "not promoting a computation with side effects");
        return None;
    }

    let mut points = Vec::new();
    for operand in free_operands(ctx, def) {
        let available = if ctx.defining_op(operand).is_some() {
            promote(ctx, log, operand, for_index)?
        } else if (for_index && is_affine_loop_arg(ctx, operand)) || is_valid_symbol(ctx, operand, false) {
            operand
        } else {
            return None;
        };
        points.push(InsertPoint::after_definition(ctx, available)?);
    }
    if points.is_empty() {
        return None;
    }
    let point = latest_point(ctx, points)?;

    let block = ctx.op(def).parent_block?;
    let before = ctx.next_op(def);
    let clone = ctx.clone_op(def, &mut HashMap::new());
    point.insert(ctx, clone);
    let pairs: Vec<(ValueRef, ValueRef)> = ctx
        .op_results(def)
        .iter()
        .copied()
        .zip(ctx.op_results(clone).iter().copied())
        .collect();
    for (old, new) in pairs {
        ctx.replace_all_uses(old, new);
    }
    ctx.detach_op(def);
    log.edits.push(Edit::Hoisted {
        original: def,
        block,
        before,
        clone,
    });
    trace!(from = ?def, to = ?clone, "promoted computation");

    ctx.op_results(clone).first().copied()
}

/// Operands of `op` and its nested ops that are defined outside `op`,
/// in first-use order.
fn free_operands(ctx: &IrContext, op: OpRef) -> Vec<ValueRef> {
    let mut out: Vec<ValueRef> = Vec::new();
    let inner = std::iter::once(op).chain(nested_ops(ctx, op));
    for user in inner {
        for &operand in ctx.op_operands(user) {
            if !defined_inside(ctx, operand, op) && !out.contains(&operand) {
                out.push(operand);
            }
        }
    }
    out
}

fn defined_inside(ctx: &IrContext, v: ValueRef, op: OpRef) -> bool {
    ctx.value_block(v)
        .and_then(|block| ctx.block_parent_op(block))
        .is_some_and(|owner| ctx.is_ancestor(op, owner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine_cfg::tests::func_values;
    use polyaffine_ir::parser::parse_test_module;
    use polyaffine_ir::printer::print_module;

    const HOIST: &str = r#"core.module @test {
  func.func @f(%0: core.index, %1: mem.ref(core.index)) -> core.nil {
    %2 = arith.const {value = 3} : core.index
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (8)>} {
      ^bb0(%3: core.index):
        %4 = arith.add %0, %2 : core.index
        %5 = arith.mul %4, %0 : core.index
        %6 = test.read %1 : core.index
        %7 = arith.add %6, %0 : core.index
        test.use %5, %7
        affine.yield
    }
    func.return
  }
}"#;

    #[test]
    fn symbol_chains_are_hoisted_to_the_function_body() {
        let (mut ctx, module) = parse_test_module(HOIST);
        let v = func_values(&ctx, module);
        let mut log = EditLog::new();

        let promoted = promote(&mut ctx, &mut log, v[5], false).expect("promotable");
        log.commit(&mut ctx);

        assert!(is_valid_symbol(&ctx, promoted, false));
        insta::assert_snapshot!(print_module(&ctx, module.op_ref()), @r"
        core.module @test {
          func.func @f(%0: core.index, %1: mem.ref(core.index)) -> core.nil {
            %2 = arith.const {value = 3} : core.index
            %3 = arith.add %0, %2 : core.index
            %4 = arith.mul %3, %0 : core.index
            affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (8)>} {
              ^bb0(%5: core.index):
                %6 = test.read %1 : core.index
                %7 = arith.add %6, %0 : core.index
                test.use %4, %7
                affine.yield
            }
            func.return
          }
        }
        ");
    }

    #[test]
    fn side_effecting_ops_are_not_promoted() {
        let (mut ctx, module) = parse_test_module(HOIST);
        let before = print_module(&ctx, module.op_ref());
        let v = func_values(&ctx, module);
        let mut log = EditLog::new();

        assert_eq!(promote(&mut ctx, &mut log, v[7], false), None);
        log.rollback(&mut ctx);
        assert_eq!(print_module(&ctx, module.op_ref()), before);
    }

    #[test]
    fn rollback_restores_hoisted_ops() {
        let (mut ctx, module) = parse_test_module(HOIST);
        let before = print_module(&ctx, module.op_ref());
        let v = func_values(&ctx, module);
        let mut log = EditLog::new();

        assert!(promote(&mut ctx, &mut log, v[5], false).is_some());
        assert!(!log.is_empty());
        log.rollback(&mut ctx);
        assert_eq!(print_module(&ctx, module.op_ref()), before);
    }

    #[test]
    fn induction_variables_only_pass_in_index_context() {
        let (mut ctx, module) = parse_test_module(HOIST);
        let v = func_values(&ctx, module);
        let mut log = EditLog::new();

        assert_eq!(promote(&mut ctx, &mut log, v[3], false), None);
        assert_eq!(promote(&mut ctx, &mut log, v[3], true), Some(v[3]));
        assert!(log.is_empty());
        log.rollback(&mut ctx);
    }
}
