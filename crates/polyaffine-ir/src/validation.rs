//! Structural validation of a module.
//!
//! Three checks, all collected rather than stopping at the first failure:
//!
//! 1. **Use-chain consistency**: the use-chain stored in `IrContext` matches
//!    the actual operands of every operation, in both directions.
//! 2. **Visibility**: every operand is defined before, and in a block
//!    enclosing, the operation that uses it.
//! 3. **Affine arity**: every affine operation binds exactly as many
//!    operands as its map or integer set takes inputs.

use std::collections::HashSet;
use std::fmt;
use std::ops::ControlFlow;

use derive_more::{Display, Error};

use crate::context::IrContext;
use crate::dialect::affine::{self, AccessKind};
use crate::dialect::core::Module;
use crate::dominance::value_dominates;
use crate::ops::DialectOp;
use crate::refs::{OpRef, ValueRef};
use crate::walk::{self, WalkAction};

/// A single validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum ValidationError {
    #[display("operand #{operand_index} of {op_name} ({op}) uses {value} but no use-chain entry exists")]
    MissingUse {
        op: OpRef,
        op_name: String,
        operand_index: usize,
        value: ValueRef,
    },
    #[display("use-chain of {value} lists operand #{operand_index} of {op}, which does not reference it")]
    StaleUse {
        value: ValueRef,
        op: OpRef,
        operand_index: usize,
    },
    #[display("operand #{operand_index} of {op_name} ({op}) uses {value}, which is not visible there")]
    NotDominated {
        op: OpRef,
        op_name: String,
        operand_index: usize,
        value: ValueRef,
    },
    #[display("{op_name} ({op}) binds {actual} operand(s) to `{attr}`, which takes {expected}")]
    AffineArity {
        op: OpRef,
        op_name: String,
        attr: &'static str,
        expected: usize,
        actual: usize,
    },
    #[display("{op_name} ({op}) is missing its `{attr}` attribute")]
    MissingAffineAttr {
        op: OpRef,
        op_name: String,
        attr: &'static str,
    },
}

/// Result of validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "validation passed");
        }
        writeln!(f, "{} validation error(s) found:", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "  - {err}")?;
        }
        Ok(())
    }
}

fn full_name(ctx: &IrContext, op: OpRef) -> String {
    let data = ctx.op(op);
    format!("{}.{}", data.dialect, data.name)
}

fn module_ops(ctx: &IrContext, module: Module) -> Vec<OpRef> {
    let mut ops = Vec::new();
    if let Some(body) = module.body(ctx) {
        let _ = walk::walk_region::<()>(ctx, body, &mut |op| {
            ops.push(op);
            ControlFlow::Continue(WalkAction::Advance)
        });
    }
    ops
}

/// Run every check over `module`.
pub fn validate_module(ctx: &IrContext, module: Module) -> ValidationResult {
    let mut result = validate_use_chains(ctx, module);
    result.errors.extend(validate_visibility(ctx, module).errors);
    result.errors.extend(validate_affine_arity(ctx, module).errors);
    result
}

// ============================================================================
// Use-chain consistency validation
// ============================================================================

/// Validate that the use-chain stored in `IrContext` matches the actual operands.
pub fn validate_use_chains(ctx: &IrContext, module: Module) -> ValidationResult {
    let mut errors = Vec::new();
    let ops = module_ops(ctx, module);

    let mut actual_uses: HashSet<(ValueRef, OpRef, u32)> = HashSet::new();
    let mut checked_values: HashSet<ValueRef> = HashSet::new();
    for &op in &ops {
        for (idx, &operand) in ctx.op_operands(op).iter().enumerate() {
            actual_uses.insert((operand, op, idx as u32));
            checked_values.insert(operand);
        }
        checked_values.extend(ctx.op_results(op).iter().copied());
        for &region in &ctx.op(op).regions {
            for &block in &ctx.region(region).blocks {
                checked_values.extend(ctx.block_args(block).iter().copied());
            }
        }
    }

    // Direction 1: actual operand -> use-chain entry must exist
    for &(val, op, idx) in &actual_uses {
        let found = ctx.uses(val).iter().any(|u| u.user == op && u.operand_index == idx);
        if !found {
            errors.push(ValidationError::MissingUse {
                op,
                op_name: full_name(ctx, op),
                operand_index: idx as usize,
                value: val,
            });
        }
    }

    // Direction 2: use-chain entry -> actual operand must exist
    let live: HashSet<OpRef> = ops.iter().copied().collect();
    for &val in &checked_values {
        for u in ctx.uses(val) {
            let points_back = live.contains(&u.user)
                && ctx.op_operands(u.user).get(u.operand_index as usize) == Some(&val);
            if !points_back {
                errors.push(ValidationError::StaleUse {
                    value: val,
                    op: u.user,
                    operand_index: u.operand_index as usize,
                });
            }
        }
    }

    ValidationResult { errors }
}

// ============================================================================
// Visibility validation
// ============================================================================

/// Validate that every operand is visible at its user.
pub fn validate_visibility(ctx: &IrContext, module: Module) -> ValidationResult {
    let mut errors = Vec::new();
    for op in module_ops(ctx, module) {
        for (idx, &operand) in ctx.op_operands(op).iter().enumerate() {
            if !value_dominates(ctx, operand, op) {
                errors.push(ValidationError::NotDominated {
                    op,
                    op_name: full_name(ctx, op),
                    operand_index: idx,
                    value: operand,
                });
            }
        }
    }
    ValidationResult { errors }
}

// ============================================================================
// Affine arity validation
// ============================================================================

/// Validate operand counts of affine operations against their maps and sets.
pub fn validate_affine_arity(ctx: &IrContext, module: Module) -> ValidationResult {
    let mut errors = Vec::new();
    for op in module_ops(ctx, module) {
        check_affine_op(ctx, op, &mut errors);
    }
    ValidationResult { errors }
}

fn check_affine_op(ctx: &IrContext, op: OpRef, errors: &mut Vec<ValidationError>) {
    let operand_count = ctx.op_operands(op).len();
    let mut expect = |attr: &'static str, expected: Option<usize>, actual: usize| match expected {
        None => errors.push(ValidationError::MissingAffineAttr {
            op,
            op_name: full_name(ctx, op),
            attr,
        }),
        Some(expected) if expected != actual => errors.push(ValidationError::AffineArity {
            op,
            op_name: full_name(ctx, op),
            attr,
            expected,
            actual,
        }),
        Some(_) => {}
    };

    if let Ok(apply) = affine::Apply::from_op(ctx, op) {
        expect("map", apply.map(ctx).map(|m| m.num_inputs()), operand_count);
    } else if let Some(kind) = AccessKind::of(ctx, op) {
        let bound = operand_count.saturating_sub(kind.map_operand_start());
        expect("map", affine::op_map(ctx, op).map(|m| m.num_inputs()), bound);
    } else if let Ok(for_op) = affine::For::from_op(ctx, op) {
        let lower = for_op.lower_bound_map(ctx).map(|m| m.num_inputs());
        let upper = for_op.upper_bound_map(ctx).map(|m| m.num_inputs());
        match (lower, upper) {
            (Some(lb), Some(ub)) => {
                let inits = operand_count.saturating_sub(lb + ub);
                expect("lower_bound", Some(lb + ub + inits), operand_count);
                expect("iter_args", Some(ctx.op_results(op).len()), inits);
            }
            (lb, ub) => {
                if lb.is_none() {
                    expect("lower_bound", None, 0);
                }
                if ub.is_none() {
                    expect("upper_bound", None, 0);
                }
            }
        }
    } else if let Ok(if_op) = affine::If::from_op(ctx, op) {
        expect("condition", if_op.condition(ctx).map(|s| s.num_inputs()), operand_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine::AffineMap;
    use crate::parser::parse_test_module;
    use crate::walk::collect_ops;

    const LOOP: &str = r#"core.module @test {
  func.func @f(%0: mem.ref(core.f32), %1: core.index) -> core.nil {
    affine.for %1 {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<()[s0] -> (s0)>} {
      ^bb0(%2: core.index):
        %3 = affine.load %0, %2, %1 {map = affine_map<(d0)[s0] -> (d0 + s0)>} : core.f32
        affine.yield
    }
    func.return
  }
}"#;

    #[test]
    fn well_formed_module_passes() {
        let (ctx, module) = parse_test_module(LOOP);
        let result = validate_module(&ctx, module);
        assert!(result.is_ok(), "{result}");
    }

    #[test]
    fn wrong_map_arity_is_reported() {
        let (mut ctx, module) = parse_test_module(LOOP);
        let load = collect_ops(&ctx, module.op_ref())
            .into_iter()
            .find(|&op| affine::Load::matches(&ctx, op))
            .expect("affine.load");
        affine::set_op_map(&mut ctx, load, AffineMap::dim_identity(1));

        let result = validate_affine_arity(&ctx, module);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            result.errors[0],
            ValidationError::AffineArity { expected: 1, actual: 2, .. }
        ));
    }

    #[test]
    fn use_after_definition_point_is_reported() {
        let (mut ctx, module) = parse_test_module(
            r#"core.module @test {
  func.func @f() -> core.nil {
    %0 = arith.const {value = 1} : core.index
    %1 = arith.add %0, %0 : core.index
    func.return
  }
}"#,
        );
        let ops = collect_ops(&ctx, module.op_ref());
        let c = ops.iter().copied().find(|&op| ctx.op(op).is("arith", "const")).expect("const");
        let add = ops.iter().copied().find(|&op| ctx.op(op).is("arith", "add")).expect("add");

        // Move the constant after its user.
        let block = ctx.op(c).parent_block.expect("attached");
        ctx.detach_op(c);
        let after_add = ctx.next_op(add);
        ctx.insert_op(block, after_add, c);

        let result = validate_visibility(&ctx, module);
        assert_eq!(result.errors.len(), 2);
        assert!(validate_use_chains(&ctx, module).is_ok());
    }
}
