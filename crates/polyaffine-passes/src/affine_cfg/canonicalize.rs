//! Operand-list canonicalization for affine maps and integer sets.
//!
//! After canonicalization every operand is used, no value is bound twice
//! in the same kind of position, constants are folded into the expressions
//! and dimension operands that are valid symbols have moved to symbol
//! positions.

use polyaffine_ir::dialect::arith;
use polyaffine_ir::{AffineExpr, AffineMap, IntegerSet, IrContext, ValueRef};

use super::classify::is_valid_symbol;

/// Replacement lists for one canonicalization, plus the new operand list.
struct Rebinding {
    dims: Vec<AffineExpr>,
    syms: Vec<AffineExpr>,
    new_dims: Vec<ValueRef>,
    new_syms: Vec<ValueRef>,
}

impl Rebinding {
    fn num_dims(&self) -> u32 {
        self.new_dims.len() as u32
    }

    fn num_symbols(&self) -> u32 {
        self.new_syms.len() as u32
    }

    fn operands(self) -> Vec<ValueRef> {
        let mut out = self.new_dims;
        out.extend(self.new_syms);
        out
    }
}

fn slot(list: &mut Vec<ValueRef>, v: ValueRef) -> u32 {
    let pos = list.iter().position(|&x| x == v).unwrap_or_else(|| {
        list.push(v);
        list.len() - 1
    });
    pos as u32
}

fn rebind(
    ctx: &IrContext,
    num_dims: u32,
    operands: &[ValueRef],
    uses_dim: impl Fn(u32) -> bool,
    uses_symbol: impl Fn(u32) -> bool,
) -> Rebinding {
    let (dim_operands, sym_operands) = operands.split_at((num_dims as usize).min(operands.len()));
    let mut out = Rebinding {
        dims: Vec::with_capacity(dim_operands.len()),
        syms: Vec::with_capacity(sym_operands.len()),
        new_dims: Vec::new(),
        new_syms: Vec::new(),
    };

    for (j, &v) in sym_operands.iter().enumerate() {
        let expr = if !uses_symbol(j as u32) {
            AffineExpr::constant(0)
        } else if let Some(c) = arith::constant_value(ctx, v) {
            AffineExpr::constant(c)
        } else {
            AffineExpr::symbol(slot(&mut out.new_syms, v))
        };
        out.syms.push(expr);
    }

    for (i, &v) in dim_operands.iter().enumerate() {
        let expr = if !uses_dim(i as u32) {
            AffineExpr::constant(0)
        } else if let Some(c) = arith::constant_value(ctx, v) {
            AffineExpr::constant(c)
        } else if is_valid_symbol(ctx, v, false) {
            AffineExpr::symbol(slot(&mut out.new_syms, v))
        } else {
            AffineExpr::dim(slot(&mut out.new_dims, v))
        };
        out.dims.push(expr);
    }

    out
}

/// Canonicalize a map together with the operands bound to it.
pub fn canonicalize_map_and_operands(
    ctx: &IrContext,
    map: &AffineMap,
    operands: &[ValueRef],
) -> (AffineMap, Vec<ValueRef>) {
    let mut current = (map.clone(), operands.to_vec());
    loop {
        let (map, operands) = &current;
        let rebinding = rebind(
            ctx,
            map.num_dims(),
            operands,
            |d| map.is_function_of_dim(d),
            |s| map.is_function_of_symbol(s),
        );
        let next_map = map.replace_dims_and_symbols(
            &rebinding.dims,
            &rebinding.syms,
            rebinding.num_dims(),
            rebinding.num_symbols(),
        );
        let next = (next_map, rebinding.operands());
        // Folding can leave an operand unused; go again until nothing moves.
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Canonicalize an integer set together with its operands. Equality flags
/// are preserved.
pub fn canonicalize_set_and_operands(
    ctx: &IrContext,
    set: &IntegerSet,
    operands: &[ValueRef],
) -> (IntegerSet, Vec<ValueRef>) {
    let mut current = (set.clone(), operands.to_vec());
    loop {
        let (set, operands) = &current;
        let uses = |pred: fn(&AffineExpr, u32) -> bool| {
            move |position: u32| set.constraints().iter().any(|e| pred(e, position))
        };
        let rebinding = rebind(
            ctx,
            set.num_dims(),
            operands,
            uses(AffineExpr::is_function_of_dim),
            uses(AffineExpr::is_function_of_symbol),
        );
        let next_set = set.replace_dims_and_symbols(
            &rebinding.dims,
            &rebinding.syms,
            rebinding.num_dims(),
            rebinding.num_symbols(),
        );
        let next = (next_set, rebinding.operands());
        if next == current {
            return next;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine_cfg::tests::func_values;
    use polyaffine_ir::parser::parse_test_module;

    const OPERANDS: &str = r#"core.module @test {
  func.func @f(%0: core.index, %1: core.index) -> core.nil {
    %2 = arith.const {value = 5} : core.index
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (8)>} {
      ^bb0(%3: core.index):
        affine.yield
    }
    func.return
  }
}"#;

    fn d(i: u32) -> AffineExpr {
        AffineExpr::dim(i)
    }

    fn s(i: u32) -> AffineExpr {
        AffineExpr::symbol(i)
    }

    #[test]
    fn constants_fold_and_symbols_leave_dim_positions() {
        let (ctx, module) = parse_test_module(OPERANDS);
        let v = func_values(&ctx, module);
        // (d0, d1)[s0] -> (d0 + d1 * 2 + s0) over [iv, %0, %2]
        let map = AffineMap::new(2, 1, vec![d(0).add(d(1).mul(AffineExpr::constant(2))).add(s(0))]);

        let (map, operands) = canonicalize_map_and_operands(&ctx, &map, &[v[3], v[0], v[2]]);

        assert_eq!(map.to_string(), "affine_map<(d0)[s0] -> (d0 + s0 * 2 + 5)>");
        assert_eq!(operands, vec![v[3], v[0]]);
    }

    #[test]
    fn repeated_and_unused_operands_collapse() {
        let (ctx, module) = parse_test_module(OPERANDS);
        let v = func_values(&ctx, module);
        // ()[s0, s1, s2] -> (s0 - s2) with s0 and s2 bound to the same value
        let map = AffineMap::new(0, 3, vec![s(0).sub(s(2))]);

        let (map, operands) = canonicalize_map_and_operands(&ctx, &map, &[v[0], v[1], v[0]]);

        assert_eq!(map.to_string(), "affine_map<() -> (0)>");
        assert!(operands.is_empty());
    }

    #[test]
    fn set_canonicalization_keeps_equality_flags() {
        let (ctx, module) = parse_test_module(OPERANDS);
        let v = func_values(&ctx, module);
        let set = IntegerSet::new(
            1,
            2,
            vec![d(0).sub(s(0)), s(1).sub(AffineExpr::constant(1))],
            vec![false, true],
        );

        let (set, operands) = canonicalize_set_and_operands(&ctx, &set, &[v[3], v[1], v[2]]);

        assert_eq!(set.to_string(), "affine_set<(d0)[s0] : (d0 - s0 >= 0, 4 == 0)>");
        assert_eq!(set.eq_flags(), &[false, true]);
        assert_eq!(operands, vec![v[3], v[1]]);
    }
}
