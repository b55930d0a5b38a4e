//! Classification of values as affine symbols and indices.
//!
//! The affine scope of a value is its enclosing `func.func`. A *symbol* is
//! invariant across every affine loop of that scope; an *index* may also
//! vary with affine induction variables as long as it stays an affine
//! function of them.

use polyaffine_ir::dialect::arith::{self, ArithKind};
use polyaffine_ir::dialect::{affine, func, scf};
use polyaffine_ir::{BlockRef, DialectOp, IrContext, OpRef, ValueDef, ValueRef};
use tracing::debug;

/// Whether `v` lives directly in a function body: an entry-block argument
/// or the result of an op placed in that block.
pub fn is_top_level_value(ctx: &IrContext, v: ValueRef) -> bool {
    ctx.value_block(v)
        .and_then(|block| ctx.block_parent_op(block))
        .is_some_and(|owner| func::Func::matches(ctx, owner))
}

/// Whether `v` can be bound to a symbol position of an affine map.
///
/// Without `recurse` only top-level values, constants and `affine.apply`
/// chains over symbols qualify. With `recurse`, generic arithmetic and
/// conditionals built entirely out of symbols qualify too: such a value is
/// not directly usable, but can be promoted to one that is.
pub fn is_valid_symbol(ctx: &IrContext, v: ValueRef, recurse: bool) -> bool {
    if is_top_level_value(ctx, v) {
        return true;
    }
    let Some(def) = ctx.defining_op(v) else {
        return false;
    };
    if is_valid_symbol_op(ctx, def, recurse) {
        return true;
    }
    is_scope_symbol(ctx, v)
}

/// The operation-level half of [`is_valid_symbol`].
pub(crate) fn is_valid_symbol_op(ctx: &IrContext, op: OpRef, recurse: bool) -> bool {
    if let Some(kind) = ArithKind::of(ctx, op) {
        return match kind {
            ArithKind::Const => true,
            ArithKind::And => false,
            _ if recurse => ctx
                .op_operands(op)
                .iter()
                .all(|&operand| is_valid_symbol(ctx, operand, true)),
            _ => false,
        };
    }
    if !recurse {
        return false;
    }
    if let Ok(if_op) = scf::If::from_op(ctx, op) {
        return is_valid_symbol(ctx, if_op.condition(ctx), true) && branches_are_symbolic(ctx, op);
    }
    if affine::If::matches(ctx, op) {
        return ctx
            .op_operands(op)
            .iter()
            .all(|&operand| is_valid_symbol(ctx, operand, true))
            && branches_are_symbolic(ctx, op);
    }
    false
}

fn branches_are_symbolic(ctx: &IrContext, op: OpRef) -> bool {
    ctx.op(op).regions.iter().all(|&region| {
        ctx.region(region).blocks.iter().all(|&block| {
            ctx.block(block)
                .ops
                .iter()
                .filter(|&&nested| !is_terminator(ctx, nested))
                .all(|&nested| is_valid_symbol_op(ctx, nested, true))
        })
    })
}

fn is_terminator(ctx: &IrContext, op: OpRef) -> bool {
    scf::Yield::matches(ctx, op) || affine::Yield::matches(ctx, op)
}

/// Symbols in the narrow sense: top-level values, constants and
/// `affine.apply` results over such symbols.
fn is_scope_symbol(ctx: &IrContext, v: ValueRef) -> bool {
    if is_top_level_value(ctx, v) {
        return true;
    }
    let Some(def) = ctx.defining_op(v) else {
        return false;
    };
    if arith::Const::matches(ctx, def) {
        return true;
    }
    affine::Apply::matches(ctx, def)
        && ctx
            .op_operands(def)
            .iter()
            .all(|&operand| is_scope_symbol(ctx, operand))
}

/// Whether `v` is an affine function of induction variables and symbols.
pub fn is_valid_index(ctx: &IrContext, v: ValueRef) -> bool {
    let valid = valid_index(ctx, v);
    if !valid {
        debug!(value = ?v, "not a valid affine index");
    }
    valid
}

pub(crate) fn valid_index(ctx: &IrContext, v: ValueRef) -> bool {
    if is_valid_symbol(ctx, v, true) {
        return true;
    }
    match ctx.value_def(v) {
        ValueDef::OpResult(op, _) => is_valid_index_op(ctx, op),
        ValueDef::BlockArg(block, index) => is_index_block_arg(ctx, block, index),
    }
}

fn is_valid_index_op(ctx: &IrContext, op: OpRef) -> bool {
    let Some(kind) = ArithKind::of(ctx, op) else {
        return false;
    };
    let symbol = |v| is_valid_symbol(ctx, v, true);
    match (kind, ctx.op_operands(op)) {
        (ArithKind::IndexCast | ArithKind::ExtS | ArithKind::ExtU, &[input]) => valid_index(ctx, input),
        (ArithKind::Add | ArithKind::Sub, &[lhs, rhs]) => valid_index(ctx, lhs) && valid_index(ctx, rhs),
        (ArithKind::Mul, &[lhs, rhs]) => {
            (valid_index(ctx, lhs) && symbol(rhs)) || (valid_index(ctx, rhs) && symbol(lhs))
        }
        (ArithKind::DivS | ArithKind::DivU, &[lhs, rhs]) => valid_index(ctx, lhs) && symbol(rhs),
        (ArithKind::RemS | ArithKind::RemU, &[lhs, rhs]) => {
            valid_index(ctx, lhs) && arith::constant_value(ctx, rhs).is_some()
        }
        (ArithKind::Const, _) => true,
        _ => false,
    }
}

/// Function arguments, `affine.for` induction variables and
/// `affine.parallel` induction variables. Loop-carried values are not
/// indices.
fn is_index_block_arg(ctx: &IrContext, block: BlockRef, index: u32) -> bool {
    let Some(owner) = ctx.block_parent_op(block) else {
        return false;
    };
    if func::Func::matches(ctx, owner) {
        return true;
    }
    if affine::For::matches(ctx, owner) {
        return index == 0;
    }
    affine::Parallel::matches(ctx, owner)
}

/// Whether `v` is an induction variable of an enclosing `affine.for` or
/// `affine.parallel`.
pub fn is_affine_loop_arg(ctx: &IrContext, v: ValueRef) -> bool {
    let ValueDef::BlockArg(block, index) = ctx.value_def(v) else {
        return false;
    };
    match ctx.block_parent_op(block) {
        Some(owner) if affine::For::matches(ctx, owner) => index == 0,
        Some(owner) => affine::Parallel::matches(ctx, owner),
        None => false,
    }
}

/// Follow `arith.index_cast` inputs back to the first non-cast value.
pub(crate) fn strip_index_casts(ctx: &IrContext, mut v: ValueRef) -> ValueRef {
    while let Some(op) = ctx.defining_op(v)
        && let Ok(cast) = arith::IndexCast::from_op(ctx, op)
    {
        v = cast.input(ctx);
    }
    v
}

/// Follow `index_cast`, `extu` and `exts` inputs back to the first
/// non-cast value.
pub(crate) fn strip_casts(ctx: &IrContext, mut v: ValueRef) -> ValueRef {
    while let Some(op) = ctx.defining_op(v)
        && ArithKind::of(ctx, op).is_some_and(|kind| {
            matches!(kind, ArithKind::IndexCast | ArithKind::ExtU | ArithKind::ExtS)
        })
    {
        v = ctx.op_operands(op)[0];
    }
    v
}

/// Whether the value bound at a map position still has structure the
/// normalizer can fold into the map.
pub fn legal_condition(ctx: &IrContext, v: ValueRef, is_dim: bool) -> bool {
    if ctx
        .defining_op(v)
        .is_some_and(|op| affine::Apply::matches(ctx, op))
    {
        return true;
    }
    // Anything affine that is not yet bound in canonical form: a symbol
    // slot wants a symbol, a dimension slot a symbol or induction variable.
    if !is_valid_symbol(ctx, v, false) && valid_index(ctx, v) && !(is_dim && is_affine_loop_arg(ctx, v)) {
        return true;
    }
    let stripped = strip_index_casts(ctx, v);
    if let Some(op) = ctx.defining_op(stripped)
        && matches!(
            ArithKind::of(ctx, op),
            Some(ArithKind::Add | ArithKind::Sub | ArithKind::Mul | ArithKind::RemS | ArithKind::RemU)
        )
        && ctx
            .op_operands(op)
            .get(1)
            .is_some_and(|&rhs| arith::constant_value(ctx, rhs).is_some())
    {
        return true;
    }
    !is_dim && is_affine_loop_arg(ctx, stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine_cfg::tests::func_values;
    use polyaffine_ir::parser::parse_test_module;

    const SCOPE: &str = r#"core.module @test {
  func.func @f(%0: core.index, %1: mem.ref(core.f32), %2: core.i32) -> core.nil {
    %3 = arith.const {value = 4} : core.index
    %4 = arith.mul %0, %3 : core.index
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (10)>} {
      ^bb0(%5: core.index):
        %6 = arith.mul %5, %3 : core.index
        %7 = arith.add %6, %0 : core.index
        %8 = arith.mul %5, %5 : core.index
        %9 = mem.load %1, %7 : core.f32
        %10 = arith.add %0, %3 : core.index
        %11 = arith.rems %5, %3 : core.index
        %12 = arith.divs %5, %0 : core.index
        %13 = arith.index_cast %2 : core.index
        %14 = arith.index_cast %7 : core.index
        affine.yield
    }
    func.return
  }
}"#;

    #[test]
    fn top_level_values_and_constants_are_symbols() {
        let (ctx, module) = parse_test_module(SCOPE);
        let v = func_values(&ctx, module);

        assert!(is_valid_symbol(&ctx, v[0], false));
        assert!(is_valid_symbol(&ctx, v[3], false));
        assert!(is_valid_symbol(&ctx, v[4], false));
        assert!(!is_valid_symbol(&ctx, v[5], true));
        assert!(!is_valid_symbol(&ctx, v[6], true));
    }

    #[test]
    fn recursive_symbols_need_symbol_operands() {
        let (ctx, module) = parse_test_module(SCOPE);
        let v = func_values(&ctx, module);

        // `%10 = %0 + %3` inside the loop
        assert!(!is_valid_symbol(&ctx, v[10], false));
        assert!(is_valid_symbol(&ctx, v[10], true));
        // `%13 = index_cast %2`
        assert!(is_valid_symbol(&ctx, v[13], true));
        // `%7` depends on the induction variable
        assert!(!is_valid_symbol(&ctx, v[7], true));
    }

    #[test]
    fn affine_arithmetic_is_a_valid_index() {
        let (ctx, module) = parse_test_module(SCOPE);
        let v = func_values(&ctx, module);

        assert!(is_valid_index(&ctx, v[5]));
        assert!(is_valid_index(&ctx, v[6]));
        assert!(is_valid_index(&ctx, v[7]));
        assert!(is_valid_index(&ctx, v[11]));
        assert!(is_valid_index(&ctx, v[12]));
        assert!(is_valid_index(&ctx, v[14]));
        // iv * iv
        assert!(!is_valid_index(&ctx, v[8]));
        // loaded values
        assert!(!is_valid_index(&ctx, v[9]));
    }

    #[test]
    fn legal_condition_tracks_slot_kind() {
        let (ctx, module) = parse_test_module(SCOPE);
        let v = func_values(&ctx, module);

        // the induction variable is only worth renumbering from a symbol slot
        assert!(legal_condition(&ctx, v[5], false));
        assert!(!legal_condition(&ctx, v[5], true));
        // `iv * 4` folds in either slot
        assert!(legal_condition(&ctx, v[6], true));
        assert!(legal_condition(&ctx, v[6], false));
        // a plain argument is already canonical
        assert!(!legal_condition(&ctx, v[0], false));
        assert!(!legal_condition(&ctx, v[0], true));
        // `iv * iv` is out of reach
        assert!(!legal_condition(&ctx, v[8], true));
    }

    #[test]
    fn casts_are_stripped() {
        let (ctx, module) = parse_test_module(SCOPE);
        let v = func_values(&ctx, module);

        assert_eq!(strip_index_casts(&ctx, v[13]), v[2]);
        assert_eq!(strip_casts(&ctx, v[14]), v[7]);
        assert_eq!(strip_casts(&ctx, v[7]), v[7]);
    }
}
