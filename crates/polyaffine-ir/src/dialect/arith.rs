//! Integer arithmetic dialect.
//!
//! Binary ops take two operands of the same type. `arith.cmp` carries its
//! predicate as a symbol attribute (`{predicate = @slt}`) and yields `core.i1`.
//! Casts take one operand and a result type.

use crate::context::{IrContext, OperationDataBuilder};
use crate::location::Location;
use crate::refs::{OpRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::Attribute;

crate::define_op! {
    /// `arith.const {value = N} : ty`
    pub struct Const = "arith"."const";
    pub struct Add = "arith"."add";
    pub struct Sub = "arith"."sub";
    pub struct Mul = "arith"."mul";
    /// Signed division, rounding toward zero.
    pub struct DivS = "arith"."divs";
    pub struct DivU = "arith"."divu";
    /// Signed remainder, taking the sign of the dividend.
    pub struct RemS = "arith"."rems";
    pub struct RemU = "arith"."remu";
    pub struct And = "arith"."and";
    /// `arith.cmp %a, %b {predicate = @slt} : core.i1`
    pub struct Cmp = "arith"."cmp";
    /// `arith.select %cond, %a, %b : ty`
    pub struct Select = "arith"."select";
    /// Conversion between `core.index` and `core.iN`.
    pub struct IndexCast = "arith"."index_cast";
    pub struct Trunc = "arith"."trunc";
    pub struct ExtU = "arith"."extu";
    pub struct ExtS = "arith"."exts";
}

crate::register_effect!(Const => Pure);
crate::register_effect!(Add => Pure);
crate::register_effect!(Sub => Pure);
crate::register_effect!(Mul => Pure);
crate::register_effect!(DivS => Pure);
crate::register_effect!(DivU => Pure);
crate::register_effect!(RemS => Pure);
crate::register_effect!(RemU => Pure);
crate::register_effect!(And => Pure);
crate::register_effect!(Cmp => Pure);
crate::register_effect!(Select => Pure);
crate::register_effect!(IndexCast => Pure);
crate::register_effect!(Trunc => Pure);
crate::register_effect!(ExtU => Pure);
crate::register_effect!(ExtS => Pure);

/// Every arith operation, for matching by kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithKind {
    Const,
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Cmp,
    Select,
    IndexCast,
    Trunc,
    ExtU,
    ExtS,
}

impl ArithKind {
    pub fn of(ctx: &IrContext, op: OpRef) -> Option<ArithKind> {
        let data = ctx.op(op);
        if data.dialect != "arith" {
            return None;
        }
        data.name.with_str(|name| {
            Some(match name {
                "const" => ArithKind::Const,
                "add" => ArithKind::Add,
                "sub" => ArithKind::Sub,
                "mul" => ArithKind::Mul,
                "divs" => ArithKind::DivS,
                "divu" => ArithKind::DivU,
                "rems" => ArithKind::RemS,
                "remu" => ArithKind::RemU,
                "and" => ArithKind::And,
                "cmp" => ArithKind::Cmp,
                "select" => ArithKind::Select,
                "index_cast" => ArithKind::IndexCast,
                "trunc" => ArithKind::Trunc,
                "extu" => ArithKind::ExtU,
                "exts" => ArithKind::ExtS,
                _ => return None,
            })
        })
    }

    pub fn op_name(self) -> &'static str {
        match self {
            ArithKind::Const => "const",
            ArithKind::Add => "add",
            ArithKind::Sub => "sub",
            ArithKind::Mul => "mul",
            ArithKind::DivS => "divs",
            ArithKind::DivU => "divu",
            ArithKind::RemS => "rems",
            ArithKind::RemU => "remu",
            ArithKind::And => "and",
            ArithKind::Cmp => "cmp",
            ArithKind::Select => "select",
            ArithKind::IndexCast => "index_cast",
            ArithKind::Trunc => "trunc",
            ArithKind::ExtU => "extu",
            ArithKind::ExtS => "exts",
        }
    }

    /// Casts that preserve an integer value's meaning as a subscript.
    pub fn is_cast(self) -> bool {
        matches!(
            self,
            ArithKind::IndexCast | ArithKind::Trunc | ArithKind::ExtU | ArithKind::ExtS
        )
    }
}

/// Comparison predicates of `arith.cmp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl CmpPredicate {
    pub fn from_symbol(sym: Symbol) -> Option<CmpPredicate> {
        sym.with_str(|s| {
            Some(match s {
                "eq" => CmpPredicate::Eq,
                "ne" => CmpPredicate::Ne,
                "slt" => CmpPredicate::Slt,
                "sle" => CmpPredicate::Sle,
                "sgt" => CmpPredicate::Sgt,
                "sge" => CmpPredicate::Sge,
                "ult" => CmpPredicate::Ult,
                "ule" => CmpPredicate::Ule,
                "ugt" => CmpPredicate::Ugt,
                "uge" => CmpPredicate::Uge,
                _ => return None,
            })
        })
    }

    pub fn symbol(self) -> Symbol {
        Symbol::new(match self {
            CmpPredicate::Eq => "eq",
            CmpPredicate::Ne => "ne",
            CmpPredicate::Slt => "slt",
            CmpPredicate::Sle => "sle",
            CmpPredicate::Sgt => "sgt",
            CmpPredicate::Sge => "sge",
            CmpPredicate::Ult => "ult",
            CmpPredicate::Ule => "ule",
            CmpPredicate::Ugt => "ugt",
            CmpPredicate::Uge => "uge",
        })
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            CmpPredicate::Ult | CmpPredicate::Ule | CmpPredicate::Ugt | CmpPredicate::Uge
        )
    }

    /// The signed predicate with the same ordering.
    pub fn to_signed(self) -> CmpPredicate {
        match self {
            CmpPredicate::Ult => CmpPredicate::Slt,
            CmpPredicate::Ule => CmpPredicate::Sle,
            CmpPredicate::Ugt => CmpPredicate::Sgt,
            CmpPredicate::Uge => CmpPredicate::Sge,
            other => other,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

pub fn r#const(ctx: &mut IrContext, loc: Location, ty: TypeRef, value: i64) -> Const {
    let data = OperationDataBuilder::new(loc, Symbol::new("arith"), Symbol::new("const"))
        .attr("value", Attribute::Int(value))
        .result(ty)
        .build(ctx);
    Const(ctx.create_op(data))
}

/// Build any two-operand arith op (`add`, `sub`, `mul`, `divs`, ...).
pub fn binary(ctx: &mut IrContext, loc: Location, kind: ArithKind, lhs: ValueRef, rhs: ValueRef, ty: TypeRef) -> OpRef {
    let data = OperationDataBuilder::new(loc, Symbol::new("arith"), Symbol::new(kind.op_name()))
        .operand(lhs)
        .operand(rhs)
        .result(ty)
        .build(ctx);
    ctx.create_op(data)
}

pub fn add(ctx: &mut IrContext, loc: Location, lhs: ValueRef, rhs: ValueRef, ty: TypeRef) -> Add {
    Add(binary(ctx, loc, ArithKind::Add, lhs, rhs, ty))
}

pub fn mul(ctx: &mut IrContext, loc: Location, lhs: ValueRef, rhs: ValueRef, ty: TypeRef) -> Mul {
    Mul(binary(ctx, loc, ArithKind::Mul, lhs, rhs, ty))
}

pub fn cmp(ctx: &mut IrContext, loc: Location, predicate: CmpPredicate, lhs: ValueRef, rhs: ValueRef, i1: TypeRef) -> Cmp {
    let data = OperationDataBuilder::new(loc, Symbol::new("arith"), Symbol::new("cmp"))
        .operand(lhs)
        .operand(rhs)
        .attr("predicate", Attribute::Symbol(predicate.symbol()))
        .result(i1)
        .build(ctx);
    Cmp(ctx.create_op(data))
}

pub fn select(ctx: &mut IrContext, loc: Location, cond: ValueRef, a: ValueRef, b: ValueRef, ty: TypeRef) -> Select {
    let data = OperationDataBuilder::new(loc, Symbol::new("arith"), Symbol::new("select"))
        .operands([cond, a, b])
        .result(ty)
        .build(ctx);
    Select(ctx.create_op(data))
}

pub fn index_cast(ctx: &mut IrContext, loc: Location, value: ValueRef, ty: TypeRef) -> IndexCast {
    let data = OperationDataBuilder::new(loc, Symbol::new("arith"), Symbol::new("index_cast"))
        .operand(value)
        .result(ty)
        .build(ctx);
    IndexCast(ctx.create_op(data))
}

// ============================================================================
// Accessors
// ============================================================================

impl Const {
    pub fn value(self, ctx: &IrContext) -> Option<i64> {
        ctx.op(self.0).attributes.get(&Symbol::new("value"))?.as_int()
    }

    pub fn result(self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

impl Cmp {
    pub fn predicate(self, ctx: &IrContext) -> Option<CmpPredicate> {
        let sym = ctx.op(self.0).attributes.get(&Symbol::new("predicate"))?.as_symbol()?;
        CmpPredicate::from_symbol(sym)
    }

    pub fn lhs(self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn rhs(self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[1]
    }

    pub fn result(self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

impl Select {
    pub fn condition(self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn true_value(self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[1]
    }

    pub fn false_value(self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[2]
    }
}

impl IndexCast {
    pub fn input(self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn result(self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

/// The integer a value holds, if it is the result of `arith.const`.
pub fn constant_value(ctx: &IrContext, v: ValueRef) -> Option<i64> {
    let op = ctx.defining_op(v)?;
    match ArithKind::of(ctx, op)? {
        ArithKind::Const => Const(op).value(ctx),
        _ => None,
    }
}
