//! Structured control flow.

use crate::context::{IrContext, OperationDataBuilder};
use crate::location::Location;
use crate::refs::{RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;

crate::define_op! {
    /// `%r = scf.if %cond : tys { then } { else }`
    pub struct If = "scf"."if";
    /// Region terminator forwarding values to the parent op's results.
    pub struct Yield = "scf"."yield";
}

crate::register_effect!(If => Pure);
crate::register_effect!(Yield => Pure);

pub fn r#if(
    ctx: &mut IrContext,
    loc: Location,
    cond: ValueRef,
    result_types: impl IntoIterator<Item = TypeRef>,
    then_region: RegionRef,
    else_region: RegionRef,
) -> If {
    let data = OperationDataBuilder::new(loc, Symbol::new("scf"), Symbol::new("if"))
        .operand(cond)
        .results(result_types)
        .region(then_region)
        .region(else_region)
        .build(ctx);
    If(ctx.create_op(data))
}

pub fn r#yield(ctx: &mut IrContext, loc: Location, values: impl IntoIterator<Item = ValueRef>) -> Yield {
    let data = OperationDataBuilder::new(loc, Symbol::new("scf"), Symbol::new("yield"))
        .operands(values)
        .build(ctx);
    Yield(ctx.create_op(data))
}

impl If {
    pub fn condition(self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn then_region(self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn else_region(self, ctx: &IrContext) -> Option<RegionRef> {
        ctx.op(self.0).regions.get(1).copied()
    }
}
