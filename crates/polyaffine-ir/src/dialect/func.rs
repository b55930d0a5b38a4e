//! Function dialect.

use crate::context::{IrContext, OperationDataBuilder};
use crate::location::Location;
use crate::refs::{BlockRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::Attribute;

crate::define_op! {
    /// `func.func @name(args) -> ret { ... }`
    pub struct Func = "func"."func";
    /// `func.return %values`
    pub struct Return = "func"."return";
    /// `func.call %args {callee = @f} : results`
    pub struct Call = "func"."call";
}

crate::register_effect!(Func => Write);
crate::register_effect!(Return => Pure);
crate::register_effect!(Call => Write);

pub fn func(ctx: &mut IrContext, loc: Location, name: Symbol, ty: TypeRef, body: RegionRef) -> Func {
    let data = OperationDataBuilder::new(loc, Symbol::new("func"), Symbol::new("func"))
        .attr("sym_name", Attribute::Symbol(name))
        .attr("type", Attribute::Type(ty))
        .region(body)
        .build(ctx);
    Func(ctx.create_op(data))
}

impl Func {
    pub fn name(self, ctx: &IrContext) -> Option<Symbol> {
        ctx.op(self.0)
            .attributes
            .get(&Symbol::new("sym_name"))
            .and_then(Attribute::as_symbol)
    }

    pub fn ty(self, ctx: &IrContext) -> Option<TypeRef> {
        match ctx.op(self.0).attributes.get(&Symbol::new("type")) {
            Some(Attribute::Type(ty)) => Some(*ty),
            _ => None,
        }
    }

    pub fn body(self, ctx: &IrContext) -> Option<RegionRef> {
        ctx.op(self.0).regions.first().copied()
    }

    pub fn entry_block(self, ctx: &IrContext) -> Option<BlockRef> {
        let body = self.body(ctx)?;
        ctx.region(body).blocks.first().copied()
    }
}

pub fn r#return(ctx: &mut IrContext, loc: Location, values: impl IntoIterator<Item = ValueRef>) -> Return {
    let data = OperationDataBuilder::new(loc, Symbol::new("func"), Symbol::new("return"))
        .operands(values)
        .build(ctx);
    Return(ctx.create_op(data))
}

pub fn call(
    ctx: &mut IrContext,
    loc: Location,
    callee: Symbol,
    args: impl IntoIterator<Item = ValueRef>,
    results: impl IntoIterator<Item = TypeRef>,
) -> Call {
    let data = OperationDataBuilder::new(loc, Symbol::new("func"), Symbol::new("call"))
        .operands(args)
        .results(results)
        .attr("callee", Attribute::Symbol(callee))
        .build(ctx);
    Call(ctx.create_op(data))
}
