//! Raw memory access with integer subscripts.

use crate::context::{IrContext, OperationDataBuilder};
use crate::location::Location;
use crate::refs::{TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::TypeDataBuilder;

crate::define_op! {
    /// `%m = mem.alloca : mem.ref(elem)`
    pub struct Alloca = "mem"."alloca";
    /// `%v = mem.load %m, %i0, %i1 : elem`
    pub struct Load = "mem"."load";
    /// `mem.store %v, %m, %i0, %i1`
    pub struct Store = "mem"."store";
}

crate::register_effect!(Alloca => Write);
crate::register_effect!(Load => Read);
crate::register_effect!(Store => Write);

/// `mem.ref(elem)`.
pub fn ref_type(ctx: &mut IrContext, elem: TypeRef) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(Symbol::new("mem"), Symbol::new("ref")).param(elem).build())
}

pub fn alloca(ctx: &mut IrContext, loc: Location, ty: TypeRef) -> Alloca {
    let data = OperationDataBuilder::new(loc, Symbol::new("mem"), Symbol::new("alloca"))
        .result(ty)
        .build(ctx);
    Alloca(ctx.create_op(data))
}

pub fn load(ctx: &mut IrContext, loc: Location, memref: ValueRef, indices: &[ValueRef], ty: TypeRef) -> Load {
    let data = OperationDataBuilder::new(loc, Symbol::new("mem"), Symbol::new("load"))
        .operand(memref)
        .operands(indices.iter().copied())
        .result(ty)
        .build(ctx);
    Load(ctx.create_op(data))
}

pub fn store(ctx: &mut IrContext, loc: Location, value: ValueRef, memref: ValueRef, indices: &[ValueRef]) -> Store {
    let data = OperationDataBuilder::new(loc, Symbol::new("mem"), Symbol::new("store"))
        .operand(value)
        .operand(memref)
        .operands(indices.iter().copied())
        .build(ctx);
    Store(ctx.create_op(data))
}

impl Load {
    pub fn memref(self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn indices(self, ctx: &IrContext) -> &[ValueRef] {
        &ctx.op_operands(self.0)[1..]
    }
}

impl Store {
    pub fn value(self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn memref(self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[1]
    }

    pub fn indices(self, ctx: &IrContext) -> &[ValueRef] {
        &ctx.op_operands(self.0)[2..]
    }
}
