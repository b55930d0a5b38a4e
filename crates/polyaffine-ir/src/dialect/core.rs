//! Core dialect: the module container and the builtin scalar types.

use smallvec::smallvec;

use crate::context::{IrContext, OperationDataBuilder};
use crate::location::Location;
use crate::refs::{BlockRef, OpRef, RegionRef, TypeRef};
use crate::symbol::Symbol;
use crate::types::{Attribute, TypeDataBuilder};

crate::define_op! {
    /// `core.module @name { ... }`
    pub struct Module = "core"."module";
}

crate::register_effect!(Module => Write);

pub fn module(ctx: &mut IrContext, loc: Location, name: Symbol, body: RegionRef) -> Module {
    let data = OperationDataBuilder::new(loc, Symbol::new("core"), Symbol::new("module"))
        .attr("sym_name", Attribute::Symbol(name))
        .region(body)
        .build(ctx);
    Module(ctx.create_op(data))
}

impl Module {
    pub fn body(self, ctx: &IrContext) -> Option<RegionRef> {
        ctx.op(self.0).regions.first().copied()
    }

    pub fn first_block(self, ctx: &IrContext) -> Option<BlockRef> {
        let region = self.body(ctx)?;
        ctx.region(region).blocks.first().copied()
    }

    /// Top-level operations in the module's first block.
    pub fn ops(self, ctx: &IrContext) -> Vec<OpRef> {
        match self.first_block(ctx) {
            Some(block) => ctx.block(block).ops.to_vec(),
            None => vec![],
        }
    }

    pub fn name(self, ctx: &IrContext) -> Option<Symbol> {
        ctx.op(self.0)
            .attributes
            .get(&Symbol::new("sym_name"))
            .and_then(Attribute::as_symbol)
    }
}

// ============================================================================
// Types
// ============================================================================

fn scalar(ctx: &mut IrContext, name: &'static str) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(Symbol::new("core"), Symbol::new(name)).build())
}

/// `core.index`: the machine-word integer type used for subscripts and
/// loop bounds.
pub fn index(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "index")
}

pub fn i1(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "i1")
}

pub fn i32(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "i32")
}

pub fn i64(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "i64")
}

pub fn f32(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "f32")
}

pub fn f64(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "f64")
}

/// `core.vector(elem)`: the value type of `affine.vector_load`.
pub fn vector(ctx: &mut IrContext, elem: TypeRef) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(Symbol::new("core"), Symbol::new("vector")).param(elem).build())
}

pub fn nil(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "nil")
}

/// `core.func(ret, params...)`.
pub fn func_type(ctx: &mut IrContext, ret: TypeRef, params: &[TypeRef]) -> TypeRef {
    let mut all: smallvec::SmallVec<[TypeRef; 4]> = smallvec![ret];
    all.extend_from_slice(params);
    ctx.types
        .intern(TypeDataBuilder::new(Symbol::new("core"), Symbol::new("func")).params(all).build())
}

pub fn is_index(ctx: &IrContext, ty: TypeRef) -> bool {
    ctx.types.is_dialect(ty, Symbol::new("core"), Symbol::new("index"))
}

/// Bit width of a `core.iN` type.
pub fn int_width(ctx: &IrContext, ty: TypeRef) -> Option<u32> {
    let data = ctx.types.get(ty);
    if data.dialect != "core" {
        return None;
    }
    data.name.with_str(|name| name.strip_prefix('i')?.parse().ok())
}

/// Integer-like: `core.index` or a `core.iN`.
pub fn is_integer_like(ctx: &IrContext, ty: TypeRef) -> bool {
    is_index(ctx, ty) || int_width(ctx, ty).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widths() {
        let mut ctx = IrContext::new();
        let index_ty = index(&mut ctx);
        let i32_ty = i32(&mut ctx);
        let f32_ty = f32(&mut ctx);
        assert_eq!(int_width(&ctx, i32_ty), Some(32));
        assert_eq!(int_width(&ctx, index_ty), None);
        assert_eq!(int_width(&ctx, f32_ty), None);
        assert!(is_index(&ctx, index_ty));
        assert!(is_integer_like(&ctx, i32_ty));
        assert!(!is_integer_like(&ctx, f32_ty));
    }

    #[test]
    fn func_type_puts_return_first() {
        let mut ctx = IrContext::new();
        let index_ty = index(&mut ctx);
        let nil_ty = nil(&mut ctx);
        let fty = func_type(&mut ctx, nil_ty, &[index_ty, index_ty]);
        assert_eq!(ctx.types.get(fty).params.as_slice(), &[nil_ty, index_ty, index_ty]);
    }
}
