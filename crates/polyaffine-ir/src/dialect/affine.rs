//! Affine dialect.
//!
//! Affine operations carry their index arithmetic as [`AffineMap`] or
//! [`IntegerSet`] attributes; the operands bound to a map are laid out dims
//! first, then symbols. Memory ops put their non-index operands (value,
//! memref) in front of the map operands.
//!
//! `affine.for` stores `lower_bound ++ upper_bound ++ inits` as one operand
//! list; the split points follow from each bound map's input count. Its body
//! block takes `[iv, iter_args...]` and yields the loop-carried values.

use smallvec::SmallVec;

use crate::affine::{AffineMap, IntegerSet};
use crate::context::{IrContext, OperationDataBuilder};
use crate::location::Location;
use crate::refs::{BlockRef, OpRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::Attribute;

crate::define_op! {
    /// `%r = affine.apply %ops {map = affine_map<..>} : core.index`
    pub struct Apply = "affine"."apply";
    /// `%v = affine.load %m, %ops {map = ..} : elem`
    pub struct Load = "affine"."load";
    /// `affine.store %v, %m, %ops {map = ..}`
    pub struct Store = "affine"."store";
    /// `affine.prefetch %m, %ops {map = .., is_write = false, locality_hint = 3, is_data_cache = true}`
    pub struct Prefetch = "affine"."prefetch";
    pub struct VectorLoad = "affine"."vector_load";
    pub struct VectorStore = "affine"."vector_store";
    /// Counted loop with affine bounds.
    pub struct For = "affine"."for";
    /// Conditional on an integer set.
    pub struct If = "affine"."if";
    /// Multi-dimensional parallel loop nest.
    pub struct Parallel = "affine"."parallel";
    pub struct Yield = "affine"."yield";
}

crate::register_effect!(Apply => Pure);
crate::register_effect!(Load => Read);
crate::register_effect!(Store => Write);
crate::register_effect!(Prefetch => Read);
crate::register_effect!(VectorLoad => Read);
crate::register_effect!(VectorStore => Write);
crate::register_effect!(For => Pure);
crate::register_effect!(If => Pure);
crate::register_effect!(Parallel => Pure);
crate::register_effect!(Yield => Pure);

crate::symbols! {
    ATTR_MAP => "map",
    ATTR_LOWER_BOUND => "lower_bound",
    ATTR_UPPER_BOUND => "upper_bound",
    ATTR_STEP => "step",
    ATTR_STEPS => "steps",
    ATTR_CONDITION => "condition",
}

/// Affine memory operations whose subscripts are the operands of `{map}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Load,
    Store,
    Prefetch,
    VectorLoad,
    VectorStore,
}

impl AccessKind {
    pub fn of(ctx: &IrContext, op: OpRef) -> Option<AccessKind> {
        let data = ctx.op(op);
        if data.dialect != "affine" {
            return None;
        }
        data.name.with_str(|name| {
            Some(match name {
                "load" => AccessKind::Load,
                "store" => AccessKind::Store,
                "prefetch" => AccessKind::Prefetch,
                "vector_load" => AccessKind::VectorLoad,
                "vector_store" => AccessKind::VectorStore,
                _ => return None,
            })
        })
    }

    /// Index of the first operand bound to the access map.
    pub fn map_operand_start(self) -> usize {
        match self {
            AccessKind::Load | AccessKind::Prefetch | AccessKind::VectorLoad => 1,
            AccessKind::Store | AccessKind::VectorStore => 2,
        }
    }
}

/// The `map` attribute of an apply or memory op.
pub fn op_map(ctx: &IrContext, op: OpRef) -> Option<&AffineMap> {
    ctx.op(op).attributes.get(&ATTR_MAP())?.as_affine_map()
}

pub fn set_op_map(ctx: &mut IrContext, op: OpRef, map: AffineMap) {
    ctx.op_mut(op).attributes.insert(ATTR_MAP(), Attribute::AffineMap(map));
}

// ============================================================================
// Constructors
// ============================================================================

pub fn apply(ctx: &mut IrContext, loc: Location, map: AffineMap, operands: &[ValueRef], index: TypeRef) -> Apply {
    let data = OperationDataBuilder::new(loc, Symbol::new("affine"), Symbol::new("apply"))
        .operands(operands.iter().copied())
        .attr(ATTR_MAP(), map)
        .result(index)
        .build(ctx);
    Apply(ctx.create_op(data))
}

pub fn load(
    ctx: &mut IrContext,
    loc: Location,
    memref: ValueRef,
    map: AffineMap,
    map_operands: &[ValueRef],
    ty: TypeRef,
) -> Load {
    let data = OperationDataBuilder::new(loc, Symbol::new("affine"), Symbol::new("load"))
        .operand(memref)
        .operands(map_operands.iter().copied())
        .attr(ATTR_MAP(), map)
        .result(ty)
        .build(ctx);
    Load(ctx.create_op(data))
}

pub fn store(
    ctx: &mut IrContext,
    loc: Location,
    value: ValueRef,
    memref: ValueRef,
    map: AffineMap,
    map_operands: &[ValueRef],
) -> Store {
    let data = OperationDataBuilder::new(loc, Symbol::new("affine"), Symbol::new("store"))
        .operand(value)
        .operand(memref)
        .operands(map_operands.iter().copied())
        .attr(ATTR_MAP(), map)
        .build(ctx);
    Store(ctx.create_op(data))
}

/// Bounds of an `affine.for`: a map plus its operands for each side.
#[derive(Clone, Debug)]
pub struct LoopBounds {
    pub lower: AffineMap,
    pub lower_operands: Vec<ValueRef>,
    pub upper: AffineMap,
    pub upper_operands: Vec<ValueRef>,
    pub step: i64,
}

pub fn r#for(
    ctx: &mut IrContext,
    loc: Location,
    bounds: LoopBounds,
    inits: &[ValueRef],
    body: RegionRef,
) -> For {
    let result_types: Vec<TypeRef> = inits.iter().map(|&v| ctx.value_ty(v)).collect();
    let data = OperationDataBuilder::new(loc, Symbol::new("affine"), Symbol::new("for"))
        .operands(bounds.lower_operands)
        .operands(bounds.upper_operands)
        .operands(inits.iter().copied())
        .attr(ATTR_LOWER_BOUND(), bounds.lower)
        .attr(ATTR_UPPER_BOUND(), bounds.upper)
        .attr(ATTR_STEP(), Attribute::Int(bounds.step))
        .results(result_types)
        .region(body)
        .build(ctx);
    For(ctx.create_op(data))
}

pub fn r#if(
    ctx: &mut IrContext,
    loc: Location,
    condition: IntegerSet,
    operands: &[ValueRef],
    result_types: impl IntoIterator<Item = TypeRef>,
    then_region: RegionRef,
    else_region: RegionRef,
) -> If {
    let data = OperationDataBuilder::new(loc, Symbol::new("affine"), Symbol::new("if"))
        .operands(operands.iter().copied())
        .attr(ATTR_CONDITION(), condition)
        .results(result_types)
        .region(then_region)
        .region(else_region)
        .build(ctx);
    If(ctx.create_op(data))
}

pub fn r#yield(ctx: &mut IrContext, loc: Location, values: impl IntoIterator<Item = ValueRef>) -> Yield {
    let data = OperationDataBuilder::new(loc, Symbol::new("affine"), Symbol::new("yield"))
        .operands(values)
        .build(ctx);
    Yield(ctx.create_op(data))
}

// ============================================================================
// Accessors
// ============================================================================

impl Apply {
    pub fn map(self, ctx: &IrContext) -> Option<&AffineMap> {
        op_map(ctx, self.0)
    }

    pub fn map_operands(self, ctx: &IrContext) -> &[ValueRef] {
        ctx.op_operands(self.0)
    }

    pub fn result(self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

impl For {
    pub fn lower_bound_map(self, ctx: &IrContext) -> Option<&AffineMap> {
        ctx.op(self.0).attributes.get(&ATTR_LOWER_BOUND())?.as_affine_map()
    }

    pub fn upper_bound_map(self, ctx: &IrContext) -> Option<&AffineMap> {
        ctx.op(self.0).attributes.get(&ATTR_UPPER_BOUND())?.as_affine_map()
    }

    pub fn step(self, ctx: &IrContext) -> Option<i64> {
        ctx.op(self.0).attributes.get(&ATTR_STEP())?.as_int()
    }

    fn split(self, ctx: &IrContext) -> Option<(usize, usize)> {
        let lb = self.lower_bound_map(ctx)?.num_inputs();
        let ub = self.upper_bound_map(ctx)?.num_inputs();
        Some((lb, lb + ub))
    }

    pub fn lower_bound_operands(self, ctx: &IrContext) -> &[ValueRef] {
        let (lb, _) = self.split(ctx).unwrap_or((0, 0));
        &ctx.op_operands(self.0)[..lb]
    }

    pub fn upper_bound_operands(self, ctx: &IrContext) -> &[ValueRef] {
        let (lb, ub) = self.split(ctx).unwrap_or((0, 0));
        &ctx.op_operands(self.0)[lb..ub]
    }

    pub fn inits(self, ctx: &IrContext) -> &[ValueRef] {
        let (_, ub) = self.split(ctx).unwrap_or((0, 0));
        &ctx.op_operands(self.0)[ub..]
    }

    pub fn body_block(self, ctx: &IrContext) -> Option<BlockRef> {
        let region = *ctx.op(self.0).regions.first()?;
        ctx.region(region).blocks.first().copied()
    }

    pub fn induction_var(self, ctx: &IrContext) -> Option<ValueRef> {
        let block = self.body_block(ctx)?;
        ctx.block_args(block).first().copied()
    }

    /// Replace the lower bound map and its operands, keeping the rest.
    pub fn set_lower_bound(self, ctx: &mut IrContext, map: AffineMap, operands: &[ValueRef]) {
        let mut all: SmallVec<[ValueRef; 8]> = operands.into();
        all.extend_from_slice(self.upper_bound_operands(ctx));
        all.extend_from_slice(self.inits(ctx));
        ctx.op_mut(self.0).attributes.insert(ATTR_LOWER_BOUND(), Attribute::AffineMap(map));
        ctx.set_op_operands(self.0, &all);
    }

    /// Replace the upper bound map and its operands, keeping the rest.
    pub fn set_upper_bound(self, ctx: &mut IrContext, map: AffineMap, operands: &[ValueRef]) {
        let mut all: SmallVec<[ValueRef; 8]> = self.lower_bound_operands(ctx).into();
        all.extend_from_slice(operands);
        all.extend_from_slice(self.inits(ctx));
        ctx.op_mut(self.0).attributes.insert(ATTR_UPPER_BOUND(), Attribute::AffineMap(map));
        ctx.set_op_operands(self.0, &all);
    }
}

impl If {
    pub fn condition(self, ctx: &IrContext) -> Option<&IntegerSet> {
        ctx.op(self.0).attributes.get(&ATTR_CONDITION())?.as_integer_set()
    }

    pub fn set_condition(self, ctx: &mut IrContext, set: IntegerSet, operands: &[ValueRef]) {
        ctx.op_mut(self.0).attributes.insert(ATTR_CONDITION(), Attribute::IntegerSet(set));
        ctx.set_op_operands(self.0, operands);
    }
}

impl Parallel {
    pub fn lower_bound_map(self, ctx: &IrContext) -> Option<&AffineMap> {
        ctx.op(self.0).attributes.get(&ATTR_LOWER_BOUND())?.as_affine_map()
    }

    pub fn upper_bound_map(self, ctx: &IrContext) -> Option<&AffineMap> {
        ctx.op(self.0).attributes.get(&ATTR_UPPER_BOUND())?.as_affine_map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine::AffineExpr;
    use crate::context::BlockData;
    use crate::context::RegionData;
    use crate::dialect::{arith, core};
    use crate::location::Span;
    use smallvec::smallvec;

    fn test_ctx() -> (IrContext, Location) {
        let mut ctx = IrContext::new();
        let path = ctx.paths.intern("test.mlir".to_owned());
        (ctx, Location::new(path, Span::new(0, 0)))
    }

    #[test]
    fn for_operand_groups_follow_map_inputs() {
        let (mut ctx, loc) = test_ctx();
        let index = core::index(&mut ctx);
        let n = arith::r#const(&mut ctx, loc, index, 10).result(&ctx);
        let m = arith::r#const(&mut ctx, loc, index, 20).result(&ctx);
        let init = arith::r#const(&mut ctx, loc, index, 0).result(&ctx);

        let block = ctx.create_block(BlockData {
            location: loc,
            args: vec![index, index],
            ops: Default::default(),
            parent_region: None,
        });
        let iter = ctx.block_arg(block, 1);
        let y = r#yield(&mut ctx, loc, [iter]);
        ctx.push_op(block, y.op_ref());
        let body = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![block],
            parent_op: None,
        });

        let bounds = LoopBounds {
            lower: AffineMap::constant(0),
            lower_operands: vec![],
            upper: AffineMap::new(0, 2, vec![AffineExpr::symbol(0), AffineExpr::symbol(1)]),
            upper_operands: vec![n, m],
            step: 1,
        };
        let for_op = r#for(&mut ctx, loc, bounds, &[init], body);

        assert!(for_op.lower_bound_operands(&ctx).is_empty());
        assert_eq!(for_op.upper_bound_operands(&ctx), &[n, m]);
        assert_eq!(for_op.inits(&ctx), &[init]);
        assert_eq!(for_op.induction_var(&ctx), Some(ctx.block_arg(block, 0)));

        for_op.set_lower_bound(&mut ctx, AffineMap::symbol_identity(1), &[m]);
        assert_eq!(for_op.lower_bound_operands(&ctx), &[m]);
        assert_eq!(for_op.upper_bound_operands(&ctx), &[n, m]);
        assert_eq!(for_op.inits(&ctx), &[init]);
        assert_eq!(ctx.uses(m).len(), 2);
    }

    #[test]
    fn access_kinds_and_map_offsets() {
        let (mut ctx, loc) = test_ctx();
        let index = core::index(&mut ctx);
        let f32_ty = core::f32(&mut ctx);
        let ref_ty = crate::dialect::mem::ref_type(&mut ctx, f32_ty);
        let buf = crate::dialect::mem::alloca(&mut ctx, loc, ref_ty);
        let buf = ctx.op_result(buf.op_ref(), 0);
        let i = arith::r#const(&mut ctx, loc, index, 1).result(&ctx);

        let ld = load(&mut ctx, loc, buf, AffineMap::symbol_identity(1), &[i], f32_ty);
        let v = ctx.op_result(ld.op_ref(), 0);
        let st = store(&mut ctx, loc, v, buf, AffineMap::symbol_identity(1), &[i]);

        assert_eq!(AccessKind::of(&ctx, ld.op_ref()), Some(AccessKind::Load));
        assert_eq!(AccessKind::of(&ctx, st.op_ref()), Some(AccessKind::Store));
        assert_eq!(AccessKind::Load.map_operand_start(), 1);
        assert_eq!(AccessKind::Store.map_operand_start(), 2);
        assert_eq!(AccessKind::Prefetch.map_operand_start(), 1);
        assert_eq!(AccessKind::VectorLoad.map_operand_start(), 1);
        assert_eq!(AccessKind::VectorStore.map_operand_start(), 2);
        assert_eq!(op_map(&ctx, st.op_ref()), Some(&AffineMap::symbol_identity(1)));
    }
}
