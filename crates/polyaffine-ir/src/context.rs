//! IrContext: arena-based mutable IR storage.
//!
//! All IR entities (operations, values, blocks, regions) are stored in
//! `PrimaryMap`s owned by `IrContext`. Entity lists (operands, results)
//! use `EntityList + ListPool` for compact 4-byte per-field storage.

use std::collections::{BTreeMap, HashMap};

use cranelift_entity::{EntityList, ListPool, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use crate::location::Location;
use crate::refs::*;
use crate::symbol::Symbol;
use crate::types::*;

// ============================================================================
// Use-chain
// ============================================================================

/// A single use of a value: which operation uses it, at which operand index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: OpRef,
    pub operand_index: u32,
}

// ============================================================================
// Entity data types
// ============================================================================

/// Data for a single operation in the arena.
pub struct OperationData {
    pub location: Location,
    pub dialect: Symbol,
    pub name: Symbol,
    pub operands: EntityList<ValueRef>,
    pub results: EntityList<TypeRef>,
    pub attributes: BTreeMap<Symbol, Attribute>,
    pub regions: SmallVec<[RegionRef; 4]>,
    pub successors: SmallVec<[BlockRef; 4]>,
    pub parent_block: Option<BlockRef>,
}

impl OperationData {
    /// Whether this operation is `dialect.name`.
    pub fn is(&self, dialect: &str, name: &str) -> bool {
        self.dialect == dialect && self.name == name
    }
}

/// Data for a single SSA value.
pub struct ValueData {
    pub def: ValueDef,
    pub ty: TypeRef,
}

/// Data for a basic block.
pub struct BlockData {
    pub location: Location,
    /// Argument types; the argument values are allocated by `create_block`.
    pub args: Vec<TypeRef>,
    pub ops: SmallVec<[OpRef; 4]>,
    pub parent_region: Option<RegionRef>,
}

/// Data for a region (list of blocks).
pub struct RegionData {
    pub location: Location,
    pub blocks: SmallVec<[BlockRef; 4]>,
    pub parent_op: Option<OpRef>,
}

// ============================================================================
// IrContext
// ============================================================================

/// Arena-based mutable IR context.
///
/// Owns all IR entities and provides methods for creating, querying,
/// and mutating them. Use-chains are automatically maintained.
pub struct IrContext {
    ops: PrimaryMap<OpRef, OperationData>,
    values: PrimaryMap<ValueRef, ValueData>,
    blocks: PrimaryMap<BlockRef, BlockData>,
    regions: PrimaryMap<RegionRef, RegionData>,

    /// Use-chain: for each value, the list of operations that use it.
    uses: SecondaryMap<ValueRef, SmallVec<[Use; 2]>>,

    pub types: TypeInterner,
    pub paths: PathInterner,

    value_pool: ListPool<ValueRef>,
    type_pool: ListPool<TypeRef>,

    result_values: SecondaryMap<OpRef, EntityList<ValueRef>>,
    block_arg_values: SecondaryMap<BlockRef, EntityList<ValueRef>>,
}

impl IrContext {
    pub fn new() -> Self {
        Self {
            ops: PrimaryMap::new(),
            values: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            regions: PrimaryMap::new(),
            uses: SecondaryMap::new(),
            types: TypeInterner::new(),
            paths: PathInterner::new(),
            value_pool: ListPool::new(),
            type_pool: ListPool::new(),
            result_values: SecondaryMap::new(),
            block_arg_values: SecondaryMap::new(),
        }
    }

    // ========================================================================
    // Operation
    // ========================================================================

    /// Create a new operation and allocate result values for it.
    ///
    /// The operation's operands are registered in the use-chain.
    ///
    /// # Panics
    ///
    /// Panics if `data.parent_block` is `Some`, or if any region in
    /// `data.regions` already belongs to another operation.
    pub fn create_op(&mut self, data: OperationData) -> OpRef {
        assert!(
            data.parent_block.is_none(),
            "create_op: operation must not have parent_block set; \
             use push_op to attach to a block after creation",
        );

        let operand_slice: SmallVec<[ValueRef; 8]> =
            data.operands.as_slice(&self.value_pool).into();
        let result_types: SmallVec<[TypeRef; 4]> = data.results.as_slice(&self.type_pool).into();
        let regions: SmallVec<[RegionRef; 4]> = data.regions.clone();

        let op = self.ops.push(data);

        for &r in &regions {
            if let Some(existing) = self.regions[r].parent_op {
                panic!(
                    "create_op: region {r} already belongs to operation {existing}; \
                     cannot reassign to {op}",
                );
            }
            self.regions[r].parent_op = Some(op);
        }

        for (idx, &val) in operand_slice.iter().enumerate() {
            self.uses[val].push(Use {
                user: op,
                operand_index: idx as u32,
            });
        }

        let mut result_value_list = EntityList::new();
        for (idx, &ty) in result_types.iter().enumerate() {
            let v = self.values.push(ValueData {
                def: ValueDef::OpResult(op, idx as u32),
                ty,
            });
            result_value_list.push(v, &mut self.value_pool);
        }
        self.result_values[op] = result_value_list;

        op
    }

    pub fn op(&self, op: OpRef) -> &OperationData {
        &self.ops[op]
    }

    /// Get mutable reference to operation data.
    ///
    /// **Warning**: Modifying operands directly will desync the use-chain.
    /// Use `set_op_operands` or `replace_all_uses` instead.
    pub fn op_mut(&mut self, op: OpRef) -> &mut OperationData {
        &mut self.ops[op]
    }

    pub fn op_operands(&self, op: OpRef) -> &[ValueRef] {
        self.ops[op].operands.as_slice(&self.value_pool)
    }

    pub fn op_result_types(&self, op: OpRef) -> &[TypeRef] {
        self.ops[op].results.as_slice(&self.type_pool)
    }

    pub fn op_result(&self, op: OpRef, index: u32) -> ValueRef {
        self.result_values[op].as_slice(&self.value_pool)[index as usize]
    }

    pub fn op_results(&self, op: OpRef) -> &[ValueRef] {
        self.result_values[op].as_slice(&self.value_pool)
    }

    /// Replace the whole operand list of an operation, keeping the
    /// use-chain in sync.
    pub fn set_op_operands(&mut self, op: OpRef, operands: &[ValueRef]) {
        let old: SmallVec<[ValueRef; 8]> = self.op_operands(op).into();
        for val in old {
            self.uses[val].retain(|u| u.user != op);
        }
        let mut list = EntityList::new();
        for (idx, &val) in operands.iter().enumerate() {
            list.push(val, &mut self.value_pool);
            self.uses[val].push(Use {
                user: op,
                operand_index: idx as u32,
            });
        }
        self.ops[op].operands = list;
    }

    /// Replace a single operand of an operation.
    pub fn set_op_operand(&mut self, op: OpRef, index: usize, val: ValueRef) {
        let mut operands: SmallVec<[ValueRef; 8]> = self.op_operands(op).into();
        operands[index] = val;
        self.set_op_operands(op, &operands);
    }

    /// Remove an operation, clearing its use-chain entries.
    ///
    /// Does NOT remove it from its parent block. Use `detach_op` first.
    ///
    /// # Panics
    ///
    /// Panics if the operation is still attached to a block, or if any of
    /// its results still has uses.
    pub fn remove_op(&mut self, op: OpRef) {
        if let Some(block) = self.ops[op].parent_block {
            panic!(
                "remove_op: operation {op} is still attached to block {block}; \
                 call detach_op first"
            );
        }

        let results: SmallVec<[ValueRef; 4]> =
            self.result_values[op].as_slice(&self.value_pool).into();
        for &val in &results {
            assert!(
                self.uses[val].is_empty(),
                "remove_op: result value {val} still has {} use(s); \
                 replace all uses before removing the operation",
                self.uses[val].len()
            );
        }

        let operands: SmallVec<[ValueRef; 8]> =
            self.ops[op].operands.as_slice(&self.value_pool).into();
        for (idx, &val) in operands.iter().enumerate() {
            self.uses[val].retain(|u| !(u.user == op && u.operand_index == idx as u32));
        }
    }

    /// Detach an operation from its parent block, if any.
    pub fn detach_op(&mut self, op: OpRef) {
        if let Some(block) = self.ops[op].parent_block {
            self.remove_op_from_block(block, op);
        }
    }

    /// Erase an operation and everything nested in its regions.
    ///
    /// Nested operations are erased in reverse order so that values defined
    /// inside the tree lose their uses before their definitions go away.
    ///
    /// # Panics
    ///
    /// Panics if a result of the erased tree is still used outside it.
    pub fn erase_op(&mut self, op: OpRef) {
        let regions = self.ops[op].regions.clone();
        for region in regions {
            let blocks = self.regions[region].blocks.clone();
            for block in blocks.into_iter().rev() {
                let ops = self.blocks[block].ops.clone();
                for nested in ops.into_iter().rev() {
                    self.erase_op(nested);
                }
            }
        }
        self.detach_op(op);
        self.remove_op(op);
    }

    /// Move the regions out of an operation, leaving it region-less.
    ///
    /// The returned regions are unowned and can be handed to a new
    /// operation through the builder.
    pub fn take_regions(&mut self, op: OpRef) -> SmallVec<[RegionRef; 4]> {
        let regions = std::mem::take(&mut self.ops[op].regions);
        for &r in &regions {
            self.regions[r].parent_op = None;
        }
        regions
    }

    /// Deep-copy an operation, including nested regions.
    ///
    /// Operands found in `mapping` are remapped; others are reused as-is.
    /// Every value defined by the clone is recorded in `mapping`. The clone
    /// is not attached to any block.
    pub fn clone_op(&mut self, op: OpRef, mapping: &mut HashMap<ValueRef, ValueRef>) -> OpRef {
        let data = &self.ops[op];
        let location = data.location;
        let dialect = data.dialect;
        let name = data.name;
        let attributes = data.attributes.clone();
        let successors = data.successors.clone();
        let regions = data.regions.clone();

        let operands: Vec<ValueRef> = self
            .op_operands(op)
            .iter()
            .map(|v| *mapping.get(v).unwrap_or(v))
            .collect();
        let result_types: Vec<TypeRef> = self.op_result_types(op).to_vec();

        let new_regions: SmallVec<[RegionRef; 4]> = regions
            .into_iter()
            .map(|r| self.clone_region(r, mapping))
            .collect();

        let mut builder = OperationDataBuilder::new(location, dialect, name)
            .operands(operands)
            .results(result_types);
        builder.attributes = attributes;
        builder.regions = new_regions;
        builder.successors = successors;
        let data = builder.build(self);
        let new_op = self.create_op(data);

        let old_results: SmallVec<[ValueRef; 4]> = self.op_results(op).into();
        let new_results: SmallVec<[ValueRef; 4]> = self.op_results(new_op).into();
        for (old, new) in old_results.into_iter().zip(new_results) {
            mapping.insert(old, new);
        }
        new_op
    }

    fn clone_region(&mut self, region: RegionRef, mapping: &mut HashMap<ValueRef, ValueRef>) -> RegionRef {
        let location = self.regions[region].location;
        let blocks = self.regions[region].blocks.clone();

        let mut block_map: HashMap<BlockRef, BlockRef> = HashMap::new();
        let mut new_blocks: SmallVec<[BlockRef; 4]> = SmallVec::new();
        for &block in &blocks {
            let new_block = self.create_block(BlockData {
                location: self.blocks[block].location,
                args: self.blocks[block].args.clone(),
                ops: SmallVec::new(),
                parent_region: None,
            });
            let old_args: SmallVec<[ValueRef; 4]> = self.block_args(block).into();
            let new_args: SmallVec<[ValueRef; 4]> = self.block_args(new_block).into();
            for (old, new) in old_args.into_iter().zip(new_args) {
                mapping.insert(old, new);
            }
            block_map.insert(block, new_block);
            new_blocks.push(new_block);
        }

        for (&block, &new_block) in blocks.iter().zip(&new_blocks) {
            let ops = self.blocks[block].ops.clone();
            for nested in ops {
                let cloned = self.clone_op(nested, mapping);
                for succ in self.ops[cloned].successors.iter_mut() {
                    if let Some(&mapped) = block_map.get(succ) {
                        *succ = mapped;
                    }
                }
                self.push_op(new_block, cloned);
            }
        }

        self.create_region(RegionData {
            location,
            blocks: new_blocks,
            parent_op: None,
        })
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// The operation whose region contains `block`.
    pub fn block_parent_op(&self, block: BlockRef) -> Option<OpRef> {
        let region = self.blocks[block].parent_region?;
        self.regions[region].parent_op
    }

    /// The operation that encloses `op`.
    pub fn parent_op(&self, op: OpRef) -> Option<OpRef> {
        let block = self.ops[op].parent_block?;
        self.block_parent_op(block)
    }

    /// The block in which a value becomes available.
    pub fn value_block(&self, v: ValueRef) -> Option<BlockRef> {
        match self.values[v].def {
            ValueDef::OpResult(op, _) => self.ops[op].parent_block,
            ValueDef::BlockArg(block, _) => Some(block),
        }
    }

    /// Whether `ancestor` encloses `op` (or is `op` itself).
    pub fn is_ancestor(&self, ancestor: OpRef, op: OpRef) -> bool {
        let mut cur = Some(op);
        while let Some(o) = cur {
            if o == ancestor {
                return true;
            }
            cur = self.parent_op(o);
        }
        false
    }

    /// The operation following `op` in its block.
    pub fn next_op(&self, op: OpRef) -> Option<OpRef> {
        let block = self.ops[op].parent_block?;
        let ops = &self.blocks[block].ops;
        let pos = ops.iter().position(|&o| o == op)?;
        ops.get(pos + 1).copied()
    }

    /// Position of `op` within its block.
    pub fn op_position(&self, op: OpRef) -> Option<usize> {
        let block = self.ops[op].parent_block?;
        self.blocks[block].ops.iter().position(|&o| o == op)
    }

    // ========================================================================
    // Value
    // ========================================================================

    pub fn value(&self, v: ValueRef) -> &ValueData {
        &self.values[v]
    }

    pub fn value_ty(&self, v: ValueRef) -> TypeRef {
        self.values[v].ty
    }

    pub fn value_def(&self, v: ValueRef) -> ValueDef {
        self.values[v].def
    }

    /// The operation defining `v`, if it is an op result.
    pub fn defining_op(&self, v: ValueRef) -> Option<OpRef> {
        self.values[v].def.op()
    }

    // ========================================================================
    // Block
    // ========================================================================

    /// Create a new block and allocate argument values for it.
    pub fn create_block(&mut self, data: BlockData) -> BlockRef {
        let arg_types = data.args.clone();
        let block = self.blocks.push(data);

        let mut arg_value_list = EntityList::new();
        for (idx, ty) in arg_types.into_iter().enumerate() {
            let v = self.values.push(ValueData {
                def: ValueDef::BlockArg(block, idx as u32),
                ty,
            });
            arg_value_list.push(v, &mut self.value_pool);
        }
        self.block_arg_values[block] = arg_value_list;

        block
    }

    pub fn block(&self, b: BlockRef) -> &BlockData {
        &self.blocks[b]
    }

    pub fn block_arg(&self, b: BlockRef, index: u32) -> ValueRef {
        self.block_arg_values[b].as_slice(&self.value_pool)[index as usize]
    }

    pub fn block_args(&self, b: BlockRef) -> &[ValueRef] {
        self.block_arg_values[b].as_slice(&self.value_pool)
    }

    /// Append an operation to the end of a block.
    ///
    /// # Panics
    ///
    /// Panics if the operation already belongs to a block.
    pub fn push_op(&mut self, block: BlockRef, op: OpRef) {
        if let Some(existing) = self.ops[op].parent_block {
            panic!(
                "push_op: operation {op} already belongs to block {existing}; \
                 remove it from the old block first"
            );
        }
        self.ops[op].parent_block = Some(block);
        self.blocks[block].ops.push(op);
    }

    /// Insert an operation before `before` in the given block.
    ///
    /// # Panics
    ///
    /// Panics if the operation already belongs to a block, or if `before`
    /// is not found in the block.
    pub fn insert_op_before(&mut self, block: BlockRef, before: OpRef, op: OpRef) {
        if let Some(existing) = self.ops[op].parent_block {
            panic!(
                "insert_op_before: operation {op} already belongs to block {existing}; \
                 remove it from the old block first"
            );
        }
        let ops = &mut self.blocks[block].ops;
        let pos = ops
            .iter()
            .position(|&o| o == before)
            .expect("insert_op_before: `before` op not found in block");
        ops.insert(pos, op);
        self.ops[op].parent_block = Some(block);
    }

    /// Insert before `before`, or append when `before` is `None`.
    pub fn insert_op(&mut self, block: BlockRef, before: Option<OpRef>, op: OpRef) {
        match before {
            Some(before) => self.insert_op_before(block, before, op),
            None => self.push_op(block, op),
        }
    }

    /// Remove an operation from a block (does not destroy the operation).
    pub fn remove_op_from_block(&mut self, block: BlockRef, op: OpRef) {
        self.blocks[block].ops.retain(|o| *o != op);
        if self.ops[op].parent_block == Some(block) {
            self.ops[op].parent_block = None;
        }
    }

    // ========================================================================
    // Region
    // ========================================================================

    /// Create a new region.
    ///
    /// # Panics
    ///
    /// Panics if any block in `data.blocks` already belongs to another region.
    pub fn create_region(&mut self, data: RegionData) -> RegionRef {
        let region = self.regions.push(data);

        let blocks: SmallVec<[BlockRef; 4]> = self.regions[region].blocks.clone();
        for &b in &blocks {
            if let Some(existing) = self.blocks[b].parent_region {
                panic!(
                    "create_region: block {b} already belongs to region {existing}; \
                     cannot reassign to {region}",
                );
            }
            self.blocks[b].parent_region = Some(region);
        }

        region
    }

    pub fn region(&self, r: RegionRef) -> &RegionData {
        &self.regions[r]
    }

    // ========================================================================
    // Use-chain
    // ========================================================================

    pub fn uses(&self, v: ValueRef) -> &[Use] {
        &self.uses[v]
    }

    pub fn has_uses(&self, v: ValueRef) -> bool {
        !self.uses[v].is_empty()
    }

    /// Replace all uses of `old` with `new` in all operations.
    pub fn replace_all_uses(&mut self, old: ValueRef, new: ValueRef) {
        if old == new {
            return;
        }
        let old_uses = std::mem::take(&mut self.uses[old]);

        for u in &old_uses {
            let operands = &mut self.ops[u.user].operands;
            let slice = operands.as_mut_slice(&mut self.value_pool);
            debug_assert_eq!(slice[u.operand_index as usize], old);
            slice[u.operand_index as usize] = new;

            self.uses[new].push(Use {
                user: u.user,
                operand_index: u.operand_index,
            });
        }
    }

    /// Replace uses of `old` with `new`, but only in users accepted by `filter`.
    pub fn replace_uses_where(&mut self, old: ValueRef, new: ValueRef, filter: impl Fn(OpRef) -> bool) {
        if old == new {
            return;
        }
        let (moved, kept): (SmallVec<[Use; 2]>, SmallVec<[Use; 2]>) =
            std::mem::take(&mut self.uses[old]).into_iter().partition(|u| filter(u.user));
        self.uses[old] = kept;
        for u in moved {
            let slice = self.ops[u.user].operands.as_mut_slice(&mut self.value_pool);
            slice[u.operand_index as usize] = new;
            self.uses[new].push(u);
        }
    }
}

impl Default for IrContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Helper constructors for OperationData
// ============================================================================

/// Builder for constructing `OperationData` with pool-backed lists.
///
/// Collects operands and result types into `Vec`s, then packs them
/// into `EntityList`s on `build()`.
pub struct OperationDataBuilder {
    location: Location,
    dialect: Symbol,
    name: Symbol,
    operands: Vec<ValueRef>,
    results: Vec<TypeRef>,
    attributes: BTreeMap<Symbol, Attribute>,
    regions: SmallVec<[RegionRef; 4]>,
    successors: SmallVec<[BlockRef; 4]>,
}

impl OperationDataBuilder {
    pub fn new(location: Location, dialect: Symbol, name: Symbol) -> Self {
        Self {
            location,
            dialect,
            name,
            operands: Vec::new(),
            results: Vec::new(),
            attributes: BTreeMap::new(),
            regions: SmallVec::new(),
            successors: SmallVec::new(),
        }
    }

    pub fn operand(mut self, v: ValueRef) -> Self {
        self.operands.push(v);
        self
    }

    pub fn operands(mut self, vs: impl IntoIterator<Item = ValueRef>) -> Self {
        self.operands.extend(vs);
        self
    }

    pub fn result(mut self, ty: TypeRef) -> Self {
        self.results.push(ty);
        self
    }

    pub fn results(mut self, tys: impl IntoIterator<Item = TypeRef>) -> Self {
        self.results.extend(tys);
        self
    }

    pub fn attr(mut self, key: impl Into<Symbol>, val: impl Into<Attribute>) -> Self {
        self.attributes.insert(key.into(), val.into());
        self
    }

    pub fn region(mut self, r: RegionRef) -> Self {
        self.regions.push(r);
        self
    }

    pub fn regions(mut self, rs: impl IntoIterator<Item = RegionRef>) -> Self {
        self.regions.extend(rs);
        self
    }

    pub fn successor(mut self, b: BlockRef) -> Self {
        self.successors.push(b);
        self
    }

    /// Build the `OperationData`, packing vecs into `EntityList`s using
    /// the context's pools.
    pub fn build(self, ctx: &mut IrContext) -> OperationData {
        let mut operands = EntityList::new();
        for v in self.operands {
            operands.push(v, &mut ctx.value_pool);
        }
        let mut results = EntityList::new();
        for ty in self.results {
            results.push(ty, &mut ctx.type_pool);
        }
        OperationData {
            location: self.location,
            dialect: self.dialect,
            name: self.name,
            operands,
            results,
            attributes: self.attributes,
            regions: self.regions,
            successors: self.successors,
            parent_block: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Span;
    use smallvec::smallvec;

    fn test_location(ctx: &mut IrContext) -> Location {
        let path = ctx.paths.intern("test.mlir".to_owned());
        Location::new(path, Span::new(0, 0))
    }

    fn index_type(ctx: &mut IrContext) -> TypeRef {
        ctx.types
            .intern(TypeDataBuilder::new(Symbol::new("core"), Symbol::new("index")).build())
    }

    fn empty_block(ctx: &mut IrContext, loc: Location, args: Vec<TypeRef>) -> BlockRef {
        ctx.create_block(BlockData {
            location: loc,
            args,
            ops: SmallVec::new(),
            parent_region: None,
        })
    }

    fn mk(ctx: &mut IrContext, loc: Location, name: &'static str, operands: &[ValueRef], ty: TypeRef) -> OpRef {
        let data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new(name))
            .operands(operands.iter().copied())
            .result(ty)
            .build(ctx);
        ctx.create_op(data)
    }

    #[test]
    fn create_op_and_read_back() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);
        let index = index_type(&mut ctx);

        let data = OperationDataBuilder::new(loc, Symbol::new("arith"), Symbol::new("const"))
            .result(index)
            .attr("value", Attribute::Int(-3))
            .build(&mut ctx);
        let op = ctx.create_op(data);

        assert!(ctx.op(op).is("arith", "const"));
        assert_eq!(ctx.op_result_types(op), &[index]);
        assert_eq!(
            ctx.op(op).attributes.get(&Symbol::new("value")),
            Some(&Attribute::Int(-3))
        );
        assert_eq!(ctx.value_def(ctx.op_result(op, 0)), ValueDef::OpResult(op, 0));
    }

    #[test]
    fn block_args_get_values() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);
        let index = index_type(&mut ctx);

        let block = empty_block(&mut ctx, loc, vec![index, index]);
        let a0 = ctx.block_arg(block, 0);
        let a1 = ctx.block_arg(block, 1);
        assert_ne!(a0, a1);
        assert_eq!(ctx.value_def(a1), ValueDef::BlockArg(block, 1));
        assert_eq!(ctx.value_block(a0), Some(block));
    }

    #[test]
    fn rauw_moves_every_use() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);
        let index = index_type(&mut ctx);

        let old = mk(&mut ctx, loc, "a", &[], index);
        let new = mk(&mut ctx, loc, "b", &[], index);
        let v_old = ctx.op_result(old, 0);
        let v_new = ctx.op_result(new, 0);
        let user = mk(&mut ctx, loc, "add", &[v_old, v_old], index);

        ctx.replace_all_uses(v_old, v_new);

        assert!(!ctx.has_uses(v_old));
        assert_eq!(ctx.uses(v_new).len(), 2);
        assert_eq!(ctx.op_operands(user), &[v_new, v_new]);
    }

    #[test]
    fn replace_uses_where_is_selective() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);
        let index = index_type(&mut ctx);

        let old = mk(&mut ctx, loc, "a", &[], index);
        let new = mk(&mut ctx, loc, "b", &[], index);
        let v_old = ctx.op_result(old, 0);
        let v_new = ctx.op_result(new, 0);
        let keep = mk(&mut ctx, loc, "keep", &[v_old], index);
        let moved = mk(&mut ctx, loc, "moved", &[v_old], index);

        ctx.replace_uses_where(v_old, v_new, |user| user == moved);

        assert_eq!(ctx.op_operands(keep), &[v_old]);
        assert_eq!(ctx.op_operands(moved), &[v_new]);
        assert_eq!(ctx.uses(v_old).len(), 1);
        assert_eq!(ctx.uses(v_new).len(), 1);
    }

    #[test]
    fn set_op_operands_updates_use_chain() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);
        let index = index_type(&mut ctx);

        let a = mk(&mut ctx, loc, "a", &[], index);
        let b = mk(&mut ctx, loc, "b", &[], index);
        let va = ctx.op_result(a, 0);
        let vb = ctx.op_result(b, 0);
        let user = mk(&mut ctx, loc, "use", &[va], index);

        ctx.set_op_operands(user, &[vb, vb]);

        assert!(!ctx.has_uses(va));
        assert_eq!(ctx.uses(vb).len(), 2);
        assert_eq!(ctx.uses(vb)[1].operand_index, 1);

        ctx.set_op_operand(user, 0, va);
        assert_eq!(ctx.op_operands(user), &[va, vb]);
        assert_eq!(ctx.uses(va).len(), 1);
        assert_eq!(ctx.uses(vb).len(), 1);
    }

    #[test]
    fn insert_and_navigate() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);
        let index = index_type(&mut ctx);

        let block = empty_block(&mut ctx, loc, vec![]);
        let op_a = mk(&mut ctx, loc, "a", &[], index);
        let op_c = mk(&mut ctx, loc, "c", &[], index);
        ctx.push_op(block, op_a);
        ctx.push_op(block, op_c);
        let op_b = mk(&mut ctx, loc, "b", &[], index);
        ctx.insert_op(block, Some(op_c), op_b);

        assert_eq!(ctx.block(block).ops.as_slice(), &[op_a, op_b, op_c]);
        assert_eq!(ctx.next_op(op_a), Some(op_b));
        assert_eq!(ctx.next_op(op_c), None);
        assert_eq!(ctx.op_position(op_c), Some(2));

        ctx.detach_op(op_b);
        assert_eq!(ctx.block(block).ops.as_slice(), &[op_a, op_c]);
        assert_eq!(ctx.op(op_b).parent_block, None);
    }

    #[test]
    fn erase_op_removes_nested_uses() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);
        let index = index_type(&mut ctx);

        let outer = empty_block(&mut ctx, loc, vec![]);
        let def = mk(&mut ctx, loc, "def", &[], index);
        ctx.push_op(outer, def);
        let v = ctx.op_result(def, 0);

        let inner = empty_block(&mut ctx, loc, vec![index]);
        let arg = ctx.block_arg(inner, 0);
        let first = mk(&mut ctx, loc, "first", &[v, arg], index);
        ctx.push_op(inner, first);
        let r = ctx.op_result(first, 0);
        let second = mk(&mut ctx, loc, "second", &[r], index);
        ctx.push_op(inner, second);
        let region = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![inner],
            parent_op: None,
        });
        let data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("wrap"))
            .region(region)
            .build(&mut ctx);
        let wrap = ctx.create_op(data);
        ctx.push_op(outer, wrap);

        assert_eq!(ctx.uses(v).len(), 1);
        ctx.erase_op(wrap);
        assert!(!ctx.has_uses(v));
        assert_eq!(ctx.block(outer).ops.as_slice(), &[def]);
    }

    #[test]
    fn clone_op_remaps_nested_values() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);
        let index = index_type(&mut ctx);

        let inner = empty_block(&mut ctx, loc, vec![index]);
        let arg = ctx.block_arg(inner, 0);
        let body = mk(&mut ctx, loc, "body", &[arg], index);
        ctx.push_op(inner, body);
        let region = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![inner],
            parent_op: None,
        });
        let data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("loop"))
            .result(index)
            .attr("step", Attribute::Int(1))
            .region(region)
            .build(&mut ctx);
        let original = ctx.create_op(data);

        let mut mapping = HashMap::new();
        let copy = ctx.clone_op(original, &mut mapping);

        assert_ne!(copy, original);
        assert_eq!(ctx.op(copy).attributes, ctx.op(original).attributes);
        let copy_region = ctx.op(copy).regions[0];
        assert_ne!(copy_region, region);
        let copy_block = ctx.region(copy_region).blocks[0];
        let copy_body = ctx.block(copy_block).ops[0];
        assert_eq!(ctx.op_operands(copy_body), &[ctx.block_arg(copy_block, 0)]);
        assert_eq!(mapping[&ctx.op_result(original, 0)], ctx.op_result(copy, 0));
    }

    #[test]
    fn take_regions_allows_reparenting() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);

        let block = empty_block(&mut ctx, loc, vec![]);
        let region = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![block],
            parent_op: None,
        });
        let data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("old"))
            .region(region)
            .build(&mut ctx);
        let old = ctx.create_op(data);

        let taken = ctx.take_regions(old);
        assert_eq!(taken.as_slice(), &[region]);
        assert!(ctx.op(old).regions.is_empty());

        let data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("new"))
            .regions(taken)
            .build(&mut ctx);
        let new = ctx.create_op(data);
        assert_eq!(ctx.region(region).parent_op, Some(new));
        assert_eq!(ctx.block_parent_op(block), Some(new));
    }

    #[test]
    #[should_panic(expected = "still has")]
    fn remove_op_panics_when_result_has_uses() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);
        let index = index_type(&mut ctx);

        let op1 = mk(&mut ctx, loc, "a", &[], index);
        let v1 = ctx.op_result(op1, 0);
        let _op2 = mk(&mut ctx, loc, "b", &[v1], index);

        ctx.remove_op(op1);
    }

    #[test]
    #[should_panic(expected = "already belongs to operation")]
    fn create_op_panics_when_region_already_owned() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);

        let block = empty_block(&mut ctx, loc, vec![]);
        let region = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![block],
            parent_op: None,
        });
        let data1 = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("a"))
            .region(region)
            .build(&mut ctx);
        let _op1 = ctx.create_op(data1);
        let data2 = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("b"))
            .region(region)
            .build(&mut ctx);
        ctx.create_op(data2);
    }

    #[test]
    fn entity_ref_display() {
        use cranelift_entity::EntityRef;

        assert_eq!(format!("{}", OpRef::new(0)), "op0");
        assert_eq!(format!("{}", ValueRef::new(5)), "v5");
        assert_eq!(format!("{}", BlockRef::new(2)), "block2");
        assert_eq!(format!("{}", RegionRef::new(1)), "region1");
    }
}
