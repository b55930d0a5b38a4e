//! IR text format parser.
//!
//! Parses the textual IR produced by [`crate::printer`] back into an
//! [`IrContext`].
//!
//! # Two-stage parsing
//!
//! 1. **Raw parse**: winnow combinators turn text into `Raw*` structures.
//! 2. **IR build**: `IrBuilder` resolves names and creates `OpRef`,
//!    `BlockRef` and `RegionRef` entities.

mod affine;
mod raw;

use std::collections::{BTreeMap, HashMap, HashSet};

use smallvec::smallvec;
use winnow::prelude::*;

pub use raw::ParseError;

use crate::context::{BlockData, IrContext, OperationDataBuilder, RegionData};
use crate::dialect::core::{self, Module};
use crate::location::{Location, Span};
use crate::ops::DialectOp;
use crate::refs::*;
use crate::symbol::Symbol;
use crate::types::*;
use raw::{RawAttribute, RawOperation, RawRegion, RawType};

// ============================================================================
// IrBuilder (Raw -> IR)
// ============================================================================

struct IrBuilder<'a> {
    ctx: &'a mut IrContext,
    location: Location,
    /// Maps value name (without %) -> ValueRef
    value_map: HashMap<String, ValueRef>,
    /// Maps block label (without ^) -> BlockRef
    block_map: HashMap<String, BlockRef>,
}

fn error(message: String) -> ParseError {
    ParseError { message, offset: 0 }
}

impl<'a> IrBuilder<'a> {
    fn new(ctx: &'a mut IrContext, path: &str) -> Self {
        let path = ctx.paths.intern(path.to_owned());
        let location = Location::new(path, Span::new(0, 0));
        Self {
            ctx,
            location,
            value_map: HashMap::new(),
            block_map: HashMap::new(),
        }
    }

    fn build_type(&mut self, raw: &RawType<'_>) -> TypeRef {
        let mut builder = TypeDataBuilder::new(Symbol::from_dynamic(raw.dialect), Symbol::from_dynamic(raw.name));
        for p in &raw.params {
            let p = self.build_type(p);
            builder = builder.param(p);
        }
        for (k, v) in &raw.attrs {
            let v = self.build_attribute(v);
            builder = builder.attr(Symbol::from_dynamic(k), v);
        }
        self.ctx.types.intern(builder.build())
    }

    fn build_attribute(&mut self, raw: &RawAttribute<'_>) -> Attribute {
        match raw {
            RawAttribute::Bool(b) => Attribute::Bool(*b),
            RawAttribute::Int(n) => Attribute::Int(*n),
            RawAttribute::Float(f) => Attribute::FloatBits(f.to_bits()),
            RawAttribute::String(s) => Attribute::String(s.clone()),
            RawAttribute::Symbol(s) => Attribute::Symbol(Symbol::from_dynamic(s.as_str())),
            RawAttribute::Type(t) => Attribute::Type(self.build_type(t)),
            RawAttribute::List(items) => Attribute::List(items.iter().map(|a| self.build_attribute(a)).collect()),
            RawAttribute::Unit => Attribute::Unit,
            RawAttribute::AffineMap(m) => Attribute::AffineMap(m.clone()),
            RawAttribute::IntegerSet(s) => Attribute::IntegerSet(s.clone()),
        }
    }

    fn save_scopes(&self) -> (HashMap<String, ValueRef>, HashMap<String, BlockRef>) {
        (self.value_map.clone(), self.block_map.clone())
    }

    fn restore_scopes(&mut self, saved: (HashMap<String, ValueRef>, HashMap<String, BlockRef>)) {
        self.value_map = saved.0;
        self.block_map = saved.1;
    }

    /// Build a region. Names defined inside do not leak out of it.
    ///
    /// `entry_args` are injected as the entry block's arguments when the
    /// entry block declares none (function signatures).
    fn build_region(&mut self, raw: &RawRegion<'_>, entry_args: &[(&str, RawType<'_>)]) -> Result<RegionRef, ParseError> {
        let saved = self.save_scopes();
        let result = self.build_region_inner(raw, entry_args);
        self.restore_scopes(saved);
        result
    }

    fn build_region_inner(
        &mut self,
        raw: &RawRegion<'_>,
        entry_args: &[(&str, RawType<'_>)],
    ) -> Result<RegionRef, ParseError> {
        // Pass 1: create every block first so successors can refer forward.
        let mut seen_labels = HashSet::new();
        let mut block_refs = Vec::with_capacity(raw.blocks.len());

        for (i, raw_block) in raw.blocks.iter().enumerate() {
            if !seen_labels.insert(raw_block.label) {
                return Err(error(format!("duplicate block label '^{}'", raw_block.label)));
            }

            let args = if i == 0 && raw_block.args.is_empty() {
                entry_args
            } else {
                &raw_block.args[..]
            };
            if i == 0 && !raw_block.args.is_empty() && !entry_args.is_empty() && raw_block.args.len() != entry_args.len() {
                return Err(error(format!(
                    "entry block has {} args but function signature has {} params",
                    raw_block.args.len(),
                    entry_args.len()
                )));
            }

            let mut seen_names = HashSet::new();
            let mut arg_types = Vec::with_capacity(args.len());
            for (j, (name, raw_ty)) in args.iter().enumerate() {
                if !seen_names.insert(*name) {
                    return Err(error(format!("duplicate block argument name '%{name}' at index {j}")));
                }
                arg_types.push(self.build_type(raw_ty));
            }

            let block = self.ctx.create_block(BlockData {
                location: self.location,
                args: arg_types,
                ops: smallvec![],
                parent_region: None,
            });
            self.block_map.insert(raw_block.label.to_owned(), block);
            for (j, (name, _)) in args.iter().enumerate() {
                let value = self.ctx.block_arg(block, j as u32);
                self.value_map.insert((*name).to_owned(), value);
            }
            block_refs.push(block);
        }

        // Pass 2: operations.
        for (raw_block, &block) in raw.blocks.iter().zip(&block_refs) {
            for raw_op in &raw_block.ops {
                let op = self.build_operation(raw_op)?;
                self.ctx.push_op(block, op);
            }
        }

        Ok(self.ctx.create_region(RegionData {
            location: self.location,
            blocks: block_refs.into_iter().collect(),
            parent_op: None,
        }))
    }

    fn build_operation(&mut self, raw: &RawOperation<'_>) -> Result<OpRef, ParseError> {
        let operands: Vec<ValueRef> = raw
            .operands
            .iter()
            .map(|name| {
                self.value_map.get(*name).copied().ok_or_else(|| {
                    error(format!(
                        "undefined value '%{name}' in operation '{}.{}'",
                        raw.dialect, raw.op_name
                    ))
                })
            })
            .collect::<Result<_, _>>()?;

        let result_types: Vec<TypeRef> = raw.result_types.iter().map(|t| self.build_type(t)).collect();
        if !raw.results.is_empty() && raw.results.len() != result_types.len() {
            return Err(error(format!(
                "operation '{}.{}' declares {} result names but {} result types",
                raw.dialect,
                raw.op_name,
                raw.results.len(),
                result_types.len()
            )));
        }

        let mut attributes: BTreeMap<Symbol, Attribute> = BTreeMap::new();
        for (k, v) in &raw.attributes {
            let v = self.build_attribute(v);
            attributes.insert(Symbol::from_dynamic(k), v);
        }
        if let Some(name) = &raw.sym_name {
            attributes.insert(Symbol::new("sym_name"), Attribute::Symbol(Symbol::from_dynamic(name)));
        }

        // `(%a: T, ..) -> R` signature becomes a `core.func(R, T, ..)` type.
        if raw.return_type.is_some() || !raw.func_params.is_empty() {
            let ret = match &raw.return_type {
                Some(t) => self.build_type(t),
                None => core::nil(self.ctx),
            };
            let params: Vec<TypeRef> = raw.func_params.iter().map(|(_, t)| self.build_type(t)).collect();
            let func_ty = core::func_type(self.ctx, ret, &params);
            attributes.insert(Symbol::new("type"), Attribute::Type(func_ty));
        }

        let successors: Vec<BlockRef> = raw
            .successors
            .iter()
            .map(|label| {
                self.block_map.get(*label).copied().ok_or_else(|| {
                    error(format!(
                        "undefined block '^{label}' in successor list of '{}.{}'",
                        raw.dialect, raw.op_name
                    ))
                })
            })
            .collect::<Result<_, _>>()?;

        let mut regions = Vec::with_capacity(raw.regions.len());
        for (i, r) in raw.regions.iter().enumerate() {
            let entry_args = if i == 0 { &raw.func_params[..] } else { &[] };
            regions.push(self.build_region(r, entry_args)?);
        }

        let mut builder = OperationDataBuilder::new(
            self.location,
            Symbol::from_dynamic(raw.dialect),
            Symbol::from_dynamic(raw.op_name),
        )
        .operands(operands)
        .results(result_types)
        .regions(regions);
        for (k, v) in attributes {
            builder = builder.attr(k, v);
        }
        for b in successors {
            builder = builder.successor(b);
        }
        let data = builder.build(self.ctx);
        let op = self.ctx.create_op(data);

        for (i, name) in raw.results.iter().enumerate() {
            if self.value_map.contains_key(*name) {
                return Err(error(format!(
                    "duplicate SSA name '%{name}' in operation '{}.{}' result index {i}",
                    raw.dialect, raw.op_name
                )));
            }
            let value = self.ctx.op_result(op, i as u32);
            self.value_map.insert((*name).to_owned(), value);
        }

        Ok(op)
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a single top-level operation (normally a `core.module`).
pub fn parse_module(ctx: &mut IrContext, input: &str) -> Result<OpRef, ParseError> {
    parse_module_at(ctx, input, "<input>")
}

/// Like [`parse_module`], recording `path` in every location.
pub fn parse_module_at(ctx: &mut IrContext, input: &str, path: &str) -> Result<OpRef, ParseError> {
    let mut remaining = input;
    let offset = |remaining: &str| input.len() - remaining.len();

    let raw_op = raw::raw_operation.parse_next(&mut remaining).map_err(|e| ParseError {
        message: format!("parse error: {e}"),
        offset: offset(remaining),
    })?;

    raw::ws.parse_next(&mut remaining).map_err(|e| ParseError {
        message: format!("lexer error: {e}"),
        offset: offset(remaining),
    })?;
    if !remaining.is_empty() {
        return Err(ParseError {
            message: "trailing input after top-level operation".to_owned(),
            offset: offset(remaining),
        });
    }

    IrBuilder::new(ctx, path).build_operation(&raw_op)
}

/// Parse textual IR into a fresh context, panicking on failure.
///
/// Convenience wrapper around [`parse_module`] for tests.
pub fn parse_test_module(input: &str) -> (IrContext, Module) {
    let mut ctx = IrContext::new();
    let op = parse_module(&mut ctx, input).unwrap_or_else(|e| {
        panic!(
            "Failed to parse test IR at offset {}:\n  {}\n\nInput:\n{}",
            e.offset, e.message, input
        );
    });
    let module = Module::from_op(&ctx, op)
        .unwrap_or_else(|e| panic!("Parsed operation is not a core.module: {e}\n\nInput:\n{input}"));
    (ctx, module)
}
