//! Text format printer.
//!
//! ```text
//! core.module @name {
//!   func.func @f(%0: mem.ref(core.f32), %1: core.index) -> core.nil {
//!     %2 = affine.load %0, %1 {map = affine_map<(d0) -> (d0 * 4)>} : core.f32
//!     func.return
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;

use crate::context::IrContext;
use crate::refs::*;
use crate::symbol::Symbol;
use crate::types::*;

/// Print state for value numbering and block labeling.
struct PrintState<'a> {
    ctx: &'a IrContext,
    value_names: HashMap<ValueRef, String>,
    block_labels: HashMap<BlockRef, String>,
    next_value_num: usize,
    next_block_num: usize,
}

impl<'a> PrintState<'a> {
    fn new(ctx: &'a IrContext) -> Self {
        Self {
            ctx,
            value_names: HashMap::new(),
            block_labels: HashMap::new(),
            next_value_num: 0,
            next_block_num: 0,
        }
    }

    fn assign_value_name(&mut self, v: ValueRef) -> String {
        let name = format!("%{}", self.next_value_num);
        self.next_value_num += 1;
        self.value_names.insert(v, name.clone());
        name
    }

    fn get_value_name(&self, v: ValueRef) -> &str {
        self.value_names.get(&v).map(|s| s.as_str()).unwrap_or("%?")
    }

    fn assign_block_label(&mut self, b: BlockRef) -> String {
        let label = format!("^bb{}", self.next_block_num);
        self.next_block_num += 1;
        self.block_labels.insert(b, label.clone());
        label
    }

    fn get_block_label(&self, b: BlockRef) -> &str {
        self.block_labels.get(&b).map(|s| s.as_str()).unwrap_or("^bb?")
    }

    fn reset_numbering(&mut self) {
        self.next_value_num = 0;
        self.next_block_num = 0;
        self.value_names.clear();
        self.block_labels.clear();
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Print an operation as IR text.
pub fn print_op(ctx: &IrContext, op: OpRef) -> String {
    let mut state = PrintState::new(ctx);
    let mut out = String::new();
    print_operation(&mut state, &mut out, op, 0).expect("fmt::Write to String never fails");
    out
}

/// Print a type as IR text.
pub fn print_type(ctx: &IrContext, ty: TypeRef) -> String {
    let mut out = String::new();
    write_type(ctx, &mut out, ty).expect("fmt::Write to String never fails");
    out
}

/// Print a module (root operation with nested functions) as IR text.
pub fn print_module(ctx: &IrContext, root: OpRef) -> String {
    let mut state = PrintState::new(ctx);
    let mut out = String::new();
    print_operation(&mut state, &mut out, root, 0).expect("fmt::Write to String never fails");
    out
}

// ============================================================================
// Type and attribute printing
// ============================================================================

fn write_type(ctx: &IrContext, f: &mut impl Write, ty: TypeRef) -> fmt::Result {
    let data = ctx.types.get(ty);
    write!(f, "{}.{}", data.dialect, data.name)?;
    if !data.params.is_empty() {
        f.write_char('(')?;
        for (i, &param) in data.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_type(ctx, f, param)?;
        }
        f.write_char(')')?;
    } else if !data.attrs.is_empty() {
        // Empty parens signal that attrs follow
        f.write_str("()")?;
    }
    if !data.attrs.is_empty() {
        f.write_str(" {")?;
        for (i, (key, val)) in data.attrs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key} = ")?;
            write_attribute(ctx, f, val)?;
        }
        f.write_char('}')?;
    }
    Ok(())
}

fn write_attribute(ctx: &IrContext, f: &mut impl Write, attr: &Attribute) -> fmt::Result {
    match attr {
        Attribute::Unit => f.write_str("unit"),
        Attribute::Bool(b) => write!(f, "{b}"),
        Attribute::Int(v) => write!(f, "{v}"),
        Attribute::FloatBits(bits) => {
            let v = f64::from_bits(*bits);
            let s = format!("{v}");
            f.write_str(&s)?;
            // Keep a decimal point on finite whole numbers so they reparse as floats.
            if v.is_finite() && !s.contains('.') && !s.contains('e') && !s.contains('E') {
                f.write_str(".0")?;
            }
            Ok(())
        }
        Attribute::String(s) => {
            f.write_char('"')?;
            write_escaped_string(f, s)?;
            f.write_char('"')
        }
        Attribute::Symbol(sym) => write_symbol(f, *sym),
        Attribute::Type(ty) => write_type(ctx, f, *ty),
        Attribute::List(list) => {
            f.write_char('[')?;
            for (i, item) in list.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_attribute(ctx, f, item)?;
            }
            f.write_char(']')
        }
        Attribute::AffineMap(map) => write!(f, "{map}"),
        Attribute::IntegerSet(set) => write!(f, "{set}"),
    }
}

fn write_escaped_string(f: &mut impl Write, s: &str) -> fmt::Result {
    for ch in s.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\0' => f.write_str("\\0")?,
            c if c.is_control() => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

fn write_symbol(f: &mut impl Write, sym: Symbol) -> fmt::Result {
    sym.with_str(|s| {
        let needs_quoting = s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if needs_quoting {
            f.write_str("@\"")?;
            write_escaped_string(f, s)?;
            f.write_char('"')
        } else {
            write!(f, "@{s}")
        }
    })
}

// ============================================================================
// Operation printing
// ============================================================================

fn print_operation(state: &mut PrintState<'_>, f: &mut impl Write, op: OpRef, indent: usize) -> fmt::Result {
    let data = state.ctx.op(op);
    if data.is("core", "module") {
        return print_module_op(state, f, op, indent);
    }
    if data.is("func", "func") {
        return print_func_op(state, f, op, indent);
    }
    print_generic_op(state, f, op, indent)
}

fn print_generic_op(state: &mut PrintState<'_>, f: &mut impl Write, op: OpRef, indent: usize) -> fmt::Result {
    let indent_str = " ".repeat(indent);
    write!(f, "{indent_str}")?;

    let results = state.ctx.op_results(op);
    if !results.is_empty() {
        for (i, &v) in results.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let name = state.assign_value_name(v);
            f.write_str(&name)?;
        }
        f.write_str(" = ")?;
    }

    let data = state.ctx.op(op);
    write!(f, "{}.{}", data.dialect, data.name)?;

    let operands = state.ctx.op_operands(op);
    if !operands.is_empty() {
        f.write_char(' ')?;
        for (i, &v) in operands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.get_value_name(v))?;
        }
    }

    let successors = &state.ctx.op(op).successors;
    if !successors.is_empty() {
        f.write_str(" [")?;
        for (i, &b) in successors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.get_block_label(b))?;
        }
        f.write_char(']')?;
    }

    let attrs = &state.ctx.op(op).attributes;
    if !attrs.is_empty() {
        f.write_str(" {")?;
        for (i, (key, val)) in attrs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key} = ")?;
            write_attribute(state.ctx, f, val)?;
        }
        f.write_char('}')?;
    }

    let result_types = state.ctx.op_result_types(op);
    if !result_types.is_empty() {
        f.write_str(" : ")?;
        for (i, &ty) in result_types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_type(state.ctx, f, ty)?;
        }
    }

    for &region in state.ctx.op(op).regions.iter() {
        f.write_str(" {\n")?;
        print_region(state, f, region, indent + 2)?;
        write!(f, "{indent_str}}}")?;
    }

    f.write_char('\n')
}

// ============================================================================
// Region / Block printing
// ============================================================================

fn print_region(state: &mut PrintState<'_>, f: &mut impl Write, region: RegionRef, indent: usize) -> fmt::Result {
    let blocks: Vec<_> = state.ctx.region(region).blocks.iter().copied().collect();
    let can_elide_label = blocks.len() == 1 && state.ctx.block_args(blocks[0]).is_empty();
    if !can_elide_label {
        for &block in &blocks {
            state.assign_block_label(block);
        }
    }

    for (i, &block) in blocks.iter().enumerate() {
        if !can_elide_label {
            let indent_str = " ".repeat(indent);
            let label = state.get_block_label(block).to_owned();
            write!(f, "{indent_str}{label}")?;
            write_block_args(state, f, block)?;
            f.write_str(":\n")?;
        }

        let ops: Vec<_> = state.ctx.block(block).ops.iter().copied().collect();
        for &op in &ops {
            print_operation(state, f, op, indent + 2)?;
        }
        if i + 1 < blocks.len() {
            f.write_char('\n')?;
        }
    }

    Ok(())
}

fn write_block_args(state: &mut PrintState<'_>, f: &mut impl Write, block: BlockRef) -> fmt::Result {
    let args: Vec<_> = state.ctx.block_args(block).to_vec();
    if args.is_empty() {
        return Ok(());
    }
    f.write_char('(')?;
    for (j, &arg) in args.iter().enumerate() {
        if j > 0 {
            f.write_str(", ")?;
        }
        let name = state.assign_value_name(arg);
        write!(f, "{name}: ")?;
        write_type(state.ctx, f, state.ctx.value_ty(arg))?;
    }
    f.write_char(')')
}

// ============================================================================
// Special operation printers
// ============================================================================

fn print_module_op(state: &mut PrintState<'_>, f: &mut impl Write, op: OpRef, indent: usize) -> fmt::Result {
    let indent_str = " ".repeat(indent);
    let data = state.ctx.op(op);
    write!(f, "{indent_str}core.module")?;

    if let Some(Attribute::Symbol(name)) = data.attributes.get(&Symbol::new("sym_name")) {
        f.write_char(' ')?;
        write_symbol(f, *name)?;
    }

    let Some(&region) = data.regions.first() else {
        return f.write_char('\n');
    };
    f.write_str(" {\n")?;
    let blocks: Vec<_> = state.ctx.region(region).blocks.iter().copied().collect();
    for block in blocks {
        let ops: Vec<_> = state.ctx.block(block).ops.iter().copied().collect();
        for child_op in ops {
            // Each top-level op numbers its values from zero.
            state.reset_numbering();
            print_operation(state, f, child_op, indent + 2)?;
        }
    }
    writeln!(f, "{indent_str}}}")
}

fn print_func_op(state: &mut PrintState<'_>, f: &mut impl Write, op: OpRef, indent: usize) -> fmt::Result {
    let indent_str = " ".repeat(indent);
    let data = state.ctx.op(op);

    write!(f, "{indent_str}func.func")?;
    if let Some(Attribute::Symbol(name)) = data.attributes.get(&Symbol::new("sym_name")) {
        f.write_char(' ')?;
        write_symbol(f, *name)?;
    }

    state.reset_numbering();

    let blocks: Vec<BlockRef> = data
        .regions
        .first()
        .map(|&r| state.ctx.region(r).blocks.iter().copied().collect())
        .unwrap_or_default();

    // Entry block args form the signature.
    f.write_char('(')?;
    if let Some(&entry) = blocks.first() {
        let args: Vec<_> = state.ctx.block_args(entry).to_vec();
        for (i, &arg) in args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let name = state.assign_value_name(arg);
            write!(f, "{name}: ")?;
            write_type(state.ctx, f, state.ctx.value_ty(arg))?;
        }
    }
    f.write_char(')')?;

    // `core.func(ret, params..)`: only the return type is printed.
    if let Some(Attribute::Type(func_ty)) = data.attributes.get(&Symbol::new("type"))
        && let Some(&ret) = state.ctx.types.get(*func_ty).params.first()
    {
        f.write_str(" -> ")?;
        write_type(state.ctx, f, ret)?;
    }

    if blocks.is_empty() {
        return f.write_char('\n');
    }

    f.write_str(" {\n")?;
    let labeled = blocks.len() > 1;
    if labeled {
        for &block in &blocks {
            state.assign_block_label(block);
        }
    }
    for (i, &block) in blocks.iter().enumerate() {
        if labeled {
            let label = state.get_block_label(block).to_owned();
            write!(f, "{indent_str}  {label}")?;
            if i > 0 {
                write_block_args(state, f, block)?;
            }
            f.write_str(":\n")?;
        }
        let ops: Vec<_> = state.ctx.block(block).ops.iter().copied().collect();
        for child_op in ops {
            print_operation(state, f, child_op, indent + 2 + if labeled { 2 } else { 0 })?;
        }
    }
    writeln!(f, "{indent_str}}}")
}
