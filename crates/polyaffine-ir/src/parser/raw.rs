//! Raw (unresolved) parse structures and winnow combinators for the IR text
//! format.
//!
//! This is the first parsing stage: text into `Raw*` structs whose value
//! and block references are still names.

use derive_more::{Display, Error};
use winnow::ascii;
use winnow::combinator::{alt, delimited, opt, preceded, separated};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use super::affine::{affine_map_attr, affine_set_attr};
use crate::affine::{AffineMap, IntegerSet};

// ============================================================================
// Error type
// ============================================================================

/// Parse error for the IR text format.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

// ============================================================================
// Raw (unresolved) AST structures
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct RawOperation<'a> {
    pub results: Vec<&'a str>,
    pub dialect: &'a str,
    pub op_name: &'a str,
    /// Optional symbol name parsed from `@name` after `dialect.op`.
    pub sym_name: Option<String>,
    /// Optional function-style parameters: `(%arg: type, ...)`.
    pub func_params: Vec<(&'a str, RawType<'a>)>,
    /// Optional return type from `-> type`.
    pub return_type: Option<RawType<'a>>,
    pub operands: Vec<&'a str>,
    pub attributes: Vec<(&'a str, RawAttribute<'a>)>,
    pub result_types: Vec<RawType<'a>>,
    pub regions: Vec<RawRegion<'a>>,
    /// Optional successor list from `[^bb0, ^bb1]`.
    pub successors: Vec<&'a str>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawRegion<'a> {
    pub blocks: Vec<RawBlock<'a>>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawBlock<'a> {
    pub label: &'a str,
    pub args: Vec<(&'a str, RawType<'a>)>,
    pub ops: Vec<RawOperation<'a>>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawType<'a> {
    pub dialect: &'a str,
    pub name: &'a str,
    pub params: Vec<RawType<'a>>,
    pub attrs: Vec<(&'a str, RawAttribute<'a>)>,
}

#[derive(Debug, Clone)]
pub(crate) enum RawAttribute<'a> {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Symbol(String),
    Type(RawType<'a>),
    List(Vec<RawAttribute<'a>>),
    Unit,
    AffineMap(AffineMap),
    IntegerSet(IntegerSet),
}

pub(crate) fn backtrack() -> winnow::error::ErrMode<winnow::error::ContextError> {
    winnow::error::ErrMode::Backtrack(winnow::error::ContextError::new())
}

// ============================================================================
// Winnow parsers
// ============================================================================

/// Skip whitespace and `//` line comments.
pub(crate) fn ws(input: &mut &str) -> ModalResult<()> {
    loop {
        take_while(0.., |c: char| c.is_ascii_whitespace())
            .void()
            .parse_next(input)?;
        if input.starts_with("//") {
            take_while(0.., |c: char| c != '\n').void().parse_next(input)?;
        } else {
            return Ok(());
        }
    }
}

/// Parse an identifier: [a-zA-Z_][a-zA-Z0-9_]*
pub(crate) fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Parse a value reference: %name or %number
pub(crate) fn value_ref<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(
        '%',
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
    .parse_next(input)
}

/// Parse a symbol reference: @name or @"quoted name"
pub(crate) fn symbol_ref(input: &mut &str) -> ModalResult<String> {
    '@'.parse_next(input)?;
    if input.starts_with('"') {
        string_lit.parse_next(input)
    } else {
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_')
            .map(|s: &str| s.to_owned())
            .parse_next(input)
    }
}

/// Parse a block label: ^bbN or ^name
pub(crate) fn block_label<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(
        '^',
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
    .parse_next(input)
}

/// Parse a dialect-qualified name: dialect.name
pub(crate) fn qualified_name<'a>(input: &mut &'a str) -> ModalResult<(&'a str, &'a str)> {
    (ident, '.', ident)
        .map(|(d, _, n)| (d, n))
        .parse_next(input)
}

/// Parse a signed 64-bit integer literal.
pub(crate) fn integer_lit(input: &mut &str) -> ModalResult<i64> {
    let negative = opt('-').parse_next(input)?.is_some();
    let magnitude: u64 = ascii::dec_uint(input)?;
    if negative {
        if magnitude == i64::MIN.unsigned_abs() {
            return Ok(i64::MIN);
        }
        i64::try_from(magnitude).map(|v| -v).map_err(|_| backtrack())
    } else {
        i64::try_from(magnitude).map_err(|_| backtrack())
    }
}

/// Parse a float literal that MUST contain a decimal point, so that `42`
/// stays an integer.
pub(crate) fn float_with_dot(input: &mut &str) -> ModalResult<f64> {
    let s = (
        opt('-'),
        take_while(1.., |c: char| c.is_ascii_digit()),
        '.',
        take_while(1.., |c: char| c.is_ascii_digit()),
        opt((
            one_of(['e', 'E']),
            opt(one_of(['+', '-'])),
            take_while(1.., |c: char| c.is_ascii_digit()),
        )),
    )
        .take()
        .parse_next(input)?;
    s.parse::<f64>().map_err(|_| backtrack())
}

/// Parse a string literal: "content"
pub(crate) fn string_lit(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut result = String::new();
    loop {
        let c = any.parse_next(input)?;
        match c {
            '"' => break,
            '\\' => {
                let escaped = any.parse_next(input)?;
                match escaped {
                    '"' => result.push('"'),
                    '\\' => result.push('\\'),
                    'n' => result.push('\n'),
                    't' => result.push('\t'),
                    'r' => result.push('\r'),
                    '0' => result.push('\0'),
                    'x' => {
                        let h1 = any.parse_next(input)?;
                        let h2 = any.parse_next(input)?;
                        let hex_str = format!("{h1}{h2}");
                        if let Ok(code) = u8::from_str_radix(&hex_str, 16) {
                            result.push(code as char);
                        } else {
                            result.push('\\');
                            result.push('x');
                            result.push(h1);
                            result.push(h2);
                        }
                    }
                    _ => {
                        result.push('\\');
                        result.push(escaped);
                    }
                }
            }
            _ => result.push(c),
        }
    }
    Ok(result)
}

/// Parse a type: `dialect.name`, `dialect.name(params)`, or
/// `dialect.name(params) {key = value, ...}`.
///
/// Type attributes are only parsed after explicit parentheses so that the
/// opening `{` of a region is never taken for an attribute dict.
pub(crate) fn raw_type<'a>(input: &mut &'a str) -> ModalResult<RawType<'a>> {
    let (dialect, name) = qualified_name.parse_next(input)?;

    let opt_params = opt(delimited(
        ('(', ws),
        separated(0.., (ws, raw_type, ws).map(|(_, t, _)| t), ','),
        (ws, ')'),
    ))
    .parse_next(input)?;
    let has_parens = opt_params.is_some();
    let params = opt_params.unwrap_or_default();

    let attrs = if has_parens {
        opt(preceded(ws, raw_attr_dict))
            .parse_next(input)?
            .unwrap_or_default()
    } else {
        vec![]
    };

    Ok(RawType {
        dialect,
        name,
        params,
        attrs,
    })
}

/// Parse an attribute value.
pub(crate) fn raw_attr_value<'a>(input: &mut &'a str) -> ModalResult<RawAttribute<'a>> {
    alt((
        "true".value(RawAttribute::Bool(true)),
        "false".value(RawAttribute::Bool(false)),
        "unit".value(RawAttribute::Unit),
        affine_map_attr.map(RawAttribute::AffineMap),
        affine_set_attr.map(RawAttribute::IntegerSet),
        string_lit.map(RawAttribute::String),
        symbol_ref.map(RawAttribute::Symbol),
        delimited(
            ('[', ws),
            separated(0.., (ws, raw_attr_value, ws).map(|(_, a, _)| a), ','),
            (ws, ']'),
        )
        .map(RawAttribute::List),
        float_with_dot.map(RawAttribute::Float),
        integer_lit.map(RawAttribute::Int),
        raw_type.map(RawAttribute::Type),
    ))
    .parse_next(input)
}

/// Parse an attribute dict: {key = value, ...}
pub(crate) fn raw_attr_dict<'a>(input: &mut &'a str) -> ModalResult<Vec<(&'a str, RawAttribute<'a>)>> {
    delimited(
        ('{', ws),
        separated(
            0..,
            (ws, ident, ws, '=', ws, raw_attr_value, ws).map(|(_, k, _, _, _, v, _)| (k, v)),
            ',',
        ),
        (ws, '}'),
    )
    .parse_next(input)
}

/// Parse result list: %0 = or %0, %1 =
fn result_list<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    let results: Vec<&str> =
        separated(1.., (ws, value_ref, ws).map(|(_, v, _)| v), ',').parse_next(input)?;
    ws.parse_next(input)?;
    '='.parse_next(input)?;
    Ok(results)
}

/// Parse operand list: %a, %b, ...
fn operand_list<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    separated(1.., (ws, value_ref, ws).map(|(_, v, _)| v), ',').parse_next(input)
}

/// Parse type annotation: : type1, type2
fn type_annotation<'a>(input: &mut &'a str) -> ModalResult<Vec<RawType<'a>>> {
    preceded(
        (ws, ':', ws),
        separated(1.., (ws, raw_type, ws).map(|(_, t, _)| t), ','),
    )
    .parse_next(input)
}

/// Parse a `(%arg: type, ...)` list, used for function signatures and
/// block headers.
pub(crate) fn typed_args<'a>(input: &mut &'a str) -> ModalResult<Vec<(&'a str, RawType<'a>)>> {
    delimited(
        ('(', ws),
        separated(
            0..,
            (ws, value_ref, ws, ':', ws, raw_type, ws).map(|(_, name, _, _, _, ty, _)| (name, ty)),
            ',',
        ),
        (ws, ')'),
    )
    .parse_next(input)
}

/// Parse return type: -> type
fn return_type<'a>(input: &mut &'a str) -> ModalResult<RawType<'a>> {
    preceded((ws, '-', '>', ws), raw_type).parse_next(input)
}

/// Parse a successor list: [^bb0, ^bb1]
fn successor_list<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    delimited(
        ('[', ws),
        separated(1.., (ws, block_label, ws).map(|(_, l, _)| l), ','),
        (ws, ']'),
    )
    .parse_next(input)
}

/// Parse a single operation.
///
/// Grammar:
/// ```text
/// [results =] dialect.op [@symbol] [(%arg: type, ...) | operands]
///   [[successors]] [-> type] [{attrs}] [: types] [regions]
/// ```
pub(crate) fn raw_operation<'a>(input: &mut &'a str) -> ModalResult<RawOperation<'a>> {
    ws.parse_next(input)?;

    let results = opt(result_list).parse_next(input)?.unwrap_or_default();
    ws.parse_next(input)?;

    let (dialect, op_name) = qualified_name.parse_next(input)?;

    let sym_name = opt(preceded(ws, symbol_ref)).parse_next(input)?;

    let mut func_params = Vec::new();
    let mut operands = Vec::new();

    ws.parse_next(input)?;
    if input.starts_with('(') {
        func_params = typed_args.parse_next(input)?;
    } else if input.starts_with('%') {
        operands = opt(operand_list).parse_next(input)?.unwrap_or_default();
    }

    let successors = opt(preceded(ws, successor_list))
        .parse_next(input)?
        .unwrap_or_default();

    let return_ty = opt(return_type).parse_next(input)?;

    let attributes = opt(preceded(ws, raw_attr_dict))
        .parse_next(input)?
        .unwrap_or_default();

    let result_types = opt(type_annotation).parse_next(input)?.unwrap_or_default();

    let mut regions = Vec::new();
    loop {
        ws.parse_next(input)?;
        if input.starts_with('{') {
            let region = raw_region.parse_next(input)?;
            regions.push(region);
        } else {
            break;
        }
    }

    Ok(RawOperation {
        results,
        dialect,
        op_name,
        sym_name,
        func_params,
        return_type: return_ty,
        operands,
        attributes,
        result_types,
        regions,
        successors,
    })
}

/// Parse a block: ^label(args): ops...
pub(crate) fn raw_block<'a>(input: &mut &'a str) -> ModalResult<RawBlock<'a>> {
    ws.parse_next(input)?;
    let label = block_label.parse_next(input)?;

    let args = opt(typed_args).parse_next(input)?.unwrap_or_default();

    ws.parse_next(input)?;
    ':'.parse_next(input)?;

    let mut ops = Vec::new();
    loop {
        ws.parse_next(input)?;
        if input.starts_with('^') || input.starts_with('}') || input.is_empty() {
            break;
        }
        let op = raw_operation.parse_next(input)?;
        ops.push(op);
    }

    Ok(RawBlock { label, args, ops })
}

/// Parse a region: { blocks... } or { ops... } (single implicit block)
pub(crate) fn raw_region<'a>(input: &mut &'a str) -> ModalResult<RawRegion<'a>> {
    '{'.parse_next(input)?;
    ws.parse_next(input)?;

    let mut blocks = Vec::new();

    if input.starts_with('^') {
        loop {
            ws.parse_next(input)?;
            if input.starts_with('}') {
                break;
            }
            let block = raw_block.parse_next(input)?;
            blocks.push(block);
        }
    } else if !input.starts_with('}') {
        let mut ops = Vec::new();
        loop {
            ws.parse_next(input)?;
            if input.starts_with('}') || input.is_empty() {
                break;
            }
            let op = raw_operation.parse_next(input)?;
            ops.push(op);
        }
        blocks.push(RawBlock {
            label: "bb0",
            args: vec![],
            ops,
        });
    }

    ws.parse_next(input)?;
    '}'.parse_next(input)?;

    Ok(RawRegion { blocks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type() {
        let mut input = "core.i32";
        let raw = raw_type.parse_next(&mut input).expect("should parse type");
        assert_eq!(raw.dialect, "core");
        assert_eq!(raw.name, "i32");
        assert!(raw.params.is_empty());
    }

    #[test]
    fn test_parse_parameterized_type() {
        let mut input = "mem.ref(core.f32)";
        let raw = raw_type.parse_next(&mut input).expect("should parse type");
        assert_eq!(raw.dialect, "mem");
        assert_eq!(raw.name, "ref");
        assert_eq!(raw.params.len(), 1);
    }

    #[test]
    fn test_parse_attribute_values() {
        let mut input = "42";
        let attr = raw_attr_value.parse_next(&mut input).expect("should parse int");
        assert!(matches!(attr, RawAttribute::Int(42)));

        let mut input = "-7";
        let attr = raw_attr_value.parse_next(&mut input).expect("should parse int");
        assert!(matches!(attr, RawAttribute::Int(-7)));

        let mut input = "3.25";
        let attr = raw_attr_value.parse_next(&mut input).expect("should parse float");
        assert!(matches!(attr, RawAttribute::Float(f) if (f - 3.25).abs() < 1e-10));

        let mut input = "@slt";
        let attr = raw_attr_value.parse_next(&mut input).expect("should parse symbol");
        assert!(matches!(attr, RawAttribute::Symbol(ref s) if s == "slt"));

        let mut input = "affine_map<(d0) -> (d0 + 1)>";
        let attr = raw_attr_value.parse_next(&mut input).expect("should parse map");
        assert!(matches!(attr, RawAttribute::AffineMap(ref m) if m.num_dims() == 1));
    }

    #[test]
    fn test_parse_integer_lit_bounds() {
        let mut input = "-9223372036854775808";
        let val = integer_lit.parse_next(&mut input).expect("i64::MIN should parse");
        assert_eq!(val, i64::MIN);

        let mut input = "9223372036854775808";
        assert!(integer_lit.parse_next(&mut input).is_err());
    }

    #[test]
    fn test_parse_string_escapes() {
        let cases = [
            (r#""hello""#, "hello"),
            (r#""a\nb""#, "a\nb"),
            (r#""a\\b""#, "a\\b"),
            (r#""a\"b""#, "a\"b"),
            (r#""a\x01b""#, "a\x01b"),
        ];
        for (input_str, expected) in &cases {
            let mut input = *input_str;
            let result = string_lit.parse_next(&mut input).expect("should parse");
            assert_eq!(&result, *expected, "failed for input: {input_str}");
        }
    }

    #[test]
    fn test_ws_skips_comments() {
        let mut input = "  // note\n  core.i1";
        ws.parse_next(&mut input).expect("ws never fails");
        assert_eq!(input, "core.i1");
    }

    #[test]
    fn test_parse_block_with_args() {
        let mut input = "^bb0(%1: core.index):\n  affine.yield\n}";
        let block = raw_block.parse_next(&mut input).expect("should parse");
        assert_eq!(block.label, "bb0");
        assert_eq!(block.args.len(), 1);
        assert_eq!(block.ops.len(), 1);
        assert_eq!(input, "}");
    }
}
