//! Parsers for `affine_map<..>` and `affine_set<..>` attributes.
//!
//! ```text
//! affine_map<(d0, d1)[s0] -> (d0 * 4 + s0, d1 floordiv 2)>
//! affine_set<(d0)[s0] : (d0 - s0 >= 0, d0 == 0)>
//! ```
//!
//! Identifier names are positional: the n-th name in `(..)` is `d<n>` and
//! the n-th name in `[..]` is `s<n>`, whatever it is spelled.

use winnow::ascii;
use winnow::combinator::{alt, delimited, opt, preceded, separated};
use winnow::prelude::*;

use super::raw::{backtrack, ident, ws};
use crate::affine::{AffineExpr, AffineMap, IntegerSet};

struct Bindings<'a> {
    dims: Vec<&'a str>,
    symbols: Vec<&'a str>,
}

impl Bindings<'_> {
    fn lookup(&self, name: &str) -> Option<AffineExpr> {
        if let Some(pos) = self.dims.iter().position(|d| *d == name) {
            return Some(AffineExpr::dim(pos as u32));
        }
        self.symbols
            .iter()
            .position(|s| *s == name)
            .map(|pos| AffineExpr::symbol(pos as u32))
    }

    fn num_dims(&self) -> u32 {
        self.dims.len() as u32
    }

    fn num_symbols(&self) -> u32 {
        self.symbols.len() as u32
    }
}

fn name_list<'a>(open: char, close: char) -> impl Parser<&'a str, Vec<&'a str>, winnow::error::ErrMode<winnow::error::ContextError>> {
    delimited(
        (open, ws),
        separated(0.., (ws, ident, ws).map(|(_, n, _)| n), ','),
        (ws, close),
    )
}

fn bindings<'a>(input: &mut &'a str) -> ModalResult<Bindings<'a>> {
    let dims = name_list('(', ')').parse_next(input)?;
    let symbols = opt(preceded(ws, name_list('[', ']')))
        .parse_next(input)?
        .unwrap_or_default();
    Ok(Bindings { dims, symbols })
}

fn expr(input: &mut &str, b: &Bindings<'_>) -> ModalResult<AffineExpr> {
    let mut acc = term(input, b)?;
    loop {
        ws.parse_next(input)?;
        match opt(alt(('+', '-'))).parse_next(input)? {
            Some('+') => acc = acc.add(term(input, b)?),
            Some(_) => acc = acc.sub(term(input, b)?),
            None => return Ok(acc),
        }
    }
}

fn term(input: &mut &str, b: &Bindings<'_>) -> ModalResult<AffineExpr> {
    let mut acc = factor(input, b)?;
    loop {
        ws.parse_next(input)?;
        let op = opt(alt(("*", "floordiv", "ceildiv", "mod"))).parse_next(input)?;
        let Some(op) = op else {
            return Ok(acc);
        };
        let rhs = factor(input, b)?;
        acc = match op {
            "*" => acc.mul(rhs),
            "floordiv" => acc.floor_div(rhs),
            "ceildiv" => acc.ceil_div(rhs),
            _ => acc.modulo(rhs),
        };
    }
}

fn factor(input: &mut &str, b: &Bindings<'_>) -> ModalResult<AffineExpr> {
    ws.parse_next(input)?;
    if opt('-').parse_next(input)?.is_some() {
        return Ok(factor(input, b)?.neg());
    }
    if opt('(').parse_next(input)?.is_some() {
        let inner = expr(input, b)?;
        ws.parse_next(input)?;
        ')'.parse_next(input)?;
        return Ok(inner);
    }
    if let Some(n) = opt(ascii::dec_uint::<_, u64, _>).parse_next(input)? {
        return i64::try_from(n).map(AffineExpr::constant).map_err(|_| backtrack());
    }
    let name = ident.parse_next(input)?;
    b.lookup(name).ok_or_else(backtrack)
}

/// `affine_map<(dims)[symbols] -> (results)>`
pub(crate) fn affine_map_attr(input: &mut &str) -> ModalResult<AffineMap> {
    ("affine_map", ws, '<', ws).parse_next(input)?;
    let b = bindings(input)?;
    (ws, "->", ws, '(', ws).parse_next(input)?;
    let results: Vec<AffineExpr> =
        separated(0.., |i: &mut &str| expr(i, &b), (ws, ',', ws)).parse_next(input)?;
    (ws, ')', ws, '>').parse_next(input)?;
    Ok(AffineMap::new(b.num_dims(), b.num_symbols(), results))
}

/// `affine_set<(dims)[symbols] : (e >= 0, e == 0, ..)>`
///
/// A constraint may have a non-zero right-hand side, which is moved to the
/// left: `d0 >= s0` becomes `d0 - s0 >= 0`.
pub(crate) fn affine_set_attr(input: &mut &str) -> ModalResult<IntegerSet> {
    ("affine_set", ws, '<', ws).parse_next(input)?;
    let b = bindings(input)?;
    (ws, ':', ws, '(', ws).parse_next(input)?;
    let constraints: Vec<(AffineExpr, bool)> =
        separated(0.., |i: &mut &str| constraint(i, &b), (ws, ',', ws)).parse_next(input)?;
    (ws, ')', ws, '>').parse_next(input)?;
    let (exprs, eq_flags) = constraints.into_iter().unzip();
    Ok(IntegerSet::new(b.num_dims(), b.num_symbols(), exprs, eq_flags))
}

fn constraint(input: &mut &str, b: &Bindings<'_>) -> ModalResult<(AffineExpr, bool)> {
    let lhs = expr(input, b)?;
    ws.parse_next(input)?;
    let is_eq = alt((">=".value(false), "==".value(true))).parse_next(input)?;
    let rhs = expr(input, b)?;
    Ok((lhs.sub(rhs), is_eq))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(text: &str) -> AffineMap {
        let mut input = text;
        let m = affine_map_attr.parse_next(&mut input).expect("should parse map");
        assert!(input.is_empty(), "trailing input: {input}");
        m
    }

    #[test]
    fn parses_linear_map() {
        let m = map("affine_map<(d0)[s0] -> (d0 * 4 + s0)>");
        assert_eq!(m.num_dims(), 1);
        assert_eq!(m.num_symbols(), 1);
        assert_eq!(
            m.results()[0],
            AffineExpr::dim(0).mul(AffineExpr::constant(4)).add(AffineExpr::symbol(0))
        );
    }

    #[test]
    fn printed_maps_reparse_to_themselves() {
        for text in [
            "affine_map<() -> (0)>",
            "affine_map<()[s0, s1] -> (-s0 + s1 - 1)>",
            "affine_map<(d0) -> (d0 * -2)>",
            "affine_map<(d0) -> ((d0 + 1) floordiv 2, d0 mod 3)>",
            "affine_map<(d0, d1)[s0] -> (d0 - d1 * 3, s0 ceildiv 4)>",
            "affine_map<()[s0, s1] -> (s0, s1)>",
        ] {
            assert_eq!(map(text).to_string(), text);
        }
    }

    #[test]
    fn names_are_positional() {
        let m = map("affine_map<(i, j)[n] -> (i + j + n)>");
        assert_eq!(m.to_string(), "affine_map<(d0, d1)[s0] -> (d0 + d1 + s0)>");
    }

    #[test]
    fn unknown_identifier_fails() {
        let mut input = "affine_map<(d0) -> (d1)>";
        assert!(affine_map_attr.parse_next(&mut input).is_err());
    }

    #[test]
    fn parses_set_and_moves_rhs() {
        let mut input = "affine_set<(d0)[s0] : (d0 >= s0, d0 == 0)>";
        let set = affine_set_attr.parse_next(&mut input).expect("should parse set");
        assert_eq!(set.eq_flags(), &[false, true]);
        assert_eq!(set.to_string(), "affine_set<(d0)[s0] : (d0 - s0 >= 0, d0 == 0)>");
    }
}
