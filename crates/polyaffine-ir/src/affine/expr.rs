//! Affine expressions over dimension and symbol identifiers.
//!
//! Every constructor returns a canonical expression. Sums are flattened into
//! a linear form whose atoms are ordered dimensions first, then symbols, then
//! compound terms (`floordiv`, `ceildiv`, `mod`), with the constant last.
//! The resulting tree is a left-nested chain of `Add` nodes where each term is
//! either an atom or `atom * c`.

use std::collections::BTreeMap;
use std::fmt;

/// A quasi-affine integer expression.
///
/// The variant order doubles as the atom order of the canonical form, so the
/// derived `Ord` sorts dimensions before symbols before compound terms.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AffineExpr {
    Dim(u32),
    Symbol(u32),
    Const(i64),
    Add(Box<AffineExpr>, Box<AffineExpr>),
    Mul(Box<AffineExpr>, Box<AffineExpr>),
    FloorDiv(Box<AffineExpr>, Box<AffineExpr>),
    CeilDiv(Box<AffineExpr>, Box<AffineExpr>),
    Mod(Box<AffineExpr>, Box<AffineExpr>),
}

/// `sum(coefficient * atom) + constant`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Linear {
    terms: BTreeMap<AffineExpr, i64>,
    constant: i64,
}

impl Linear {
    fn of(expr: &AffineExpr) -> Linear {
        let mut lin = Linear::default();
        lin.accumulate(expr, 1);
        lin
    }

    fn accumulate(&mut self, expr: &AffineExpr, scale: i64) {
        match expr {
            AffineExpr::Const(c) => self.constant = self.constant.wrapping_add(c.wrapping_mul(scale)),
            AffineExpr::Add(lhs, rhs) => {
                self.accumulate(lhs, scale);
                self.accumulate(rhs, scale);
            }
            AffineExpr::Mul(lhs, rhs) => match (lhs.as_constant(), rhs.as_constant()) {
                (_, Some(c)) => self.accumulate(lhs, scale.wrapping_mul(c)),
                (Some(c), None) => self.accumulate(rhs, scale.wrapping_mul(c)),
                (None, None) => self.add_atom(expr.clone(), scale),
            },
            atom => self.add_atom(atom.clone(), scale),
        }
    }

    fn add_atom(&mut self, atom: AffineExpr, coefficient: i64) {
        let entry = self.terms.entry(atom).or_insert(0);
        *entry = entry.wrapping_add(coefficient);
    }

    fn merge(mut self, other: Linear) -> Linear {
        for (atom, c) in other.terms {
            self.add_atom(atom, c);
        }
        self.constant = self.constant.wrapping_add(other.constant);
        self
    }

    fn scale(mut self, factor: i64) -> Linear {
        for c in self.terms.values_mut() {
            *c = c.wrapping_mul(factor);
        }
        self.constant = self.constant.wrapping_mul(factor);
        self
    }

    fn all_divisible_by(&self, d: i64) -> bool {
        self.constant % d == 0 && self.terms.values().all(|c| c % d == 0)
    }

    fn into_expr(self) -> AffineExpr {
        let mut acc: Option<AffineExpr> = None;
        for (atom, c) in self.terms {
            if c == 0 {
                continue;
            }
            let term = if c == 1 {
                atom
            } else {
                AffineExpr::Mul(Box::new(atom), Box::new(AffineExpr::Const(c)))
            };
            acc = Some(match acc {
                None => term,
                Some(prev) => AffineExpr::Add(Box::new(prev), Box::new(term)),
            });
        }
        match acc {
            None => AffineExpr::Const(self.constant),
            Some(e) if self.constant == 0 => e,
            Some(e) => AffineExpr::Add(Box::new(e), Box::new(AffineExpr::Const(self.constant))),
        }
    }
}

impl AffineExpr {
    pub fn dim(position: u32) -> Self {
        AffineExpr::Dim(position)
    }

    pub fn symbol(position: u32) -> Self {
        AffineExpr::Symbol(position)
    }

    pub fn constant(value: i64) -> Self {
        AffineExpr::Const(value)
    }

    pub fn as_constant(&self) -> Option<i64> {
        match self {
            AffineExpr::Const(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_dim(&self) -> Option<u32> {
        match self {
            AffineExpr::Dim(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<u32> {
        match self {
            AffineExpr::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, AffineExpr::Const(_))
    }

    pub fn add(self, rhs: AffineExpr) -> AffineExpr {
        Linear::of(&self).merge(Linear::of(&rhs)).into_expr()
    }

    pub fn sub(self, rhs: AffineExpr) -> AffineExpr {
        self.add(rhs.neg())
    }

    pub fn neg(self) -> AffineExpr {
        self.mul(AffineExpr::Const(-1))
    }

    /// Multiply. A product with no constant side is kept as an opaque
    /// semi-affine atom.
    pub fn mul(self, rhs: AffineExpr) -> AffineExpr {
        match (self.as_constant(), rhs.as_constant()) {
            (_, Some(c)) => Linear::of(&self).scale(c).into_expr(),
            (Some(c), None) => Linear::of(&rhs).scale(c).into_expr(),
            (None, None) => AffineExpr::Mul(Box::new(self), Box::new(rhs)),
        }
    }

    pub fn floor_div(self, rhs: AffineExpr) -> AffineExpr {
        if let Some(d) = rhs.as_constant().filter(|d| *d > 0) {
            if d == 1 {
                return self;
            }
            if let Some(c) = self.as_constant() {
                return AffineExpr::Const(c.div_euclid(d));
            }
            let lin = Linear::of(&self);
            if lin.all_divisible_by(d) {
                return lin.scale_down(d).into_expr();
            }
        }
        AffineExpr::FloorDiv(Box::new(self), Box::new(rhs))
    }

    pub fn ceil_div(self, rhs: AffineExpr) -> AffineExpr {
        if let Some(d) = rhs.as_constant().filter(|d| *d > 0) {
            if d == 1 {
                return self;
            }
            if let Some(c) = self.as_constant() {
                return AffineExpr::Const(ceil_div_i64(c, d));
            }
            let lin = Linear::of(&self);
            if lin.all_divisible_by(d) {
                return lin.scale_down(d).into_expr();
            }
        }
        AffineExpr::CeilDiv(Box::new(self), Box::new(rhs))
    }

    /// Modulo with a non-negative result for positive divisors. Terms whose
    /// coefficient is a multiple of the divisor drop out.
    pub fn modulo(self, rhs: AffineExpr) -> AffineExpr {
        if let Some(d) = rhs.as_constant().filter(|d| *d > 0) {
            let mut lin = Linear::of(&self);
            lin.terms.retain(|_, c| *c % d != 0);
            lin.constant = lin.constant.rem_euclid(d);
            if lin.terms.is_empty() {
                return AffineExpr::Const(lin.constant);
            }
            return AffineExpr::Mod(Box::new(lin.into_expr()), Box::new(rhs));
        }
        AffineExpr::Mod(Box::new(self), Box::new(rhs))
    }

    /// Rebuild the expression bottom-up through the canonicalizing
    /// constructors.
    pub fn simplify(&self) -> AffineExpr {
        self.replace_dims_and_symbols_with(&|e| e.clone())
    }

    /// Substitute every `d_i` with `dims[i]` and every `s_j` with `syms[j]`.
    ///
    /// # Panics
    ///
    /// Panics if an identifier is out of range of the replacement slices.
    pub fn replace_dims_and_symbols(&self, dims: &[AffineExpr], syms: &[AffineExpr]) -> AffineExpr {
        self.replace_dims_and_symbols_with(&|e| match e {
            AffineExpr::Dim(d) => dims[*d as usize].clone(),
            AffineExpr::Symbol(s) => syms[*s as usize].clone(),
            other => other.clone(),
        })
    }

    fn replace_dims_and_symbols_with(&self, leaf: &dyn Fn(&AffineExpr) -> AffineExpr) -> AffineExpr {
        let both = |l: &AffineExpr, r: &AffineExpr| {
            (
                l.replace_dims_and_symbols_with(leaf),
                r.replace_dims_and_symbols_with(leaf),
            )
        };
        match self {
            AffineExpr::Dim(_) | AffineExpr::Symbol(_) => leaf(self),
            AffineExpr::Const(c) => AffineExpr::Const(*c),
            AffineExpr::Add(l, r) => {
                let (l, r) = both(l, r);
                l.add(r)
            }
            AffineExpr::Mul(l, r) => {
                let (l, r) = both(l, r);
                l.mul(r)
            }
            AffineExpr::FloorDiv(l, r) => {
                let (l, r) = both(l, r);
                l.floor_div(r)
            }
            AffineExpr::CeilDiv(l, r) => {
                let (l, r) = both(l, r);
                l.ceil_div(r)
            }
            AffineExpr::Mod(l, r) => {
                let (l, r) = both(l, r);
                l.modulo(r)
            }
        }
    }

    /// Visit every sub-expression in pre-order.
    pub fn walk(&self, f: &mut impl FnMut(&AffineExpr)) {
        f(self);
        match self {
            AffineExpr::Dim(_) | AffineExpr::Symbol(_) | AffineExpr::Const(_) => {}
            AffineExpr::Add(l, r)
            | AffineExpr::Mul(l, r)
            | AffineExpr::FloorDiv(l, r)
            | AffineExpr::CeilDiv(l, r)
            | AffineExpr::Mod(l, r) => {
                l.walk(f);
                r.walk(f);
            }
        }
    }

    pub fn is_function_of_dim(&self, position: u32) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= *e == AffineExpr::Dim(position));
        found
    }

    pub fn is_function_of_symbol(&self, position: u32) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= *e == AffineExpr::Symbol(position));
        found
    }

    /// True when every multiplication has a constant side and every
    /// division or modulo has a constant divisor.
    pub fn is_pure_affine(&self) -> bool {
        let mut pure = true;
        self.walk(&mut |e| match e {
            AffineExpr::Mul(l, r) => pure &= l.is_constant() || r.is_constant(),
            AffineExpr::FloorDiv(_, r) | AffineExpr::CeilDiv(_, r) | AffineExpr::Mod(_, r) => {
                pure &= r.is_constant()
            }
            _ => {}
        });
        pure
    }

    /// Evaluate with floor semantics for `floordiv` and a non-negative
    /// remainder for `mod`. Returns `None` on division by zero or overflow.
    pub fn eval(&self, dims: &[i64], syms: &[i64]) -> Option<i64> {
        match self {
            AffineExpr::Dim(d) => dims.get(*d as usize).copied(),
            AffineExpr::Symbol(s) => syms.get(*s as usize).copied(),
            AffineExpr::Const(c) => Some(*c),
            AffineExpr::Add(l, r) => l.eval(dims, syms)?.checked_add(r.eval(dims, syms)?),
            AffineExpr::Mul(l, r) => l.eval(dims, syms)?.checked_mul(r.eval(dims, syms)?),
            AffineExpr::FloorDiv(l, r) => {
                let (a, b) = (l.eval(dims, syms)?, r.eval(dims, syms)?);
                if b == 0 {
                    return None;
                }
                Some(floor_div_i64(a, b))
            }
            AffineExpr::CeilDiv(l, r) => {
                let (a, b) = (l.eval(dims, syms)?, r.eval(dims, syms)?);
                if b == 0 {
                    return None;
                }
                Some(ceil_div_i64(a, b))
            }
            AffineExpr::Mod(l, r) => {
                let (a, b) = (l.eval(dims, syms)?, r.eval(dims, syms)?);
                if b == 0 {
                    return None;
                }
                Some(a.rem_euclid(b))
            }
        }
    }

    fn is_binary(&self) -> bool {
        !matches!(
            self,
            AffineExpr::Dim(_) | AffineExpr::Symbol(_) | AffineExpr::Const(_)
        )
    }
}

impl Linear {
    fn scale_down(mut self, d: i64) -> Linear {
        for c in self.terms.values_mut() {
            *c /= d;
        }
        self.constant /= d;
        self
    }
}

fn floor_div_i64(a: i64, b: i64) -> i64 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn ceil_div_i64(a: i64, b: i64) -> i64 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) == (b < 0)) {
        q + 1
    } else {
        q
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffineExpr::Dim(d) => write!(f, "d{d}"),
            AffineExpr::Symbol(s) => write!(f, "s{s}"),
            AffineExpr::Const(c) => write!(f, "{c}"),
            AffineExpr::Add(lhs, rhs) => {
                write!(f, "{lhs}")?;
                match rhs.as_ref() {
                    AffineExpr::Const(c) if *c < 0 => write!(f, " - {}", c.unsigned_abs()),
                    AffineExpr::Mul(atom, c) => match c.as_constant() {
                        Some(-1) => {
                            f.write_str(" - ")?;
                            write_operand(f, atom)
                        }
                        Some(c) if c < 0 => {
                            f.write_str(" - ")?;
                            write_operand(f, atom)?;
                            write!(f, " * {}", c.unsigned_abs())
                        }
                        _ => write!(f, " + {rhs}"),
                    },
                    _ => write!(f, " + {rhs}"),
                }
            }
            AffineExpr::Mul(lhs, rhs) if rhs.as_constant() == Some(-1) => {
                f.write_str("-")?;
                write_operand(f, lhs)
            }
            AffineExpr::Mul(lhs, rhs) => write_binary(f, lhs, "*", rhs),
            AffineExpr::FloorDiv(lhs, rhs) => write_binary(f, lhs, "floordiv", rhs),
            AffineExpr::CeilDiv(lhs, rhs) => write_binary(f, lhs, "ceildiv", rhs),
            AffineExpr::Mod(lhs, rhs) => write_binary(f, lhs, "mod", rhs),
        }
    }
}

fn write_binary(f: &mut fmt::Formatter<'_>, lhs: &AffineExpr, op: &str, rhs: &AffineExpr) -> fmt::Result {
    match lhs {
        AffineExpr::Add(..) => write!(f, "({lhs})")?,
        AffineExpr::Mul(_, c) if c.as_constant() == Some(-1) => write!(f, "({lhs})")?,
        _ => write!(f, "{lhs}")?,
    }
    write!(f, " {op} ")?;
    write_operand(f, rhs)
}

/// Right-hand operands bind tighter than any binary operator.
fn write_operand(f: &mut fmt::Formatter<'_>, e: &AffineExpr) -> fmt::Result {
    if e.is_binary() {
        write!(f, "({e})")
    } else {
        write!(f, "{e}")
    }
}
