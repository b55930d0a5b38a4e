//! Affine maps: `(d0, ..)[s0, ..] -> (e0, ..)`.

use std::fmt;

use super::expr::AffineExpr;

/// A list of affine result expressions over `num_dims` dimensions and
/// `num_symbols` symbols. Operands bound to a map are laid out dims first,
/// then symbols.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AffineMap {
    num_dims: u32,
    num_symbols: u32,
    results: Vec<AffineExpr>,
}

impl AffineMap {
    pub fn new(num_dims: u32, num_symbols: u32, results: Vec<AffineExpr>) -> Self {
        Self {
            num_dims,
            num_symbols,
            results,
        }
    }

    /// `() -> (value)`.
    pub fn constant(value: i64) -> Self {
        Self::new(0, 0, vec![AffineExpr::constant(value)])
    }

    /// `()[s0, .., s(n-1)] -> (s0, .., s(n-1))`.
    pub fn symbol_identity(n: u32) -> Self {
        Self::new(0, n, (0..n).map(AffineExpr::symbol).collect())
    }

    /// `(d0, .., d(n-1)) -> (d0, .., d(n-1))`.
    pub fn dim_identity(n: u32) -> Self {
        Self::new(n, 0, (0..n).map(AffineExpr::dim).collect())
    }

    pub fn num_dims(&self) -> u32 {
        self.num_dims
    }

    pub fn num_symbols(&self) -> u32 {
        self.num_symbols
    }

    /// Number of operands this map consumes.
    pub fn num_inputs(&self) -> usize {
        (self.num_dims + self.num_symbols) as usize
    }

    pub fn results(&self) -> &[AffineExpr] {
        &self.results
    }

    pub fn num_results(&self) -> usize {
        self.results.len()
    }

    /// The single constant this map produces, if it has exactly one
    /// constant result.
    pub fn single_constant_result(&self) -> Option<i64> {
        match self.results.as_slice() {
            [only] => only.as_constant(),
            _ => None,
        }
    }

    pub fn is_function_of_dim(&self, position: u32) -> bool {
        self.results.iter().any(|e| e.is_function_of_dim(position))
    }

    pub fn is_function_of_symbol(&self, position: u32) -> bool {
        self.results.iter().any(|e| e.is_function_of_symbol(position))
    }

    /// Substitute identifiers in every result and rebind the map to the new
    /// dimension and symbol counts.
    pub fn replace_dims_and_symbols(
        &self,
        dims: &[AffineExpr],
        syms: &[AffineExpr],
        new_num_dims: u32,
        new_num_symbols: u32,
    ) -> AffineMap {
        let results = self
            .results
            .iter()
            .map(|e| e.replace_dims_and_symbols(dims, syms))
            .collect();
        AffineMap::new(new_num_dims, new_num_symbols, results)
    }

    /// Re-canonicalize every result expression.
    pub fn simplify(&self) -> AffineMap {
        AffineMap::new(
            self.num_dims,
            self.num_symbols,
            self.results.iter().map(AffineExpr::simplify).collect(),
        )
    }

    /// Drop repeated result expressions, keeping first occurrences.
    pub fn remove_duplicate_exprs(&self) -> AffineMap {
        let mut results: Vec<AffineExpr> = Vec::with_capacity(self.results.len());
        for e in &self.results {
            if !results.contains(e) {
                results.push(e.clone());
            }
        }
        AffineMap::new(self.num_dims, self.num_symbols, results)
    }

    pub fn eval(&self, dims: &[i64], syms: &[i64]) -> Option<Vec<i64>> {
        self.results.iter().map(|e| e.eval(dims, syms)).collect()
    }
}

pub(crate) fn write_binding_list(f: &mut fmt::Formatter<'_>, num_dims: u32, num_symbols: u32) -> fmt::Result {
    f.write_str("(")?;
    for d in 0..num_dims {
        if d > 0 {
            f.write_str(", ")?;
        }
        write!(f, "d{d}")?;
    }
    f.write_str(")")?;
    if num_symbols > 0 {
        f.write_str("[")?;
        for s in 0..num_symbols {
            if s > 0 {
                f.write_str(", ")?;
            }
            write!(f, "s{s}")?;
        }
        f.write_str("]")?;
    }
    Ok(())
}

impl fmt::Display for AffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("affine_map<")?;
        write_binding_list(f, self.num_dims, self.num_symbols)?;
        f.write_str(" -> (")?;
        for (i, e) in self.results.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{e}")?;
        }
        f.write_str(")>")
    }
}
