//! Integer sets: conjunctions of `expr >= 0` and `expr == 0` constraints.

use std::fmt;

use super::expr::AffineExpr;
use super::map::write_binding_list;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IntegerSet {
    num_dims: u32,
    num_symbols: u32,
    constraints: Vec<AffineExpr>,
    eq_flags: Vec<bool>,
}

impl IntegerSet {
    /// # Panics
    ///
    /// Panics if `constraints` and `eq_flags` differ in length.
    pub fn new(num_dims: u32, num_symbols: u32, constraints: Vec<AffineExpr>, eq_flags: Vec<bool>) -> Self {
        assert_eq!(
            constraints.len(),
            eq_flags.len(),
            "IntegerSet::new: one eq flag per constraint"
        );
        Self {
            num_dims,
            num_symbols,
            constraints,
            eq_flags,
        }
    }

    pub fn num_dims(&self) -> u32 {
        self.num_dims
    }

    pub fn num_symbols(&self) -> u32 {
        self.num_symbols
    }

    pub fn num_inputs(&self) -> usize {
        (self.num_dims + self.num_symbols) as usize
    }

    pub fn constraints(&self) -> &[AffineExpr] {
        &self.constraints
    }

    pub fn eq_flags(&self) -> &[bool] {
        &self.eq_flags
    }

    pub fn is_eq(&self, index: usize) -> bool {
        self.eq_flags[index]
    }

    pub fn replace_dims_and_symbols(
        &self,
        dims: &[AffineExpr],
        syms: &[AffineExpr],
        new_num_dims: u32,
        new_num_symbols: u32,
    ) -> IntegerSet {
        IntegerSet {
            num_dims: new_num_dims,
            num_symbols: new_num_symbols,
            constraints: self
                .constraints
                .iter()
                .map(|e| e.replace_dims_and_symbols(dims, syms))
                .collect(),
            eq_flags: self.eq_flags.clone(),
        }
    }

    pub fn simplify(&self) -> IntegerSet {
        IntegerSet {
            num_dims: self.num_dims,
            num_symbols: self.num_symbols,
            constraints: self.constraints.iter().map(AffineExpr::simplify).collect(),
            eq_flags: self.eq_flags.clone(),
        }
    }

    /// Whether the point satisfies every constraint. `None` if a constraint
    /// cannot be evaluated.
    pub fn contains(&self, dims: &[i64], syms: &[i64]) -> Option<bool> {
        let mut all = true;
        for (e, &eq) in self.constraints.iter().zip(&self.eq_flags) {
            let v = e.eval(dims, syms)?;
            all &= if eq { v == 0 } else { v >= 0 };
        }
        Some(all)
    }
}

impl fmt::Display for IntegerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("affine_set<")?;
        write_binding_list(f, self.num_dims, self.num_symbols)?;
        f.write_str(" : (")?;
        for (i, (e, eq)) in self.constraints.iter().zip(&self.eq_flags).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{e} {} 0", if *eq { "==" } else { ">=" })?;
        }
        f.write_str(")>")
    }
}
