//! Affine expressions, maps and integer sets.

mod expr;
mod map;
mod set;

pub use expr::AffineExpr;
pub use map::AffineMap;
pub use set::IntegerSet;
