//! Arena-based mutable SSA IR with an affine dialect.
//!
//! Operations, values, blocks and regions live in `cranelift-entity` arenas
//! owned by [`IrContext`], with use-chains maintained on every mutation.
//! On top of the storage this crate provides the dialects, affine maps and
//! integer sets, a textual format, dominance queries and a greedy pattern
//! rewrite driver.

pub mod affine;
pub mod context;
pub mod dialect;
pub mod dominance;
pub mod effects;
pub mod location;
pub mod ops;
pub mod parser;
pub mod printer;
pub mod refs;
pub mod rewrite;
pub mod symbol;
pub mod transforms;
pub mod types;
pub mod validation;
pub mod walk;

pub use affine::{AffineExpr, AffineMap, IntegerSet};
pub use context::{BlockData, IrContext, OperationData, OperationDataBuilder, RegionData, Use, ValueData};
pub use dominance::InsertPoint;
pub use location::{Location, Span};
pub use ops::{ConversionError, DialectOp};
pub use refs::{BlockRef, OpRef, PathRef, RegionRef, TypeRef, ValueDef, ValueRef};
pub use symbol::Symbol;
pub use types::{Attribute, TypeData, TypeDataBuilder};
pub use walk::WalkAction;

pub use smallvec;
