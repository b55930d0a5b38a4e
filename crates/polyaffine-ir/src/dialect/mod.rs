//! Dialects understood by the IR: structural `core` and `func`, scalar
//! `arith`, structured `scf`, raw memory `mem`, and `affine`.

pub mod affine;
pub mod arith;
pub mod core;
pub mod func;
pub mod mem;
pub mod scf;
