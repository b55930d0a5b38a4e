//! Affine control-flow legalization for the polyaffine IR.
//!
//! The IR itself lives in [`polyaffine_ir`] and the pass in
//! [`polyaffine_passes`]; this crate wires them into a text pipeline.

pub mod pipeline;

pub use pipeline::{LegalizeOptions, LegalizeOutput, PipelineError, legalize_source, print_source, read_input};
