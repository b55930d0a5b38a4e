//! Transformation passes over the polyaffine IR.
//!
//! The main pass is [`affine_cfg`], which raises generic index arithmetic,
//! memory accesses and conditionals into the affine dialect and keeps
//! existing affine maps in canonical form.

// === Affine passes ===
pub mod affine_cfg;

// Re-exports
pub use affine_cfg::{
    AffineCfgConfig, AffineCfgResult, NormalizeError, canonicalize_map_and_operands,
    canonicalize_set_and_operands, fully_compose_map_and_operands, fully_compose_set_and_operands,
    is_valid_index, is_valid_symbol, legal_condition, legalize_affine_cfg,
    legalize_affine_cfg_with_config,
};
pub use polyaffine_ir::rewrite::{ApplyResult, PatternApplicator, RewritePattern};
