//! IR transformation passes operating directly on `IrContext`.

pub mod dce;

pub use dce::{DceConfig, DceResult, eliminate_dead_code, eliminate_dead_code_with_config};
