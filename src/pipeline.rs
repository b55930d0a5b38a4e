//! Text-in, text-out driver around the legalization pass.
//!
//! ```text
//! source ─► parse_module_at ─► [validate] ─► legalize_affine_cfg ─► [validate] ─► print_module
//! ```

use std::io::Read;
use std::path::Path;

use derive_more::{Display, Error, From};
use polyaffine_ir::dialect::core::Module;
use polyaffine_ir::parser::{ParseError, parse_module_at};
use polyaffine_ir::printer::print_module;
use polyaffine_ir::validation::validate_module;
use polyaffine_ir::{ConversionError, DialectOp, IrContext};
use polyaffine_passes::{AffineCfgConfig, AffineCfgResult, legalize_affine_cfg_with_config};
use tracing::{debug, info};

#[derive(Debug, Display, Error, From)]
pub enum PipelineError {
    #[display("cannot read {path}: {source}")]
    #[from(skip)]
    Io { path: String, source: std::io::Error },
    Parse(ParseError),
    #[display("top-level operation is not a module: {_0}")]
    NotAModule(ConversionError),
    #[display("{stage}: {report}")]
    #[from(skip)]
    Invalid {
        stage: &'static str,
        report: String,
    },
}

/// Read the file at `path`, or standard input for `-`.
pub fn read_input(path: &Path) -> Result<String, PipelineError> {
    let io_error = |source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    };
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map_err(io_error)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).map_err(io_error)
}

#[derive(Debug, Clone, Default)]
pub struct LegalizeOptions {
    pub config: AffineCfgConfig,
    /// Validate the module before and after the pass.
    pub verify: bool,
}

#[derive(Debug)]
pub struct LegalizeOutput {
    pub text: String,
    pub result: AffineCfgResult,
}

fn parse(ctx: &mut IrContext, source: &str, path: &str) -> Result<Module, PipelineError> {
    let op = parse_module_at(ctx, source, path)?;
    Ok(Module::from_op(ctx, op)?)
}

fn verify(ctx: &IrContext, module: Module, stage: &'static str) -> Result<(), PipelineError> {
    let result = validate_module(ctx, module);
    if result.is_ok() {
        debug!(stage, "module is valid");
        return Ok(());
    }
    Err(PipelineError::Invalid {
        stage,
        report: result.to_string(),
    })
}

/// Parse `source`, legalize it and print the result.
pub fn legalize_source(source: &str, path: &str, options: LegalizeOptions) -> Result<LegalizeOutput, PipelineError> {
    let mut ctx = IrContext::new();
    let module = parse(&mut ctx, source, path)?;
    if options.verify {
        verify(&ctx, module, "input")?;
    }

    let result = legalize_affine_cfg_with_config(&mut ctx, module, options.config);
    info!(
        path,
        changes = result.apply.total_changes,
        iterations = result.apply.iterations,
        removed = result.dce.map_or(0, |d| d.removed_count),
        "legalized"
    );

    if options.verify {
        verify(&ctx, module, "output")?;
    }
    Ok(LegalizeOutput {
        text: print_module(&ctx, module.op_ref()),
        result,
    })
}

/// Parse `source` and print it back in canonical form.
pub fn print_source(source: &str, path: &str) -> Result<String, PipelineError> {
    let mut ctx = IrContext::new();
    let module = parse(&mut ctx, source, path)?;
    Ok(print_module(&ctx, module.op_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = r#"core.module @test {
  func.func @f(%0: mem.ref(core.f32), %1: core.index) -> core.nil {
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (8)>} {
      ^bb0(%2: core.index):
        %3 = arith.add %2, %1 : core.index
        %4 = mem.load %0, %3 : core.f32
        test.use %4
        affine.yield
    }
    func.return
  }
}"#;

    #[test]
    fn printing_is_canonical() {
        assert_eq!(print_source(MODULE, "test.ir").expect("parses"), format!("{MODULE}\n"));
    }

    #[test]
    fn legalized_output_reparses() {
        let options = LegalizeOptions {
            verify: true,
            ..LegalizeOptions::default()
        };
        let output = legalize_source(MODULE, "test.ir", options).expect("legalizes");

        assert!(output.result.changed());
        assert!(output.text.contains("affine.load %0, %2, %1 {map = affine_map<(d0)[s0] -> (d0 + s0)>}"));
        assert_eq!(print_source(&output.text, "out.ir").expect("parses"), output.text);
    }

    #[test]
    fn top_level_must_be_a_module() {
        let err = print_source("test.nop", "nop.ir").expect_err("not a module");
        assert!(matches!(err, PipelineError::NotAModule(_)), "{err}");
    }

    #[test]
    fn syntax_errors_are_reported_as_parse_errors() {
        let err = print_source("core.module @test {", "bad.ir").expect_err("unterminated");
        match err {
            PipelineError::Parse(parse) => assert!(!parse.message.is_empty()),
            other => panic!("expected a parse error, got {other}"),
        }
    }
}
