//! Typed operation wrappers.
//!
//! A dialect op wrapper is a `Copy` newtype over `OpRef` that has been
//! checked against its `dialect.name` pair. Wrappers are declared with
//! [`define_op!`] and given constructors and accessors by hand in each
//! dialect module.

use derive_more::{Display, Error};

use crate::context::IrContext;
use crate::refs::OpRef;
use crate::symbol::Symbol;
use crate::types::Attribute;

/// Error when viewing an operation as a dialect-specific wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ConversionError {
    /// Operation name doesn't match expected dialect.operation.
    #[display("expected `{expected}`, found `{actual}`")]
    WrongOperation {
        expected: &'static str,
        actual: String,
    },
    #[display("missing attribute `{_0}`")]
    MissingAttribute(#[error(not(source))] &'static str),
    #[display("attribute `{_0}` has the wrong kind")]
    WrongAttributeType(#[error(not(source))] &'static str),
    #[display("missing result")]
    MissingResult,
    #[display("missing region")]
    MissingRegion,
    #[display("expected {expected} operands, found {actual}")]
    WrongOperandCount { expected: usize, actual: usize },
}

/// Trait for typed operation wrappers.
pub trait DialectOp: Sized + Copy {
    const DIALECT_NAME: &'static str;
    const OP_NAME: &'static str;

    fn from_op(ctx: &IrContext, op: OpRef) -> Result<Self, ConversionError>;
    fn op_ref(&self) -> OpRef;

    fn matches(ctx: &IrContext, op: OpRef) -> bool {
        let data = ctx.op(op);
        data.dialect == Symbol::new(Self::DIALECT_NAME) && data.name == Symbol::new(Self::OP_NAME)
    }
}

/// Look up a required attribute on an operation.
pub fn required_attr<'a>(ctx: &'a IrContext, op: OpRef, key: &'static str) -> Result<&'a Attribute, ConversionError> {
    ctx.op(op)
        .attributes
        .get(&Symbol::new(key))
        .ok_or(ConversionError::MissingAttribute(key))
}

/// Declare a typed wrapper for `dialect.name`.
///
/// ```
/// use polyaffine_ir::define_op;
///
/// define_op! {
///     /// `test.probe`
///     pub struct Probe = "test"."probe";
/// }
///
/// assert_eq!(<Probe as polyaffine_ir::DialectOp>::OP_NAME, "probe");
/// ```
#[macro_export]
macro_rules! define_op {
    ($($(#[$meta:meta])* pub struct $name:ident = $dialect:literal . $op:literal;)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
            pub struct $name($crate::OpRef);

            impl $crate::DialectOp for $name {
                const DIALECT_NAME: &'static str = $dialect;
                const OP_NAME: &'static str = $op;

                fn from_op(
                    ctx: &$crate::IrContext,
                    op: $crate::OpRef,
                ) -> Result<Self, $crate::ConversionError> {
                    if !<Self as $crate::DialectOp>::matches(ctx, op) {
                        return Err($crate::ConversionError::WrongOperation {
                            expected: concat!($dialect, ".", $op),
                            actual: format!("{}.{}", ctx.op(op).dialect, ctx.op(op).name),
                        });
                    }
                    Ok(Self(op))
                }

                fn op_ref(&self) -> $crate::OpRef {
                    self.0
                }
            }

            impl $name {
                pub fn op_ref(&self) -> $crate::OpRef {
                    self.0
                }
            }
        )*
    };
}
