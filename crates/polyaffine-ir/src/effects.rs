//! Memory-effect registry for operations.
//!
//! Dialects register the effect of each of their operations with
//! [`register_effect!`]. The registry is built from `inventory` on first
//! access. Operations nobody registered are treated as writing memory.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::context::IrContext;
use crate::refs::OpRef;
use crate::symbol::Symbol;

/// What an operation does to memory, ignoring nested operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryEffect {
    /// No observable effect.
    Pure,
    /// Reads memory but never writes it.
    Read,
    /// May write memory or have other side effects.
    Write,
}

/// Registration entry collected through `inventory`.
pub struct EffectRegistration {
    pub dialect: &'static str,
    pub op_name: &'static str,
    pub effect: MemoryEffect,
}

inventory::collect!(EffectRegistration);

static REGISTRY: LazyLock<HashMap<(Symbol, Symbol), MemoryEffect>> = LazyLock::new(|| {
    inventory::iter::<EffectRegistration>
        .into_iter()
        .map(|reg| {
            (
                (Symbol::from_dynamic(reg.dialect), Symbol::from_dynamic(reg.op_name)),
                reg.effect,
            )
        })
        .collect()
});

/// Queries over the effect registry.
pub struct OpEffects;

impl OpEffects {
    /// Build a registration entry (used by `register_effect!`).
    #[doc(hidden)]
    pub const fn register(
        dialect: &'static str,
        op_name: &'static str,
        effect: MemoryEffect,
    ) -> EffectRegistration {
        EffectRegistration {
            dialect,
            op_name,
            effect,
        }
    }

    /// The registered effect of `op` itself. Unregistered ops write.
    pub fn of(ctx: &IrContext, op: OpRef) -> MemoryEffect {
        let data = ctx.op(op);
        REGISTRY
            .get(&(data.dialect, data.name))
            .copied()
            .unwrap_or(MemoryEffect::Write)
    }

    /// `op` and everything nested in it has no effect.
    pub fn is_pure(ctx: &IrContext, op: OpRef) -> bool {
        Self::of(ctx, op) == MemoryEffect::Pure && nested_all(ctx, op, Self::is_pure)
    }

    /// `op` and everything nested in it at most reads memory.
    pub fn is_read_only(ctx: &IrContext, op: OpRef) -> bool {
        Self::of(ctx, op) != MemoryEffect::Write && nested_all(ctx, op, Self::is_read_only)
    }

    /// Pure and producing at least one result. Ops with no results are
    /// kept so that terminators and structural ops survive.
    pub fn is_removable(ctx: &IrContext, op: OpRef) -> bool {
        !ctx.op_results(op).is_empty() && Self::is_pure(ctx, op)
    }
}

fn nested_all(ctx: &IrContext, op: OpRef, pred: fn(&IrContext, OpRef) -> bool) -> bool {
    ctx.op(op).regions.iter().all(|&region| {
        ctx.region(region)
            .blocks
            .iter()
            .all(|&block| ctx.block(block).ops.iter().all(|&nested| pred(ctx, nested)))
    })
}

/// Register the memory effect of a typed operation wrapper.
///
/// ```text
/// register_effect!(arith::Add => Pure);
/// register_effect!(mem::Load => Read);
/// ```
#[macro_export]
macro_rules! register_effect {
    ($op_type:ty => $effect:ident) => {
        ::inventory::submit! {
            $crate::effects::OpEffects::register(
                <$op_type as $crate::DialectOp>::DIALECT_NAME,
                <$op_type as $crate::DialectOp>::OP_NAME,
                $crate::effects::MemoryEffect::$effect,
            )
        }
    };
}
