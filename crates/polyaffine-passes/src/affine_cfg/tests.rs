use polyaffine_ir::dialect::{affine, arith, core, func};
use polyaffine_ir::parser::parse_test_module;
use polyaffine_ir::printer::print_module;
use polyaffine_ir::walk::collect_ops;
use polyaffine_ir::{AffineExpr, DialectOp, IntegerSet, IrContext, OpRef, RegionRef, ValueRef};

use super::*;

/// Values of the first function in `module`, in the order the printer
/// numbers them: `v[n]` is `%n`.
pub(crate) fn func_values(ctx: &IrContext, module: core::Module) -> Vec<ValueRef> {
    fn region_values(ctx: &IrContext, region: RegionRef, out: &mut Vec<ValueRef>) {
        for &block in &ctx.region(region).blocks {
            out.extend_from_slice(ctx.block_args(block));
            for &op in &ctx.block(block).ops {
                op_values(ctx, op, out);
            }
        }
    }

    fn op_values(ctx: &IrContext, op: OpRef, out: &mut Vec<ValueRef>) {
        out.extend_from_slice(ctx.op_results(op));
        for &region in &ctx.op(op).regions {
            region_values(ctx, region, out);
        }
    }

    let mut out = Vec::new();
    let body = module
        .ops(ctx)
        .into_iter()
        .find_map(|op| func::Func::from_op(ctx, op).ok())
        .and_then(|f| f.body(ctx));
    if let Some(body) = body {
        region_values(ctx, body, &mut out);
    }
    out
}

/// All `dialect.name` operations under `module`, in pre-order.
pub(crate) fn find_ops(ctx: &IrContext, module: core::Module, dialect: &str, name: &str) -> Vec<OpRef> {
    collect_ops(ctx, module.op_ref())
        .into_iter()
        .filter(|&op| ctx.op(op).is(dialect, name))
        .collect()
}

const LOAD: &str = r#"core.module @test {
  func.func @f(%0: mem.ref(core.f32), %1: core.index) -> core.nil {
    %2 = arith.const {value = 4} : core.index
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (16)>} {
      ^bb0(%3: core.index):
        %4 = arith.mul %3, %2 : core.index
        %5 = arith.add %4, %1 : core.index
        %6 = mem.load %0, %5 : core.f32
        test.use %6
        affine.yield
    }
    func.return
  }
}"#;

#[test]
fn strided_loads_become_affine_loads() {
    let (mut ctx, module) = parse_test_module(LOAD);

    let result = legalize_affine_cfg(&mut ctx, module);

    assert!(result.apply.reached_fixpoint);
    assert!(result.changed());
    insta::assert_snapshot!(print_module(&ctx, module.op_ref()), @r"
    core.module @test {
      func.func @f(%0: mem.ref(core.f32), %1: core.index) -> core.nil {
        affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (16)>} {
          ^bb0(%2: core.index):
            %3 = affine.load %0, %2, %1 {map = affine_map<(d0)[s0] -> (d0 * 4 + s0)>} : core.f32
            test.use %3
            affine.yield
        }
        func.return
      }
    }
    ");
}

#[test]
fn legalization_is_idempotent() {
    let (mut ctx, module) = parse_test_module(LOAD);
    legalize_affine_cfg(&mut ctx, module);
    let once = print_module(&ctx, module.op_ref());

    let again = legalize_affine_cfg(&mut ctx, module);

    assert!(!again.changed());
    assert_eq!(again.apply.iterations, 1);
    assert_eq!(print_module(&ctx, module.op_ref()), once);
}

#[test]
fn dead_index_arithmetic_stays_without_dce() {
    let (mut ctx, module) = parse_test_module(LOAD);
    let config = AffineCfgConfig {
        run_dce: false,
        ..AffineCfgConfig::default()
    };

    let result = legalize_affine_cfg_with_config(&mut ctx, module, config);

    assert!(result.dce.is_none());
    assert_eq!(find_ops(&ctx, module, "affine", "load").len(), 1);
    assert!(find_ops(&ctx, module, "mem", "load").is_empty());
    assert_eq!(find_ops(&ctx, module, "arith", "mul").len(), 1);
}

#[test]
fn stores_become_affine_stores() {
    let (mut ctx, module) = parse_test_module(
        r#"core.module @test {
  func.func @f(%0: mem.ref(core.f32), %1: core.index, %2: core.f32) -> core.nil {
    affine.for %1 {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<()[s0] -> (s0)>} {
      ^bb0(%3: core.index):
        %4 = arith.add %3, %1 : core.index
        mem.store %2, %0, %4, %3
        affine.yield
    }
    func.return
  }
}"#,
    );
    let v = func_values(&ctx, module);

    legalize_affine_cfg(&mut ctx, module);

    assert!(find_ops(&ctx, module, "mem", "store").is_empty());
    let store = find_ops(&ctx, module, "affine", "store")[0];
    let map = affine::op_map(&ctx, store).expect("access map");
    assert_eq!(map.to_string(), "affine_map<(d0)[s0] -> (d0 + s0, d0)>");
    assert_eq!(ctx.op_operands(store), &[v[2], v[0], v[3], v[1]]);
    assert!(find_ops(&ctx, module, "arith", "add").is_empty());
}

fn d(i: u32) -> AffineExpr {
    AffineExpr::dim(i)
}

fn s(i: u32) -> AffineExpr {
    AffineExpr::symbol(i)
}

#[test]
fn guards_inside_loops_become_affine_ifs() {
    let (mut ctx, module) = parse_test_module(
        r#"core.module @test {
  func.func @f(%0: mem.ref(core.f32), %1: core.index, %2: core.f32) -> core.nil {
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (64)>} {
      ^bb0(%3: core.index):
        %4 = arith.cmp %3, %1 {predicate = @slt} : core.i1
        scf.if %4 {
            affine.store %2, %0, %3 {map = affine_map<(d0) -> (d0)>}
            scf.yield
        }
        affine.yield
    }
    func.return
  }
}"#,
    );
    let v = func_values(&ctx, module);

    legalize_affine_cfg(&mut ctx, module);

    assert!(find_ops(&ctx, module, "scf", "if").is_empty());
    assert!(find_ops(&ctx, module, "arith", "cmp").is_empty());
    let if_op = affine::If::from_op(&ctx, find_ops(&ctx, module, "affine", "if")[0]).expect("affine.if");
    // iv < b  <=>  b - iv - 1 >= 0
    let expected = IntegerSet::new(1, 1, vec![s(0).sub(d(0)).sub(AffineExpr::constant(1))], vec![false]);
    assert_eq!(if_op.condition(&ctx), Some(&expected));
    assert_eq!(ctx.op_operands(if_op.op_ref()), &[v[3], v[1]]);

    // The missing else branch is materialized as an empty yield.
    let regions = ctx.op(if_op.op_ref()).regions.to_vec();
    assert_eq!(regions.len(), 2);
    let else_block = ctx.region(regions[1]).blocks[0];
    let else_ops = &ctx.block(else_block).ops;
    assert_eq!(else_ops.len(), 1);
    assert!(affine::Yield::matches(&ctx, else_ops[0]));
    assert!(find_ops(&ctx, module, "scf", "yield").is_empty());
}

#[test]
fn guards_with_results_keep_both_branches() {
    let (mut ctx, module) = parse_test_module(
        r#"core.module @test {
  func.func @f(%0: core.index, %1: core.index) -> core.nil {
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (64)>} {
      ^bb0(%2: core.index):
        %3 = arith.cmp %2, %0 {predicate = @sge} : core.i1
        %4 = arith.cmp %2, %1 {predicate = @sle} : core.i1
        %5 = arith.and %3, %4 : core.i1
        %6 = scf.if %5 : core.index {
            scf.yield %0
        } {
            scf.yield %1
        }
        test.use %6
        affine.yield
    }
    func.return
  }
}"#,
    );

    legalize_affine_cfg(&mut ctx, module);

    let if_op = affine::If::from_op(&ctx, find_ops(&ctx, module, "affine", "if")[0]).expect("affine.if");
    let set = if_op.condition(&ctx).expect("integer set");
    assert_eq!(set.constraints().len(), 2);
    assert_eq!(set.eq_flags(), &[false, false]);
    assert_eq!(ctx.op_results(if_op.op_ref()).len(), 1);
    assert_eq!(find_ops(&ctx, module, "affine", "yield").len(), 3);
    let used = ctx.op_operands(find_ops(&ctx, module, "test", "use")[0])[0];
    assert_eq!(ctx.defining_op(used), Some(if_op.op_ref()));
}

#[test]
fn unrepresentable_guards_are_left_alone() {
    // `!=`, min(iv, a) < b (a disjunction) and a guard outside any loop
    let src = r#"core.module @test {
  func.func @f(%0: core.index, %1: core.index) -> core.nil {
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (64)>} {
      ^bb0(%2: core.index):
        %3 = arith.cmp %2, %1 {predicate = @ne} : core.i1
        scf.if %3 {
            test.effect %2
            scf.yield
        }
        %4 = arith.cmp %2, %0 {predicate = @slt} : core.i1
        %5 = arith.select %4, %2, %0 : core.index
        %6 = arith.cmp %5, %1 {predicate = @slt} : core.i1
        scf.if %6 {
            test.effect %5
            scf.yield
        }
        affine.yield
    }
    %7 = arith.cmp %0, %1 {predicate = @slt} : core.i1
    scf.if %7 {
        test.effect %0
        scf.yield
    }
    func.return
  }
}"#;
    let (mut ctx, module) = parse_test_module(src);
    let before = print_module(&ctx, module.op_ref());

    let result = legalize_affine_cfg(&mut ctx, module);

    assert!(!result.changed());
    assert_eq!(find_ops(&ctx, module, "scf", "if").len(), 3);
    assert!(find_ops(&ctx, module, "affine", "if").is_empty());
    assert_eq!(print_module(&ctx, module.op_ref()), before);
}

#[test]
fn min_max_bounds_are_split_by_the_full_pass() {
    let (mut ctx, module) = parse_test_module(
        r#"core.module @test {
  func.func @f(%0: core.index, %1: core.index) -> core.nil {
    %2 = arith.cmp %0, %1 {predicate = @slt} : core.i1
    %3 = arith.select %2, %0, %1 : core.index
    affine.for %3 {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<()[s0] -> (s0)>} {
      ^bb0(%4: core.index):
        affine.yield
    }
    func.return
  }
}"#,
    );
    let v = func_values(&ctx, module);

    legalize_affine_cfg(&mut ctx, module);

    let for_op = affine::For::from_op(&ctx, find_ops(&ctx, module, "affine", "for")[0]).expect("affine.for");
    let ub = for_op.upper_bound_map(&ctx).expect("upper bound");
    assert_eq!(ub.to_string(), "affine_map<()[s0, s1] -> (s0, s1)>");
    assert_eq!(for_op.upper_bound_operands(&ctx), &[v[0], v[1]]);
    assert!(find_ops(&ctx, module, "arith", "select").is_empty());
    assert!(find_ops(&ctx, module, "arith", "cmp").is_empty());
}

#[test]
fn apply_chains_collapse_into_one_apply() {
    let (mut ctx, module) = parse_test_module(
        r#"core.module @test {
  func.func @f(%0: core.index) -> core.nil {
    %1 = affine.apply %0 {map = affine_map<(d0) -> (d0 * 2)>} : core.index
    %2 = affine.apply %1 {map = affine_map<(d0) -> (d0 + 1)>} : core.index
    test.use %2
    func.return
  }
}"#,
    );
    let v = func_values(&ctx, module);

    legalize_affine_cfg(&mut ctx, module);

    let applies = find_ops(&ctx, module, "affine", "apply");
    assert_eq!(applies.len(), 1);
    let map = affine::op_map(&ctx, applies[0]).expect("map");
    assert_eq!(map.to_string(), "affine_map<()[s0] -> (s0 * 2 + 1)>");
    assert_eq!(ctx.op_operands(applies[0]), &[v[0]]);
}

#[test]
fn integer_constants_cast_to_index_fold() {
    let (mut ctx, module) = parse_test_module(
        r#"core.module @test {
  func.func @f() -> core.nil {
    %0 = arith.const {value = 3} : core.i32
    %1 = arith.index_cast %0 : core.index
    test.use %1
    func.return
  }
}"#,
    );

    legalize_affine_cfg(&mut ctx, module);

    assert!(find_ops(&ctx, module, "arith", "index_cast").is_empty());
    let used = ctx.op_operands(find_ops(&ctx, module, "test", "use")[0])[0];
    assert_eq!(arith::constant_value(&ctx, used), Some(3));
    assert!(core::is_index(&ctx, ctx.value_ty(used)));
}

#[test]
fn affine_access_maps_are_recomposed() {
    let (mut ctx, module) = parse_test_module(
        r#"core.module @test {
  func.func @f(%0: mem.ref(core.f32), %1: core.index) -> core.nil {
    affine.for {lower_bound = affine_map<() -> (0)>, step = 1, upper_bound = affine_map<() -> (16)>} {
      ^bb0(%2: core.index):
        %3 = arith.add %2, %1 : core.index
        %4 = affine.load %0, %3 {map = affine_map<(d0) -> (d0)>} : core.f32
        %5 = affine.load %0, %1 {map = affine_map<(d0) -> (d0)>} : core.f32
        test.use %4, %5
        affine.yield
    }
    func.return
  }
}"#,
    );
    let v = func_values(&ctx, module);

    legalize_affine_cfg(&mut ctx, module);

    let loads = find_ops(&ctx, module, "affine", "load");
    assert_eq!(loads.len(), 2);
    let first = affine::op_map(&ctx, loads[0]).expect("map");
    assert_eq!(first.to_string(), "affine_map<(d0)[s0] -> (d0 + s0)>");
    assert_eq!(ctx.op_operands(loads[0]), &[v[0], v[2], v[1]]);
    let second = affine::op_map(&ctx, loads[1]).expect("map");
    assert_eq!(second.to_string(), "affine_map<()[s0] -> (s0)>");
    assert_eq!(ctx.op_operands(loads[1]), &[v[0], v[1]]);
}

const PARALLEL_ACCESS: &str = r#"core.module @test {
  func.func @f(%0: mem.ref(core.f32), %1: core.index) -> core.nil {
    %2 = arith.const {value = 2} : core.index
    affine.parallel {lower_bound = affine_map<() -> (0, 0)>, upper_bound = affine_map<() -> (8, 8)>} {
      ^bb0(%3: core.index, %4: core.index):
        %5 = arith.divs %3, %2 : core.index
        %6 = arith.add %4, %1 : core.index
        affine.prefetch %0, %5, %6 {is_data_cache = true, is_write = false, locality_hint = 3, map = affine_map<(d0, d1) -> (d0, d1)>}
        %7 = affine.vector_load %0, %5, %6 {map = affine_map<(d0, d1) -> (d0, d1)>} : core.vector(core.f32)
        affine.vector_store %7, %0, %5, %6 {map = affine_map<(d0, d1) -> (d0, d1)>}
        affine.yield
    }
    func.return
  }
}"#;

#[test]
fn prefetch_and_vector_accesses_keep_their_leading_operands() {
    let (mut ctx, module) = parse_test_module(PARALLEL_ACCESS);
    let v = func_values(&ctx, module);

    let result = legalize_affine_cfg(&mut ctx, module);
    assert!(result.changed());

    let composed = "affine_map<(d0, d1)[s0] -> (d0 floordiv 2, d1 + s0)>";
    let indices = [v[3], v[4], v[1]];

    let prefetch = find_ops(&ctx, module, "affine", "prefetch")[0];
    assert_eq!(affine::op_map(&ctx, prefetch).expect("map").to_string(), composed);
    assert_eq!(ctx.op_operands(prefetch)[0], v[0]);
    assert_eq!(&ctx.op_operands(prefetch)[1..], &indices);

    let load = find_ops(&ctx, module, "affine", "vector_load")[0];
    assert_eq!(affine::op_map(&ctx, load).expect("map").to_string(), composed);
    assert_eq!(ctx.op_operands(load)[0], v[0]);
    assert_eq!(&ctx.op_operands(load)[1..], &indices);
    let f32 = core::f32(&mut ctx);
    let vector = core::vector(&mut ctx, f32);
    assert_eq!(ctx.value_ty(ctx.op_results(load)[0]), vector);

    let store = find_ops(&ctx, module, "affine", "vector_store")[0];
    assert_eq!(affine::op_map(&ctx, store).expect("map").to_string(), composed);
    assert_eq!(&ctx.op_operands(store)[..2], &[ctx.op_results(load)[0], v[0]]);
    assert_eq!(&ctx.op_operands(store)[2..], &indices);

    let printed = print_module(&ctx, module.op_ref());
    assert!(printed.contains("locality_hint = 3"), "{printed}");
    assert!(!printed.contains("arith.divs"), "{printed}");

    let again = legalize_affine_cfg(&mut ctx, module);
    assert!(!again.changed());
}
