//! Small functions in text IR with known solver results.

use sccp::entity::EntityRef;
use sccp::pass::{LatticeValue, Solver, SolverOptions};
use sccp::{Block, Constant, Func, Global, Module, Type, Value};

fn parse(text: &str) -> Module {
    Module::from_text(text).unwrap()
}

fn inst(module: &Module, func: Func, block: usize, index: usize) -> Value {
    module.funcs[func].body().unwrap().blocks[Block::new(block)].insts[index]
}

fn param(module: &Module, func: Func, block: usize, index: usize) -> Value {
    module.funcs[func].body().unwrap().blocks[Block::new(block)].params[index].1
}

fn solve(module: &Module, opts: SolverOptions) -> Solver<'_> {
    let func = Func::new(0);
    let mut solver = Solver::for_function(module, func, opts);
    solver.run_to_fixed_point(&[func]);
    solver
}

fn i32_const(bits: u64) -> LatticeValue {
    LatticeValue::Constant(Constant::int(Type::I32, bits))
}

#[test]
fn simple_constant_fold() {
    let module = parse(
        "func @f0 \"f\" external () -> i32 {
b0():
  x: i32 = add i32 2, i32 3
  return x
}
",
    );
    let solver = solve(&module, SolverOptions::default());
    let func = Func::new(0);
    assert_eq!(solver.lattice_value(func, inst(&module, func, 0, 0)), &i32_const(5));
    assert!(solver.is_block_executable(func, Block::new(0)));
    assert_eq!(solver.executable_blocks().count(), 1);
}

#[test]
fn dead_branch_elimination() {
    let module = parse(
        "func @f0 \"f\" external () -> i32 {
b0():
  if i1 1, b1(), b2()
b1():
  return i32 1
b2():
  return i32 2
}
",
    );
    let solver = solve(&module, SolverOptions::default());
    let func = Func::new(0);
    assert!(solver.is_edge_feasible(func, Block::new(0), 0));
    assert!(!solver.is_edge_feasible(func, Block::new(0), 1));
    assert!(solver.is_block_executable(func, Block::new(1)));
    assert!(!solver.is_block_executable(func, Block::new(2)));
}

const JOIN: &str = "func @f0 \"f\" external (i1) -> i32 {
b0(c: i1):
  if c, b1(), b2()
b1():
  br b3(i32 LEFT)
b2():
  br b3(i32 RIGHT)
b3(p: i32):
  return p
}
";

fn join(left: u32, right: u32) -> Module {
    parse(
        &JOIN
            .replace("LEFT", &left.to_string())
            .replace("RIGHT", &right.to_string()),
    )
}

#[test]
fn join_with_conflicting_constants() {
    let module = join(1, 2);
    let solver = solve(&module, SolverOptions::default());
    let func = Func::new(0);
    assert!(solver.lattice_value(func, param(&module, func, 3, 0)).is_overdefined());
}

#[test]
fn join_with_identical_constants() {
    let module = join(7, 7);
    let solver = solve(&module, SolverOptions::default());
    let func = Func::new(0);
    assert_eq!(solver.lattice_value(func, param(&module, func, 3, 0)), &i32_const(7));
}

#[test]
fn wide_joins_give_up() {
    let module = join(7, 7);
    let opts = SolverOptions {
        max_join_fan_in: 1,
        ..SolverOptions::default()
    };
    let solver = solve(&module, opts);
    let func = Func::new(0);
    assert!(solver.lattice_value(func, param(&module, func, 3, 0)).is_overdefined());
}

#[test]
fn undefined_condition_is_forced() {
    let module = parse(
        "func @f0 \"f\" external () -> i32 {
b0():
  x: i1 = and undef i1, undef i1
  if x, b1(), b2()
b1():
  return i32 1
b2():
  return i32 2
}
",
    );
    let func = Func::new(0);
    let mut solver = Solver::for_function(&module, func, SolverOptions::default());
    solver.solve();
    assert!(!solver.is_block_executable(func, Block::new(1)));
    assert!(!solver.is_block_executable(func, Block::new(2)));

    solver.run_to_fixed_point(&[func]);
    let reached = [1, 2]
        .iter()
        .filter(|&&b| solver.is_block_executable(func, Block::new(b)))
        .count();
    assert_eq!(reached, 1);
    assert!(!solver.lattice_value(func, inst(&module, func, 0, 0)).is_undefined());
}

#[test]
fn and_with_zero_short_circuits() {
    let module = parse(
        "func @f0 \"f\" external (i32) -> i32 {
b0(a: i32):
  x: i32 = and a, i32 0
  y: i32 = or i32 -1, a
  return x
}
",
    );
    let solver = solve(&module, SolverOptions::default());
    let func = Func::new(0);
    assert!(solver.lattice_value(func, param(&module, func, 0, 0)).is_overdefined());
    assert_eq!(solver.lattice_value(func, inst(&module, func, 0, 0)), &i32_const(0));
    assert_eq!(
        solver.lattice_value(func, inst(&module, func, 0, 1)),
        &i32_const(u32::MAX as u64)
    );
}

#[test]
fn operator_over_paired_params() {
    // p and q are each overdefined, but p + q is 3 along both edges.
    let module = parse(
        "func @f0 \"f\" external (i1) -> i32 {
b0(c: i1):
  if c, b1(), b2()
b1():
  br b3(i32 1, i32 2)
b2():
  br b3(i32 2, i32 1)
b3(p: i32, q: i32):
  r: i32 = add p, q
  return r
}
",
    );
    let solver = solve(&module, SolverOptions::default());
    let func = Func::new(0);
    assert!(solver.lattice_value(func, param(&module, func, 3, 0)).is_overdefined());
    assert!(solver.lattice_value(func, param(&module, func, 3, 1)).is_overdefined());
    assert_eq!(solver.lattice_value(func, inst(&module, func, 3, 0)), &i32_const(3));
}

#[test]
fn constant_select_terminator() {
    let module = parse(
        "func @f0 \"f\" external () -> i32 {
b0():
  select i32 1, [b1(), b2()], b3()
b1():
  return i32 1
b2():
  return i32 2
b3():
  return i32 3
}
",
    );
    let solver = solve(&module, SolverOptions::default());
    let func = Func::new(0);
    // Successor 0 is the default; target i is successor i + 1.
    assert!(solver.is_edge_feasible(func, Block::new(0), 2));
    assert!(solver.is_block_executable(func, Block::new(2)));
    assert!(!solver.is_block_executable(func, Block::new(1)));
    assert!(!solver.is_block_executable(func, Block::new(3)));
}

const IPO: &str = "global @g0: i32 = i32 3 internal mutable
global @g1: i32 = i32 3 external mutable
func @f0 \"main\" external (i32) -> i32 {
b0(a: i32):
  x: i32 = call @f1 i32 5
  y: i32 = call @f1 i32 5
  s0: void = store @g0, i32 3
  s1: void = store @g1, i32 3
  u: i32 = load @g0
  v: i32 = load @g1
  return x
}
func @f1 \"helper\" internal (i32) -> i32 {
b0(n: i32):
  m: i32 = mul n, i32 2
  return m
}
";

#[test]
fn interprocedural_arguments_returns_and_globals() {
    let module = parse(IPO);
    let main = Func::new(0);
    let helper = Func::new(1);
    let mut solver = Solver::for_module(&module, SolverOptions::default());
    solver.run_to_fixed_point(&[main, helper]);

    assert!(solver.is_argument_tracked(helper));
    assert!(!solver.is_argument_tracked(main));
    assert_eq!(solver.lattice_value(helper, param(&module, helper, 0, 0)), &i32_const(5));
    assert_eq!(solver.tracked_return_values()[&helper], i32_const(10));
    assert_eq!(solver.lattice_value(main, inst(&module, main, 0, 0)), &i32_const(10));
    assert_eq!(solver.lattice_value(main, inst(&module, main, 0, 1)), &i32_const(10));

    assert_eq!(solver.tracked_globals()[&Global::new(0)], i32_const(3));
    assert!(!solver.tracked_globals().contains_key(&Global::new(1)));
    assert_eq!(solver.lattice_value(main, inst(&module, main, 0, 4)), &i32_const(3));
    assert!(solver.lattice_value(main, inst(&module, main, 0, 5)).is_overdefined());
}

#[test]
fn per_function_mode_ignores_callees() {
    let module = parse(IPO);
    let solver = solve(&module, SolverOptions::default());
    let main = Func::new(0);
    assert!(solver.lattice_value(main, inst(&module, main, 0, 0)).is_overdefined());
    assert!(solver.lattice_value(main, inst(&module, main, 0, 4)).is_overdefined());
}

#[test]
fn disabled_tracking_is_respected() {
    let module = parse(IPO);
    let opts = SolverOptions {
        track_globals: false,
        track_functions: false,
        ..SolverOptions::default()
    };
    let solver = Solver::for_module(&module, opts);
    assert!(solver.tracked_globals().is_empty());
    assert!(!solver.is_argument_tracked(Func::new(1)));
}
