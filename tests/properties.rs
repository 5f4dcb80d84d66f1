//! Solver properties checked over generated modules.

use sccp::entity::EntityRef;
use sccp::fuzzing::generate_module;
use sccp::pass::{LatticeValue, Solver, SolverOptions};
use sccp::passes::{sccp as sccp_pass, Fuel};
use sccp::{Block, Constant, Func, InterpContext, InterpResult, Module, Type, Value};
use std::collections::{BTreeMap, BTreeSet};

const SEEDS: u64 = 64;
const ARGS: &[u64] = &[0, 1, 7, u32::MAX as u64];

/// xorshift64*, enough to spread seeds over the generator's choices.
fn bytes(seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;
    (0..2048)
        .map(|_| {
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            (state.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 56) as u8
        })
        .collect()
}

fn modules() -> impl Iterator<Item = (u64, Module)> {
    (0..SEEDS).filter_map(|seed| generate_module(&bytes(seed)).ok().map(|m| (seed, m)))
}

fn bodies(module: &Module) -> Vec<Func> {
    module.bodies().map(|(func, _)| func).collect()
}

#[derive(Debug, PartialEq, Eq)]
struct Snapshot {
    values: BTreeMap<(Func, Value), LatticeValue>,
    fields: BTreeMap<(Func, Value, u32), LatticeValue>,
    blocks: BTreeSet<(Func, Block)>,
    edges: BTreeSet<(Func, Block, usize)>,
}

fn snapshot(solver: &Solver) -> Snapshot {
    Snapshot {
        values: solver.lattice_values().map(|(k, v)| (k, v.clone())).collect(),
        fields: solver
            .struct_lattice_values()
            .map(|(k, v)| (k, v.clone()))
            .collect(),
        blocks: solver.executable_blocks().collect(),
        edges: solver.feasible_edges().collect(),
    }
}

fn solved(module: &Module) -> Solver<'_> {
    let mut solver = Solver::for_module(module, SolverOptions::default());
    solver.run_to_fixed_point(&bodies(module)[..]);
    solver
}

#[test]
fn lattice_values_only_move_down() {
    for (seed, module) in modules() {
        let funcs = bodies(&module);
        let mut solver = Solver::for_module(&module, SolverOptions::default());
        let mut before = snapshot(&solver);
        loop {
            solver.solve();
            let after = snapshot(&solver);
            for (key, old) in &before.values {
                let new = &after.values[key];
                assert!(new.height() >= old.height(), "seed {}: {:?} rose", seed, key);
                if old.is_constant() && new.is_constant() {
                    assert_eq!(old.constant(), new.constant(), "seed {}: {:?}", seed, key);
                }
            }
            for (key, old) in &before.fields {
                assert!(after.fields[key].height() >= old.height(), "seed {}", seed);
            }
            assert!(before.blocks.is_subset(&after.blocks));
            assert!(before.edges.is_subset(&after.edges));
            before = after;

            let mut resolved = false;
            for &func in &funcs {
                resolved |= solver.resolved_undefs_in(func);
            }
            if !resolved {
                break;
            }
        }
    }
}

#[test]
fn executable_blocks_are_reached_through_feasible_edges() {
    for (seed, module) in modules() {
        let solver = solved(&module);
        for (func, block, index) in solver.feasible_edges() {
            assert!(solver.is_block_executable(func, block), "seed {}", seed);
            let body = module.funcs[func].body().unwrap();
            assert!(index < body.blocks[block].succs.len(), "seed {}", seed);
        }
        for (func, block) in solver.executable_blocks() {
            let body = module.funcs[func].body().unwrap();
            if block == body.entry {
                continue;
            }
            let def = &body.blocks[block];
            let reached = def
                .preds
                .iter()
                .zip(def.pos_in_pred_succ.iter())
                .any(|(&pred, &index)| solver.is_edge_feasible(func, pred, index));
            assert!(reached, "seed {}: {} {} has no feasible way in", seed, func, block);
        }
    }
}

#[test]
fn solutions_agree_with_execution() {
    for (seed, module) in modules() {
        let solver = solved(&module);
        for &arg in ARGS {
            let mut ctx = InterpContext::new(&module).unwrap().with_trace();
            ctx.fuel = 5000;
            ctx.call(&module, Func::new(0), &[Constant::int(Type::I32, arg)]);
            let trace = ctx.trace.take().unwrap();
            for &(func, block) in &trace.blocks {
                assert!(solver.is_block_executable(func, block), "seed {}", seed);
            }
            for &(func, block, index) in &trace.edges {
                assert!(solver.is_edge_feasible(func, block, index), "seed {}", seed);
            }
            for (func, value, concrete) in &trace.values {
                let lv = solver.lattice_value(*func, *value);
                assert!(!lv.is_undefined(), "seed {}: {} in {}", seed, value, func);
                if let Some(c) = lv.as_constant() {
                    assert_eq!(c, concrete, "seed {}: {} in {}", seed, value, func);
                }
            }
        }
    }
}

#[test]
fn solving_twice_gives_the_same_answer() {
    for (seed, module) in modules() {
        let first = snapshot(&solved(&module));
        let second = snapshot(&solved(&module));
        assert_eq!(first, second, "seed {}", seed);

        for func in bodies(&module) {
            let opts = SolverOptions::default();
            let mut a = Solver::for_function(&module, func, opts);
            a.run_to_fixed_point(&[func]);
            let mut b = Solver::for_function(&module, func, opts);
            b.run_to_fixed_point(&[func]);
            assert_eq!(snapshot(&a), snapshot(&b), "seed {}", seed);
        }
    }
}

#[test]
fn rewritten_modules_behave_the_same() {
    for (seed, module) in modules() {
        let mut per_func = module.clone();
        sccp_pass::run_all(&mut per_func, &SolverOptions::default());
        let mut whole = module.clone();
        sccp_pass::run_module(&mut whole, &SolverOptions::default(), &mut Fuel::infinite());

        for &arg in ARGS {
            let args = [Constant::int(Type::I32, arg)];
            let mut ctx = InterpContext::new(&module).unwrap();
            ctx.fuel = 5000;
            let expected = ctx.call(&module, Func::new(0), &args[..]);
            if !matches!(expected, InterpResult::Ok(_)) {
                continue;
            }
            for opt in [&per_func, &whole] {
                let mut opt_ctx = InterpContext::new(opt).unwrap();
                opt_ctx.fuel = 10000;
                let result = opt_ctx.call(opt, Func::new(0), &args[..]);
                assert_eq!(expected, result, "seed {} arg {}:\n{}", seed, arg, opt.display());
                assert_eq!(ctx.globals, opt_ctx.globals, "seed {} arg {}", seed, arg);
            }
        }
    }
}
