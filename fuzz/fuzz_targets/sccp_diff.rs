#![no_main]
use libfuzzer_sys::fuzz_target;

use sccp::entity::EntityRef;
use sccp::passes::{sccp as sccp_pass, Fuel};
use sccp::pass::{Solver, SolverOptions};
use sccp::{Constant, Func, InterpContext, InterpResult, Type};

fuzz_target!(|data: &[u8]| {
    let _ = env_logger::try_init();
    let (module, arg) = match data.split_first() {
        Some((&arg, rest)) => match sccp::fuzzing::generate_module(rest) {
            Ok(module) => (module, arg as u64),
            Err(_) => return,
        },
        None => return,
    };
    log::debug!("input module:\n{}", module.display());

    let main = Func::new(0);
    let args = [Constant::int(Type::I32, arg)];

    let mut orig_ctx = InterpContext::new(&module).unwrap().with_trace();
    orig_ctx.fuel = 10000;
    let orig_result = orig_ctx.call(&module, main, &args[..]);

    // Everything the unoptimized run did must agree with the solver.
    let funcs: Vec<Func> = module.bodies().map(|(func, _)| func).collect();
    let mut solver = Solver::for_module(&module, SolverOptions::default());
    solver.run_to_fixed_point(&funcs[..]);
    let trace = orig_ctx.trace.take().unwrap();
    for &(func, block) in &trace.blocks {
        assert!(
            solver.is_block_executable(func, block),
            "{} {} ran but is not executable",
            func,
            block
        );
    }
    for &(func, block, index) in &trace.edges {
        assert!(solver.is_edge_feasible(func, block, index));
    }
    for (func, value, concrete) in &trace.values {
        let lv = solver.lattice_value(*func, *value);
        assert!(!lv.is_undefined(), "{} in {} ran but is undefined", value, func);
        if let Some(c) = lv.as_constant() {
            assert_eq!(c, concrete, "{} in {} folded wrongly", value, func);
        }
    }
    drop(solver);

    match orig_result {
        InterpResult::OutOfFuel => {
            log::trace!("Rejecting due to timeout in unoptimized run");
            return;
        }
        InterpResult::Trap(..) => {
            log::trace!("Rejecting due to trap in unoptimized run");
            return;
        }
        InterpResult::Ok(_) => {}
    }

    let mut opt_module = module.clone();
    sccp_pass::run_module(&mut opt_module, &SolverOptions::default(), &mut Fuel::infinite());
    log::debug!("optimized module:\n{}", opt_module.display());

    let mut opt_ctx = InterpContext::new(&opt_module).unwrap();
    // Allow a little leeway for the optimized module to not actually be faster.
    opt_ctx.fuel = 20000;
    let opt_result = opt_ctx.call(&opt_module, main, &args[..]);

    assert_eq!(orig_result, opt_result);
    assert_eq!(orig_ctx.globals, opt_ctx.globals);
});
