//! SCCP command-line tool.

use anyhow::{bail, Result};
use log::debug;
use sccp::entity::EntityRef;
use sccp::pass::{Solver, SolverOptions};
use sccp::passes::{sccp as sccp_pass, Fuel};
use sccp::{Func, FunctionBody, Module};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "sccp-util", about = "Sparse conditional constant propagation utility.")]
struct Options {
    #[structopt(short, long)]
    debug: bool,

    /// Largest number of incoming edges a block param is joined over.
    #[structopt(long, default_value = "64")]
    max_join_fan_in: usize,

    #[structopt(long)]
    no_track_globals: bool,

    #[structopt(long)]
    no_track_functions: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    #[structopt(name = "print-ir", about = "Parse textual IR and print it back")]
    PrintIR {
        #[structopt(help = "IR file to parse")]
        file: PathBuf,
    },
    #[structopt(name = "solve", about = "Print reachability and lattice values")]
    Solve {
        #[structopt(help = "IR file to parse")]
        file: PathBuf,
        #[structopt(long, help = "Solve the whole module at once")]
        module: bool,
        #[structopt(long, help = "Only this function (index)")]
        func: Option<usize>,
    },
    #[structopt(name = "opt", about = "Rewrite the module and print the result")]
    Opt {
        #[structopt(help = "IR file to parse")]
        file: PathBuf,
        #[structopt(long, help = "Solve the whole module at once")]
        module: bool,
        #[structopt(long, help = "Stop after this many rewrites")]
        fuel: Option<u64>,
    },
}

fn load(file: &PathBuf) -> Result<Module> {
    let text = std::fs::read_to_string(file)?;
    debug!("Loaded {} bytes of IR text", text.len());
    Module::from_text(&text)
}

fn print_solution(solver: &Solver, func: Func, body: &FunctionBody) {
    println!("{}:", func);
    let names = body.value_names();
    for (block, def) in body.blocks.entries() {
        if !solver.is_block_executable(func, block) {
            println!("  {}: dead", block);
            continue;
        }
        let feasible: Vec<String> = (0..def.terminator.num_targets())
            .filter(|&index| solver.is_edge_feasible(func, block, index))
            .map(|index| format!("{}", def.succs[index]))
            .collect();
        println!("  {}: executable, feasible [{}]", block, feasible.join(", "));
        let values = def.params.iter().map(|&(_, param)| param).chain(def.insts.iter().copied());
        for value in values {
            let ty = body.value_ty(value);
            let name = names.get(&body.resolve_alias(value)).copied().unwrap_or(value);
            match ty.fields() {
                Some(fields) => {
                    for index in 0..fields.len() as u32 {
                        println!(
                            "    {}.{} = {}",
                            name,
                            index,
                            solver.struct_lattice_value(func, value, index)
                        );
                    }
                }
                None if ty.is_void() => {}
                None => println!("    {} = {}", name, solver.lattice_value(func, value)),
            }
        }
    }
}

fn main() -> Result<()> {
    let opts = Options::from_args();

    let mut logger = env_logger::Builder::from_default_env();
    if opts.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    let _ = logger.try_init();

    let solver_opts = SolverOptions {
        max_join_fan_in: opts.max_join_fan_in,
        track_globals: !opts.no_track_globals,
        track_functions: !opts.no_track_functions,
    };

    match opts.command {
        Command::PrintIR { file } => {
            let module = load(&file)?;
            print!("{}", module.display());
        }
        Command::Solve { file, module: whole, func } => {
            let module = load(&file)?;
            let funcs: Vec<Func> = match func {
                Some(index) => {
                    if index >= module.funcs.len() || module.funcs[Func::new(index)].body().is_none()
                    {
                        bail!("no function body with index {}", index);
                    }
                    vec![Func::new(index)]
                }
                None => module.bodies().map(|(func, _)| func).collect(),
            };
            if whole {
                let all: Vec<Func> = module.bodies().map(|(func, _)| func).collect();
                let mut solver = Solver::for_module(&module, solver_opts);
                solver.run_to_fixed_point(&all[..]);
                for &func in &funcs {
                    if let Some(body) = module.funcs[func].body() {
                        print_solution(&solver, func, body);
                    }
                }
                let mut globals: Vec<_> = solver.tracked_globals().iter().collect();
                globals.sort_by_key(|(global, _)| **global);
                for (global, lv) in globals {
                    println!("global {} = {}", global, lv);
                }
            } else {
                for &func in &funcs {
                    let mut solver = Solver::for_function(&module, func, solver_opts);
                    solver.run_to_fixed_point(&[func]);
                    if let Some(body) = module.funcs[func].body() {
                        print_solution(&solver, func, body);
                    }
                }
            }
        }
        Command::Opt {
            file,
            module: whole,
            fuel,
        } => {
            let mut module = load(&file)?;
            let mut fuel = match fuel {
                Some(limit) => Fuel::limited(limit),
                None => Fuel::infinite(),
            };
            let stats = if whole {
                sccp_pass::run_module(&mut module, &solver_opts, &mut fuel)
            } else if fuel.remaining == u64::MAX {
                sccp_pass::run_all(&mut module, &solver_opts)
            } else {
                let funcs: Vec<Func> = module.bodies().map(|(func, _)| func).collect();
                let mut stats = sccp_pass::SccpStats::default();
                for func in funcs {
                    stats += sccp_pass::run(&mut module, func, &solver_opts, &mut fuel);
                }
                stats
            };
            print!("{}", module.display());
            eprintln!("{}", stats);
            debug!("{} rewrite(s) attempted", fuel.consumed);
        }
    }

    Ok(())
}
