//! Rewrite function bodies with the results of the SCCP solver.
//!
//! The solver borrows the module immutably, so each function's results
//! are first collected into a `FuncPlan` and applied once the solver
//! is gone. Applying a plan folds branches with a single feasible
//! successor, empties blocks that never execute, replaces values known
//! to be constant (or never computed) by literals, and drops block
//! params that always receive the same constant.

use super::{resolve_aliases, Fuel};
use crate::ir::*;
use crate::pass::{LatticeValue, Solver, SolverOptions};
use crate::Operator;
use fxhash::{FxHashMap, FxHashSet};
use rayon::prelude::*;

/// Counts of what a run changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SccpStats {
    /// Instructions deleted because their result is known, or because
    /// their block never executes.
    pub insts_removed: usize,
    pub dead_blocks: usize,
    /// Block params and formal parameters replaced by a constant.
    pub args_elided: usize,
    pub globals_folded: usize,
    pub returns_zapped: usize,
}

impl std::ops::AddAssign for SccpStats {
    fn add_assign(&mut self, other: SccpStats) {
        self.insts_removed += other.insts_removed;
        self.dead_blocks += other.dead_blocks;
        self.args_elided += other.args_elided;
        self.globals_folded += other.globals_folded;
        self.returns_zapped += other.returns_zapped;
    }
}

impl std::fmt::Display for SccpStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} inst(s) removed, {} dead block(s), {} arg(s) elided, {} global(s) folded, {} return(s) zapped",
            self.insts_removed,
            self.dead_blocks,
            self.args_elided,
            self.globals_folded,
            self.returns_zapped
        )
    }
}

/// Everything the rewrite needs to know about one function.
#[derive(Clone, Debug)]
struct FuncPlan {
    func: Func,
    executable: FxHashSet<Block>,
    /// Terminators to replace: by a branch along the given successor,
    /// or by `unreachable` if no successor is feasible.
    branch_folds: Vec<(Block, Option<usize>)>,
    /// Params and instructions of executable blocks with a known value.
    known: FxHashMap<Value, Constant>,
}

/// The literal a value can be replaced with: its constant, or `undef`
/// if it was never computed. Struct values qualify when none of their
/// fields is overdefined.
fn known_value(solver: &Solver, func: Func, body: &FunctionBody, value: Value) -> Option<Constant> {
    let ty = body.value_ty(value);
    if ty.is_void() {
        return None;
    }
    if let Some(field_tys) = ty.fields() {
        let mut fields = Vec::with_capacity(field_tys.len());
        let mut all_undef = true;
        for (index, field_ty) in field_tys.iter().enumerate() {
            match solver.struct_lattice_value(func, value, index as u32) {
                LatticeValue::Overdefined => return None,
                LatticeValue::Undefined => fields.push(Constant::Undef(field_ty.clone())),
                LatticeValue::Constant(c) | LatticeValue::ForcedConstant(c) => {
                    all_undef = false;
                    fields.push(c.clone());
                }
            }
        }
        return Some(if all_undef {
            Constant::Undef(ty)
        } else {
            Constant::Struct(fields)
        });
    }
    match solver.lattice_value(func, value) {
        LatticeValue::Overdefined => None,
        LatticeValue::Undefined => Some(Constant::Undef(ty)),
        LatticeValue::Constant(c) | LatticeValue::ForcedConstant(c) => Some(c.clone()),
    }
}

impl FuncPlan {
    fn collect(solver: &Solver, func: Func) -> FuncPlan {
        let module = solver.module();
        let body = match module.funcs[func].body() {
            Some(body) => body,
            None => panic!("function {} has no body", func),
        };
        let mut plan = FuncPlan {
            func,
            executable: FxHashSet::default(),
            branch_folds: vec![],
            known: FxHashMap::default(),
        };

        for (block, def) in body.blocks.entries() {
            if !solver.is_block_executable(func, block) {
                continue;
            }
            plan.executable.insert(block);

            let num_targets = def.terminator.num_targets();
            let feasible: Vec<usize> = (0..num_targets)
                .filter(|&index| solver.is_edge_feasible(func, block, index))
                .collect();
            match feasible.len() {
                0 if num_targets > 0 => plan.branch_folds.push((block, None)),
                1 if num_targets > 1 => plan.branch_folds.push((block, Some(feasible[0]))),
                _ => {}
            }

            for &(_, param) in &def.params {
                if let Some(c) = known_value(solver, func, body, param) {
                    plan.known.insert(param, c);
                }
            }
            for &inst in &def.insts {
                if let Some(c) = known_value(solver, func, body, inst) {
                    plan.known.insert(inst, c);
                }
            }
        }
        plan
    }

    /// Rewrite the function. Returns `false` if fuel ran out before
    /// every rewrite was applied.
    fn apply(&self, module: &mut Module, fuel: &mut Fuel, stats: &mut SccpStats) -> bool {
        let func = self.func;
        let body = match module.funcs[func].body_mut() {
            Some(body) => body,
            None => panic!("function {} has no body", func),
        };
        let mut complete = true;

        for &(block, taken) in &self.branch_folds {
            let new_term = match taken {
                Some(index) => match body.blocks[block].terminator.target(index) {
                    Some(target) => Terminator::Br {
                        target: target.clone(),
                    },
                    None => continue,
                },
                None => Terminator::Unreachable,
            };
            if !fuel.consume() {
                complete = false;
                continue;
            }
            log::trace!("sccp: {} {}: folding terminator to {}", func, block, new_term);
            body.blocks[block].terminator = new_term;
        }

        for block in body.blocks.iter() {
            if self.executable.contains(&block) {
                continue;
            }
            let def = &body.blocks[block];
            if def.insts.is_empty() && def.terminator == Terminator::Unreachable {
                continue;
            }
            if !fuel.consume() {
                complete = false;
                continue;
            }
            log::trace!("sccp: {} {}: never executes", func, block);
            stats.dead_blocks += 1;
            stats.insts_removed += body.blocks[block].insts.len();
            body.blocks[block].insts.clear();
            body.blocks[block].terminator = Terminator::Unreachable;
        }

        body.recompute_edges();

        // Values that stay defined but whose uses read the literal.
        let mut rewritten_uses: FxHashMap<Value, Value> = FxHashMap::default();

        for block in body.blocks.iter() {
            if block == body.entry || !self.executable.contains(&block) {
                continue;
            }
            let mut deleted = vec![];
            for (index, &(_, param)) in body.blocks[block].params.iter().enumerate() {
                if !self.known.contains_key(&param) {
                    continue;
                }
                if fuel.consume() {
                    deleted.push(index);
                } else {
                    complete = false;
                }
            }
            if deleted.is_empty() {
                continue;
            }

            for &index in &deleted {
                let param = body.blocks[block].params[index].1;
                let c = body.add_const(self.known[&param].clone());
                log::trace!("sccp: {} {}: param {} is {}", func, block, param, c);
                body.set_alias(param, c);
                stats.args_elided += 1;
            }
            delete_indices(&mut body.blocks[block].params, &deleted[..]);
            for i in 0..body.blocks[block].preds.len() {
                let pred = body.blocks[block].preds[i];
                let pos = body.blocks[block].pos_in_pred_succ[i];
                body.blocks[pred].terminator.update_target(pos, |target| {
                    delete_indices(&mut target.args, &deleted[..]);
                });
            }
            for (i, (ty, param)) in body.blocks[block].params.clone().into_iter().enumerate() {
                body.values[param] = ValueDef::BlockParam(block, i as u32, ty);
            }
        }

        for block in body.blocks.iter() {
            if !self.executable.contains(&block) {
                continue;
            }
            let insts = std::mem::take(&mut body.blocks[block].insts);
            let mut kept = Vec::with_capacity(insts.len());
            for inst in insts {
                let c = match self.known.get(&inst) {
                    Some(c) => c.clone(),
                    None => {
                        kept.push(inst);
                        continue;
                    }
                };
                if !fuel.consume() {
                    complete = false;
                    kept.push(inst);
                    continue;
                }
                let side_effects = match &body.values[inst] {
                    ValueDef::Operator(op, ..) => op.has_side_effects(),
                    _ => false,
                };
                let c = body.add_const(c);
                if side_effects {
                    rewritten_uses.insert(inst, c);
                    kept.push(inst);
                } else {
                    log::trace!("sccp: {} {}: {} is {}", func, block, inst, c);
                    body.set_alias(inst, c);
                    stats.insts_removed += 1;
                }
            }
            body.blocks[block].insts = kept;
        }

        if self.executable.contains(&body.entry) {
            let params: Vec<Value> = body.params().collect();
            for param in params {
                if let Some(c) = self.known.get(&param) {
                    if !fuel.consume() {
                        complete = false;
                        continue;
                    }
                    let c = body.add_const(c.clone());
                    rewritten_uses.insert(param, c);
                    stats.args_elided += 1;
                }
            }
        }

        resolve_aliases::run(body);
        if !rewritten_uses.is_empty() {
            let rewrite = |value: &mut Value| {
                if let Some(&c) = rewritten_uses.get(value) {
                    *value = c;
                }
            };
            for value in body.values.iter() {
                body.values[value].update_uses(rewrite);
            }
            for block in body.blocks.values_mut() {
                block.terminator.update_uses(rewrite);
            }
        }

        log::trace!("sccp: {} rewritten:\n{}", func, body.display_verbose("| "));
        complete
    }
}

fn delete_indices<T>(vec: &mut Vec<T>, indices: &[usize]) {
    let mut i = 0;
    vec.retain(|_| {
        let keep = indices.binary_search(&i).is_err();
        i += 1;
        keep
    });
}

/// Solve and rewrite one function on its own.
pub fn run(module: &mut Module, func: Func, opts: &SolverOptions, fuel: &mut Fuel) -> SccpStats {
    let mut stats = SccpStats::default();
    if module.funcs[func].body().is_none() {
        return stats;
    }
    let plan = {
        let mut solver = Solver::for_function(module, func, *opts);
        solver.run_to_fixed_point(&[func]);
        FuncPlan::collect(&solver, func)
    };
    plan.apply(module, fuel, &mut stats);
    log::debug!("sccp: {}: {}", func, stats);
    stats
}

/// Solve every function independently and in parallel, then rewrite
/// them one after another.
pub fn run_all(module: &mut Module, opts: &SolverOptions) -> SccpStats {
    let plans = {
        let module = &*module;
        module
            .bodies()
            .map(|(func, _)| func)
            .collect::<Vec<_>>()
            .par_iter()
            .map(|&func| {
                let mut solver = Solver::for_function(module, func, *opts);
                solver.run_to_fixed_point(&[func]);
                FuncPlan::collect(&solver, func)
            })
            .collect::<Vec<_>>()
    };
    let mut stats = SccpStats::default();
    let mut fuel = Fuel::infinite();
    for plan in &plans {
        plan.apply(module, &mut fuel, &mut stats);
    }
    log::debug!("sccp: all functions: {}", stats);
    stats
}

/// What whole-module solving allows beyond per-function rewrites.
struct ModulePlan {
    /// Argument-tracked functions whose callers already see the
    /// returned value.
    zap_returns: Vec<Func>,
    globals: Vec<(Global, Constant)>,
}

/// Solve the whole module at once, tracking values across calls and
/// through internal globals, and rewrite every function.
pub fn run_module(module: &mut Module, opts: &SolverOptions, fuel: &mut Fuel) -> SccpStats {
    let (plans, extra) = {
        let mut solver = Solver::for_module(module, *opts);
        let funcs: Vec<Func> = module.bodies().map(|(func, _)| func).collect();
        solver.run_to_fixed_point(&funcs[..]);
        let plans: Vec<FuncPlan> = funcs
            .iter()
            .map(|&func| FuncPlan::collect(&solver, func))
            .collect();

        let mut zap_returns = vec![];
        for &func in &funcs {
            if !solver.is_argument_tracked(func) {
                continue;
            }
            let known = match solver.tracked_return_values().get(&func) {
                Some(lv) => !lv.is_overdefined(),
                None => {
                    let n = module.funcs[func]
                        .body()
                        .and_then(|body| body.ret.fields().map(|fields| fields.len()))
                        .unwrap_or(0);
                    n > 0
                        && (0..n as u32).all(|index| {
                            solver
                                .tracked_struct_return_values()
                                .get(&(func, index))
                                .map_or(false, |lv| !lv.is_overdefined())
                        })
                }
            };
            if known {
                zap_returns.push(func);
            }
        }

        let mut globals: Vec<(Global, Constant)> = solver
            .tracked_globals()
            .iter()
            .filter(|(_, lv)| !lv.is_overdefined())
            .map(|(&global, lv)| {
                let c = match lv.as_constant() {
                    Some(c) => c.clone(),
                    None => Constant::Undef(module.globals[global].ty.clone()),
                };
                (global, c)
            })
            .collect();
        globals.sort();

        (plans, ModulePlan { zap_returns, globals })
    };

    let mut stats = SccpStats::default();
    let mut complete = true;
    for plan in &plans {
        complete &= plan.apply(module, fuel, &mut stats);
    }
    if !complete {
        log::debug!("sccp: out of fuel; skipping return and global rewrites");
        log::debug!("sccp: module: {}", stats);
        return stats;
    }

    for &func in &extra.zap_returns {
        let body = match module.funcs[func].body_mut() {
            Some(body) => body,
            None => continue,
        };
        let ret = body.ret.clone();
        for block in body.blocks.iter() {
            let value = match &body.blocks[block].terminator {
                Terminator::Return { value: Some(value) } => *value,
                _ => continue,
            };
            if body.const_of(value).map_or(false, |c| c.is_undef()) {
                continue;
            }
            let undef = body.undef(ret.clone());
            log::trace!("sccp: {} {}: return value is never used", func, block);
            body.blocks[block].terminator = Terminator::Return { value: Some(undef) };
            stats.returns_zapped += 1;
        }
    }

    for (global, c) in extra.globals {
        for decl in module.funcs.values_mut() {
            let body = match decl.body_mut() {
                Some(body) => body,
                None => continue,
            };
            for block in body.blocks.iter() {
                let insts = std::mem::take(&mut body.blocks[block].insts);
                let before = insts.len();
                let kept: Vec<Value> = insts
                    .into_iter()
                    .filter(|&inst| !is_store_to(body, inst, global))
                    .collect();
                stats.insts_removed += before - kept.len();
                body.blocks[block].insts = kept;
            }
        }
        log::trace!("sccp: global {} is always {}", global, c);
        let data = &mut module.globals[global];
        data.mutable = false;
        data.init = Some(c);
        stats.globals_folded += 1;
    }

    log::debug!("sccp: module: {}", stats);
    stats
}

fn is_store_to(body: &FunctionBody, inst: Value, global: Global) -> bool {
    match &body.values[body.resolve_alias(inst)] {
        ValueDef::Operator(Operator::Store { .. }, args, _) => {
            body.const_of(args[0]) == Some(&Constant::GlobalAddr(global))
        }
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::EntityRef;
    use crate::{InterpContext, InterpResult};

    fn parse(text: &str) -> Module {
        Module::from_text(text).unwrap()
    }

    fn returned(body: &FunctionBody, block: Block) -> Option<Constant> {
        match &body.blocks[block].terminator {
            Terminator::Return { value: Some(value) } => body.const_of(*value).cloned(),
            _ => None,
        }
    }

    const DIAMOND: &str = "func @f0 \"f\" external (i32) -> i32 {
b0(a: i32):
  c: i1 = lt_s i32 1, i32 2
  if c, b1(), b2()
b1():
  x: i32 = add a, i32 1
  br b3(i32 7, x)
b2():
  y: i32 = mul a, i32 3
  br b3(i32 7, y)
b3(p: i32, q: i32):
  r: i32 = add p, q
  return r
}
";

    #[test]
    fn dead_branch_is_folded_away() {
        let mut module = parse(DIAMOND);
        let func = Func::new(0);
        let stats = run(&mut module, func, &SolverOptions::default(), &mut Fuel::infinite());
        let body = module.funcs[func].body().unwrap();

        assert_eq!(stats.dead_blocks, 1);
        // c and y.
        assert_eq!(stats.insts_removed, 2);
        assert_eq!(stats.args_elided, 1);
        assert!(matches!(
            body.blocks[body.entry].terminator,
            Terminator::Br { .. }
        ));
        let b2 = Block::new(2);
        assert!(body.blocks[b2].insts.is_empty());
        assert_eq!(body.blocks[b2].terminator, Terminator::Unreachable);
        assert!(body.blocks[b2].preds.is_empty());

        let b3 = Block::new(3);
        assert_eq!(body.blocks[b3].params.len(), 1);
        let q = body.blocks[b3].params[0].1;
        assert!(matches!(body.values[q], ValueDef::BlockParam(_, 0, _)));
        match &body.blocks[Block::new(1)].terminator {
            Terminator::Br { target } => assert_eq!(target.args.len(), 1),
            term => panic!("unexpected terminator {}", term),
        }
        assert_eq!(body.blocks[b3].insts.len(), 1);
    }

    #[test]
    fn side_effects_stay() {
        let mut module = parse(
            "global @g0: i32 = i32 0 external mutable
func @f0 \"f\" external () -> i32 {
b0():
  x: i32 = call @f1
  s0: void = store @g0, x
  y: i32 = add x, i32 1
  return y
}
func @f1 \"g\" internal () -> i32 {
b0():
  return i32 4
}
",
        );
        let opts = SolverOptions::default();
        let stats = run_module(&mut module, &opts, &mut Fuel::infinite());
        let body = module.funcs[Func::new(0)].body().unwrap();
        assert_eq!(body.blocks[body.entry].insts.len(), 2);
        assert_eq!(returned(body, body.entry), Some(Constant::int(Type::I32, 5)));
        let store = body.blocks[body.entry].insts[1];
        match &body.values[store] {
            ValueDef::Operator(Operator::Store { .. }, args, _) => {
                assert_eq!(body.const_of(args[1]), Some(&Constant::int(Type::I32, 4)));
            }
            def => panic!("unexpected def {:?}", def),
        }
        // f1 is only called directly; its callers no longer need the value.
        assert_eq!(stats.returns_zapped, 1);
        let callee = module.funcs[Func::new(1)].body().unwrap();
        assert_eq!(returned(callee, callee.entry), Some(Constant::Undef(Type::I32)));
    }

    #[test]
    fn stored_constant_becomes_initializer() {
        let mut module = parse(
            "global @g0: i32 = i32 3 internal mutable
func @f0 \"main\" external (i1) -> i32 {
b0(c: i1):
  if c, b1(), b2()
b1():
  s0: void = store @g0, i32 3
  br b2()
b2():
  x: i32 = load @g0
  return x
}
",
        );
        let stats = run_module(&mut module, &SolverOptions::default(), &mut Fuel::infinite());
        assert_eq!(stats.globals_folded, 1);
        let data = &module.globals[Global::new(0)];
        assert!(!data.mutable);
        assert_eq!(data.init, Some(Constant::int(Type::I32, 3)));
        let body = module.funcs[Func::new(0)].body().unwrap();
        assert!(body.blocks[Block::new(1)].insts.is_empty());
        assert!(body.blocks[Block::new(2)].insts.is_empty());
        assert_eq!(
            returned(body, Block::new(2)),
            Some(Constant::int(Type::I32, 3))
        );
    }

    #[test]
    fn forced_branch_in_callee_reaches_callers() {
        let mut module = parse(
            "func @f0 \"main\" external () -> i32 {
b0():
  x: i32 = call @f1
  return x
}
func @f1 \"pick\" internal () -> i32 {
b0():
  if undef i1, b1(), b2()
b1():
  return i32 5
b2():
  return i32 5
}
",
        );
        let main = Func::new(0);
        {
            let mut solver = Solver::for_module(&module, SolverOptions::default());
            solver.run_to_fixed_point(&[main, Func::new(1)]);
            let body = module.funcs[main].body().unwrap();
            let call = body.blocks[body.entry].insts[0];
            assert_eq!(
                solver.lattice_value(main, call),
                &LatticeValue::Constant(Constant::int(Type::I32, 5))
            );
        }

        let mut ctx = InterpContext::new(&module).unwrap();
        let before = ctx.call(&module, main, &[]);
        let stats = run_module(&mut module, &SolverOptions::default(), &mut Fuel::infinite());
        assert_eq!(stats.returns_zapped, 1);
        let body = module.funcs[main].body().unwrap();
        assert_eq!(returned(body, body.entry), Some(Constant::int(Type::I32, 5)));
        let mut ctx = InterpContext::new(&module).unwrap();
        assert_eq!(ctx.call(&module, main, &[]), before);
        assert_eq!(before, InterpResult::Ok(Some(Constant::int(Type::I32, 5))));
    }

    #[test]
    fn fuel_limits_rewrites() {
        let mut module = parse(DIAMOND);
        let func = Func::new(0);
        let mut fuel = Fuel::limited(1);
        run(&mut module, func, &SolverOptions::default(), &mut fuel);
        let body = module.funcs[func].body().unwrap();
        // Only the branch fold happened.
        assert!(matches!(
            body.blocks[body.entry].terminator,
            Terminator::Br { .. }
        ));
        assert_eq!(body.blocks[Block::new(2)].insts.len(), 1);
        assert_eq!(body.blocks[Block::new(3)].params.len(), 2);
        assert_eq!(fuel.remaining, 0);
    }

    #[test]
    fn parallel_run_matches_sequential() {
        let mut a = parse(DIAMOND);
        let mut b = parse(DIAMOND);
        let opts = SolverOptions::default();
        let seq = run(&mut a, Func::new(0), &opts, &mut Fuel::infinite());
        let par = run_all(&mut b, &opts);
        assert_eq!(seq, par);
        assert_eq!(format!("{}", a.display()), format!("{}", b.display()));
    }
}
