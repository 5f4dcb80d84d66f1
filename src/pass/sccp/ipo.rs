//! Whole-module setup: which functions and globals can be tracked.

use super::{Solver, SolverOptions};
use crate::analysis::{UseMap, User};
use crate::ir::*;
use crate::Operator;
use fxhash::FxHashSet;

/// Functions and globals whose address may be observed by code the
/// solver cannot enumerate.
#[derive(Clone, Debug, Default)]
pub struct AddressTaken {
    pub funcs: FxHashSet<Func>,
    pub globals: FxHashSet<Global>,
}

impl AddressTaken {
    /// A function's address escapes wherever it is used as a value:
    /// direct calls name their callee and never use it. A global's
    /// address escapes unless every use is the pointer operand of a
    /// plain load or store of the global's own type.
    pub fn compute(module: &Module) -> AddressTaken {
        let mut taken = AddressTaken::default();
        for data in module.globals.values() {
            if let Some(init) = &data.init {
                taken.escape(init);
            }
        }
        for (_, body) in module.bodies() {
            let uses = UseMap::compute(body);
            for (value, def) in body.values.entries() {
                let c = match def {
                    ValueDef::Const(c) => c,
                    _ => continue,
                };
                let users = uses.users(value);
                if users.is_empty() {
                    continue;
                }
                match c {
                    &Constant::GlobalAddr(global) => {
                        let ty = &module.globals[global].ty;
                        if !users
                            .iter()
                            .all(|&user| is_direct_access(body, user, value, ty))
                        {
                            taken.globals.insert(global);
                        }
                    }
                    c => taken.escape(c),
                }
            }
        }
        log::debug!(
            "address taken: {} function(s), {} global(s)",
            taken.funcs.len(),
            taken.globals.len()
        );
        taken
    }

    fn escape(&mut self, c: &Constant) {
        match c {
            &Constant::FuncAddr(func) => {
                self.funcs.insert(func);
            }
            &Constant::GlobalAddr(global) | &Constant::FieldAddr(global, _) => {
                self.globals.insert(global);
            }
            Constant::Struct(fields) => {
                for field in fields {
                    self.escape(field);
                }
            }
            _ => {}
        }
    }
}

fn is_direct_access(body: &FunctionBody, user: User, addr: Value, ty: &Type) -> bool {
    let inst = match user {
        User::Value(inst) => inst,
        User::Terminator(_) => return false,
    };
    match &body.values[inst] {
        ValueDef::Operator(Operator::Load { memory }, args, load_ty) => {
            !memory.volatile && body.resolve_alias(args[0]) == addr && load_ty == ty
        }
        ValueDef::Operator(Operator::Store { memory }, args, _) => {
            !memory.volatile
                && body.resolve_alias(args[0]) == addr
                && body.resolve_alias(args[1]) != addr
                && body.value_ty(args[1]) == *ty
        }
        _ => false,
    }
}

impl<'a> Solver<'a> {
    /// A solver for the whole module. Every function that may be
    /// called from outside starts executable with unknown parameters;
    /// internal functions whose address never escapes start
    /// unreachable and learn their parameters from their call sites.
    pub fn for_module(module: &'a Module, opts: SolverOptions) -> Solver<'a> {
        let mut solver = Solver::new(module, opts);
        let taken = AddressTaken::compute(module);

        for (func, decl) in module.funcs() {
            let linkage = match decl.linkage() {
                Some(linkage) => linkage,
                None => continue,
            };
            if opts.track_functions {
                if !linkage.may_be_overridden() {
                    solver.add_tracked_function(func);
                }
                if linkage.is_local() && !taken.funcs.contains(&func) {
                    solver.add_argument_tracked_function(func);
                    continue;
                }
            }
            solver.enter_unknown_caller(func);
        }

        if opts.track_globals {
            for (global, data) in module.globals.entries() {
                let scalar = data.ty.is_int() || data.ty == Type::Ptr;
                if scalar
                    && data.mutable
                    && data.linkage.is_local()
                    && data.init.is_some()
                    && !taken.globals.contains(&global)
                {
                    solver.track_global(global);
                }
            }
        }

        log::debug!(
            "for_module: {} tracked return(s), {} argument-tracked function(s), {} tracked global(s)",
            solver.tracked_returns.len() + solver.struct_return_funcs.len(),
            solver.arg_tracked.len(),
            solver.tracked_globals.len()
        );
        solver
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::EntityRef;

    #[test]
    fn escaping_addresses() {
        let module = Module::from_text(
            "global @g0: i32 = i32 0 internal mutable
global @g1: i32 = i32 0 internal mutable
global @g2: i64 = i64 0 internal mutable
global @g3: ptr = @f1 internal mutable
func @f0 \"main\" external () -> i32 {
b0():
  x: i32 = load @g0
  s0: void = store @g0, x
  s1: void = store @g1, i32 1
  s2: void = store @g2, i64 2
  y: i32 = load @g2
  z: i32 = call @f2
  return x
}
func @f1 \"callback\" internal () -> void {
b0():
  return
}
func @f2 \"helper\" internal () -> i32 {
b0():
  w: ptr = load @g3
  r: i32 = call_indirect w
  return r
}
",
        )
        .unwrap();
        let taken = AddressTaken::compute(&module);
        assert!(!taken.globals.contains(&Global::new(0)));
        assert!(!taken.globals.contains(&Global::new(1)));
        // Loaded at a type other than its own.
        assert!(taken.globals.contains(&Global::new(2)));
        assert!(!taken.globals.contains(&Global::new(3)));
        // Reachable through an initializer.
        assert!(taken.funcs.contains(&Func::new(1)));
        assert!(!taken.funcs.contains(&Func::new(2)));

        let solver = Solver::for_module(&module, SolverOptions::default());
        assert!(solver.is_argument_tracked(Func::new(2)));
        assert!(!solver.is_argument_tracked(Func::new(1)));
        assert!(solver.tracked_globals().contains_key(&Global::new(0)));
        assert!(!solver.tracked_globals().contains_key(&Global::new(2)));
        assert!(solver.tracked_return_values().contains_key(&Func::new(0)));
        assert!(solver.tracked_return_values().contains_key(&Func::new(2)));
    }
}
