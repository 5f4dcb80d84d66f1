//! Reference interpreter for the IR.
//!
//! Runs a function on concrete arguments, with the module's globals as
//! the only memory. Runtime values are literals: integers, pointers
//! (null, global, field or function addresses) and struct literals.
//! `undef` evaluates to the zero value of its type. Anything the
//! interpreter does not model (stack slots, varargs, opaque operators,
//! ordered comparison of pointers) traps.

use crate::entity::{EntityRef, EntityVec};
use crate::ir::*;
use crate::op_traits::Intrinsic;
use crate::ops::Operator;
use fxhash::FxHashMap;
use smallvec::SmallVec;

/// How deep calls may nest before the run is abandoned.
const MAX_CALL_DEPTH: usize = 256;

/// Context for the IR interpreter: the contents of memory and the
/// remaining budget.
pub struct InterpContext {
    /// Current contents of each global.
    pub globals: EntityVec<Global, Constant>,
    /// Fuel remaining: allows deterministic stopping of execution. One
    /// unit is spent per block entered.
    pub fuel: u64,
    /// Record of everything executed, when enabled.
    pub trace: Option<InterpTrace>,
    depth: usize,
}

/// What an execution did, in order.
#[derive(Clone, Debug, Default)]
pub struct InterpTrace {
    pub blocks: Vec<(Func, Block)>,
    /// Edges taken, by source block and successor index.
    pub edges: Vec<(Func, Block, usize)>,
    /// Values computed: instruction results and block params.
    pub values: Vec<(Func, Value, Constant)>,
}

/// One stack frame in the interpreted execution context.
#[derive(Debug, Clone, Default)]
struct InterpStackFrame {
    func: Func,
    cur_block: Block,
    values: FxHashMap<Value, Constant>,
}

/// The result of an interpreter session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterpResult {
    /// The function returned, with a value unless it is `void`.
    Ok(Option<Constant>),
    /// Execution trapped at instruction `index` of a block, or at its
    /// terminator (`u32::MAX`).
    Trap(Func, Block, u32),
    /// Fuel or call depth ran out.
    OutOfFuel,
}

impl InterpResult {
    /// Extract the return value, if normal return, otherwise produce
    /// an error.
    pub fn ok(self) -> anyhow::Result<Option<Constant>> {
        match self {
            InterpResult::Ok(value) => Ok(value),
            other => anyhow::bail!("Bad InterpResult: {:?}", other),
        }
    }
}

/// The runtime value of a literal: `undef` reads as zero and zero
/// fills are spelled out field by field.
pub fn concrete(c: &Constant) -> Constant {
    match c {
        Constant::Undef(ty) | Constant::Zero(ty) => zero_value(ty),
        Constant::Struct(fields) => Constant::Struct(fields.iter().map(concrete).collect()),
        c => c.clone(),
    }
}

fn zero_value(ty: &Type) -> Constant {
    match ty.fields() {
        Some(fields) => Constant::Struct(fields.iter().map(zero_value).collect()),
        None if ty.is_void() => Constant::Struct(vec![]),
        None => Constant::null_value(ty),
    }
}

impl InterpContext {
    /// Construct a new interpreter context for the given module.
    /// Globals without an initializer start out zeroed.
    pub fn new(module: &Module) -> anyhow::Result<Self> {
        let mut globals = EntityVec::default();
        for (global, data) in module.globals.entries() {
            let contents = match &data.init {
                Some(init) => {
                    if init.ty() != data.ty {
                        anyhow::bail!(
                            "initializer {} of {} does not have type {}",
                            init,
                            global,
                            data.ty
                        );
                    }
                    concrete(init)
                }
                None => zero_value(&data.ty),
            };
            globals.push(contents);
        }
        Ok(InterpContext {
            globals,
            fuel: u64::MAX,
            trace: None,
            depth: 0,
        })
    }

    /// Record blocks, edges and values from now on.
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(InterpTrace::default());
        self
    }

    fn global_ty<'m>(module: &'m Module, global: Global) -> Option<&'m Type> {
        module.globals.get(global).map(|data| &data.ty)
    }

    fn load(&self, module: &Module, ptr: &Constant, ty: &Type) -> Option<Constant> {
        let value = match ptr {
            &Constant::GlobalAddr(global) => {
                Self::global_ty(module, global)?;
                self.globals[global].clone()
            }
            &Constant::FieldAddr(global, index) => {
                Self::global_ty(module, global)?;
                self.globals[global].field(index as usize)?
            }
            _ => return None,
        };
        if value.ty() == *ty {
            Some(value)
        } else {
            None
        }
    }

    fn store(&mut self, module: &Module, ptr: &Constant, value: Constant) -> Option<()> {
        match ptr {
            &Constant::GlobalAddr(global) => {
                if *Self::global_ty(module, global)? != value.ty() {
                    return None;
                }
                self.globals[global] = value;
            }
            &Constant::FieldAddr(global, index) => {
                Self::global_ty(module, global)?;
                match &mut self.globals[global] {
                    Constant::Struct(fields) => {
                        let field = fields.get_mut(index as usize)?;
                        if field.ty() != value.ty() {
                            return None;
                        }
                        *field = value;
                    }
                    _ => return None,
                }
            }
            _ => return None,
        }
        Some(())
    }

    /// Call the given function with the given args, running the
    /// interpreter until fuel is exhausted or the function returns.
    pub fn call(&mut self, module: &Module, func: Func, args: &[Constant]) -> InterpResult {
        let body = match &module.funcs[func] {
            FuncDecl::Import(_, name) => return self.call_import(func, name, args),
            FuncDecl::Body(_, _, _, body) => body,
        };
        if self.depth >= MAX_CALL_DEPTH {
            return InterpResult::OutOfFuel;
        }

        log::trace!(
            "Interp: entering func {}:\n{}\n",
            func,
            body.display_verbose("| ")
        );
        log::trace!("args: {:?}", args);

        let mut frame = InterpStackFrame {
            func,
            cur_block: body.entry,
            values: FxHashMap::default(),
        };
        for (arg, &(_, param)) in args.iter().zip(body.blocks[body.entry].params.iter()) {
            self.define(&mut frame, param, concrete(arg));
        }

        self.depth += 1;
        let result = self.run_frame(module, body, &mut frame);
        self.depth -= 1;
        result
    }

    fn run_frame(
        &mut self,
        module: &Module,
        body: &FunctionBody,
        frame: &mut InterpStackFrame,
    ) -> InterpResult {
        loop {
            if self.fuel == 0 {
                return InterpResult::OutOfFuel;
            }
            self.fuel -= 1;

            let block = frame.cur_block;
            log::trace!("Interpreting block {}", block);
            if let Some(trace) = self.trace.as_mut() {
                trace.blocks.push((frame.func, block));
            }

            for (inst_idx, &inst) in body.blocks[block].insts.iter().enumerate() {
                let inst = body.resolve_alias(inst);
                let (op, args, ty) = match &body.values[inst] {
                    ValueDef::Operator(op, args, ty) => (op, args, ty),
                    ValueDef::Const(_) => continue,
                    def => panic!("{} in {} is not an instruction: {:?}", inst, block, def),
                };
                let args: SmallVec<[Constant; 4]> =
                    args.iter().map(|&arg| frame.get(body, arg)).collect();
                let trap = InterpResult::Trap(frame.func, block, inst_idx as u32);

                let result = match op {
                    Operator::Call { function_index } => {
                        match self.call(module, *function_index, &args[..]) {
                            InterpResult::Ok(value) => value,
                            other => return other,
                        }
                    }
                    Operator::CallIndirect => {
                        let callee = match args.first() {
                            Some(&Constant::FuncAddr(callee)) => callee,
                            _ => return trap,
                        };
                        if callee.index() >= module.funcs.len()
                            || module.func_sig(callee).params.len() != args.len() - 1
                        {
                            return trap;
                        }
                        match self.call(module, callee, &args[1..]) {
                            InterpResult::Ok(value) => value,
                            other => return other,
                        }
                    }
                    Operator::Load { .. } => match self.load(module, &args[0], ty) {
                        Some(value) => Some(value),
                        None => return trap,
                    },
                    Operator::Store { .. } => {
                        if self.store(module, &args[0], args[1].clone()).is_none() {
                            return trap;
                        }
                        None
                    }
                    Operator::FieldAddr { index } => match &args[0] {
                        &Constant::GlobalAddr(global)
                            if Self::global_ty(module, global)
                                .and_then(|ty| ty.fields())
                                .map_or(false, |fields| (*index as usize) < fields.len()) =>
                        {
                            Some(Constant::FieldAddr(global, *index))
                        }
                        _ => return trap,
                    },
                    Operator::Alloca | Operator::VaArg | Operator::Opaque { .. } => {
                        log::trace!("cannot interpret {}", op);
                        return trap;
                    }
                    op => match fold_op(op, &args[..], ty) {
                        Some(value) => Some(concrete(&value)),
                        None => {
                            log::trace!("fold_op failed on {} args {:?}", op, args);
                            return trap;
                        }
                    },
                };

                if ty.is_void() {
                    continue;
                }
                let result = match result {
                    Some(value) if value.ty() == *ty => value,
                    _ => return trap,
                };
                log::trace!("Inst {} gets result {}", inst, result);
                self.define(frame, inst, result);
            }

            let trap = InterpResult::Trap(frame.func, block, u32::MAX);
            let (index, target) = match &body.blocks[block].terminator {
                Terminator::None | Terminator::Unreachable => return trap,
                Terminator::Br { target } => (0, target),
                Terminator::CondBr {
                    cond,
                    if_true,
                    if_false,
                } => match frame.get(body, *cond).as_bool() {
                    Some(true) => (0, if_true),
                    Some(false) => (1, if_false),
                    None => return trap,
                },
                Terminator::Select {
                    value,
                    targets,
                    default,
                } => match frame.get(body, *value).as_int() {
                    Some(i) if (i as usize) < targets.len() && i < u32::MAX as u64 => {
                        (i as usize + 1, &targets[i as usize])
                    }
                    Some(_) => (0, default),
                    None => return trap,
                },
                Terminator::Return { value } => {
                    let value = value.map(|value| frame.get(body, value));
                    log::trace!("returning from {}: {:?}", frame.func, value);
                    return InterpResult::Ok(value);
                }
            };
            if let Some(trace) = self.trace.as_mut() {
                trace.edges.push((frame.func, block, index));
            }
            self.apply_target(body, frame, target);
        }
    }

    fn define(&mut self, frame: &mut InterpStackFrame, value: Value, result: Constant) {
        if let Some(trace) = self.trace.as_mut() {
            trace.values.push((frame.func, value, result.clone()));
        }
        frame.values.insert(value, result);
    }

    fn apply_target(&mut self, body: &FunctionBody, frame: &mut InterpStackFrame, target: &BlockTarget) {
        // Read every arg before writing any param: a loop back-edge may
        // pass a param to another param of the same block.
        let args: SmallVec<[Constant; 4]> = target
            .args
            .iter()
            .map(|&arg| frame.get(body, arg))
            .collect();
        log::trace!("taking target {} with args {:?}", target, args);
        for (arg, &(_, param)) in args
            .into_iter()
            .zip(body.blocks[target.block].params.iter())
        {
            self.define(frame, param, arg);
        }
        frame.cur_block = target.block;
    }

    fn call_import(&mut self, func: Func, name: &str, args: &[Constant]) -> InterpResult {
        let result = Intrinsic::from_name(name).and_then(|intrinsic| intrinsic.fold(args));
        match result {
            Some(value) => InterpResult::Ok(Some(value)),
            None => {
                log::trace!("import {} \"{}\" cannot run on {:?}", func, name, args);
                InterpResult::Trap(func, Block::invalid(), u32::MAX)
            }
        }
    }
}

impl InterpStackFrame {
    fn get(&self, body: &FunctionBody, value: Value) -> Constant {
        let value = body.resolve_alias(value);
        if let ValueDef::Const(c) = &body.values[value] {
            return concrete(c);
        }
        match self.values.get(&value) {
            Some(c) => c.clone(),
            None => panic!("Unset SSA value: {} in {}", value, self.func),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const COUNT: &str = "global @g0: {i32, i32} = zero {i32, i32} internal mutable
import @f0 \"ctpop\" (i32) -> i32
func @f1 \"count\" external (i32) -> i32 {
entry(n: i32):
  br head(i32 0, i32 0)
head(i: i32, acc: i32):
  done: i1 = ge_s i, n
  if done, exit(), body()
body():
  bits: i32 = call @f0 i
  next_acc: i32 = add acc, bits
  next: i32 = add i, i32 1
  br head(next, next_acc)
exit():
  s0: void = store @g0.1, acc
  return acc
}
";

    #[test]
    fn loops_and_imports() {
        let module = Module::from_text(COUNT).unwrap();
        let mut ctx = InterpContext::new(&module).unwrap().with_trace();
        let func = Func::new(1);
        let result = ctx.call(&module, func, &[Constant::int(Type::I32, 4)]);
        // popcount of 0, 1, 2, 3
        assert_eq!(result, InterpResult::Ok(Some(Constant::int(Type::I32, 4))));
        assert_eq!(
            ctx.globals[Global::new(0)],
            Constant::Struct(vec![Constant::int(Type::I32, 0), Constant::int(Type::I32, 4)])
        );
        let trace = ctx.trace.unwrap();
        // entry, five visits of head, four of body, exit
        assert_eq!(trace.blocks.len(), 11);
        assert_eq!(trace.edges.len(), 10);
    }

    #[test]
    fn fuel_and_traps() {
        let module = Module::from_text(
            "func @f0 \"spin\" external () -> void {
b0():
  br b1()
b1():
  br b1()
}
func @f1 \"div\" external (i32) -> i32 {
b0(a: i32):
  x: i32 = div_u i32 1, a
  return x
}
func @f2 \"null\" external () -> i32 {
b0():
  x: i32 = load null
  return x
}
",
        )
        .unwrap();
        let mut ctx = InterpContext::new(&module).unwrap();
        ctx.fuel = 100;
        assert_eq!(ctx.call(&module, Func::new(0), &[]), InterpResult::OutOfFuel);

        let mut ctx = InterpContext::new(&module).unwrap();
        assert_eq!(
            ctx.call(&module, Func::new(1), &[Constant::int(Type::I32, 0)]),
            InterpResult::Trap(Func::new(1), Block::new(0), 0)
        );
        assert_eq!(
            ctx.call(&module, Func::new(1), &[Constant::int(Type::I32, 1)])
                .ok()
                .unwrap(),
            Some(Constant::int(Type::I32, 1))
        );
        assert!(ctx.call(&module, Func::new(2), &[]).ok().is_err());
    }

    #[test]
    fn undef_reads_as_zero() {
        let module = Module::from_text(
            "func @f0 \"f\" external () -> {i32, ptr} {
b0():
  x: i32 = add undef i32, i32 3
  s: {i32, ptr} = insert.0 undef {i32, ptr}, x
  return s
}
",
        )
        .unwrap();
        let mut ctx = InterpContext::new(&module).unwrap();
        assert_eq!(
            ctx.call(&module, Func::new(0), &[]),
            InterpResult::Ok(Some(Constant::Struct(vec![
                Constant::int(Type::I32, 3),
                Constant::Null
            ])))
        );
    }
}
