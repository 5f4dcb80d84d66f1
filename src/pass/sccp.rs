//! Sparse conditional constant propagation.
//!
//! The solver computes two facts at once: which blocks and edges of a
//! function can execute, and which SSA values hold the same constant
//! on every execution that reaches them. Each scalar value (and each
//! field of a struct value) carries a `LatticeValue` that only moves
//! down the lattice. Three worklists drive the iteration to a fixed
//! point:
//!
//! 1. values that just became overdefined;
//! 2. values that just became (forced) constant, and tracked returns
//!    or globals that changed;
//! 3. blocks that just became executable.
//!
//! Draining an item re-runs the transfer function of every user of
//! the changed value that sits in an executable block. Since nothing
//! ever moves back up, every value changes at most twice.
//!
//! After the worklists drain, `resolved_undefs_in` looks for values
//! that stayed undefined although a definite answer exists, forces
//! one of them, and asks for another round. `run_to_fixed_point`
//! alternates the two until nothing is forced.
//!
//! In whole-module mode (`Solver::for_module`) return values of
//! functions that cannot be overridden, parameters of functions whose
//! address never escapes, and internal globals whose address never
//! escapes are tracked across call and memory edges.

use crate::analysis::{UseMap, User};
use crate::cfg::CFGInfo;
use crate::ir::*;
use crate::pass::{Lattice, LatticeValue};
use crate::Operator;
use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

mod ipo;
mod undef;
mod visit;

pub use ipo::AddressTaken;

/// Knobs for one solver run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolverOptions {
    /// Block params with more incoming edges than this go straight to
    /// overdefined without looking at their arguments.
    pub max_join_fan_in: usize,
    /// Track internal globals whose address does not escape
    /// (whole-module mode only).
    pub track_globals: bool,
    /// Track return values and parameters across calls (whole-module
    /// mode only).
    pub track_functions: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_join_fan_in: 64,
            track_globals: true,
            track_functions: true,
        }
    }
}

/// A scalar value, or one field of a struct value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
    Scalar(Value),
    Field(Value, u32),
}

impl Slot {
    fn value(self) -> Value {
        match self {
            Slot::Scalar(value) | Slot::Field(value, _) => value,
        }
    }

    fn with_value(self, value: Value) -> Slot {
        match self {
            Slot::Scalar(_) => Slot::Scalar(value),
            Slot::Field(_, index) => Slot::Field(value, index),
        }
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Slot {
        Slot::Scalar(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum WorkItem {
    /// A value (or a field of it) changed state.
    Value(Func, Value),
    /// The tracked return value of a function changed.
    Return(Func),
    /// The tracked contents of a global changed.
    Global(Global),
}

#[derive(Debug)]
struct FuncInfo {
    uses: UseMap,
    cfg: CFGInfo,
}

pub struct Solver<'a> {
    module: &'a Module,
    opts: SolverOptions,
    /// Use index and CFG order, for functions with executable blocks.
    funcs: FxHashMap<Func, FuncInfo>,
    values: FxHashMap<(Func, Value), LatticeValue>,
    struct_values: FxHashMap<(Func, Value, u32), LatticeValue>,
    executable: FxHashSet<(Func, Block)>,
    /// Edges by source block and successor index.
    feasible_edges: FxHashSet<(Func, Block, usize)>,
    tracked_globals: FxHashMap<Global, LatticeValue>,
    tracked_returns: FxHashMap<Func, LatticeValue>,
    tracked_struct_returns: FxHashMap<(Func, u32), LatticeValue>,
    struct_return_funcs: FxHashSet<Func>,
    arg_tracked: FxHashSet<Func>,
    /// Instructions folded by evaluating them pairwise over the
    /// incoming edges of the block params they read, keyed by param.
    /// They must be revisited when the param is, even though the param
    /// itself is already overdefined.
    join_deps: FxHashMap<(Func, Value), SmallVec<[Value; 2]>>,
    overdefined_worklist: Vec<WorkItem>,
    inst_worklist: Vec<WorkItem>,
    block_worklist: Vec<(Func, Block)>,
    /// Direct call sites of each function.
    callers: FxHashMap<Func, Vec<(Func, Value)>>,
    /// Loads straight from the address of each global.
    global_loads: FxHashMap<Global, Vec<(Func, Value)>>,
    indexed: bool,
}

impl<'a> Solver<'a> {
    pub fn new(module: &'a Module, opts: SolverOptions) -> Solver<'a> {
        Solver {
            module,
            opts,
            funcs: FxHashMap::default(),
            values: FxHashMap::default(),
            struct_values: FxHashMap::default(),
            executable: FxHashSet::default(),
            feasible_edges: FxHashSet::default(),
            tracked_globals: FxHashMap::default(),
            tracked_returns: FxHashMap::default(),
            tracked_struct_returns: FxHashMap::default(),
            struct_return_funcs: FxHashSet::default(),
            arg_tracked: FxHashSet::default(),
            join_deps: FxHashMap::default(),
            overdefined_worklist: vec![],
            inst_worklist: vec![],
            block_worklist: vec![],
            callers: FxHashMap::default(),
            global_loads: FxHashMap::default(),
            indexed: false,
        }
    }

    /// A solver for one function on its own: the entry block is
    /// executable and every parameter is overdefined. Calls and
    /// globals are not tracked.
    pub fn for_function(module: &'a Module, func: Func, opts: SolverOptions) -> Solver<'a> {
        let mut solver = Solver::new(module, opts);
        solver.enter_unknown_caller(func);
        solver
    }

    pub fn module(&self) -> &'a Module {
        self.module
    }

    pub fn options(&self) -> &SolverOptions {
        &self.opts
    }

    fn body(&self, func: Func) -> &'a FunctionBody {
        let module = self.module;
        match module.funcs[func].body() {
            Some(body) => body,
            None => panic!("function {} has no body", func),
        }
    }

    fn func_info(&mut self, func: Func) -> &FuncInfo {
        let body = self.body(func);
        self.funcs.entry(func).or_insert_with(|| FuncInfo {
            uses: UseMap::compute(body),
            cfg: CFGInfo::new(body),
        })
    }

    /// Build the call-site and global-load indexes the first time a
    /// function or global is tracked.
    fn ensure_indexes(&mut self) {
        if self.indexed {
            return;
        }
        self.indexed = true;
        let module = self.module;
        for (func, body) in module.bodies() {
            for block in body.blocks.values() {
                for &inst in &block.insts {
                    let inst = body.resolve_alias(inst);
                    match &body.values[inst] {
                        ValueDef::Operator(Operator::Call { function_index }, _, _) => {
                            self.callers
                                .entry(*function_index)
                                .or_default()
                                .push((func, inst));
                        }
                        ValueDef::Operator(Operator::Load { .. }, args, _) => {
                            if let Some(&Constant::GlobalAddr(global)) = body.const_of(args[0]) {
                                self.global_loads
                                    .entry(global)
                                    .or_default()
                                    .push((func, inst));
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Start `func` as if called from somewhere unknown.
    fn enter_unknown_caller(&mut self, func: Func) {
        let body = self.body(func);
        self.mark_block_executable(func, body.entry);
        for param in body.params() {
            self.mark_anything_overdefined(func, param);
        }
    }

    // ---- state store ----

    fn slot_mut(&mut self, func: Func, slot: Slot) -> &mut LatticeValue {
        let body = self.body(func);
        match slot {
            Slot::Scalar(value) => self.values.entry((func, value)).or_insert_with(|| {
                assert!(
                    !body.value_ty(value).is_struct(),
                    "scalar state requested for struct value {} in {}",
                    value,
                    func
                );
                match &body.values[value] {
                    ValueDef::Const(c) if !c.is_undef() => LatticeValue::Constant(c.clone()),
                    _ => LatticeValue::Undefined,
                }
            }),
            Slot::Field(value, index) => self
                .struct_values
                .entry((func, value, index))
                .or_insert_with(|| match &body.values[value] {
                    ValueDef::Const(c) => match c.field(index as usize) {
                        Some(field) if field.is_undef() => LatticeValue::Undefined,
                        Some(field) => LatticeValue::Constant(field),
                        None => LatticeValue::Overdefined,
                    },
                    _ => LatticeValue::Undefined,
                }),
        }
    }

    fn resolve_slot(&self, func: Func, slot: Slot) -> Slot {
        slot.with_value(self.body(func).resolve_alias(slot.value()))
    }

    /// Current state of a scalar value, created on first use.
    fn state(&mut self, func: Func, value: Value) -> LatticeValue {
        let slot = self.resolve_slot(func, Slot::Scalar(value));
        self.slot_mut(func, slot).clone()
    }

    fn field_state(&mut self, func: Func, value: Value, index: u32) -> LatticeValue {
        let slot = self.resolve_slot(func, Slot::Field(value, index));
        self.slot_mut(func, slot).clone()
    }

    /// Make sure a value has its state entries, so that queries after
    /// solving find every value of an executable block.
    fn touch(&mut self, func: Func, value: Value) {
        let ty = self.body(func).value_ty(value);
        match ty.fields() {
            Some(fields) => {
                for index in 0..fields.len() as u32 {
                    self.field_state(func, value, index);
                }
            }
            None if ty.is_void() => {}
            None => {
                self.state(func, value);
            }
        }
    }

    fn push(&mut self, item: WorkItem, overdefined: bool) {
        if overdefined {
            self.overdefined_worklist.push(item);
        } else {
            self.inst_worklist.push(item);
        }
    }

    /// Apply `f` to a slot's state and queue the value if it changed.
    fn update<F: FnOnce(&mut LatticeValue) -> bool>(&mut self, func: Func, slot: Slot, f: F) -> bool {
        let slot = self.resolve_slot(func, slot);
        let lv = self.slot_mut(func, slot);
        if !f(lv) {
            return false;
        }
        let overdefined = lv.is_overdefined();
        log::trace!("{}: {:?} -> {:?}", func, slot, lv);
        self.push(WorkItem::Value(func, slot.value()), overdefined);
        true
    }

    /// Mark a slot constant. A plain constant that disagrees goes to
    /// overdefined rather than tripping the lattice assertion.
    fn mark_constant<S: Into<Slot>>(&mut self, func: Func, slot: S, c: Constant) -> bool {
        self.update(func, slot.into(), |lv| {
            if matches!(lv, LatticeValue::Constant(old) if *old != c) {
                lv.mark_overdefined()
            } else {
                lv.mark_constant(c)
            }
        })
    }

    fn mark_forced_constant<S: Into<Slot>>(&mut self, func: Func, slot: S, c: Constant) -> bool {
        self.update(func, slot.into(), |lv| lv.mark_forced_constant(c))
    }

    fn mark_overdefined<S: Into<Slot>>(&mut self, func: Func, slot: S) -> bool {
        self.update(func, slot.into(), |lv| lv.mark_overdefined())
    }

    fn merge_in<S: Into<Slot>>(&mut self, func: Func, slot: S, incoming: LatticeValue) -> bool {
        self.update(func, slot.into(), |lv| lv.meet_with(&incoming))
    }

    /// Overdefine a value, or every field of a struct value. Void
    /// values have no state.
    pub fn mark_anything_overdefined(&mut self, func: Func, value: Value) {
        let ty = self.body(func).value_ty(value);
        match ty.fields() {
            Some(fields) => {
                for index in 0..fields.len() as u32 {
                    self.mark_overdefined(func, Slot::Field(value, index));
                }
            }
            None if ty.is_void() => {}
            None => {
                self.mark_overdefined(func, value);
            }
        }
    }

    fn merge_in_global(&mut self, global: Global, incoming: &LatticeValue) {
        let lv = match self.tracked_globals.get_mut(&global) {
            Some(lv) => lv,
            None => return,
        };
        if !lv.meet_with(incoming) {
            return;
        }
        let overdefined = lv.is_overdefined();
        log::trace!("global {} -> {:?}", global, lv);
        if overdefined {
            // Loads see an untracked mutable global from now on.
            self.tracked_globals.remove(&global);
        }
        self.push(WorkItem::Global(global), overdefined);
    }

    fn merge_in_return(&mut self, func: Func, field: Option<u32>, incoming: &LatticeValue) {
        let lv = match field {
            Some(index) => self.tracked_struct_returns.get_mut(&(func, index)),
            None => self.tracked_returns.get_mut(&func),
        };
        if let Some(lv) = lv {
            if lv.meet_with(incoming) {
                let overdefined = lv.is_overdefined();
                log::trace!("return of {} ({:?}) -> {:?}", func, field, lv);
                self.push(WorkItem::Return(func), overdefined);
            }
        }
    }

    // ---- tracking setup ----

    /// Track the merged return value of `func` across all its returns.
    /// Call sites then see that value instead of overdefined.
    pub fn add_tracked_function(&mut self, func: Func) {
        self.ensure_indexes();
        let ret = self.body(func).ret.clone();
        match ret.fields() {
            Some(fields) => {
                self.struct_return_funcs.insert(func);
                for index in 0..fields.len() as u32 {
                    self.tracked_struct_returns
                        .insert((func, index), LatticeValue::top());
                }
            }
            None if ret.is_void() => {}
            None => {
                self.tracked_returns.insert(func, LatticeValue::top());
            }
        }
    }

    /// Let call sites feed the parameters of `func`, which must not be
    /// callable from anywhere else. Its entry block becomes executable
    /// only once a call to it is seen.
    pub fn add_argument_tracked_function(&mut self, func: Func) {
        self.ensure_indexes();
        self.arg_tracked.insert(func);
    }

    /// Track everything stored to `global`, starting from its
    /// initializer.
    pub fn track_global(&mut self, global: Global) {
        self.ensure_indexes();
        let lv = match &self.module.globals[global].init {
            Some(init) if !init.is_undef() => LatticeValue::Constant(init.clone()),
            _ => LatticeValue::top(),
        };
        self.tracked_globals.insert(global, lv);
    }

    // ---- reachability ----

    /// Returns `true` if the block was not executable before.
    pub fn mark_block_executable(&mut self, func: Func, block: Block) -> bool {
        if !self.executable.insert((func, block)) {
            return false;
        }
        log::trace!("mark_block_executable: {} {}", func, block);
        self.func_info(func);
        self.block_worklist.push((func, block));
        true
    }

    /// Mark successor edge `index` of `from` feasible. Returns `true` if
    /// it was not feasible before.
    fn mark_edge_feasible(&mut self, func: Func, from: Block, index: usize) -> bool {
        debug_assert!(self.is_block_executable(func, from));
        if !self.feasible_edges.insert((func, from, index)) {
            return false;
        }
        let body = self.body(func);
        let to = body.blocks[from].succs[index];
        log::trace!("mark_edge_feasible: {} {} -> {} (#{})", func, from, to, index);
        if !self.mark_block_executable(func, to) {
            // Already visited: only its params see a new argument.
            for &(_, param) in &body.blocks[to].params {
                self.visit_join(func, param);
            }
        }
        true
    }

    // ---- driving ----

    /// Drain all worklists, highest priority first, until none has
    /// anything left.
    pub fn solve(&mut self) {
        loop {
            if let Some(item) = self.overdefined_worklist.pop() {
                self.notify_users(item);
            } else if let Some(item) = self.inst_worklist.pop() {
                if self.is_stale(item) {
                    continue;
                }
                self.notify_users(item);
            } else if let Some((func, block)) = self.block_worklist.pop() {
                self.visit_block(func, block);
            } else {
                break;
            }
        }
    }

    /// A scalar that went on to become overdefined has already had its
    /// users notified from the overdefined list.
    fn is_stale(&self, item: WorkItem) -> bool {
        match item {
            WorkItem::Value(func, value) => self
                .values
                .get(&(func, value))
                .map_or(false, |lv| lv.is_overdefined()),
            _ => false,
        }
    }

    fn notify_users(&mut self, item: WorkItem) {
        match item {
            WorkItem::Value(func, value) => {
                let users: SmallVec<[User; 8]> =
                    self.func_info(func).uses.users(value).iter().copied().collect();
                let body = self.body(func);
                for user in users {
                    match user {
                        User::Value(user) => {
                            if !self.is_block_executable(func, body.value_blocks[user]) {
                                continue;
                            }
                            if let ValueDef::BlockParam(..) = &body.values[user] {
                                self.visit_join(func, user);
                            } else {
                                self.visit_inst(func, user);
                            }
                        }
                        User::Terminator(block) => {
                            if self.is_block_executable(func, block) {
                                self.visit_terminator(func, block);
                            }
                        }
                    }
                }
            }
            WorkItem::Return(func) => {
                let sites = self.callers.get(&func).cloned().unwrap_or_default();
                self.revisit(&sites);
            }
            WorkItem::Global(global) => {
                let loads = self.global_loads.get(&global).cloned().unwrap_or_default();
                self.revisit(&loads);
            }
        }
    }

    fn revisit(&mut self, insts: &[(Func, Value)]) {
        for &(func, inst) in insts {
            let block = self.body(func).value_blocks[inst];
            if self.is_block_executable(func, block) {
                self.visit_inst(func, inst);
            }
        }
    }

    fn visit_block(&mut self, func: Func, block: Block) {
        log::trace!("visit_block: {} {}", func, block);
        let body = self.body(func);
        let def = &body.blocks[block];
        for &(_, param) in &def.params {
            self.touch(func, param);
            self.visit_join(func, param);
        }
        for &inst in &def.insts {
            let inst = body.resolve_alias(inst);
            self.touch(func, inst);
            self.visit_inst(func, inst);
        }
        self.visit_terminator(func, block);
    }

    /// Solve, then force undefined values in `funcs` and solve again,
    /// until no more values need forcing.
    pub fn run_to_fixed_point(&mut self, funcs: &[Func]) {
        let mut rounds = 0;
        loop {
            self.solve();
            rounds += 1;
            let mut resolved = false;
            for &func in funcs {
                resolved |= self.resolved_undefs_in(func);
            }
            if !resolved {
                break;
            }
        }
        log::debug!(
            "sccp: fixed point after {} round(s), {} executable block(s)",
            rounds,
            self.executable.len()
        );
    }

    // ---- queries ----

    pub fn is_block_executable(&self, func: Func, block: Block) -> bool {
        self.executable.contains(&(func, block))
    }

    /// Whether successor edge `index` of `from` can execute.
    pub fn is_edge_feasible(&self, func: Func, from: Block, index: usize) -> bool {
        self.feasible_edges.contains(&(func, from, index))
    }

    /// The final state of a scalar value. Panics if the solver never
    /// visited the value.
    pub fn lattice_value(&self, func: Func, value: Value) -> &LatticeValue {
        let value = self.body(func).resolve_alias(value);
        match self.values.get(&(func, value)) {
            Some(lv) => lv,
            None => panic!("value {} in {} was never visited", value, func),
        }
    }

    /// The final state of one field of a struct value. Panics if the
    /// solver never visited the value.
    pub fn struct_lattice_value(&self, func: Func, value: Value, index: u32) -> &LatticeValue {
        let value = self.body(func).resolve_alias(value);
        match self.struct_values.get(&(func, value, index)) {
            Some(lv) => lv,
            None => panic!("field {} of {} in {} was never visited", index, value, func),
        }
    }

    /// All scalar states, including literal operands that were read.
    pub fn lattice_values(&self) -> impl Iterator<Item = ((Func, Value), &LatticeValue)> {
        self.values.iter().map(|(&key, lv)| (key, lv))
    }

    pub fn struct_lattice_values(&self) -> impl Iterator<Item = ((Func, Value, u32), &LatticeValue)> {
        self.struct_values.iter().map(|(&key, lv)| (key, lv))
    }

    pub fn executable_blocks(&self) -> impl Iterator<Item = (Func, Block)> + '_ {
        self.executable.iter().copied()
    }

    pub fn feasible_edges(&self) -> impl Iterator<Item = (Func, Block, usize)> + '_ {
        self.feasible_edges.iter().copied()
    }

    pub fn tracked_return_values(&self) -> &FxHashMap<Func, LatticeValue> {
        &self.tracked_returns
    }

    pub fn tracked_struct_return_values(&self) -> &FxHashMap<(Func, u32), LatticeValue> {
        &self.tracked_struct_returns
    }

    /// Globals still tracked; those that became overdefined are gone.
    pub fn tracked_globals(&self) -> &FxHashMap<Global, LatticeValue> {
        &self.tracked_globals
    }

    pub fn is_argument_tracked(&self, func: Func) -> bool {
        self.arg_tracked.contains(&func)
    }
}
