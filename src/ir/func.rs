use super::{
    Block, Constant, FunctionBodyDisplay, Module, Signature, Type, Value, ValueDef,
};
use crate::entity::{EntityRef, EntityVec, PerEntity};
use crate::Operator;
use fxhash::FxHashMap;

#[derive(Clone, Debug)]
pub enum FuncDecl {
    /// A function defined outside the module, by name.
    Import(Signature, String),
    Body(Signature, String, Linkage, FunctionBody),
}

/// Visibility of a function or global outside the module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Linkage {
    /// Not visible outside the module.
    Internal,
    /// Visible; the definition here is the one that runs.
    External,
    /// Visible, and may be replaced by another definition at link time.
    Weak,
}

impl Linkage {
    /// Whether the definition seen here may not be the one that runs.
    pub fn may_be_overridden(&self) -> bool {
        matches!(self, Linkage::Weak)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Linkage::Internal)
    }
}

impl std::fmt::Display for Linkage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Linkage::Internal => write!(f, "internal"),
            Linkage::External => write!(f, "external"),
            Linkage::Weak => write!(f, "weak"),
        }
    }
}

impl FuncDecl {
    pub fn sig(&self) -> Signature {
        match self {
            FuncDecl::Import(sig, ..) => *sig,
            FuncDecl::Body(sig, ..) => *sig,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FuncDecl::Import(_, name) => &name[..],
            FuncDecl::Body(_, name, ..) => &name[..],
        }
    }

    pub fn linkage(&self) -> Option<Linkage> {
        match self {
            FuncDecl::Body(_, _, linkage, _) => Some(*linkage),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&FunctionBody> {
        match self {
            FuncDecl::Body(_, _, _, body) => Some(body),
            _ => None,
        }
    }

    pub fn body_mut(&mut self) -> Option<&mut FunctionBody> {
        match self {
            FuncDecl::Body(_, _, _, body) => Some(body),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FunctionBody {
    /// Return type of the function; `Void` if it returns nothing.
    pub ret: Type,
    /// Entry block. Its params are the function's formal parameters.
    pub entry: Block,
    /// Block bodies.
    pub blocks: EntityVec<Block, BlockDef>,
    /// Value definitions, indexed by `Value`.
    pub values: EntityVec<Value, ValueDef>,
    /// Blocks in which values are computed. Each may be `Block::invalid()` if not placed.
    pub value_blocks: PerEntity<Value, Block>,
    /// Interned literal operands.
    const_values: FxHashMap<Constant, Value>,
}

impl FunctionBody {
    pub fn new(module: &Module, sig: Signature) -> FunctionBody {
        let sig = module.signature(sig);
        let mut blocks = EntityVec::default();
        let entry = blocks.push(BlockDef::default());
        let mut values = EntityVec::default();
        let mut value_blocks = PerEntity::default();
        for (i, arg_ty) in sig.params.iter().enumerate() {
            let value = values.push(ValueDef::BlockParam(entry, i as u32, arg_ty.clone()));
            blocks[entry].params.push((arg_ty.clone(), value));
            value_blocks[value] = entry;
        }
        FunctionBody {
            ret: sig.ret.clone(),
            entry,
            blocks,
            values,
            value_blocks,
            const_values: FxHashMap::default(),
        }
    }

    pub fn add_block(&mut self) -> Block {
        let id = self.blocks.push(BlockDef::default());
        log::trace!("add_block: block {}", id);
        id
    }

    fn add_edge(&mut self, from: Block, to: Block) {
        let succ_pos = self.blocks[from].succs.len();
        let pred_pos = self.blocks[to].preds.len();
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
        self.blocks[from].pos_in_succ_pred.push(pred_pos);
        self.blocks[to].pos_in_pred_succ.push(succ_pos);
        log::trace!("add_edge: from {} to {}", from, to);
    }

    /// Rebuild all pred/succ lists from the terminators.
    pub fn recompute_edges(&mut self) {
        for block in self.blocks.values_mut() {
            block.preds.clear();
            block.succs.clear();
            block.pos_in_succ_pred.clear();
            block.pos_in_pred_succ.clear();
        }

        for block in 0..self.blocks.len() {
            let block = Block::new(block);
            let terminator = self.blocks[block].terminator.clone();
            terminator.visit_successors(|succ| {
                self.add_edge(block, succ);
            });
        }
    }

    pub fn add_value(&mut self, value: ValueDef) -> Value {
        log::trace!("add_value: def {:?}", value);
        let value = self.values.push(value);
        log::trace!(" -> {}", value);
        value
    }

    /// Add an instruction at the end of `block`.
    pub fn add_op(&mut self, block: Block, op: Operator, args: &[Value], ty: Type) -> Value {
        let value = self.add_value(ValueDef::Operator(op, args.to_vec(), ty));
        self.append_to_block(block, value);
        value
    }

    /// The value holding literal `c`, shared by every use in this body.
    pub fn add_const(&mut self, c: Constant) -> Value {
        if let Some(&value) = self.const_values.get(&c) {
            return value;
        }
        let value = self.add_value(ValueDef::Const(c.clone()));
        self.const_values.insert(c, value);
        value
    }

    pub fn undef(&mut self, ty: Type) -> Value {
        self.add_const(Constant::Undef(ty))
    }

    /// The literal behind `value`, looking through aliases.
    pub fn const_of(&self, value: Value) -> Option<&Constant> {
        self.values[self.resolve_alias(value)].as_const()
    }

    pub fn set_alias(&mut self, value: Value, to: Value) {
        log::trace!("set_alias: value {:?} to {:?}", value, to);
        // Resolve the `to` value through all existing aliases.
        let to = self.resolve_and_update_alias(to);
        // Disallow cycles.
        if to == value {
            panic!("Cannot create an alias cycle");
        }
        self.values[value] = ValueDef::Alias(to);
    }

    pub fn resolve_alias(&self, value: Value) -> Value {
        let mut result = value;
        loop {
            if let &ValueDef::Alias(to) = &self.values[result] {
                result = to;
            } else {
                break;
            }
        }
        result
    }

    pub fn resolve_and_update_alias(&mut self, value: Value) -> Value {
        let to = self.resolve_alias(value);
        // Short-circuit the chain, union-find-style.
        if let &ValueDef::Alias(orig_to) = &self.values[value] {
            if orig_to != to {
                self.values[value] = ValueDef::Alias(to);
            }
        }
        to
    }

    pub fn add_blockparam(&mut self, block: Block, ty: Type) -> Value {
        let index = self.blocks[block].params.len() as u32;
        let value = self.add_value(ValueDef::BlockParam(block, index, ty.clone()));
        self.blocks[block].params.push((ty, value));
        self.value_blocks[value] = block;
        value
    }

    pub fn add_placeholder(&mut self, ty: Type) -> Value {
        self.add_value(ValueDef::Placeholder(ty))
    }

    pub fn replace_placeholder_with_blockparam(&mut self, block: Block, value: Value, ty: Type) {
        assert!(matches!(self.values[value], ValueDef::Placeholder(_)));
        let index = self.blocks[block].params.len() as u32;
        self.blocks[block].params.push((ty.clone(), value));
        self.values[value] = ValueDef::BlockParam(block, index, ty);
        self.value_blocks[value] = block;
    }

    pub fn append_to_block(&mut self, block: Block, value: Value) {
        self.blocks[block].insts.push(value);
        self.value_blocks[value] = block;
    }

    pub fn end_block(&mut self, block: Block, terminator: Terminator) {
        terminator.visit_successors(|succ| {
            self.add_edge(block, succ);
        });
        self.blocks[block].terminator = terminator;
    }

    /// The type of a value, looking through aliases.
    pub fn value_ty(&self, value: Value) -> Type {
        self.values[self.resolve_alias(value)]
            .ty()
            .unwrap_or(Type::Void)
    }

    /// Formal parameters, in order.
    pub fn params(&self) -> impl Iterator<Item = Value> + '_ {
        self.blocks[self.entry].params.iter().map(|&(_, value)| value)
    }

    pub fn display<'a>(&'a self, indent: &'a str) -> FunctionBodyDisplay<'a> {
        FunctionBodyDisplay(self, indent, /* verbose = */ false)
    }

    pub fn display_verbose<'a>(&'a self, indent: &'a str) -> FunctionBodyDisplay<'a> {
        FunctionBodyDisplay(self, indent, /* verbose = */ true)
    }
}

#[derive(Clone, Debug, Default)]
pub struct BlockDef {
    /// Instructions in this block.
    pub insts: Vec<Value>,
    /// Terminator: branch or return.
    pub terminator: Terminator,
    /// Successor blocks.
    pub succs: Vec<Block>,
    /// For each successor block, our index in its `preds` array.
    pub pos_in_succ_pred: Vec<usize>,
    /// Predecessor blocks.
    pub preds: Vec<Block>,
    /// For each predecessor block, our index in its `succs` array.
    pub pos_in_pred_succ: Vec<usize>,
    /// Type and Value for each blockparam.
    pub params: Vec<(Type, Value)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTarget {
    pub block: Block,
    pub args: Vec<Value>,
}

impl std::fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let args = self
            .args
            .iter()
            .map(|arg| format!("{}", arg))
            .collect::<Vec<_>>();
        write!(f, "{}({})", self.block, args.join(", "))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Terminator {
    Br {
        target: BlockTarget,
    },
    CondBr {
        cond: Value,
        if_true: BlockTarget,
        if_false: BlockTarget,
    },
    /// Value `i` jumps to `targets[i]`; anything else to `default`.
    Select {
        value: Value,
        targets: Vec<BlockTarget>,
        default: BlockTarget,
    },
    Return {
        value: Option<Value>,
    },
    Unreachable,
    #[default]
    None,
}

impl std::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Terminator::None => write!(f, "no_terminator")?,
            Terminator::Br { target } => write!(f, "br {}", target)?,
            Terminator::CondBr {
                cond,
                if_true,
                if_false,
            } => write!(f, "if {}, {}, {}", cond, if_true, if_false)?,
            Terminator::Select {
                value,
                targets,
                default,
            } => write!(
                f,
                "select {}, [{}], {}",
                value,
                targets
                    .iter()
                    .map(|target| format!("{}", target))
                    .collect::<Vec<_>>()
                    .join(", "),
                default
            )?,
            Terminator::Return { value: Some(value) } => write!(f, "return {}", value)?,
            Terminator::Return { value: None } => write!(f, "return")?,
            Terminator::Unreachable => write!(f, "unreachable")?,
        }
        Ok(())
    }
}

impl Terminator {
    pub fn visit_targets<F: FnMut(&BlockTarget)>(&self, mut f: F) {
        match self {
            Terminator::Return { .. } => {}
            Terminator::Br { ref target, .. } => f(target),
            Terminator::CondBr {
                ref if_true,
                ref if_false,
                ..
            } => {
                f(if_true);
                f(if_false);
            }
            Terminator::Select {
                ref targets,
                ref default,
                ..
            } => {
                f(default);
                for target in targets {
                    f(target);
                }
            }
            Terminator::None => {}
            Terminator::Unreachable => {}
        }
    }

    pub fn update_targets<F: FnMut(&mut BlockTarget)>(&mut self, mut f: F) {
        match self {
            Terminator::Return { .. } => {}
            Terminator::Br { ref mut target, .. } => f(target),
            Terminator::CondBr {
                ref mut if_true,
                ref mut if_false,
                ..
            } => {
                f(if_true);
                f(if_false);
            }
            Terminator::Select {
                ref mut targets,
                ref mut default,
                ..
            } => {
                f(default);
                for target in targets {
                    f(target);
                }
            }
            Terminator::None => {}
            Terminator::Unreachable => {}
        }
    }

    /// Number of successor edges, counting duplicates.
    pub fn num_targets(&self) -> usize {
        let mut n = 0;
        self.visit_targets(|_| n += 1);
        n
    }

    pub fn target(&self, index: usize) -> Option<&BlockTarget> {
        match (index, self) {
            (0, Terminator::Br { ref target, .. }) => Some(target),
            (0, Terminator::CondBr { ref if_true, .. }) => Some(if_true),
            (1, Terminator::CondBr { ref if_false, .. }) => Some(if_false),
            (0, Terminator::Select { ref default, .. }) => Some(default),
            (i, Terminator::Select { ref targets, .. }) if i <= targets.len() => {
                Some(&targets[i - 1])
            }
            _ => None,
        }
    }

    pub fn visit_target<F: FnMut(&BlockTarget)>(&self, index: usize, mut f: F) {
        match self.target(index) {
            Some(target) => f(target),
            None => panic!("out of bounds: index {} term {:?}", index, self),
        }
    }

    pub fn update_target<F: FnMut(&mut BlockTarget)>(&mut self, index: usize, mut f: F) {
        match (index, self) {
            (0, Terminator::Br { ref mut target, .. }) => f(target),
            (
                0,
                Terminator::CondBr {
                    ref mut if_true, ..
                },
            ) => {
                f(if_true);
            }
            (
                1,
                Terminator::CondBr {
                    ref mut if_false, ..
                },
            ) => {
                f(if_false);
            }
            (
                0,
                Terminator::Select {
                    ref mut default, ..
                },
            ) => {
                f(default);
            }
            (
                i,
                Terminator::Select {
                    ref mut targets, ..
                },
            ) if i <= targets.len() => {
                f(&mut targets[i - 1]);
            }
            (i, this) => panic!("out of bounds: index {} term {:?}", i, this),
        }
    }

    pub fn visit_successors<F: FnMut(Block)>(&self, mut f: F) {
        self.visit_targets(|target| f(target.block));
    }

    pub fn visit_uses<F: FnMut(Value)>(&self, mut f: F) {
        self.visit_targets(|target| {
            for &arg in &target.args {
                f(arg);
            }
        });
        match self {
            &Terminator::CondBr { cond, .. } => f(cond),
            &Terminator::Select { value, .. } => f(value),
            &Terminator::Return { value: Some(value) } => f(value),
            _ => {}
        }
    }

    pub fn update_uses<F: FnMut(&mut Value)>(&mut self, mut f: F) {
        self.update_targets(|target| {
            for arg in &mut target.args {
                f(arg);
            }
        });
        match self {
            &mut Terminator::CondBr { ref mut cond, .. } => f(cond),
            &mut Terminator::Select { ref mut value, .. } => f(value),
            &mut Terminator::Return {
                value: Some(ref mut value),
            } => f(value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::SignatureData;

    #[test]
    fn edges_track_positions_both_ways() {
        let mut module = Module::empty();
        let sig = module.add_signature(SignatureData {
            params: vec![Type::I1],
            ret: Type::Void,
        });
        let mut body = FunctionBody::new(&module, sig);
        let cond = body.params().next().unwrap();
        let a = body.add_block();
        let b = body.add_block();
        body.end_block(
            body.entry,
            Terminator::CondBr {
                cond,
                if_true: BlockTarget { block: a, args: vec![] },
                if_false: BlockTarget { block: b, args: vec![] },
            },
        );
        body.end_block(a, Terminator::Br { target: BlockTarget { block: b, args: vec![] } });
        body.end_block(b, Terminator::Return { value: None });

        assert_eq!(body.blocks[body.entry].succs, vec![a, b]);
        assert_eq!(body.blocks[b].preds, vec![body.entry, a]);
        assert_eq!(body.blocks[b].pos_in_pred_succ, vec![1, 0]);

        let before = body.blocks[b].preds.clone();
        body.recompute_edges();
        assert_eq!(body.blocks[b].preds, before);
        assert_eq!(body.blocks[body.entry].terminator.num_targets(), 2);
        module.funcs.push(FuncDecl::Body(sig, "f".to_owned(), Linkage::Internal, body));
    }

    #[test]
    fn constants_are_interned() {
        let mut body = FunctionBody::default();
        let a = body.add_const(Constant::int(Type::I32, 5));
        let b = body.add_const(Constant::int(Type::I32, 5));
        let c = body.add_const(Constant::int(Type::I64, 5));
        assert_eq!(a, b);
        assert_ne!(a, c);
        let alias = body.add_placeholder(Type::I32);
        body.set_alias(alias, a);
        assert_eq!(body.const_of(alias), Some(&Constant::int(Type::I32, 5)));
    }
}
