//! Displaying IR.
//!
//! The non-verbose output is the text format read back by
//! `Module::from_text()`.

use super::{BlockTarget, FuncDecl, FunctionBody, Module, Terminator, Value, ValueDef};
use crate::entity::EntityRef;
use fxhash::FxHashMap;

use std::fmt::{Display, Formatter, Result as FmtResult};

pub struct FunctionBodyDisplay<'a>(
    pub(crate) &'a FunctionBody,
    pub(crate) &'a str,
    pub(crate) bool,
);

impl FunctionBody {
    /// The names values are printed under: block params and
    /// instructions, numbered in print order with the entry block
    /// first. Reading the text back and printing it again gives the
    /// same names.
    pub fn value_names(&self) -> FxHashMap<Value, Value> {
        let mut names = FxHashMap::default();
        let entry = std::iter::once(self.entry);
        let rest = self.blocks.iter().filter(|&block| block != self.entry);
        for block in entry.chain(rest) {
            let def = &self.blocks[block];
            let params = def.params.iter().map(|&(_, param)| param);
            let insts = def
                .insts
                .iter()
                .map(|&inst| self.resolve_alias(inst))
                .filter(|&inst| matches!(self.values[inst], ValueDef::Operator(..)));
            for value in params.chain(insts) {
                if !names.contains_key(&value) {
                    let name = Value::new(names.len());
                    names.insert(value, name);
                }
            }
        }
        names
    }
}

/// An operand as written in text: literals inline, other values by
/// name.
fn operand(body: &FunctionBody, names: &FxHashMap<Value, Value>, value: Value) -> String {
    let value = body.resolve_alias(value);
    match &body.values[value] {
        ValueDef::Const(c) => format!("{}", c),
        _ => format!("{}", names.get(&value).copied().unwrap_or(value)),
    }
}

fn target(body: &FunctionBody, names: &FxHashMap<Value, Value>, target: &BlockTarget) -> String {
    let args = target
        .args
        .iter()
        .map(|&arg| operand(body, names, arg))
        .collect::<Vec<_>>();
    format!("{}({})", target.block, args.join(", "))
}

fn terminator(body: &FunctionBody, names: &FxHashMap<Value, Value>, term: &Terminator) -> String {
    match term {
        Terminator::Br { target: t } => format!("br {}", target(body, names, t)),
        Terminator::CondBr {
            cond,
            if_true,
            if_false,
        } => format!(
            "if {}, {}, {}",
            operand(body, names, *cond),
            target(body, names, if_true),
            target(body, names, if_false)
        ),
        Terminator::Select {
            value,
            targets,
            default,
        } => format!(
            "select {}, [{}], {}",
            operand(body, names, *value),
            targets
                .iter()
                .map(|t| target(body, names, t))
                .collect::<Vec<_>>()
                .join(", "),
            target(body, names, default)
        ),
        Terminator::Return { value: Some(value) } => format!("return {}", operand(body, names, *value)),
        term => format!("{}", term),
    }
}

impl<'a> Display for FunctionBodyDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let body = self.0;
        let names = body.value_names();
        let entry = std::iter::once(body.entry);
        let rest = body.blocks.iter().filter(|&block| block != body.entry);
        for block_id in entry.chain(rest) {
            let block = &body.blocks[block_id];
            let block_params = block
                .params
                .iter()
                .map(|(ty, val)| format!("{}: {}", names[val], ty))
                .collect::<Vec<_>>();
            writeln!(f, "{}{}({}):", self.1, block_id, block_params.join(", "))?;
            if self.2 {
                for &pred in &block.preds {
                    writeln!(f, "{}  # pred: {}", self.1, pred)?;
                }
                for &succ in &block.succs {
                    writeln!(f, "{}  # succ: {}", self.1, succ)?;
                }
            }
            for &inst in &block.insts {
                let inst = body.resolve_alias(inst);
                if let ValueDef::Operator(op, args, ty) = &body.values[inst] {
                    let args = args
                        .iter()
                        .map(|&v| operand(body, &names, v))
                        .collect::<Vec<_>>();
                    let sep = if args.is_empty() { "" } else { " " };
                    writeln!(
                        f,
                        "{}  {}: {} = {}{}{}",
                        self.1,
                        names[&inst],
                        ty,
                        op,
                        sep,
                        args.join(", ")
                    )?;
                }
            }
            writeln!(
                f,
                "{}  {}",
                self.1,
                terminator(body, &names, &block.terminator)
            )?;
        }
        Ok(())
    }
}

pub struct ModuleDisplay<'a>(pub(crate) &'a Module);

impl<'a> Display for ModuleDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        for (global, data) in self.0.globals.entries() {
            write!(f, "global @{}: {}", global, data.ty)?;
            if let Some(init) = &data.init {
                write!(f, " = {}", init)?;
            }
            let mutability = if data.mutable { "mutable" } else { "const" };
            writeln!(f, " {} {}", data.linkage, mutability)?;
        }
        for (func, func_decl) in self.0.funcs() {
            let sig = self.0.signature(func_decl.sig());
            match func_decl {
                FuncDecl::Body(_, name, linkage, body) => {
                    writeln!(f, "func @{} \"{}\" {} {} {{", func, name, linkage, sig)?;
                    write!(f, "{}", body.display(""))?;
                    writeln!(f, "}}")?;
                }
                FuncDecl::Import(_, name) => {
                    writeln!(f, "import @{} \"{}\" {}", func, name, sig)?;
                }
            }
        }
        Ok(())
    }
}
