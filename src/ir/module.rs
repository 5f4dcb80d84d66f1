use super::{Constant, Func, FuncDecl, FunctionBody, Global, Linkage, ModuleDisplay, Signature, Type};
use crate::entity::EntityVec;
use crate::frontend;
use anyhow::Result;

/// A module: functions, their signatures and the global variables
/// they share.
///
/// The ordinary flow for a tool that processes a module is:
///
/// - Parse a module from text using `Module::from_text()`, or build
///   one with `Module::empty()` and the `FunctionBody` builder methods.
/// - Analyze or rewrite function bodies in place (see
///   `passes::sccp`).
/// - Print the result with `Module::display()`, which produces text
///   `Module::from_text()` accepts again.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// The functions in this module: imports or function bodies.
    pub funcs: EntityVec<Func, FuncDecl>,
    /// Type signatures, referred to by `funcs`.
    pub signatures: EntityVec<Signature, SignatureData>,
    /// Global variables in this module.
    pub globals: EntityVec<Global, GlobalData>,
}

/// A function signature definition.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignatureData {
    pub params: Vec<Type>,
    /// `Void` for functions without a result.
    pub ret: Type,
}

impl std::fmt::Display for SignatureData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let params = self
            .params
            .iter()
            .map(|ty| format!("{}", ty))
            .collect::<Vec<_>>();
        write!(f, "({}) -> {}", params.join(", "), self.ret)
    }
}

/// A global-variable definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlobalData {
    /// The type of this global variable.
    pub ty: Type,
    /// The initial value, if it is known to this module.
    pub init: Option<Constant>,
    /// Whether stores to this global are allowed.
    pub mutable: bool,
    pub linkage: Linkage,
}

impl Module {
    pub fn empty() -> Module {
        Module::default()
    }

    pub fn from_text(text: &str) -> Result<Module> {
        frontend::parse(text)
    }

    pub fn signature(&self, sig: Signature) -> &SignatureData {
        &self.signatures[sig]
    }

    /// Intern a signature.
    pub fn add_signature(&mut self, data: SignatureData) -> Signature {
        let found = self
            .signatures
            .entries()
            .find(|(_, existing)| **existing == data)
            .map(|(sig, _)| sig);
        match found {
            Some(sig) => sig,
            None => self.signatures.push(data),
        }
    }

    pub fn func_sig(&self, func: Func) -> &SignatureData {
        self.signature(self.funcs[func].sig())
    }

    pub fn funcs(&self) -> impl Iterator<Item = (Func, &FuncDecl)> {
        self.funcs.entries()
    }

    /// Functions with bodies.
    pub fn bodies(&self) -> impl Iterator<Item = (Func, &FunctionBody)> {
        self.funcs
            .entries()
            .filter_map(|(func, decl)| decl.body().map(|body| (func, body)))
    }

    pub fn per_func_body<F: Fn(&mut FunctionBody)>(&mut self, f: F) {
        for func_decl in self.funcs.values_mut() {
            if let Some(body) = func_decl.body_mut() {
                f(body);
            }
        }
    }

    pub fn display(&self) -> ModuleDisplay<'_> {
        ModuleDisplay(self)
    }
}
