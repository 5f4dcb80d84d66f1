//! Reader for the textual IR printed by `Module::display()`.

use crate::entity::EntityRef;
use crate::errors::FrontendError;
use crate::ir::*;
use crate::{MemoryArg, Operator};
use anyhow::{bail, Context, Result};
use fxhash::{FxHashMap, FxHashSet};

pub(crate) fn parse(text: &str) -> Result<Module> {
    let mut module = Module::empty();
    let mut func: Option<FuncBuilder> = None;

    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cursor = Cursor { s: line };
        let result = if line == "}" && func.is_some() {
            match func.take() {
                Some(builder) => builder.finish(&mut module),
                None => Ok(()),
            }
        } else if let Some(builder) = func.as_mut() {
            builder.parse_line(&mut cursor)
        } else {
            parse_module_item(&mut module, &mut cursor).map(|opened| {
                func = opened.map(|mut builder| {
                    builder.declare_blocks(&lines[i + 1..]);
                    builder
                });
            })
        };
        result.with_context(|| format!("line {}: {}", i + 1, line))?;
    }

    if func.is_some() {
        bail!(FrontendError::Syntax("unterminated function body".to_owned()));
    }
    validate(&module)?;
    Ok(module)
}

struct Cursor<'a> {
    s: &'a str,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn syntax(msg: String) -> anyhow::Error {
    FrontendError::Syntax(msg).into()
}

impl<'a> Cursor<'a> {
    fn skip_ws(&mut self) {
        self.s = self.s.trim_start();
    }

    fn is_done(&mut self) -> bool {
        self.skip_ws();
        self.s.is_empty()
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.s.chars().next()
    }

    fn eat(&mut self, tok: &str) -> bool {
        self.skip_ws();
        if let Some(rest) = self.s.strip_prefix(tok) {
            self.s = rest;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &str) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(syntax(format!("expected `{}` at `{}`", tok, self.s)))
        }
    }

    fn peek_word(&mut self) -> &'a str {
        self.skip_ws();
        let end = self.s.find(|c| !is_word_char(c)).unwrap_or(self.s.len());
        &self.s[..end]
    }

    fn word(&mut self) -> Result<&'a str> {
        let word = self.peek_word();
        if word.is_empty() {
            return Err(syntax(format!("expected a name at `{}`", self.s)));
        }
        self.s = &self.s[word.len()..];
        Ok(word)
    }

    fn int(&mut self) -> Result<u64> {
        self.skip_ws();
        let negative = self.eat("-");
        let digits = self.word()?;
        let magnitude: u64 = digits
            .parse()
            .map_err(|_| syntax(format!("bad integer `{}`", digits)))?;
        Ok(if negative {
            magnitude.wrapping_neg()
        } else {
            magnitude
        })
    }

    fn string(&mut self) -> Result<&'a str> {
        self.expect("\"")?;
        let end = self
            .s
            .find('"')
            .ok_or_else(|| syntax("unterminated string".to_owned()))?;
        let s = &self.s[..end];
        self.s = &self.s[end + 1..];
        Ok(s)
    }

    fn end(&mut self) -> Result<()> {
        if self.is_done() {
            Ok(())
        } else {
            Err(syntax(format!("trailing text `{}`", self.s)))
        }
    }

    fn index(&mut self, prefix: &str) -> Result<usize> {
        let word = self.word()?;
        parse_index(prefix, word)
    }

    fn ty(&mut self) -> Result<Type> {
        if self.eat("{") {
            let mut fields = vec![];
            if !self.eat("}") {
                loop {
                    fields.push(self.ty()?);
                    if self.eat("}") {
                        break;
                    }
                    self.expect(",")?;
                }
            }
            return Ok(Type::Struct(fields));
        }
        let word = self.word()?;
        match word {
            "i1" => Ok(Type::I1),
            "i8" => Ok(Type::I8),
            "i16" => Ok(Type::I16),
            "i32" => Ok(Type::I32),
            "i64" => Ok(Type::I64),
            "ptr" => Ok(Type::Ptr),
            "void" => Ok(Type::Void),
            _ => Err(syntax(format!("unknown type `{}`", word))),
        }
    }

    /// Whether the next token starts a literal rather than a value name.
    fn at_constant(&mut self) -> bool {
        match self.peek() {
            Some('{') | Some('@') => true,
            _ => matches!(
                self.peek_word(),
                "undef" | "zero" | "null" | "i1" | "i8" | "i16" | "i32" | "i64"
            ),
        }
    }

    fn constant(&mut self) -> Result<Constant> {
        if self.eat("{") {
            let mut fields = vec![];
            if !self.eat("}") {
                loop {
                    fields.push(self.constant()?);
                    if self.eat("}") {
                        break;
                    }
                    self.expect(",")?;
                }
            }
            return Ok(Constant::Struct(fields));
        }
        if self.eat("@") {
            let word = self.word()?;
            if word.starts_with('f') {
                return Ok(Constant::FuncAddr(Func::new(parse_index("f", word)?)));
            }
            return match word.split_once('.') {
                Some((global, field)) => {
                    let field = field
                        .parse()
                        .map_err(|_| syntax(format!("bad field index in `{}`", word)))?;
                    Ok(Constant::FieldAddr(
                        Global::new(parse_index("g", global)?),
                        field,
                    ))
                }
                None => Ok(Constant::GlobalAddr(Global::new(parse_index("g", word)?))),
            };
        }
        match self.peek_word() {
            "undef" => {
                self.word()?;
                Ok(Constant::Undef(self.ty()?))
            }
            "zero" => {
                self.word()?;
                let ty = self.ty()?;
                if !ty.is_struct() {
                    return Err(syntax(format!("zero fill of non-struct type {}", ty)));
                }
                Ok(Constant::Zero(ty))
            }
            "null" => {
                self.word()?;
                Ok(Constant::Null)
            }
            _ => {
                let ty = self.ty()?;
                if !ty.is_int() {
                    return Err(syntax(format!("integer literal of type {}", ty)));
                }
                Ok(Constant::int(ty, self.int()?))
            }
        }
    }

    fn sig(&mut self) -> Result<SignatureData> {
        self.expect("(")?;
        let mut params = vec![];
        if !self.eat(")") {
            loop {
                params.push(self.ty()?);
                if self.eat(")") {
                    break;
                }
                self.expect(",")?;
            }
        }
        self.expect("->")?;
        let ret = self.ty()?;
        Ok(SignatureData { params, ret })
    }

    fn linkage(&mut self) -> Result<Linkage> {
        match self.word()? {
            "internal" => Ok(Linkage::Internal),
            "external" => Ok(Linkage::External),
            "weak" => Ok(Linkage::Weak),
            other => Err(syntax(format!("unknown linkage `{}`", other))),
        }
    }
}

fn parse_index(prefix: &str, word: &str) -> Result<usize> {
    word.strip_prefix(prefix)
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| syntax(format!("expected `{}N`, found `{}`", prefix, word)))
}

/// Parse a global, import or function header. Returns a builder when a
/// function body opens.
fn parse_module_item(module: &mut Module, c: &mut Cursor) -> Result<Option<FuncBuilder>> {
    match c.word()? {
        "global" => {
            c.expect("@")?;
            let index = c.index("g")?;
            if index != module.globals.len() {
                bail!(FrontendError::BadIndex(format!(
                    "global g{} declared out of order",
                    index
                )));
            }
            c.expect(":")?;
            let ty = c.ty()?;
            let init = if c.eat("=") { Some(c.constant()?) } else { None };
            let linkage = c.linkage()?;
            let mutable = match c.word()? {
                "mutable" => true,
                "const" => false,
                other => return Err(syntax(format!("expected mutability, found `{}`", other))),
            };
            c.end()?;
            module.globals.push(GlobalData {
                ty,
                init,
                mutable,
                linkage,
            });
            Ok(None)
        }
        "import" => {
            c.expect("@")?;
            check_func_index(module, c.index("f")?)?;
            let name = c.string()?.to_owned();
            let sig = c.sig()?;
            c.end()?;
            let sig = module.add_signature(sig);
            module.funcs.push(FuncDecl::Import(sig, name));
            Ok(None)
        }
        "func" => {
            c.expect("@")?;
            check_func_index(module, c.index("f")?)?;
            let name = c.string()?.to_owned();
            let linkage = c.linkage()?;
            let sig = c.sig()?;
            c.expect("{")?;
            c.end()?;
            let sig = module.add_signature(sig);
            let body = FunctionBody::new(module, sig);
            Ok(Some(FuncBuilder {
                name,
                linkage,
                sig,
                body,
                values: FxHashMap::default(),
                blocks: FxHashMap::default(),
                defined_blocks: FxHashSet::default(),
                current: None,
            }))
        }
        other => Err(syntax(format!("unexpected `{}`", other))),
    }
}

fn check_func_index(module: &Module, index: usize) -> Result<()> {
    if index != module.funcs.len() {
        bail!(FrontendError::BadIndex(format!(
            "function f{} declared out of order",
            index
        )));
    }
    Ok(())
}

struct FuncBuilder {
    name: String,
    linkage: Linkage,
    sig: Signature,
    body: FunctionBody,
    values: FxHashMap<String, Value>,
    blocks: FxHashMap<String, Block>,
    defined_blocks: FxHashSet<Block>,
    /// The open block, until its terminator is read.
    current: Option<Block>,
}

impl FuncBuilder {
    fn parse_line(&mut self, c: &mut Cursor) -> Result<()> {
        if c.s.ends_with(':') {
            return self.parse_block_header(c);
        }
        let block = self
            .current
            .ok_or_else(|| syntax("instruction outside of a block".to_owned()))?;
        let word = c.word()?;
        if c.peek() == Some(':') {
            self.parse_inst(block, word, c)
        } else {
            let term = self.parse_terminator(word, c)?;
            c.end()?;
            self.body.end_block(block, term);
            self.current = None;
            Ok(())
        }
    }

    /// Create the blocks of a body in the order their headers appear,
    /// so that printing and reading back keeps block numbers. The first
    /// header names the entry block.
    fn declare_blocks(&mut self, lines: &[&str]) {
        let headers = lines
            .iter()
            .map(|line| line.trim())
            .take_while(|&line| line != "}")
            .filter(|line| line.ends_with(':') && !line.starts_with('#'))
            .filter_map(|line| Cursor { s: line }.word().ok());
        for (i, name) in headers.enumerate() {
            if i == 0 {
                self.blocks.insert(name.to_owned(), self.body.entry);
            } else {
                self.block_ref(name);
            }
        }
    }

    fn block_ref(&mut self, name: &str) -> Block {
        if let Some(&block) = self.blocks.get(name) {
            return block;
        }
        let block = self.body.add_block();
        self.blocks.insert(name.to_owned(), block);
        block
    }

    fn use_value(&mut self, name: &str) -> Value {
        if let Some(&value) = self.values.get(name) {
            return value;
        }
        let value = self.body.add_placeholder(Type::Void);
        self.values.insert(name.to_owned(), value);
        value
    }

    /// The value a name defines: a fresh one, or the placeholder left
    /// by an earlier forward reference.
    fn def_value(&mut self, name: &str) -> Result<Option<Value>> {
        match self.values.get(name) {
            Some(&value) if matches!(self.body.values[value], ValueDef::Placeholder(_)) => {
                Ok(Some(value))
            }
            Some(_) => Err(FrontendError::Redefinition(name.to_owned()).into()),
            None => Ok(None),
        }
    }

    fn operand(&mut self, c: &mut Cursor) -> Result<Value> {
        if c.at_constant() {
            let constant = c.constant()?;
            Ok(self.body.add_const(constant))
        } else {
            let name = c.word()?;
            Ok(self.use_value(name))
        }
    }

    fn parse_block_header(&mut self, c: &mut Cursor) -> Result<()> {
        if let Some(open) = self.current {
            bail!(FrontendError::Invalid(format!(
                "block {} has no terminator",
                open
            )));
        }
        let name = c.word()?;
        let block = self.block_ref(name);
        let is_entry = block == self.body.entry;
        if !self.defined_blocks.insert(block) {
            bail!(FrontendError::Redefinition(name.to_owned()));
        }

        c.expect("(")?;
        let mut index = 0;
        if !c.eat(")") {
            loop {
                let param = c.word()?;
                c.expect(":")?;
                let ty = c.ty()?;
                if is_entry {
                    let &(ref expected, value) =
                        self.body.blocks[block].params.get(index).ok_or_else(|| {
                            FrontendError::Invalid("too many entry parameters".to_owned())
                        })?;
                    if *expected != ty {
                        bail!(FrontendError::Invalid(format!(
                            "entry parameter {} has type {}, signature says {}",
                            param, ty, expected
                        )));
                    }
                    if self.values.insert(param.to_owned(), value).is_some() {
                        bail!(FrontendError::Redefinition(param.to_owned()));
                    }
                } else {
                    match self.def_value(param)? {
                        Some(value) => {
                            self.body.replace_placeholder_with_blockparam(block, value, ty)
                        }
                        None => {
                            let value = self.body.add_blockparam(block, ty);
                            self.values.insert(param.to_owned(), value);
                        }
                    }
                }
                index += 1;
                if c.eat(")") {
                    break;
                }
                c.expect(",")?;
            }
        }
        if is_entry && index != self.body.blocks[block].params.len() {
            bail!(FrontendError::Invalid(
                "entry block parameters do not match the signature".to_owned()
            ));
        }
        c.expect(":")?;
        c.end()?;
        self.current = Some(block);
        Ok(())
    }

    fn parse_inst(&mut self, block: Block, name: &str, c: &mut Cursor) -> Result<()> {
        c.expect(":")?;
        let ty = c.ty()?;
        c.expect("=")?;
        let mnemonic = c.word()?;
        let op = parse_op(mnemonic, c)?;
        let mut args = vec![];
        if !c.is_done() {
            loop {
                args.push(self.operand(c)?);
                if c.is_done() {
                    break;
                }
                c.expect(",")?;
            }
        }
        if let Some(arity) = crate::op_traits::op_arity(&op) {
            if arity != args.len() {
                bail!(FrontendError::Invalid(format!(
                    "`{}` takes {} operands, found {}",
                    op,
                    arity,
                    args.len()
                )));
            }
        }

        let def = ValueDef::Operator(op, args, ty);
        let value = match self.def_value(name)? {
            Some(value) => {
                self.body.values[value] = def;
                value
            }
            None => {
                let value = self.body.add_value(def);
                self.values.insert(name.to_owned(), value);
                value
            }
        };
        self.body.append_to_block(block, value);
        Ok(())
    }

    fn target(&mut self, c: &mut Cursor) -> Result<BlockTarget> {
        let name = c.word()?;
        let block = self.block_ref(name);
        c.expect("(")?;
        let mut args = vec![];
        if !c.eat(")") {
            loop {
                args.push(self.operand(c)?);
                if c.eat(")") {
                    break;
                }
                c.expect(",")?;
            }
        }
        Ok(BlockTarget { block, args })
    }

    fn parse_terminator(&mut self, word: &str, c: &mut Cursor) -> Result<Terminator> {
        match word {
            "br" => Ok(Terminator::Br {
                target: self.target(c)?,
            }),
            "if" => {
                let cond = self.operand(c)?;
                c.expect(",")?;
                let if_true = self.target(c)?;
                c.expect(",")?;
                let if_false = self.target(c)?;
                Ok(Terminator::CondBr {
                    cond,
                    if_true,
                    if_false,
                })
            }
            "select" => {
                let value = self.operand(c)?;
                c.expect(",")?;
                c.expect("[")?;
                let mut targets = vec![];
                if !c.eat("]") {
                    loop {
                        targets.push(self.target(c)?);
                        if c.eat("]") {
                            break;
                        }
                        c.expect(",")?;
                    }
                }
                c.expect(",")?;
                let default = self.target(c)?;
                Ok(Terminator::Select {
                    value,
                    targets,
                    default,
                })
            }
            "return" => {
                let value = if c.is_done() {
                    None
                } else {
                    Some(self.operand(c)?)
                };
                Ok(Terminator::Return { value })
            }
            "unreachable" => Ok(Terminator::Unreachable),
            other => Err(syntax(format!("unknown terminator `{}`", other))),
        }
    }

    fn finish(mut self, module: &mut Module) -> Result<()> {
        if let Some(open) = self.current {
            bail!(FrontendError::Invalid(format!(
                "block {} has no terminator",
                open
            )));
        }
        if self.defined_blocks.is_empty() {
            bail!(FrontendError::Invalid(format!(
                "function {} has no blocks",
                self.name
            )));
        }
        for (name, &block) in &self.blocks {
            if !self.defined_blocks.contains(&block) {
                bail!(FrontendError::UndefinedBlock(name.clone()));
            }
        }
        for (name, &value) in &self.values {
            if matches!(self.body.values[value], ValueDef::Placeholder(_)) {
                bail!(FrontendError::UndefinedValue(name.clone()));
            }
        }
        for (block, def) in self.body.blocks.entries() {
            let mut arity_ok = true;
            def.terminator.visit_targets(|target| {
                arity_ok &= target.args.len() == self.body.blocks[target.block].params.len();
            });
            if !arity_ok {
                bail!(FrontendError::Invalid(format!(
                    "branch arguments of {} do not match the target's parameters",
                    block
                )));
            }
        }
        self.body.recompute_edges();
        if !self.body.blocks[self.body.entry].preds.is_empty() {
            bail!(FrontendError::Invalid(format!(
                "entry block of {} has predecessors",
                self.name
            )));
        }
        module.funcs.push(FuncDecl::Body(
            self.sig,
            self.name,
            self.linkage,
            self.body,
        ));
        Ok(())
    }
}

fn parse_op(mnemonic: &str, c: &mut Cursor) -> Result<Operator> {
    let mut parts = mnemonic.split('.');
    let head = parts.next().unwrap_or("");
    let field_index = |part: Option<&str>| -> Result<u32> {
        part.and_then(|index| index.parse().ok())
            .ok_or_else(|| syntax(format!("`{}` needs an index", mnemonic)))
    };
    let op = match head {
        "add" => Operator::Add,
        "sub" => Operator::Sub,
        "mul" => Operator::Mul,
        "div_s" => Operator::DivS,
        "div_u" => Operator::DivU,
        "rem_s" => Operator::RemS,
        "rem_u" => Operator::RemU,
        "and" => Operator::And,
        "or" => Operator::Or,
        "xor" => Operator::Xor,
        "shl" => Operator::Shl,
        "shr_s" => Operator::ShrS,
        "shr_u" => Operator::ShrU,
        "eq" => Operator::Eq,
        "ne" => Operator::Ne,
        "lt_s" => Operator::LtS,
        "lt_u" => Operator::LtU,
        "le_s" => Operator::LeS,
        "le_u" => Operator::LeU,
        "gt_s" => Operator::GtS,
        "gt_u" => Operator::GtU,
        "ge_s" => Operator::GeS,
        "ge_u" => Operator::GeU,
        "zext" => Operator::Zext,
        "sext" => Operator::Sext,
        "trunc" => Operator::Trunc,
        "select" => Operator::Select,
        "extract" => Operator::ExtractField {
            index: field_index(parts.next())?,
        },
        "insert" => Operator::InsertField {
            index: field_index(parts.next())?,
        },
        "fieldaddr" => Operator::FieldAddr {
            index: field_index(parts.next())?,
        },
        "opaque" => Operator::Opaque {
            opcode: field_index(parts.next())?,
        },
        "load" | "store" => {
            let mut memory = MemoryArg::default();
            for part in parts.by_ref() {
                if part == "volatile" {
                    memory.volatile = true;
                } else if let Some(space) = part.strip_prefix("as") {
                    memory.addr_space = space
                        .parse()
                        .map_err(|_| syntax(format!("bad address space in `{}`", mnemonic)))?;
                } else {
                    return Err(syntax(format!("unknown memory flag `{}`", part)));
                }
            }
            if head == "load" {
                Operator::Load { memory }
            } else {
                Operator::Store { memory }
            }
        }
        "call" => {
            c.expect("@")?;
            Operator::Call {
                function_index: Func::new(c.index("f")?),
            }
        }
        "call_indirect" => Operator::CallIndirect,
        "alloca" => Operator::Alloca,
        "va_arg" => Operator::VaArg,
        _ => return Err(syntax(format!("unknown operator `{}`", mnemonic))),
    };
    if parts.next().is_some() {
        return Err(syntax(format!("unexpected suffix in `{}`", mnemonic)));
    }
    Ok(op)
}

fn check_constant(module: &Module, c: &Constant) -> Result<()> {
    match c {
        Constant::GlobalAddr(global) | Constant::FieldAddr(global, _)
            if global.index() >= module.globals.len() =>
        {
            bail!(FrontendError::BadIndex(format!("no global {}", global)))
        }
        Constant::FieldAddr(global, index) => {
            let n = module.globals[*global].ty.fields().map_or(0, |f| f.len());
            if *index as usize >= n {
                bail!(FrontendError::Invalid(format!(
                    "global {} has no field {}",
                    global, index
                )));
            }
            Ok(())
        }
        Constant::FuncAddr(func) if func.index() >= module.funcs.len() => {
            bail!(FrontendError::BadIndex(format!("no function {}", func)))
        }
        Constant::Struct(fields) => fields.iter().try_for_each(|f| check_constant(module, f)),
        _ => Ok(()),
    }
}

/// Cross-function checks that need the whole module.
fn validate(module: &Module) -> Result<()> {
    for global in module.globals.values() {
        if let Some(init) = &global.init {
            check_constant(module, init)?;
        }
    }
    for (func, body) in module.bodies() {
        for def in body.values.values() {
            match def {
                ValueDef::Const(c) => check_constant(module, c)?,
                ValueDef::Operator(Operator::Call { function_index }, args, _) => {
                    if function_index.index() >= module.funcs.len() {
                        bail!(FrontendError::BadIndex(format!(
                            "{} calls missing function {}",
                            func, function_index
                        )));
                    }
                    let callee = module.func_sig(*function_index);
                    if callee.params.len() != args.len() {
                        bail!(FrontendError::Invalid(format!(
                            "{} calls {} with {} arguments, expected {}",
                            func,
                            function_index,
                            args.len(),
                            callee.params.len()
                        )));
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const LOOP: &str = "
global @g0: i32 = i32 5 internal mutable
import @f0 \"ctpop\" (i32) -> i32
func @f1 \"count\" external (i32) -> i32 {
entry(n: i32):
  br head(i32 0)
head(i: i32):
  done: i1 = ge_s i, n
  if done, exit(), body()
body():
  next: i32 = add i, i32 1
  br head(next)
exit():
  return i
}
";

    #[test]
    fn forward_references_resolve() {
        let module = Module::from_text(LOOP).unwrap();
        assert_eq!(module.funcs.len(), 2);
        let body = module.funcs[Func::new(1)].body().unwrap();
        assert_eq!(body.blocks.len(), 4);
        let head = body.blocks[body.entry].succs[0];
        assert_eq!(body.blocks[head].preds.len(), 2);
        assert_eq!(body.blocks[head].params.len(), 1);
    }

    #[test]
    fn printed_text_reads_back() {
        let module = Module::from_text(LOOP).unwrap();
        let text = format!("{}", module.display());
        let again = Module::from_text(&text).unwrap();
        assert_eq!(text, format!("{}", again.display()));
        assert!(text.contains("global @g0: i32 = i32 5 internal mutable"));
        assert!(text.contains("import @f0 \"ctpop\" (i32) -> i32"));
    }

    #[test]
    fn numbering_follows_text_order() {
        let module = Module::from_text(LOOP).unwrap();
        let body = module.funcs[Func::new(1)].body().unwrap();
        // exit is named before body, but body's header comes first.
        let head = Block::new(1);
        assert_eq!(body.blocks[body.entry].succs, vec![head]);
        assert_eq!(body.blocks[head].succs, vec![Block::new(3), Block::new(2)]);

        let text = format!("{}", module.display());
        assert!(text.contains("block0(v0: i32):"));
        assert!(text.contains("block1(v1: i32):"));
        assert!(text.contains("  v2: i1 = ge_s v1, v0"));
        assert!(text.contains("  v3: i32 = add v1, i32 1"));
        let again = Module::from_text(&text).unwrap();
        let reread = again.funcs[Func::new(1)].body().unwrap();
        assert_eq!(reread.blocks[head].succs, body.blocks[head].succs);
        assert_eq!(text, format!("{}", again.display()));
    }

    #[test]
    fn literals_of_every_shape() {
        let text = "
global @g0: {i32, ptr} = zero {i32, ptr} internal const
func @f0 \"lits\" internal () -> {i32, ptr} {
b():
  p: ptr = fieldaddr.1 @g0
  x: {i32, ptr} = insert.1 {i32 -3, null}, @g0.1
  y: {i32, ptr} = insert.0 x, undef i32
  return y
}
";
        let module = Module::from_text(text).unwrap();
        let printed = format!("{}", module.display());
        assert!(printed.contains("{i32 -3, null}, @g0.1"));
        assert!(printed.contains("undef i32"));
    }

    #[test]
    fn errors_are_reported() {
        let missing_value = "func @f0 \"f\" internal () -> i32 {\nb():\n  return x\n}\n";
        let err = Module::from_text(missing_value).unwrap_err();
        assert!(format!("{:?}", err).contains("UndefinedValue"));

        let missing_block = "func @f0 \"f\" internal () -> void {\nb():\n  br c()\n}\n";
        assert!(Module::from_text(missing_block).is_err());

        let out_of_order = "import @f1 \"g\" () -> void\n";
        assert!(Module::from_text(out_of_order).is_err());

        let bad_arity = "func @f0 \"f\" internal (i32) -> i32 {\nb(a: i32):\n  x: i32 = add a\n  return x\n}\n";
        assert!(Module::from_text(bad_arity).is_err());

        let bad_call = "func @f0 \"f\" internal (i32) -> i32 {\nb(a: i32):\n  x: i32 = call @f0\n  return x\n}\n";
        assert!(Module::from_text(bad_call).is_err());
    }
}
