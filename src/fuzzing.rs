//! Fuzzing-specific utilities: random, well-formed modules built from
//! an arbitrary byte string.
//!
//! Generated modules are meant to be interpreted and optimized, then
//! compared. They contain no `undef` literals (the interpreter reads
//! those as zero, while the solver may pick any value) and every
//! global has a concrete initializer. Blocks only read values of their
//! own and of the entry block, which dominates everything, so any CFG
//! shape is valid SSA. Loops come from back edges through block
//! params; they may run forever, which the interpreter's fuel catches.

use crate::entity::EntityRef;
use crate::ir::*;
use crate::{MemoryArg, Operator};
use arbitrary::{Result, Unstructured};

/// Build a module from `bytes`. Function 0 is the external entry point
/// `main: (i32) -> i32`; the last function is an import of a known
/// intrinsic.
pub fn generate_module(bytes: &[u8]) -> Result<Module> {
    let mut gen = Generator {
        u: Unstructured::new(bytes),
        module: Module::empty(),
    };
    gen.generate()?;
    log::debug!("generated module:\n{}", gen.module.display());
    Ok(gen.module)
}

const INT_OPS: &[Operator] = &[
    Operator::Add,
    Operator::Sub,
    Operator::Mul,
    Operator::And,
    Operator::Or,
    Operator::Xor,
    Operator::Shl,
    Operator::ShrU,
    Operator::ShrS,
    Operator::DivU,
    Operator::RemS,
];

const CMP_OPS: &[Operator] = &[
    Operator::Eq,
    Operator::Ne,
    Operator::LtS,
    Operator::LtU,
    Operator::GeS,
    Operator::GtU,
];

const INTRINSICS: &[&str] = &["umax", "smin"];

struct Generator<'a> {
    u: Unstructured<'a>,
    module: Module,
}

/// Values a block may read, by type.
#[derive(Clone, Debug, Default)]
struct Pool {
    ints: Vec<Value>,
    bools: Vec<Value>,
}

impl<'a> Generator<'a> {
    fn generate(&mut self) -> Result<()> {
        let num_globals = self.u.int_in_range(0..=3)?;
        for i in 0..num_globals {
            let init = self.small_int()?;
            let linkage = if i == 0 || self.u.ratio(3, 4)? {
                Linkage::Internal
            } else {
                Linkage::External
            };
            self.module.globals.push(GlobalData {
                ty: Type::I32,
                init: Some(Constant::int(Type::I32, init)),
                mutable: self.u.ratio(4, 5)?,
                linkage,
            });
        }

        let num_funcs = self.u.int_in_range(1..=4)?;
        let main_sig = self.module.add_signature(SignatureData {
            params: vec![Type::I32],
            ret: Type::I32,
        });
        let helper_sig = self.module.add_signature(SignatureData {
            params: vec![Type::I32, Type::I32],
            ret: Type::I32,
        });
        // Callees are always declared after their callers, so there is
        // no recursion; the import comes last.
        for index in 0..num_funcs {
            let (sig, name, linkage) = if index == 0 {
                (main_sig, "main".to_owned(), Linkage::External)
            } else {
                let linkage = if self.u.ratio(4, 5)? {
                    Linkage::Internal
                } else {
                    Linkage::External
                };
                (helper_sig, format!("helper{}", index), linkage)
            };
            let body = self.function(sig, index, num_funcs + 1)?;
            self.module
                .funcs
                .push(FuncDecl::Body(sig, name, linkage, body));
        }
        let intrinsic = *self.u.choose(INTRINSICS)?;
        self.module
            .funcs
            .push(FuncDecl::Import(helper_sig, intrinsic.to_owned()));
        Ok(())
    }

    fn small_int(&mut self) -> Result<u64> {
        Ok(match self.u.int_in_range(0..=7)? {
            0 => u32::MAX as u64,
            1 => self.u.arbitrary::<u32>()? as u64,
            n => (n - 2) as u64,
        })
    }

    fn function(&mut self, sig: Signature, index: usize, num_funcs: usize) -> Result<FunctionBody> {
        let mut body = FunctionBody::new(&self.module, sig);
        let num_blocks = self.u.int_in_range(1..=6)?;
        let mut blocks = vec![body.entry];
        for _ in 1..num_blocks {
            let block = body.add_block();
            for _ in 0..self.u.int_in_range(0..=2)? {
                body.add_blockparam(block, Type::I32);
            }
            blocks.push(block);
        }

        let mut entry_pool = Pool::default();
        entry_pool.ints.extend(body.params());
        for (i, &block) in blocks.iter().enumerate() {
            let mut pool = entry_pool.clone();
            if i > 0 {
                pool.ints
                    .extend(body.blocks[block].params.iter().map(|&(_, param)| param));
            }
            for _ in 0..self.u.int_in_range(0..=6)? {
                self.inst(&mut body, block, &mut pool, index, num_funcs)?;
            }
            let last = i + 1 == blocks.len();
            let term = self.terminator(&mut body, &blocks[..], i, &mut pool, last)?;
            body.end_block(block, term);
            if i == 0 {
                entry_pool = pool;
            }
        }
        Ok(body)
    }

    fn int_operand(&mut self, body: &mut FunctionBody, pool: &Pool) -> Result<Value> {
        if pool.ints.is_empty() || self.u.ratio(1, 4)? {
            let bits = self.small_int()?;
            return Ok(body.add_const(Constant::int(Type::I32, bits)));
        }
        Ok(*self.u.choose(&pool.ints[..])?)
    }

    fn bool_operand(&mut self, body: &mut FunctionBody, pool: &mut Pool, block: Block) -> Result<Value> {
        if !pool.bools.is_empty() && self.u.ratio(2, 3)? {
            return Ok(*self.u.choose(&pool.bools[..])?);
        }
        let op = *self.u.choose(CMP_OPS)?;
        let a = self.int_operand(body, pool)?;
        let b = self.int_operand(body, pool)?;
        let cond = body.add_op(block, op, &[a, b], Type::I1);
        pool.bools.push(cond);
        Ok(cond)
    }

    fn global_addr(&mut self, body: &mut FunctionBody) -> Result<Option<Value>> {
        let n = self.module.globals.len();
        if n == 0 {
            return Ok(None);
        }
        let global = Global::new(self.u.int_in_range(0..=n - 1)?);
        Ok(Some(body.add_const(Constant::GlobalAddr(global))))
    }

    fn inst(
        &mut self,
        body: &mut FunctionBody,
        block: Block,
        pool: &mut Pool,
        index: usize,
        num_funcs: usize,
    ) -> Result<()> {
        match self.u.int_in_range(0..=9)? {
            0..=3 => {
                let op = *self.u.choose(INT_OPS)?;
                let a = self.int_operand(body, pool)?;
                let b = self.int_operand(body, pool)?;
                pool.ints.push(body.add_op(block, op, &[a, b], Type::I32));
            }
            4 => {
                self.bool_operand(body, pool, block)?;
            }
            5 => {
                let cond = self.bool_operand(body, pool, block)?;
                let a = self.int_operand(body, pool)?;
                let b = self.int_operand(body, pool)?;
                pool.ints
                    .push(body.add_op(block, Operator::Select, &[cond, a, b], Type::I32));
            }
            6 => {
                let cond = self.bool_operand(body, pool, block)?;
                let op = if self.u.ratio(1, 2)? {
                    Operator::Zext
                } else {
                    Operator::Sext
                };
                pool.ints.push(body.add_op(block, op, &[cond], Type::I32));
            }
            7 => {
                if let Some(addr) = self.global_addr(body)? {
                    let load = Operator::Load {
                        memory: MemoryArg::default(),
                    };
                    pool.ints.push(body.add_op(block, load, &[addr], Type::I32));
                }
            }
            8 => {
                if let Some(addr) = self.global_addr(body)? {
                    let value = self.int_operand(body, pool)?;
                    let store = Operator::Store {
                        memory: MemoryArg::default(),
                    };
                    body.add_op(block, store, &[addr, value], Type::Void);
                }
            }
            _ => {
                if index + 1 < num_funcs {
                    let callee = Func::new(self.u.int_in_range(index + 1..=num_funcs - 1)?);
                    let a = self.int_operand(body, pool)?;
                    let b = self.int_operand(body, pool)?;
                    let call = Operator::Call {
                        function_index: callee,
                    };
                    pool.ints.push(body.add_op(block, call, &[a, b], Type::I32));
                }
            }
        }
        Ok(())
    }

    fn target(
        &mut self,
        body: &mut FunctionBody,
        blocks: &[Block],
        from: usize,
        pool: &Pool,
    ) -> Result<BlockTarget> {
        // Mostly forward; back edges make loops. Never the entry block.
        let to = if from + 1 < blocks.len() && self.u.ratio(3, 4)? {
            self.u.int_in_range(from + 1..=blocks.len() - 1)?
        } else {
            self.u.int_in_range(1..=blocks.len() - 1)?
        };
        let block = blocks[to];
        let mut args = vec![];
        for _ in 0..body.blocks[block].params.len() {
            args.push(self.int_operand(body, pool)?);
        }
        Ok(BlockTarget { block, args })
    }

    fn terminator(
        &mut self,
        body: &mut FunctionBody,
        blocks: &[Block],
        from: usize,
        pool: &mut Pool,
        last: bool,
    ) -> Result<Terminator> {
        if last || self.u.ratio(1, 6)? || blocks.len() == 1 {
            let value = self.int_operand(body, pool)?;
            return Ok(Terminator::Return { value: Some(value) });
        }
        let block = blocks[from];
        Ok(match self.u.int_in_range(0..=3)? {
            0 => Terminator::Br {
                target: self.target(body, blocks, from, pool)?,
            },
            1 | 2 => {
                let cond = self.bool_operand(body, pool, block)?;
                Terminator::CondBr {
                    cond,
                    if_true: self.target(body, blocks, from, pool)?,
                    if_false: self.target(body, blocks, from, pool)?,
                }
            }
            _ => {
                let value = self.int_operand(body, pool)?;
                let mut targets = vec![];
                for _ in 0..self.u.int_in_range(1..=2)? {
                    targets.push(self.target(body, blocks, from, pool)?);
                }
                Terminator::Select {
                    value,
                    targets,
                    default: self.target(body, blocks, from, pool)?,
                }
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_modules_read_back() {
        for seed in 0..32u8 {
            let bytes: Vec<u8> = (0..512u32)
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed.wrapping_mul(7)) ^ seed)
                .collect();
            let module = generate_module(&bytes).unwrap();
            let text = format!("{}", module.display());
            let again = Module::from_text(&text).unwrap();
            assert_eq!(text, format!("{}", again.display()), "seed {}", seed);
            assert_eq!(module.funcs[Func::new(0)].name(), "main");
        }
    }

    #[test]
    fn empty_input_still_builds() {
        let module = generate_module(&[]).unwrap();
        assert!(module.funcs[Func::new(0)].body().is_some());
    }
}
