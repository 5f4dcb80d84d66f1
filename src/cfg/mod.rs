//! Lightweight CFG analyses.

use crate::declare_entity;
use crate::entity::{EntityVec, PerEntity};
use crate::ir::{Block, FunctionBody, Terminator};

pub mod postorder;

declare_entity!(RPOIndex, "rpo");

/// Auxiliary analyses of the control-flow graph.
#[derive(Clone, Debug)]
pub struct CFGInfo {
    /// Entry block.
    pub entry: Block,
    /// Blocks that end in return.
    pub return_blocks: Vec<Block>,
    /// Reverse-postorder traversal of the blocks reachable from entry.
    pub rpo: EntityVec<RPOIndex, Block>,
    /// Position of each block in RPO, if reachable.
    pub rpo_pos: PerEntity<Block, Option<RPOIndex>>,
}

impl CFGInfo {
    pub fn new(f: &FunctionBody) -> CFGInfo {
        let return_blocks = f
            .blocks
            .entries()
            .filter(|(_, block)| matches!(block.terminator, Terminator::Return { .. }))
            .map(|(block_id, _)| block_id)
            .collect();

        let postorder = postorder::calculate(f.entry, |block| &f.blocks[block].succs[..]);
        let rpo: EntityVec<RPOIndex, Block> = postorder.into_iter().rev().collect::<Vec<_>>().into();
        let mut rpo_pos = PerEntity::default();
        for (rpo_index, &block) in rpo.entries() {
            rpo_pos[block] = Some(rpo_index);
        }

        CFGInfo {
            entry: f.entry,
            return_blocks,
            rpo,
            rpo_pos,
        }
    }

    /// Whether the block can be reached from entry at all, ignoring
    /// branch conditions.
    pub fn is_reachable(&self, block: Block) -> bool {
        self.rpo_pos[block].is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::EntityRef;
    use crate::{Func, Module};

    #[test]
    fn rpo_visits_defs_before_uses() {
        let module = Module::from_text(
            "func @f0 \"f\" internal (i1) -> void {
entry(c: i1):
  if c, left(), right()
orphan():
  br join()
left():
  br join()
right():
  br join()
join():
  return
}
",
        )
        .unwrap();
        let body = module.funcs[Func::new(0)].body().unwrap();
        let cfg = CFGInfo::new(body);
        assert_eq!(cfg.rpo.len(), 4);
        assert_eq!(cfg.rpo[RPOIndex::new(0)], body.entry);
        let join = cfg.return_blocks[0];
        assert_eq!(cfg.rpo[RPOIndex::new(3)], join);
        let orphan = body.blocks[join]
            .preds
            .iter()
            .copied()
            .find(|&pred| !cfg.is_reachable(pred));
        assert!(orphan.is_some());
    }
}
