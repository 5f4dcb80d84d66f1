//! Postorder traversal of the blocks reachable from an entry.

use crate::entity::PerEntity;
use crate::ir::Block;
use smallvec::{smallvec, SmallVec};

pub fn calculate<'a, SuccFn: Fn(Block) -> &'a [Block]>(
    entry: Block,
    succ_blocks: SuccFn,
) -> Vec<Block> {
    let mut ret = vec![];
    let mut visited: PerEntity<Block, bool> = PerEntity::default();

    // Explicit DFS stack of (block, successors, next successor to try).
    let mut stack: SmallVec<[(Block, &'a [Block], usize); 64]> = smallvec![];
    visited[entry] = true;
    stack.push((entry, succ_blocks(entry), 0));

    while let Some((block, succs, next)) = stack.last_mut() {
        if *next < succs.len() {
            let succ = succs[*next];
            *next += 1;
            if !visited[succ] {
                visited[succ] = true;
                stack.push((succ, succ_blocks(succ), 0));
            }
        } else {
            log::trace!("postorder: finished {}", block);
            ret.push(*block);
            stack.pop();
        }
    }

    ret
}
