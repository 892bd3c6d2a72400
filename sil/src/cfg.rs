/*
 * Copyright © 2023 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

use crate::ir::*;

use rustc_hash::FxHashMap;

struct CFGBlock {
    pred: Vec<u32>,
    num_succ: u8,
    succ: [u32; 2],
}

pub struct CFG {
    block_map: FxHashMap<u32, CFGBlock>,
}

impl CFG {
    fn block_mut(&mut self, id: u32) -> &mut CFGBlock {
        self.block_map.entry(id).or_insert_with(|| CFGBlock {
            pred: Vec::new(),
            num_succ: 0,
            succ: [0_u32; 2],
        })
    }

    fn block(&self, id: u32) -> &CFGBlock {
        self.block_map.get(&id).unwrap()
    }

    pub fn block_predecessors(&self, id: u32) -> &[u32] {
        &self.block(id).pred
    }

    pub fn block_successors(&self, id: u32) -> &[u32] {
        let b = self.block(id);
        let num_succ = usize::try_from(b.num_succ).unwrap();
        &b.succ[0..num_succ]
    }

    pub fn for_function(f: &Function) -> CFG {
        let mut cfg = CFG {
            block_map: FxHashMap::default(),
        };

        for (i, bb) in f.blocks.iter().enumerate() {
            let mut succ = [0_u32; 2];
            let mut num_succ = 0_usize;

            if f.block_falls_through(bb) {
                succ[num_succ] = f.blocks[i + 1].id;
                num_succ += 1;
            }

            if let Some(br) = f.block_branch(bb) {
                match &br.op {
                    Op::Bra(bra) => {
                        succ[num_succ] = bra.target;
                        num_succ += 1;
                    }
                    Op::Exit(_) => (),
                    _ => panic!("Unhandled branch op"),
                }
            }

            for si in 0..num_succ {
                cfg.block_mut(succ[si]).pred.push(bb.id);
            }

            let cb = cfg.block_mut(bb.id);
            assert!(cb.num_succ == 0);
            cb.num_succ = num_succ.try_into().unwrap();
            cb.succ = succ;
        }

        cfg
    }
}

const IDOM_NONE: u32 = u32::MAX;

/// Immediate dominators, indexed by block position.  Block ids must equal
/// block positions (BLOCK_INDEX metadata) when this is computed.
pub struct DomInfo {
    idom: Vec<u32>,
}

impl DomInfo {
    pub fn for_function(f: &Function) -> DomInfo {
        let cfg = CFG::for_function(f);
        let n = f.blocks.len();

        /* Postorder numbering from the entry block */
        let mut po_num = vec![IDOM_NONE; n];
        let mut po_order = Vec::new();
        let mut visited = vec![false; n];
        let mut stack: Vec<(u32, usize)> = vec![(0, 0)];
        visited[0] = true;
        while !stack.is_empty() {
            let (b, si) = *stack.last().unwrap();
            let succ = cfg.block_successors(b);
            if si < succ.len() {
                stack.last_mut().unwrap().1 += 1;
                let s = succ[si];
                let s_idx = usize::try_from(s).unwrap();
                if !visited[s_idx] {
                    visited[s_idx] = true;
                    stack.push((s, 0));
                }
            } else {
                po_num[usize::try_from(b).unwrap()] =
                    u32::try_from(po_order.len()).unwrap();
                po_order.push(b);
                stack.pop();
            }
        }

        let mut idom = vec![IDOM_NONE; n];
        idom[0] = 0;

        let intersect = |idom: &[u32], mut a: u32, mut b: u32| -> u32 {
            while a != b {
                while po_num[a as usize] < po_num[b as usize] {
                    a = idom[a as usize];
                }
                while po_num[b as usize] < po_num[a as usize] {
                    b = idom[b as usize];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &b in po_order.iter().rev() {
                if b == 0 {
                    continue;
                }
                let mut new_idom = IDOM_NONE;
                for &p in cfg.block_predecessors(b) {
                    if idom[p as usize] == IDOM_NONE {
                        continue;
                    }
                    new_idom = if new_idom == IDOM_NONE {
                        p
                    } else {
                        intersect(&idom, p, new_idom)
                    };
                }
                if new_idom != IDOM_NONE && idom[b as usize] != new_idom {
                    idom[b as usize] = new_idom;
                    changed = true;
                }
            }
        }

        DomInfo { idom: idom }
    }

    /// Returns true if block `a` dominates block `b` (both by position)
    pub fn dominates(&self, a: u32, b: u32) -> bool {
        if self.idom[b as usize] == IDOM_NONE {
            /* Unreachable blocks are dominated by nothing */
            return false;
        }
        let mut x = b;
        loop {
            if x == a {
                return true;
            }
            let up = self.idom[x as usize];
            if up == x {
                return false;
            }
            x = up;
        }
    }
}
