/*
 * Copyright © 2023 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

use crate::ir::*;
use crate::meta::Metadata;

use rustc_hash::FxHashSet;

struct DeadCodePass {
    any_dead: bool,
    new_live: bool,
    live: FxHashSet<SSAValue>,
}

impl DeadCodePass {
    pub fn new() -> DeadCodePass {
        DeadCodePass {
            any_dead: false,
            new_live: false,
            live: FxHashSet::default(),
        }
    }

    fn mark_ssa_live(&mut self, v: SSAValue) {
        self.new_live |= self.live.insert(v);
    }

    fn mark_src_live(&mut self, src: &Src) {
        if let Some(v) = src.as_ssa() {
            self.mark_ssa_live(*v);
        }
    }

    fn is_dst_live(&self, dst: &Dst) -> bool {
        match dst {
            Dst::SSA(v) => self.live.contains(v),
            Dst::None => false,
        }
    }

    fn is_instr_live(&self, instr: &Instr) -> bool {
        if !instr.can_eliminate() {
            return true;
        }

        for dst in instr.dsts() {
            if self.is_dst_live(dst) {
                return true;
            }
        }

        false
    }

    fn mark_instr(&mut self, instr: &Instr) {
        if self.is_instr_live(instr) {
            for src in instr.srcs() {
                self.mark_src_live(src);
            }
        } else {
            self.any_dead = true;
        }
    }

    pub fn run(&mut self, f: &mut Function) -> bool {
        loop {
            self.new_live = false;
            self.any_dead = false;

            for b in f.blocks.iter().rev() {
                for &r in b.instrs.iter().rev() {
                    self.mark_instr(f.instr(r));
                }
            }

            if !self.new_live {
                break;
            }
        }

        if !self.any_dead {
            return false;
        }

        /* Unlink consumers before producers so no value ever loses its
         * definition while uses remain */
        for b_idx in (0..f.blocks.len()).rev() {
            let dead: Vec<InstrRef> = f.blocks[b_idx]
                .instrs
                .iter()
                .rev()
                .copied()
                .filter(|&r| !self.is_instr_live(f.instr(r)))
                .collect();
            if dead.is_empty() {
                continue;
            }
            f.blocks[b_idx].instrs.retain(|r| !dead.contains(r));
            for r in dead {
                f.unlink_instr(r);
            }
        }

        true
    }
}

impl Shader {
    pub fn opt_dce(&mut self) -> bool {
        let mut progress = false;
        for f in &mut self.functions {
            if DeadCodePass::new().run(f) {
                f.preserve_metadata(Metadata::CONTROL_FLOW);
                progress = true;
            }
        }
        progress
    }
}
