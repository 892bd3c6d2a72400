/*
 * Copyright © 2023 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

use crate::ir::*;
use crate::meta::Metadata;

use rustc_hash::FxHashMap;

/* When we're squeezing down the value indices, we maintain a map as such */

struct SqueezeMap {
    map: FxHashMap<u32, u32>,
    count: u32,
}

impl SqueezeMap {
    fn new() -> SqueezeMap {
        SqueezeMap {
            map: FxHashMap::default(),
            count: 0,
        }
    }

    fn find_or_allocate(&mut self, v: SSAValue) -> SSAValue {
        if let Some(&t) = self.map.get(&v.idx()) {
            return SSAValue::new(v.ty(), t);
        }

        self.count += 1;
        self.map.insert(v.idx(), self.count);
        SSAValue::new(v.ty(), self.count)
    }
}

impl Function {
    /* Reassigns value numbering to get rid of gaps in the indices and to
     * prioritize texture results */
    pub fn compact_ssa(&mut self) -> bool {
        let mut sq = SqueezeMap::new();

        let refs: Vec<InstrRef> = self
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter().copied())
            .collect();

        /* Image load results need the low indices so the register
         * allocator downstream sees them before the work registers */
        for &r in &refs {
            let instr = self.instr(r);
            if let Op::SuLd(_) = instr.op {
                if let Some(v) = instr.def() {
                    sq.find_or_allocate(v);
                }
            }
        }

        let mut changed = false;
        for &r in &refs {
            let instr = self.instr_mut(r);
            for dst in instr.dsts_mut() {
                if let Dst::SSA(v) = dst {
                    let n = sq.find_or_allocate(*v);
                    changed |= n != *v;
                    *dst = n.into();
                }
            }
            for src in instr.srcs_mut() {
                if let SrcRef::SSA(v) = src.src_ref {
                    let n = sq.find_or_allocate(v);
                    changed |= n != v;
                    *src = n.into();
                }
            }
        }

        if !changed {
            return false;
        }

        self.ssa_alloc.set_count(sq.count);
        self.rebuild_def_use();
        true
    }
}

impl Shader {
    pub fn compact_ssa(&mut self) -> bool {
        let mut progress = false;
        for f in &mut self.functions {
            if f.compact_ssa() {
                f.preserve_metadata(Metadata::CONTROL_FLOW);
                progress = true;
            }
        }
        progress
    }
}
