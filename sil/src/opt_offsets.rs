/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

/* Folds constant additions into the base offset of memory instructions */

use crate::builder::RewriteCtx;
use crate::ir::*;
use crate::meta::Metadata;
use crate::pass::shader_intrinsics_pass;

/// How large a folded base offset each memory space tolerates
#[derive(Clone, Copy)]
pub struct OffsetFoldLimits {
    pub shared_max: u32,
}

impl Default for OffsetFoldLimits {
    fn default() -> OffsetFoldLimits {
        OffsetFoldLimits {
            shared_max: 0xffff,
        }
    }
}

fn try_fold_offset(ctx: &mut RewriteCtx<'_>, limits: &OffsetFoldLimits) -> bool {
    let (slot, offset, space, base) = match &ctx.instr().op {
        Op::Ld(ld) => (OpLd::OFFSET_SLOT, ld.offset, ld.space, ld.base),
        Op::St(st) => (OpSt::OFFSET_SLOT, st.offset, st.space, st.base),
        _ => return false,
    };

    if space != MemSpace::Shared {
        return false;
    }

    let Some(v) = offset.as_ssa() else {
        return false;
    };
    let Some(def) = ctx.fun().def_instr(*v) else {
        return false;
    };
    let (x, y) = match &ctx.fun().instr(def).op {
        Op::IAdd(add) => (add.srcs[0], add.srcs[1]),
        _ => return false,
    };

    let (rest, imm) = if let SrcRef::Imm32(c) = y.src_ref {
        (x, c)
    } else if let SrcRef::Imm32(c) = x.src_ref {
        (y, c)
    } else {
        return false;
    };

    let Some(new_base) = base.checked_add(imm) else {
        return false;
    };
    if new_base > limits.shared_max {
        return false;
    }

    ctx.rewrite_src(slot, rest);
    match &mut ctx.instr_mut().op {
        Op::Ld(ld) => ld.base = new_base,
        Op::St(st) => st.base = new_base,
        _ => unreachable!(),
    }

    /* The add itself goes away in the next DCE run once nothing else
     * consumes it */
    true
}

impl Shader {
    pub fn opt_offsets(&mut self, limits: &OffsetFoldLimits) -> bool {
        shader_intrinsics_pass(self, Metadata::CONTROL_FLOW, |ctx| {
            try_fold_offset(ctx, limits)
        })
    }
}
