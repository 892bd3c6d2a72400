/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

use crate::builder::*;
use crate::ir::*;
use crate::meta::Metadata;
use crate::pass::shader_intrinsics_pass;

/* The texture unit addresses image texels with 16-bit coordinates. */
fn lower_coord(ctx: &mut RewriteCtx<'_>) -> bool {
    let coord = match &ctx.instr().op {
        Op::SuLd(ld) => ld.coord,
        Op::SuSt(st) => st.coord,
        _ => return false,
    };

    let Some(v) = coord.as_ssa() else {
        return false;
    };
    if v.bits() == 16 {
        return false;
    }

    let coord16 = ctx.u2u(ScalarType::U16, coord);
    ctx.rewrite_src(0, coord16.into());
    true
}

impl Shader {
    pub fn lower_image_bitsize(&mut self) -> bool {
        shader_intrinsics_pass(self, Metadata::CONTROL_FLOW, lower_coord)
    }
}
