/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

use crate::builder::*;
use crate::ir::*;
use crate::meta::Metadata;
use crate::pass::shader_intrinsics_pass;

/* Shared memory instructions require narrow offsets, so we add
 * conversions. */
fn lower_offset(ctx: &mut RewriteCtx<'_>, bits: u8) -> bool {
    let (slot, offset, space) = match &ctx.instr().op {
        Op::Ld(ld) => (OpLd::OFFSET_SLOT, ld.offset, ld.space),
        Op::St(st) => (OpSt::OFFSET_SLOT, st.offset, st.space),
        _ => return false,
    };

    if space != MemSpace::Shared {
        return false;
    }

    let Some(v) = offset.as_ssa() else {
        return false;
    };
    if v.bits() == bits {
        return false;
    }

    let narrow = ctx.u2u(ScalarType::uint(bits), offset);
    ctx.rewrite_src(slot, narrow.into());
    true
}

impl Shader {
    pub fn lower_offset_bitsize(&mut self, bits: u8) -> bool {
        shader_intrinsics_pass(self, Metadata::CONTROL_FLOW, |ctx| {
            lower_offset(ctx, bits)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::*;
    use crate::ir::*;

    fn shared_ld_shader(offset_ty: ScalarType) -> Shader {
        let mut s = Shader::new(ShaderStage::Compute);
        let mut f = Function::new();
        let mut b = SSAFnBuilder::new(&mut f);
        let off = b.mov(offset_ty, Src::new_imm_u32(4));
        let x = b.alloc_ssa(ScalarType::F32);
        b.push_op(OpLd {
            dst: x.into(),
            offset: off.into(),
            space: MemSpace::Shared,
            base: 0,
        });
        b.push_op(OpSt {
            data: x.into(),
            offset: off.into(),
            space: MemSpace::Shared,
            base: 8,
        });
        b.push_op(OpExit {});
        s.functions.push(f);
        s
    }

    #[test]
    fn wide_offsets_get_narrowed() {
        let mut s = shared_ld_shader(ScalarType::U32);
        assert!(s.lower_offset_bitsize(16));

        let f = &s.functions[0];
        for i in f.block_instrs(&f.blocks[0]) {
            match &i.op {
                Op::Ld(ld) => {
                    assert_eq!(ld.offset.as_ssa().unwrap().bits(), 16)
                }
                Op::St(st) => {
                    assert_eq!(st.offset.as_ssa().unwrap().bits(), 16)
                }
                _ => (),
            }
        }
        s.validate().unwrap();
    }

    #[test]
    fn narrow_offsets_are_left_alone() {
        let mut s = shared_ld_shader(ScalarType::U16);
        let before = s.to_string();
        assert!(!s.lower_offset_bitsize(16));
        assert_eq!(s.to_string(), before);
    }

    #[test]
    fn idempotent() {
        let mut s = shared_ld_shader(ScalarType::U32);
        assert!(s.lower_offset_bitsize(16));
        let once = s.to_string();
        assert!(!s.lower_offset_bitsize(16));
        assert_eq!(s.to_string(), once);
    }
}
