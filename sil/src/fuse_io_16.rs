/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

/* Fuses precision-lowering converts into attribute loads */

use crate::builder::*;
use crate::ir::*;
use crate::meta::Metadata;
use crate::pass::shader_intrinsics_pass;

fn fuse_load(ctx: &mut RewriteCtx<'_>) -> bool {
    let (old, comp) = match &ctx.instr().op {
        Op::ALd(ald) => match ald.dst {
            Dst::SSA(v) => (v, ald.comp),
            _ => return false,
        },
        _ => return false,
    };

    if old.ty() != ScalarType::F32 {
        return false;
    }

    /* We swizzle at a 32-bit level so need a multiple of 2. We could do a
     * bit better and handle even components though */
    if comp != 0 {
        return false;
    }

    let mut valid = true;
    for u in ctx.fun().uses_of(old) {
        valid &= match &ctx.fun().instr(u.instr).op {
            Op::F2FMp(_) => true,
            _ => false,
        };
    }
    if !valid {
        return false;
    }

    let narrow = ctx.retype_def(ScalarType::F16);

    ctx.set_cursor_after();

    /* The f2f32(f2fmp(x)) will cancel in a later peephole */
    let conv = ctx.f2f(ScalarType::F32, narrow.into());
    ctx.rewrite_uses(old, conv);

    true
}

impl Shader {
    pub fn fuse_io_16(&mut self) -> bool {
        shader_intrinsics_pass(self, Metadata::CONTROL_FLOW, fuse_load)
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::*;
    use crate::ir::*;

    fn load_with_consumers(
        comp: u8,
        all_narrowing: bool,
    ) -> Shader {
        let mut s = Shader::new(ShaderStage::Fragment);
        let mut f = Function::new();
        let mut b = SSAFnBuilder::new(&mut f);
        let x = b.alloc_ssa(ScalarType::F32);
        b.push_op(OpALd {
            dst: x.into(),
            addr: 0x10,
            comp: comp,
        });
        let h = b.f2fmp(x.into());
        b.push_op(OpASt {
            src: h.into(),
            slot: 0,
        });
        if !all_narrowing {
            let y = b.fmul(x.into(), x.into());
            b.push_op(OpASt {
                src: y.into(),
                slot: 1,
            });
        }
        b.push_op(OpExit {});
        s.functions.push(f);
        s
    }

    #[test]
    fn load_feeding_only_narrowing_converts_is_fused() {
        let mut s = load_with_consumers(0, true);
        assert!(s.fuse_io_16());

        let f = &s.functions[0];
        let ops: Vec<_> = f.block_instrs(&f.blocks[0]).collect();

        /* ALD now defines an f16 value with a compensating up-convert */
        let ald = match &ops[0].op {
            Op::ALd(ald) => ald,
            _ => panic!("Expected ALD"),
        };
        let narrow = ald.dst.as_ssa().unwrap();
        assert_eq!(narrow.ty(), ScalarType::F16);

        let conv = match &ops[1].op {
            Op::F2F(conv) => conv,
            _ => panic!("Expected F2F"),
        };
        assert_eq!(conv.src.as_ssa(), Some(narrow));
        assert_eq!(conv.dst.as_ssa().unwrap().ty(), ScalarType::F32);

        /* The old consumer reads the up-converted value */
        let mp = match &ops[2].op {
            Op::F2FMp(mp) => mp,
            _ => panic!("Expected F2FMP"),
        };
        assert_eq!(mp.src.as_ssa(), conv.dst.as_ssa());

        s.validate().unwrap();
    }

    #[test]
    fn nonzero_component_is_skipped() {
        let mut s = load_with_consumers(1, true);
        let before = s.to_string();
        assert!(!s.fuse_io_16());
        assert_eq!(s.to_string(), before);
    }

    #[test]
    fn non_narrowing_consumer_disqualifies() {
        let mut s = load_with_consumers(0, false);
        let before = s.to_string();
        assert!(!s.fuse_io_16());
        assert_eq!(s.to_string(), before);
    }

    #[test]
    fn branch_condition_use_disqualifies() {
        let mut s = Shader::new(ShaderStage::Fragment);
        let mut f = Function::new();
        let mut b = SSAFnBuilder::new(&mut f);
        let x = b.alloc_ssa(ScalarType::F32);
        b.push_op(OpALd {
            dst: x.into(),
            addr: 0x10,
            comp: 0,
        });
        let h = b.f2fmp(x.into());
        b.push_op(OpASt {
            src: h.into(),
            slot: 0,
        });
        b.push_op(OpBra {
            cond: x.into(),
            target: 1,
        });
        b.start_block();
        b.push_op(OpExit {});
        b.start_block();
        b.push_op(OpExit {});
        s.functions.push(f);

        assert!(!s.fuse_io_16());
    }
}
