/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

use crate::builder::*;
use crate::ir::*;
use crate::meta::Metadata;
use crate::pass::shader_alu_pass;

/* The transcendental unit wants a turns-based source, so scale the radians
 * operand by 1/2pi before handing it off. */
fn lower_sin_cos(ctx: &mut RewriteCtx<'_>) -> bool {
    let (op, src) = match &ctx.instr().op {
        Op::FSin(sin) => (MuFuOp::Sin, sin.src),
        Op::FCos(cos) => (MuFuOp::Cos, cos.src),
        _ => return false,
    };

    let turns = ctx.fmul_imm(src, 0.15915493667125702);
    let replace = ctx.mufu(op, turns.into());
    ctx.replace_def(replace);

    true
}

impl Shader {
    pub fn lower_trig(&mut self) -> bool {
        shader_alu_pass(self, Metadata::CONTROL_FLOW, lower_sin_cos)
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::*;
    use crate::ir::*;

    fn cos_shader() -> Shader {
        let mut s = Shader::new(ShaderStage::Fragment);
        let mut f = Function::new();
        let mut b = SSAFnBuilder::new(&mut f);
        let x = b.alloc_ssa(ScalarType::F32);
        b.push_op(OpALd {
            dst: x.into(),
            addr: 0x10,
            comp: 0,
        });
        let c = b.alloc_ssa(ScalarType::F32);
        b.push_op(OpFCos {
            dst: c.into(),
            src: x.into(),
        });
        b.push_op(OpASt {
            src: c.into(),
            slot: 0,
        });
        b.push_op(OpExit {});
        s.functions.push(f);
        s
    }

    #[test]
    fn cos_becomes_scaled_mufu() {
        let mut s = cos_shader();
        assert!(s.lower_trig());

        let f = &s.functions[0];
        let ops: Vec<_> = f.block_instrs(&f.blocks[0]).collect();
        assert_eq!(ops.len(), 5);
        let mul = match &ops[1].op {
            Op::FMul(mul) => mul,
            _ => panic!("Expected FMUL"),
        };
        assert_eq!(
            mul.srcs[1],
            Src::new_imm_f32(0.15915493667125702)
        );
        let mufu = match &ops[2].op {
            Op::MuFu(mufu) => mufu,
            _ => panic!("Expected MUFU"),
        };
        assert!(mufu.op == MuFuOp::Cos);
        assert_eq!(mufu.src.as_ssa(), mul.dst.as_ssa());

        /* The store now consumes the MUFU result */
        let st = match &ops[3].op {
            Op::ASt(st) => st,
            _ => panic!("Expected AST"),
        };
        assert_eq!(st.src.as_ssa(), mufu.dst.as_ssa());

        s.validate().unwrap();
    }

    #[test]
    fn replacement_inherits_fp_ctrl() {
        let mut s = cos_shader();
        let f = &mut s.functions[0];
        let cos_ref = f.blocks[0].instrs[1];
        f.instr_mut(cos_ref).fp = FpCtrl {
            rnd_mode: FRndMode::Zero,
            precise: true,
        };

        assert!(s.lower_trig());

        let f = &s.functions[0];
        let ops: Vec<_> = f.block_instrs(&f.blocks[0]).collect();
        for i in [1, 2] {
            assert!(ops[i].fp.rnd_mode == FRndMode::Zero);
            assert!(ops[i].fp.precise);
        }
    }

    #[test]
    fn no_trig_no_progress() {
        let mut s = cos_shader();
        assert!(s.lower_trig());
        /* Nothing left to lower the second time around */
        assert!(!s.lower_trig());
    }
}
