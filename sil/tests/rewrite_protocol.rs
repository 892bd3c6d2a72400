/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

use pretty_assertions::assert_eq;
use sil::*;

fn fmul_chain_shader(n: usize) -> Shader {
    let mut s = Shader::new(ShaderStage::Compute);
    let mut f = Function::new();
    let mut b = SSAFnBuilder::new(&mut f);
    let mut v = b.mov(ScalarType::F32, Src::new_imm_f32(1.0));
    for _ in 0..n {
        v = b.fmul(v.into(), Src::new_imm_f32(2.0));
    }
    b.push_op(OpASt {
        src: v.into(),
        slot: 0,
    });
    b.push_op(OpExit {});
    s.functions.push(f);
    s
}

#[test]
fn replacement_instructions_are_not_revisited() {
    let mut s = fmul_chain_shader(2);

    /* A pathological pass whose replacement matches its own predicate: it
     * swaps every FMUL for a fresh FMUL.  It must terminate after exactly
     * one rewrite per original instruction. */
    let mut rewrites = 0;
    let progress = shader_alu_pass(&mut s, Metadata::CONTROL_FLOW, |ctx| {
        let srcs = match &ctx.instr().op {
            Op::FMul(mul) => mul.srcs,
            _ => return false,
        };
        let new = ctx.fmul(srcs[0], srcs[1]);
        ctx.replace_def(new);
        rewrites += 1;
        true
    });

    assert!(progress);
    assert_eq!(rewrites, 2);

    let f = &s.functions[0];
    let fmuls = f
        .block_instrs(&f.blocks[0])
        .filter(|i| matches!(i.op, Op::FMul(_)))
        .count();
    assert_eq!(fmuls, 2);
    s.validate().unwrap();
}

#[test]
fn progress_flag_is_false_without_structural_change() {
    let mut s = fmul_chain_shader(3);
    let before = s.to_string();

    let progress = shader_instr_pass(&mut s, Metadata::empty(), |_| false);

    assert!(!progress);
    assert_eq!(s.to_string(), before);
}

#[test]
fn metadata_ledger_tracks_pass_declarations() {
    let mut s = fmul_chain_shader(1);
    let f = &mut s.functions[0];
    f.require_metadata(Metadata::BLOCK_INDEX | Metadata::DOMINANCE);
    assert!(f
        .valid_metadata()
        .contains(Metadata::BLOCK_INDEX | Metadata::DOMINANCE));

    /* A pass which matches nothing must leave the ledger untouched */
    shader_alu_pass(&mut s, Metadata::empty(), |_| false);
    assert!(s.functions[0]
        .valid_metadata()
        .contains(Metadata::BLOCK_INDEX | Metadata::DOMINANCE));

    /* An instruction-local rewrite keeps control flow trustworthy */
    assert!(s.lower_trig() == false);
    let progress = shader_alu_pass(&mut s, Metadata::CONTROL_FLOW, |ctx| {
        let srcs = match &ctx.instr().op {
            Op::FMul(mul) => mul.srcs,
            _ => return false,
        };
        let new = ctx.fmul(srcs[0], srcs[1]);
        ctx.replace_def(new);
        true
    });
    assert!(progress);
    assert_eq!(
        s.functions[0].valid_metadata(),
        Metadata::CONTROL_FLOW
    );

    /* A pass declaring nothing preserved clears the ledger */
    let progress = shader_alu_pass(&mut s, Metadata::empty(), |ctx| {
        let srcs = match &ctx.instr().op {
            Op::FMul(mul) => mul.srcs,
            _ => return false,
        };
        let new = ctx.fmul(srcs[0], srcs[1]);
        ctx.replace_def(new);
        true
    });
    assert!(progress);
    assert_eq!(s.functions[0].valid_metadata(), Metadata::empty());
}

#[test]
fn trig_lowering_rewrites_every_match() {
    let mut s = Shader::new(ShaderStage::Compute);
    let mut f = Function::new();
    let mut b = SSAFnBuilder::new(&mut f);
    let x = b.mov(ScalarType::F32, Src::new_imm_f32(0.5));
    for i in 0..3 {
        let dst = b.alloc_ssa(ScalarType::F32);
        b.push_op(OpFSin {
            dst: dst.into(),
            src: x.into(),
        });
        b.push_op(OpASt {
            src: dst.into(),
            slot: i,
        });
    }
    let c = b.alloc_ssa(ScalarType::F32);
    b.push_op(OpFCos {
        dst: c.into(),
        src: x.into(),
    });
    b.push_op(OpASt {
        src: c.into(),
        slot: 3,
    });
    b.push_op(OpExit {});
    s.functions.push(f);

    assert!(s.lower_trig());

    let f = &s.functions[0];
    let mut mufus = 0;
    for i in f.block_instrs(&f.blocks[0]) {
        match &i.op {
            Op::FSin(_) | Op::FCos(_) => panic!("Unlowered trig op"),
            Op::MuFu(_) => mufus += 1,
            _ => (),
        }
    }
    assert_eq!(mufus, 4);
    s.validate().unwrap();
}

#[test]
fn scenario_cos_lowering() {
    let mut s = Shader::new(ShaderStage::Compute);
    let mut f = Function::new();
    let mut b = SSAFnBuilder::new(&mut f);
    let x = b.mov(ScalarType::F32, Src::new_imm_f32(3.0));
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

    assert!(s.lower_trig());

    let f = &s.functions[0];
    let ops: Vec<_> = f.block_instrs(&f.blocks[0]).collect();
    let mul = match &ops[1].op {
        Op::FMul(mul) => mul,
        _ => panic!("Expected FMUL"),
    };
    assert_eq!(mul.srcs[1], Src::new_imm_f32(0.15915493667125702));
    assert!(matches!(
        &ops[2].op,
        Op::MuFu(OpMuFu {
            op: MuFuOp::Cos,
            ..
        })
    ));
}

#[test]
fn scenario_narrow_offset_is_untouched() {
    let mut s = Shader::new(ShaderStage::Compute);
    let mut f = Function::new();
    let mut b = SSAFnBuilder::new(&mut f);
    let off = b.mov(ScalarType::U16, Src::new_imm_u32(4));
    let x = b.alloc_ssa(ScalarType::F32);
    b.push_op(OpLd {
        dst: x.into(),
        offset: off.into(),
        space: MemSpace::Shared,
        base: 0,
    });
    b.push_op(OpASt {
        src: x.into(),
        slot: 0,
    });
    b.push_op(OpExit {});
    s.functions.push(f);

    let before = s.to_string();
    assert!(!s.lower_offset_bitsize(16));
    assert_eq!(s.to_string(), before);
}

#[test]
fn scenario_two_of_four_outputs_survive() {
    let mut s = Shader::new(ShaderStage::Fragment);
    let mut f = Function::new();
    let mut b = SSAFnBuilder::new(&mut f);
    for slot in 0..4_u8 {
        let x = b.mov(ScalarType::F32, Src::new_imm_f32(f32::from(slot)));
        b.push_op(OpASt {
            src: x.into(),
            slot: slot,
        });
    }
    b.push_op(OpExit {});
    s.functions.push(f);

    assert!(s.remove_dead_outputs(2));

    let f = &s.functions[0];
    let slots: Vec<u8> = f
        .block_instrs(&f.blocks[0])
        .filter_map(|i| match &i.op {
            Op::ASt(ast) => Some(ast.slot),
            _ => None,
        })
        .collect();
    assert_eq!(slots, vec![0, 1]);
}
