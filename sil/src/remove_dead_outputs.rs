/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

use crate::builder::RewriteCtx;
use crate::ir::*;
use crate::meta::Metadata;
use crate::pass::shader_intrinsics_pass;

fn cull_store(ctx: &mut RewriteCtx<'_>, nr_cbufs: u8) -> bool {
    let unbound = match &ctx.instr().op {
        Op::ASt(ast) => ast.slot >= nr_cbufs,
        _ => false,
    };
    if !unbound {
        return false;
    }

    ctx.remove();
    true
}

impl Shader {
    /// Removes output stores to slots with no bound output buffer
    pub fn remove_dead_outputs(&mut self, nr_cbufs: u8) -> bool {
        shader_intrinsics_pass(self, Metadata::CONTROL_FLOW, |ctx| {
            cull_store(ctx, nr_cbufs)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::*;
    use crate::ir::*;

    fn four_output_shader() -> Shader {
        let mut s = Shader::new(ShaderStage::Fragment);
        let mut f = Function::new();
        let mut b = SSAFnBuilder::new(&mut f);
        for slot in 0..4 {
            let x = b.alloc_ssa(ScalarType::F32);
            b.push_op(OpALd {
                dst: x.into(),
                addr: 0x80 + 0x10 * u16::from(slot),
                comp: 0,
            });
            b.push_op(OpASt {
                src: x.into(),
                slot: slot,
            });
        }
        b.push_op(OpExit {});
        s.functions.push(f);
        s
    }

    #[test]
    fn stores_past_bound_buffers_are_removed() {
        let mut s = four_output_shader();
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
        s.validate().unwrap();
    }

    #[test]
    fn all_buffers_bound_no_progress() {
        let mut s = four_output_shader();
        let before = s.to_string();
        assert!(!s.remove_dead_outputs(4));
        assert_eq!(s.to_string(), before);
    }
}
