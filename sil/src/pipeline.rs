/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

//! The outer pass schedule
//!
//! A pipeline owns an ordered list of passes, each bundled with its
//! immutable configuration.  Within one shader, passes run strictly
//! sequentially; independent shaders may be optimized in parallel.

use crate::ir::{Shader, ShaderStage};
use crate::opt_offsets::OffsetFoldLimits;

use rayon::prelude::*;
use tracing::{debug, trace};

/// Per-target knobs consumed by the default pass schedule
#[derive(Clone, Copy)]
pub struct TargetOpts {
    /// Required bit width of shared-memory offsets
    pub shared_offset_bits: u8,
    /// Largest folded base offset shared memory tolerates
    pub shared_max_base: u32,
    /// Number of bound output buffers (fragment only)
    pub nr_cbufs: u8,
}

impl Default for TargetOpts {
    fn default() -> TargetOpts {
        TargetOpts {
            shared_offset_bits: 16,
            shared_max_base: 0xffff,
            nr_cbufs: 8,
        }
    }
}

pub enum Pass {
    LowerTrig,
    LowerOffsetBitsize { bits: u8 },
    LowerImageBitsize,
    RemoveDeadOutputs { nr_cbufs: u8 },
    FuseIo16,
    OptOffsets { limits: OffsetFoldLimits },
    OptDce,
    CompactSsa,
}

impl Pass {
    pub fn name(&self) -> &'static str {
        match self {
            Pass::LowerTrig => "lower_trig",
            Pass::LowerOffsetBitsize { .. } => "lower_offset_bitsize",
            Pass::LowerImageBitsize => "lower_image_bitsize",
            Pass::RemoveDeadOutputs { .. } => "remove_dead_outputs",
            Pass::FuseIo16 => "fuse_io_16",
            Pass::OptOffsets { .. } => "opt_offsets",
            Pass::OptDce => "opt_dce",
            Pass::CompactSsa => "compact_ssa",
        }
    }

    pub fn run(&self, s: &mut Shader) -> bool {
        match self {
            Pass::LowerTrig => s.lower_trig(),
            Pass::LowerOffsetBitsize { bits } => s.lower_offset_bitsize(*bits),
            Pass::LowerImageBitsize => s.lower_image_bitsize(),
            Pass::RemoveDeadOutputs { nr_cbufs } => {
                s.remove_dead_outputs(*nr_cbufs)
            }
            Pass::FuseIo16 => s.fuse_io_16(),
            Pass::OptOffsets { limits } => s.opt_offsets(limits),
            Pass::OptDce => s.opt_dce(),
            Pass::CompactSsa => s.compact_ssa(),
        }
    }
}

pub struct Pipeline {
    pub passes: Vec<Pass>,
}

impl Pipeline {
    pub fn new(passes: Vec<Pass>) -> Pipeline {
        Pipeline { passes: passes }
    }

    /// Runs every pass once, in order, and returns true if any of them
    /// changed the shader
    pub fn run(&self, s: &mut Shader) -> bool {
        let mut progress = false;
        for pass in &self.passes {
            let changed = pass.run(s);
            debug!(pass = pass.name(), changed, "pass finished");
            if changed {
                trace!("IR after {}:\n{}", pass.name(), s);
            }
            if cfg!(debug_assertions) {
                if let Err(e) = s.validate() {
                    panic!("IR broken after {}: {}", pass.name(), e);
                }
            }
            progress |= changed;
        }
        progress
    }

    /// Optimizes independent shaders in parallel.  Each shader is still
    /// mutated by exactly one pass at a time.
    pub fn run_parallel(&self, shaders: &mut [Shader]) -> bool {
        shaders
            .par_iter_mut()
            .map(|s| self.run(s))
            .reduce(|| false, |a, b| a | b)
    }
}

/// The fixed per-stage pass table
pub fn default_passes(stage: ShaderStage, opts: &TargetOpts) -> Pipeline {
    let mut passes = vec![Pass::LowerTrig];

    match stage {
        ShaderStage::Fragment => {
            passes.push(Pass::FuseIo16);
            passes.push(Pass::RemoveDeadOutputs {
                nr_cbufs: opts.nr_cbufs,
            });
        }
        ShaderStage::Vertex | ShaderStage::Compute => (),
    }

    passes.push(Pass::OptOffsets {
        limits: OffsetFoldLimits {
            shared_max: opts.shared_max_base,
        },
    });
    passes.push(Pass::LowerOffsetBitsize {
        bits: opts.shared_offset_bits,
    });
    passes.push(Pass::LowerImageBitsize);
    passes.push(Pass::OptDce);
    passes.push(Pass::CompactSsa);

    Pipeline::new(passes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::*;
    use crate::ir::*;

    fn fragment_shader() -> Shader {
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
        b.push_op(OpASt {
            src: x.into(),
            slot: 5,
        });
        b.push_op(OpExit {});
        s.functions.push(f);
        s
    }

    #[test]
    fn default_schedule_reaches_a_fixed_point() {
        let pipeline = default_passes(
            ShaderStage::Fragment,
            &TargetOpts {
                nr_cbufs: 2,
                ..Default::default()
            },
        );

        let mut s = fragment_shader();
        assert!(pipeline.run(&mut s));
        /* A second run has nothing left to do */
        assert!(!pipeline.run(&mut s));
    }

    #[test]
    fn parallel_run_matches_sequential() {
        let pipeline = default_passes(
            ShaderStage::Fragment,
            &TargetOpts::default(),
        );

        let mut seq = fragment_shader();
        pipeline.run(&mut seq);

        let mut shaders: Vec<Shader> =
            (0..8).map(|_| fragment_shader()).collect();
        assert!(pipeline.run_parallel(&mut shaders));
        for s in &shaders {
            assert_eq!(s.to_string(), seq.to_string());
        }
    }
}
