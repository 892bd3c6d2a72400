/*
 * Copyright © 2023 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

//! A scalar SSA shader IR with in-place rewrite passes
//!
//! Shaders come in from a translation layer as functions of basic blocks
//! holding instructions in SSA form, already validated.  Passes walk the
//! instruction stream, match shapes, and rewrite in place through a cursor
//! builder while the def-use index is kept consistent transactionally.
//! Each pass reports whether it changed anything and which derived analyses
//! (block index, dominance) survived, so the pass schedule knows what to
//! recompute.

mod builder;
mod cfg;
mod compact_ssa;
mod fuse_io_16;
mod ir;
mod lower_image_bitsize;
mod lower_offset_bitsize;
mod lower_trig;
mod meta;
mod opt_dce;
mod opt_offsets;
mod pass;
mod pipeline;
mod remove_dead_outputs;
mod validate;

pub use builder::{Builder, RewriteCtx, SSABuilder, SSAFnBuilder};
pub use cfg::{DomInfo, CFG};
pub use ir::*;
pub use meta::Metadata;
pub use opt_offsets::OffsetFoldLimits;
pub use pass::{
    alu_pass, instr_pass, intrinsic_pass, shader_alu_pass,
    shader_instr_pass, shader_intrinsics_pass,
};
pub use pipeline::{default_passes, Pass, Pipeline, TargetOpts};
pub use validate::ValidateError;
