/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

//! Pass drivers
//!
//! A rewrite pass is a callback invoked once per instruction.  The callback
//! inspects the instruction through its [`RewriteCtx`], decides whether it
//! matches, and either rewrites through the context and returns true or
//! leaves the function untouched and returns false.
//!
//! The driver snapshots each block's instruction list before walking it, so
//! instructions inserted by a rewrite are never visited in the same driver
//! invocation, even when they would match the callback's own predicate.
//! The aggregate progress flag is true iff at least one callback returned
//! true; on progress the function's analysis-validity flags are reduced to
//! the set the pass declared preserved.

use crate::builder::RewriteCtx;
use crate::ir::*;
use crate::meta::Metadata;

pub fn instr_pass<F>(f: &mut Function, preserved: Metadata, mut cb: F) -> bool
where
    F: FnMut(&mut RewriteCtx<'_>) -> bool,
{
    let mut progress = false;

    for b_idx in 0..f.blocks.len() {
        let snapshot = f.blocks[b_idx].instrs.clone();
        for r in snapshot {
            if f.is_removed(r) {
                continue;
            }
            let mut ctx = RewriteCtx::new(f, b_idx, r);
            progress |= cb(&mut ctx);
        }
    }

    if progress {
        f.preserve_metadata(preserved);
    }
    progress
}

pub fn intrinsic_pass<F>(
    f: &mut Function,
    preserved: Metadata,
    mut cb: F,
) -> bool
where
    F: FnMut(&mut RewriteCtx<'_>) -> bool,
{
    instr_pass(f, preserved, |ctx| {
        if ctx.instr().op.category() != OpCategory::Intrinsic {
            return false;
        }
        cb(ctx)
    })
}

pub fn alu_pass<F>(f: &mut Function, preserved: Metadata, mut cb: F) -> bool
where
    F: FnMut(&mut RewriteCtx<'_>) -> bool,
{
    instr_pass(f, preserved, |ctx| {
        if ctx.instr().op.category() != OpCategory::ALU {
            return false;
        }
        cb(ctx)
    })
}

pub fn shader_instr_pass<F>(
    s: &mut Shader,
    preserved: Metadata,
    mut cb: F,
) -> bool
where
    F: FnMut(&mut RewriteCtx<'_>) -> bool,
{
    let mut progress = false;
    for f in &mut s.functions {
        progress |= instr_pass(f, preserved, &mut cb);
    }
    progress
}

pub fn shader_intrinsics_pass<F>(
    s: &mut Shader,
    preserved: Metadata,
    mut cb: F,
) -> bool
where
    F: FnMut(&mut RewriteCtx<'_>) -> bool,
{
    let mut progress = false;
    for f in &mut s.functions {
        progress |= intrinsic_pass(f, preserved, &mut cb);
    }
    progress
}

pub fn shader_alu_pass<F>(
    s: &mut Shader,
    preserved: Metadata,
    mut cb: F,
) -> bool
where
    F: FnMut(&mut RewriteCtx<'_>) -> bool,
{
    let mut progress = false;
    for f in &mut s.functions {
        progress |= alu_pass(f, preserved, &mut cb);
    }
    progress
}
