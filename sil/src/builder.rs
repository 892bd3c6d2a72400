/*
 * Copyright © 2023 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

use crate::ir::*;

pub trait Builder {
    fn push_instr(&mut self, instr: Box<Instr>) -> InstrRef;

    fn push_op(&mut self, op: impl Into<Op>) -> InstrRef {
        self.push_instr(Instr::new_boxed(op))
    }
}

pub trait SSABuilder: Builder {
    fn alloc_ssa(&mut self, ty: ScalarType) -> SSAValue;

    fn fadd(&mut self, x: Src, y: Src) -> SSAValue {
        let dst = self.alloc_ssa(ScalarType::F32);
        self.push_op(OpFAdd {
            dst: dst.into(),
            srcs: [x, y],
        });
        dst
    }

    fn fmul(&mut self, x: Src, y: Src) -> SSAValue {
        let dst = self.alloc_ssa(ScalarType::F32);
        self.push_op(OpFMul {
            dst: dst.into(),
            srcs: [x, y],
        });
        dst
    }

    fn fmul_imm(&mut self, x: Src, imm: f32) -> SSAValue {
        self.fmul(x, Src::new_imm_f32(imm))
    }

    fn iadd(&mut self, x: Src, y: Src) -> SSAValue {
        let dst = self.alloc_ssa(ScalarType::U32);
        self.push_op(OpIAdd {
            dst: dst.into(),
            srcs: [x, y],
        });
        dst
    }

    fn iadd_imm(&mut self, x: Src, imm: u32) -> SSAValue {
        self.iadd(x, Src::new_imm_u32(imm))
    }

    fn mufu(&mut self, op: MuFuOp, src: Src) -> SSAValue {
        let dst = self.alloc_ssa(ScalarType::F32);
        self.push_op(OpMuFu {
            dst: dst.into(),
            op: op,
            src: src,
        });
        dst
    }

    fn f2f(&mut self, ty: ScalarType, src: Src) -> SSAValue {
        assert!(ty.is_float());
        let dst = self.alloc_ssa(ty);
        self.push_op(OpF2F {
            dst: dst.into(),
            src: src,
        });
        dst
    }

    fn f2fmp(&mut self, src: Src) -> SSAValue {
        let dst = self.alloc_ssa(ScalarType::F16);
        self.push_op(OpF2FMp {
            dst: dst.into(),
            src: src,
        });
        dst
    }

    fn u2u(&mut self, ty: ScalarType, src: Src) -> SSAValue {
        assert!(!ty.is_float());
        let dst = self.alloc_ssa(ty);
        self.push_op(OpU2U {
            dst: dst.into(),
            src: src,
        });
        dst
    }

    fn mov(&mut self, ty: ScalarType, src: Src) -> SSAValue {
        let dst = self.alloc_ssa(ty);
        self.push_op(OpMov {
            dst: dst.into(),
            src: src,
        });
        dst
    }
}

/// Appends instructions to the end of a function's blocks.  This is the
/// builder the translation layer and the tests construct programs with.
pub struct SSAFnBuilder<'a> {
    f: &'a mut Function,
    block: usize,
}

impl<'a> SSAFnBuilder<'a> {
    pub fn new(f: &'a mut Function) -> Self {
        if f.blocks.is_empty() {
            f.blocks.push(Block::new(0));
        }
        let block = f.blocks.len() - 1;
        SSAFnBuilder { f: f, block: block }
    }

    /// Starts a new block and makes it the insertion point
    pub fn start_block(&mut self) -> u32 {
        let id = u32::try_from(self.f.blocks.len()).unwrap();
        self.f.blocks.push(Block::new(id));
        self.block = self.f.blocks.len() - 1;
        id
    }
}

impl<'a> Builder for SSAFnBuilder<'a> {
    fn push_instr(&mut self, instr: Box<Instr>) -> InstrRef {
        let r = self.f.alloc_instr(instr);
        self.f.blocks[self.block].instrs.push(r);
        r
    }
}

impl<'a> SSABuilder for SSAFnBuilder<'a> {
    fn alloc_ssa(&mut self, ty: ScalarType) -> SSAValue {
        self.f.ssa_alloc.alloc(ty)
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum CursorSide {
    Before,
    After,
}

/// The in-pass rewrite builder, positioned at one matched instruction
///
/// Instructions pushed through the cursor land immediately before (the
/// default) or immediately after the matched instruction and inherit its
/// floating-point control state.  All def-use bookkeeping flows through the
/// owning function, so no consumer ever observes a dangling value.
pub struct RewriteCtx<'a> {
    f: &'a mut Function,
    block: usize,
    pos: usize,
    at: InstrRef,
    side: CursorSide,
    n_after: usize,
    fp: FpCtrl,
}

impl<'a> RewriteCtx<'a> {
    pub fn new(f: &'a mut Function, block: usize, at: InstrRef) -> Self {
        let pos = f.blocks[block]
            .instrs
            .iter()
            .position(|&r| r == at)
            .expect("Instruction is not in the block");
        let fp = f.instr(at).fp;
        RewriteCtx {
            f: f,
            block: block,
            pos: pos,
            at: at,
            side: CursorSide::Before,
            n_after: 0,
            fp: fp,
        }
    }

    /// The matched instruction
    pub fn instr(&self) -> &Instr {
        self.f.instr(self.at)
    }

    /// Mutable access to the matched instruction's non-source fields
    pub fn instr_mut(&mut self) -> &mut Instr {
        self.f.instr_mut(self.at)
    }

    /// Read-only view of the whole function, for gathering cross-instruction
    /// context before mutating
    pub fn fun(&self) -> &Function {
        self.f
    }

    /// Moves the cursor to just after the matched instruction
    pub fn set_cursor_after(&mut self) {
        self.side = CursorSide::After;
    }

    /// Redirects one source of the matched instruction
    pub fn rewrite_src(&mut self, slot: usize, new: Src) {
        self.f.rewrite_src(self.at, slot, new);
    }

    /// Redirects every use of `old` to `new`
    pub fn rewrite_uses(&mut self, old: SSAValue, new: SSAValue) {
        self.f.replace_uses(old, new);
    }

    /// Re-keys the matched instruction's destination to a fresh value of
    /// the given type.  Uses of the old value are left in place; redirect
    /// them with rewrite_uses() before returning from the pass callback.
    pub fn retype_def(&mut self, ty: ScalarType) -> SSAValue {
        self.f.retype_def(self.at, ty)
    }

    /// Removes the matched instruction
    pub fn remove(&mut self) {
        let r = self.f.blocks[self.block].instrs.remove(self.pos);
        assert!(r == self.at);
        self.f.unlink_instr(self.at);
    }

    /// Redirects every use of the matched instruction's destination to
    /// `new` and removes the instruction
    pub fn replace_def(&mut self, new: SSAValue) {
        let old = self
            .instr()
            .def()
            .expect("Instruction has no destination");
        self.rewrite_uses(old, new);
        self.remove();
    }
}

impl<'a> Builder for RewriteCtx<'a> {
    fn push_instr(&mut self, mut instr: Box<Instr>) -> InstrRef {
        assert!(instr.fp.is_default());
        instr.fp = self.fp;

        let r = self.f.alloc_instr(instr);
        let at = match self.side {
            CursorSide::Before => {
                let at = self.pos;
                self.pos += 1;
                at
            }
            CursorSide::After => {
                let at = self.pos + 1 + self.n_after;
                self.n_after += 1;
                at
            }
        };
        self.f.blocks[self.block].instrs.insert(at, r);
        r
    }
}

impl<'a> SSABuilder for RewriteCtx<'a> {
    fn alloc_ssa(&mut self, ty: ScalarType) -> SSAValue {
        self.f.ssa_alloc.alloc(ty)
    }
}
