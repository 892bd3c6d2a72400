/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

//! IR consistency checking
//!
//! The rewrite passes themselves have no recoverable-error channel; a
//! violated invariant inside a pass is a bug and asserts.  This checker is
//! the boundary diagnostic used by tests and by the pipeline in debug
//! builds to pin down which pass broke the IR.

use crate::ir::*;
use crate::meta::Metadata;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("{value} is referenced by \"{user}\" but has no definition")]
    DanglingSource { value: String, user: String },

    #[error("definition of {value} does not dominate its use in \"{user}\"")]
    DoesNotDominate { value: String, user: String },

    #[error("terminator \"{instr}\" in the middle of block {block}")]
    MisplacedTerminator { instr: String, block: u32 },

    #[error("instruction \"{instr}\" is placed in more than one block")]
    DuplicatePlacement { instr: String },

    #[error("a removed instruction is still listed in block {block}")]
    RemovedInBlock { block: u32 },

    #[error("instruction \"{instr}\" is in the arena but in no block")]
    Unplaced { instr: String },

    #[error("def-use index is stale for {value}")]
    StaleIndex { value: String },
}

impl Function {
    pub fn validate(&mut self) -> Result<(), ValidateError> {
        self.require_metadata(Metadata::BLOCK_INDEX | Metadata::DOMINANCE);

        let mut loc: FxHashMap<InstrRef, (u32, usize)> = FxHashMap::default();
        let mut seen: FxHashSet<InstrRef> = FxHashSet::default();

        for (b_pos, b) in self.blocks.iter().enumerate() {
            for (i_pos, &r) in b.instrs.iter().enumerate() {
                if self.is_removed(r) {
                    return Err(ValidateError::RemovedInBlock { block: b.id });
                }
                if !seen.insert(r) {
                    return Err(ValidateError::DuplicatePlacement {
                        instr: self.instr(r).to_string(),
                    });
                }
                if self.instr(r).is_terminator()
                    && i_pos != b.instrs.len() - 1
                {
                    return Err(ValidateError::MisplacedTerminator {
                        instr: self.instr(r).to_string(),
                        block: b.id,
                    });
                }
                loc.insert(r, (u32::try_from(b_pos).unwrap(), i_pos));
            }
        }

        for r in self.arena_refs() {
            if !seen.contains(&r) {
                return Err(ValidateError::Unplaced {
                    instr: self.instr(r).to_string(),
                });
            }
        }

        for (&r, &(use_block, use_pos)) in &loc {
            let instr = self.instr(r);

            if let Some(v) = instr.def() {
                if self.def_instr(v) != Some(r) {
                    return Err(ValidateError::StaleIndex {
                        value: v.to_string(),
                    });
                }
            }

            for (slot, src) in instr.srcs().iter().enumerate() {
                let Some(&v) = src.as_ssa() else {
                    continue;
                };

                let Some(def_r) = self.def_instr(v) else {
                    return Err(ValidateError::DanglingSource {
                        value: v.to_string(),
                        user: instr.to_string(),
                    });
                };

                let listed = self.uses_of(v).iter().any(|u| {
                    u.instr == r && usize::from(u.slot) == slot
                });
                if !listed {
                    return Err(ValidateError::StaleIndex {
                        value: v.to_string(),
                    });
                }

                let Some(&(def_block, def_pos)) = loc.get(&def_r) else {
                    return Err(ValidateError::DanglingSource {
                        value: v.to_string(),
                        user: instr.to_string(),
                    });
                };

                let dominates = if def_block == use_block {
                    def_pos < use_pos
                } else {
                    self.dom_info().dominates(def_block, use_block)
                };
                if !dominates {
                    return Err(ValidateError::DoesNotDominate {
                        value: v.to_string(),
                        user: instr.to_string(),
                    });
                }
            }
        }

        /* Every recorded use must still exist in the instruction it names */
        for (v, list) in &self.uses {
            for u in list {
                let stale = self.is_removed(u.instr)
                    || self
                        .instr(u.instr)
                        .srcs()
                        .get(usize::from(u.slot))
                        .and_then(|s| s.as_ssa())
                        != Some(v);
                if stale {
                    return Err(ValidateError::StaleIndex {
                        value: v.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Shader {
    pub fn validate(&mut self) -> Result<(), ValidateError> {
        for f in &mut self.functions {
            f.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::*;
    use crate::ir::*;

    #[test]
    fn well_formed_diamond_validates() {
        let mut s = Shader::new(ShaderStage::Fragment);
        let mut f = Function::new();
        let mut b = SSAFnBuilder::new(&mut f);

        let x = b.alloc_ssa(ScalarType::F32);
        b.push_op(OpALd {
            dst: x.into(),
            addr: 0x10,
            comp: 0,
        });
        b.push_op(OpBra {
            cond: x.into(),
            target: 2,
        });

        /* then side */
        b.start_block();
        let t = b.fmul(x.into(), x.into());
        b.push_op(OpASt {
            src: t.into(),
            slot: 0,
        });
        b.push_op(OpBra {
            cond: Src::new_true(),
            target: 3,
        });

        /* else side */
        b.start_block();
        let e = b.fadd(x.into(), x.into());
        b.push_op(OpASt {
            src: e.into(),
            slot: 1,
        });

        /* join */
        b.start_block();
        b.push_op(OpExit {});
        s.functions.push(f);

        s.validate().unwrap();
    }

    #[test]
    fn use_before_def_is_caught() {
        let mut s = Shader::new(ShaderStage::Compute);
        let mut f = Function::new();
        let mut b = SSAFnBuilder::new(&mut f);
        let x = b.mov(ScalarType::F32, Src::new_imm_f32(1.0));
        b.push_op(OpASt {
            src: x.into(),
            slot: 0,
        });
        b.push_op(OpExit {});
        s.functions.push(f);

        /* Swap the store in front of its operand's definition */
        let f = &mut s.functions[0];
        f.blocks[0].instrs.swap(0, 1);

        assert!(s.validate().is_err());
    }

    #[test]
    fn sibling_branch_does_not_dominate() {
        let mut s = Shader::new(ShaderStage::Fragment);
        let mut f = Function::new();
        let mut b = SSAFnBuilder::new(&mut f);

        let c = b.alloc_ssa(ScalarType::F32);
        b.push_op(OpALd {
            dst: c.into(),
            addr: 0x0,
            comp: 0,
        });
        b.push_op(OpBra {
            cond: c.into(),
            target: 2,
        });

        b.start_block();
        let t = b.fmul(c.into(), c.into());
        b.push_op(OpBra {
            cond: Src::new_true(),
            target: 3,
        });

        /* Consumes a value defined only on the other path */
        b.start_block();
        b.push_op(OpASt {
            src: t.into(),
            slot: 0,
        });

        b.start_block();
        b.push_op(OpExit {});
        s.functions.push(f);

        assert!(matches!(
            s.validate(),
            Err(crate::validate::ValidateError::DoesNotDominate { .. })
        ));
    }
}
