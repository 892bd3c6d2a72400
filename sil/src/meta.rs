/*
 * Copyright © 2024 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

use crate::cfg::DomInfo;
use crate::ir::Function;

use bitflags::bitflags;

bitflags! {
    /// Which derived analyses are still trustworthy for a function
    ///
    /// Flags are cleared by passes (via preserve_metadata) and set again by
    /// require_metadata when a consumer recomputes the analysis.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Metadata: u32 {
        /// Block ids are dense and equal to block positions
        const BLOCK_INDEX = 1 << 0;
        /// The dominator tree is up to date
        const DOMINANCE = 1 << 1;
        /// Per-block live-value sets are up to date.  Nothing in this crate
        /// recomputes these; requiring them is a caller bug.
        const LIVE_DEFS = 1 << 2;
    }
}

impl Metadata {
    /// What a pass preserves when it touches instructions but leaves the
    /// block structure alone
    pub const CONTROL_FLOW: Metadata =
        Metadata::BLOCK_INDEX.union(Metadata::DOMINANCE);
}

impl Function {
    pub fn valid_metadata(&self) -> Metadata {
        self.valid_meta
    }

    /// Declares that only the given analyses survived a mutation.  Called
    /// by the pass driver after a pass reports progress.
    pub fn preserve_metadata(&mut self, kept: Metadata) {
        self.valid_meta &= kept;
        if !self.valid_meta.contains(Metadata::DOMINANCE) {
            self.dom = None;
        }
    }

    /// Recomputes the named analyses if they are stale
    pub fn require_metadata(&mut self, need: Metadata) {
        assert!(
            !need.contains(Metadata::LIVE_DEFS),
            "No liveness recompute path"
        );

        if need.contains(Metadata::BLOCK_INDEX)
            && !self.valid_meta.contains(Metadata::BLOCK_INDEX)
        {
            for (i, b) in self.blocks.iter_mut().enumerate() {
                b.id = u32::try_from(i).unwrap();
            }
            self.valid_meta |= Metadata::BLOCK_INDEX;
        }

        if need.contains(Metadata::DOMINANCE)
            && !self.valid_meta.contains(Metadata::DOMINANCE)
        {
            self.require_metadata(Metadata::BLOCK_INDEX);
            self.dom = Some(DomInfo::for_function(self));
            self.valid_meta |= Metadata::DOMINANCE;
        }
    }

    /// The dominator tree; require_metadata(DOMINANCE) first
    pub fn dom_info(&self) -> &DomInfo {
        assert!(self.valid_meta.contains(Metadata::DOMINANCE));
        self.dom.as_ref().expect("Dominance not computed")
    }
}
