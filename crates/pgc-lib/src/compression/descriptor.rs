//! Codec descriptors: the value that says how a buffer gets compressed.
//!
//! Descriptors form a small tree. Leaves name a real backend; `Compound` chains
//! two descriptors, the first of which may not itself be compound; `ParallelBlocks` splits the buffer
//! and codes every block with the same inner descriptor; `Selector` picks one of
//! two descriptors on first use and sticks with it.

use super::backend::LeafCoder;
use super::header::{TAG_COMPOUND, TAG_PARALLEL_BLOCKS, TAG_SELECTOR, TAG_STORED};
use super::parallel_blocks::BlockSplit;
use super::selector::{Branch, ProbeSelector};
use anyhow::Result;

#[derive(Clone, Debug)]
pub enum CodecDescriptor {
    /// Payload copied verbatim.
    Stored,
    Leaf(LeafCoder),
    /// Two stages: `primary` runs first (and is skipped when it does not
    /// shrink the data), `secondary` codes the intermediate and is framed as a
    /// complete nested block.
    Compound {
        primary: Box<CodecDescriptor>,
        secondary: Box<CodecDescriptor>,
    },
    ParallelBlocks(BlockSplit),
    Selector(Box<ProbeSelector>),
}

impl From<LeafCoder> for CodecDescriptor {
    fn from(coder: LeafCoder) -> Self {
        CodecDescriptor::Leaf(coder)
    }
}

impl CodecDescriptor {
    /// Build a leaf after checking its parameter block.
    pub fn leaf(coder: LeafCoder) -> Result<Self> {
        coder.validate()?;
        Ok(CodecDescriptor::Leaf(coder))
    }

    /// Chain two descriptors. The primary is written with flat framing and so
    /// must never produce a compound block; only the secondary may nest further.
    pub fn compound(primary: CodecDescriptor, secondary: CodecDescriptor) -> Result<Self> {
        if primary.may_frame_compound() {
            anyhow::bail!(
                "compound primary must not be compound, got {} ({})",
                primary.kind(),
                primary.label()
            );
        }
        if let CodecDescriptor::Leaf(coder) = &primary {
            coder.validate()?;
        }
        Ok(CodecDescriptor::Compound { primary: Box::new(primary), secondary: Box::new(secondary) })
    }

    pub fn parallel_blocks(
        inner: CodecDescriptor,
        num_blocks: usize,
        min_block_len: usize,
        alignment: usize,
    ) -> Result<Self> {
        Ok(CodecDescriptor::ParallelBlocks(BlockSplit::new(inner, num_blocks, min_block_len, alignment)?))
    }

    pub fn selector(a: CodecDescriptor, b: CodecDescriptor, probe_fraction: f64, min_probe: usize) -> Result<Self> {
        Ok(CodecDescriptor::Selector(Box::new(ProbeSelector::new(a, b, probe_fraction, min_probe)?)))
    }

    /// Priority-ordered tournament over `candidates`, built from nested pairwise
    /// selectors: `[c0, c1, c2]` becomes `Selector(c0, Selector(c1, c2))`.
    /// Earlier candidates win ties.
    pub fn cascade(candidates: Vec<CodecDescriptor>, probe_fraction: f64, min_probe: usize) -> Result<Self> {
        let mut rev = candidates.into_iter().rev();
        let mut acc = rev.next()
            .ok_or_else(|| anyhow::anyhow!("cascade needs at least one candidate"))?;
        for candidate in rev {
            acc = Self::selector(candidate, acc, probe_fraction, min_probe)?;
        }
        Ok(acc)
    }

    /// Wire tag this descriptor frames with (selectors resolve before framing).
    pub fn tag(&self) -> u8 {
        match self {
            CodecDescriptor::Stored => TAG_STORED,
            CodecDescriptor::Leaf(coder) => coder.tag(),
            CodecDescriptor::Compound { .. } => TAG_COMPOUND,
            CodecDescriptor::ParallelBlocks(_) => TAG_PARALLEL_BLOCKS,
            CodecDescriptor::Selector(_) => TAG_SELECTOR,
        }
    }

    fn kind(&self) -> &'static str {
        super::header::tag_name(self.tag())
    }

    /// True when compressing with this descriptor can emit a compound frame at
    /// the top level (a selector emits whatever its winner does).
    fn may_frame_compound(&self) -> bool {
        match self {
            CodecDescriptor::Compound { .. } => true,
            CodecDescriptor::Selector(selector) => {
                selector.candidate(Branch::A).may_frame_compound()
                    || selector.candidate(Branch::B).may_frame_compound()
            }
            _ => false,
        }
    }

    /// Diagnostic label, e.g. `nucleotide-2bit+zstd-19` or `4x[ctx-o2]`.
    pub fn label(&self) -> String {
        match self {
            CodecDescriptor::Stored => "stored".to_string(),
            CodecDescriptor::Leaf(coder) => coder.label(),
            CodecDescriptor::Compound { primary, secondary } => {
                format!("{}+{}", primary.label(), secondary.label())
            }
            CodecDescriptor::ParallelBlocks(split) => {
                format!("{}x[{}]", split.num_blocks(), split.inner().label())
            }
            CodecDescriptor::Selector(selector) => selector.label(),
        }
    }

    /// Worker-thread hint; 0 means "use the ambient rayon pool".
    pub fn thread_hint(&self) -> usize {
        match self {
            CodecDescriptor::Stored | CodecDescriptor::Leaf(_) => 0,
            CodecDescriptor::Compound { primary, secondary } => primary.thread_hint().max(secondary.thread_hint()),
            CodecDescriptor::ParallelBlocks(split) => split.threads(),
            CodecDescriptor::Selector(selector) => {
                selector.candidate(Branch::A).thread_hint().max(selector.candidate(Branch::B).thread_hint())
            }
        }
    }

    /// True when a selector appears anywhere in the tree.
    pub fn contains_selector(&self) -> bool {
        match self {
            CodecDescriptor::Stored | CodecDescriptor::Leaf(_) => false,
            CodecDescriptor::Compound { primary, secondary } => {
                primary.contains_selector() || secondary.contains_selector()
            }
            CodecDescriptor::ParallelBlocks(split) => split.inner().contains_selector(),
            CodecDescriptor::Selector(_) => true,
        }
    }
}
