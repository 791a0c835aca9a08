//! Probe-based choice between two descriptors.
//!
//! On first use both candidates compress a prefix of the buffer; the smaller
//! result wins (A on ties) and the choice is fixed for the life of the
//! instance. Compression takes `&mut` access, so one selector can never be
//! deciding from two call sites at once.

use super::descriptor::CodecDescriptor;
use super::dispatch::{self, Encoded};
use anyhow::Result;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Branch {
    A,
    B,
}

/// What the one-time probe measured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub branch: Branch,
    pub probe_len: usize,
    pub size_a: usize,
    pub size_b: usize,
    /// The probe spanned the whole buffer and its result was emitted as-is.
    pub reused_probe: bool,
}

#[derive(Clone, Debug)]
enum SelectionState {
    Unselected,
    Selected(ProbeOutcome),
}

#[derive(Clone, Debug)]
pub struct ProbeSelector {
    a: CodecDescriptor,
    b: CodecDescriptor,
    probe_fraction: f64,
    min_probe: usize,
    state: SelectionState,
}

impl ProbeSelector {
    pub fn new(a: CodecDescriptor, b: CodecDescriptor, probe_fraction: f64, min_probe: usize) -> Result<Self> {
        if !(probe_fraction > 0.0 && probe_fraction <= 1.0) {
            anyhow::bail!("probe fraction must be in (0, 1], got {}", probe_fraction);
        }
        Ok(Self { a, b, probe_fraction, min_probe, state: SelectionState::Unselected })
    }

    /// Probe length for a buffer of `src_len` bytes: `clamp(f * len, min_probe, len)`.
    pub fn probe_len(&self, src_len: usize) -> usize {
        let scaled = (self.probe_fraction * src_len as f64) as usize;
        scaled.max(self.min_probe).min(src_len)
    }

    pub fn is_selected(&self) -> bool {
        matches!(self.state, SelectionState::Selected(_))
    }

    /// The recorded decision. Asking before the first compression is an error.
    pub fn selected(&self) -> Result<&ProbeOutcome> {
        match &self.state {
            SelectionState::Selected(outcome) => Ok(outcome),
            SelectionState::Unselected => anyhow::bail!("selector {} has not made a choice yet", self.label()),
        }
    }

    /// Record the decision. A selector decides exactly once.
    pub fn select(&mut self, outcome: ProbeOutcome) -> Result<()> {
        if let SelectionState::Selected(previous) = &self.state {
            anyhow::bail!("selector already chose branch {:?}; refusing to select {:?}", previous.branch, outcome.branch);
        }
        self.state = SelectionState::Selected(outcome);
        Ok(())
    }

    pub fn candidate(&self, branch: Branch) -> &CodecDescriptor {
        match branch {
            Branch::A => &self.a,
            Branch::B => &self.b,
        }
    }

    fn candidate_mut(&mut self, branch: Branch) -> &mut CodecDescriptor {
        match branch {
            Branch::A => &mut self.a,
            Branch::B => &mut self.b,
        }
    }

    pub fn label(&self) -> String {
        match &self.state {
            SelectionState::Unselected => format!("select({}|{})", self.a.label(), self.b.label()),
            SelectionState::Selected(outcome) => format!("select({})", self.candidate(outcome.branch).label()),
        }
    }
}

pub(crate) fn compress(src: &[u8], selector: &mut ProbeSelector, estimated_ratio: f64) -> Result<Encoded> {
    if let SelectionState::Selected(outcome) = &selector.state {
        let branch = outcome.branch;
        return dispatch::compress_block(src, selector.candidate_mut(branch), estimated_ratio);
    }

    let probe_len = selector.probe_len(src.len());
    let probe = &src[..probe_len];
    let probe_a = dispatch::compress_block(probe, &mut selector.a, estimated_ratio)?;
    let probe_b = dispatch::compress_block(probe, &mut selector.b, estimated_ratio)?;
    let (size_a, size_b) = (probe_a.frame.len(), probe_b.frame.len());
    let branch = if size_a <= size_b { Branch::A } else { Branch::B };
    let reused_probe = probe_len == src.len();

    info!(
        "Selector probe of {} / {} bytes: {} -> {} bytes, {} -> {} bytes; chose {:?}",
        probe_len, src.len(), selector.a.label(), size_a, selector.b.label(), size_b, branch
    );
    selector.select(ProbeOutcome { branch, probe_len, size_a, size_b, reused_probe })?;

    if reused_probe {
        return Ok(match branch {
            Branch::A => probe_a,
            Branch::B => probe_b,
        });
    }
    dispatch::compress_block(src, selector.candidate_mut(branch), estimated_ratio)
}
