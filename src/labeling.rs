use crate::config::PipelineConfig;
use crate::windowing::{ChunkPlan, TimeDomainPlan};
use crate::{Session, Window};
use std::ops::Range;

/// Markers of `kind` whose index falls inside `range`
pub fn marker_count(session: &Session, kind: &str, range: Range<usize>) -> usize {
    session
        .marker_indices(kind)
        .filter(|idx| range.contains(idx))
        .count()
}

/// Time-domain policy: a window is positive when it contains at least one
/// marker of the tracked kind.
pub fn presence_label(session: &Session, kind: &str, window: &Window) -> bool {
    marker_count(session, kind, window.range()) > 0
}

/// Per-sample coverage by markers of one kind, stored as a running count so
/// the covered samples of any range can be read in constant time.
#[derive(Debug, Clone)]
pub struct CoverageMask {
    cumulative: Vec<usize>,
}

impl CoverageMask {
    /// Every marker of `kind` covers `span` samples centred on its index,
    /// clamped to the session.
    pub fn new(session: &Session, kind: &str, span: usize) -> Self {
        let len = session.len();
        let mut covered = vec![false; len];
        for idx in session.marker_indices(kind) {
            let start = idx.saturating_sub(span / 2);
            let end = (idx + span - span / 2).min(len);
            covered[start..end].iter_mut().for_each(|c| *c = true);
        }

        let mut cumulative = Vec::with_capacity(len + 1);
        cumulative.push(0);
        for (i, &c) in covered.iter().enumerate() {
            cumulative.push(cumulative[i] + c as usize);
        }
        Self { cumulative }
    }

    /// Number of covered samples in `range` (clamped to the session)
    pub fn covered(&self, range: Range<usize>) -> usize {
        let last = self.cumulative.len() - 1;
        let end = range.end.min(last);
        let start = range.start.min(end);
        self.cumulative[end] - self.cumulative[start]
    }
}

/// Spectral policy: positive when strictly more than a tenth of the core
/// range is covered by markers.
pub fn coverage_label(mask: &CoverageMask, window: &Window) -> bool {
    mask.covered(window.range()) > window.length / 10
}

/// Tags windows with labels; the time-domain and spectral paths use
/// different policies.
pub struct Labeler<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Labeler<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Presence policy over every window in the plan
    pub fn label_windows(&self, session: &Session, plan: &TimeDomainPlan) -> Vec<Window> {
        plan.windows
            .iter()
            .map(|w| w.with_label(presence_label(session, &self.config.marker_type, w)))
            .collect()
    }

    /// Coverage-ratio policy over each chunk's core range
    pub fn label_chunks(&self, session: &Session, plan: &ChunkPlan) -> Vec<Window> {
        let span = session.samples_for(self.config.yawn_time);
        let mask = CoverageMask::new(session, &self.config.marker_type, span);
        plan.chunks
            .iter()
            .map(|w| w.with_label(coverage_label(&mask, w)))
            .collect()
    }
}
