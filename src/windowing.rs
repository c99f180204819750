use crate::config::{PaddingMode, PipelineConfig};
use crate::{PipelineError, Result, SensorReading, Session, Window};
use log::{debug, warn};
use std::borrow::Cow;

/// Time-domain tiling of one session
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDomainPlan {
    pub window_length: usize,
    pub windows: Vec<Window>,
    /// Length of the sequence the windows index into: the session length,
    /// or exactly one window when the session had to be padded
    pub sequence_length: usize,
    /// Readings appended to reach one full window
    pub padding: usize,
    /// Trailing readings no window reaches
    pub discarded: usize,
}

impl TimeDomainPlan {
    /// Readings (real or padded) that belong to at least one window
    pub fn covered_length(&self) -> usize {
        self.sequence_length - self.discarded
    }

    pub fn is_padded(&self) -> bool {
        self.padding > 0
    }
}

/// Tile `session_len` samples with windows starting every `gap` samples.
///
/// A session shorter than one window yields a single window over a padded
/// sequence; otherwise windows start at `0, gap, 2*gap, ...` while they fit
/// and the trailing remainder is dropped.
pub fn time_domain_windows(
    session_len: usize,
    window_length: usize,
    gap: usize,
) -> Result<TimeDomainPlan> {
    if window_length == 0 {
        return Err(PipelineError::InvalidConfig(
            "time-domain window must span at least one sample".to_string(),
        ));
    }
    if gap == 0 {
        return Err(PipelineError::InvalidConfig(
            "session gap must be at least one sample".to_string(),
        ));
    }

    if session_len < window_length {
        return Ok(TimeDomainPlan {
            window_length,
            windows: vec![Window::new(0, window_length)],
            sequence_length: window_length,
            padding: window_length - session_len,
            discarded: 0,
        });
    }

    let count = (session_len - window_length) / gap + 1;
    let windows: Vec<Window> = (0..count)
        .map(|i| Window::new(i * gap, window_length))
        .collect();
    let covered_length = (count - 1) * gap + window_length;

    Ok(TimeDomainPlan {
        window_length,
        windows,
        sequence_length: session_len,
        padding: 0,
        discarded: session_len - covered_length,
    })
}

/// Extend `readings` to exactly `target` entries; returns the input
/// unchanged when it is already long enough.
pub fn pad_readings(
    readings: &[SensorReading],
    target: usize,
    mode: PaddingMode,
) -> Cow<'_, [SensorReading]> {
    if readings.len() >= target {
        return Cow::Borrowed(readings);
    }
    let fill = match (mode, readings.last()) {
        (PaddingMode::Edge, Some(last)) => *last,
        _ => SensorReading::zero(),
    };
    let mut padded = readings.to_vec();
    padded.resize(target, fill);
    Cow::Owned(padded)
}

/// Spectral chunking of one session.
///
/// `chunks` hold the core ranges used for labeling; the spectrogram is
/// computed over each core range widened by `boundary` on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub chunk_length: usize,
    pub separation: usize,
    pub boundary: usize,
    pub chunks: Vec<Window>,
}

impl ChunkPlan {
    pub fn padded(&self, core: &Window) -> Window {
        Window::new(core.start - self.boundary, core.length + 2 * self.boundary)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Chunk starts step by `separation`, beginning at `boundary`, while the
/// chunk plus its trailing margin stays strictly inside the session.
pub fn spectral_chunks(
    session: &str,
    session_len: usize,
    chunk_length: usize,
    separation: usize,
    boundary: usize,
) -> Result<ChunkPlan> {
    if chunk_length == 0 || separation == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "chunk length ({}) and separation ({}) must both be at least one sample",
            chunk_length, separation
        )));
    }

    let usable = session_len.checked_sub(2 * boundary);
    if usable.map_or(true, |usable| chunk_length > usable) {
        return Err(PipelineError::InsufficientData {
            session: session.to_string(),
            required: chunk_length + 2 * boundary,
            available: session_len,
        });
    }

    let mut chunks = Vec::new();
    let mut start = boundary;
    while start + chunk_length < session_len - boundary {
        chunks.push(Window::new(start, chunk_length));
        start += separation;
    }

    Ok(ChunkPlan {
        chunk_length,
        separation,
        boundary,
        chunks,
    })
}

/// Converts the configured durations into sample windows for a session
pub struct Windower<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Windower<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    pub fn time_domain(&self, session: &Session) -> Result<TimeDomainPlan> {
        let window_length = session.samples_for(self.config.yawn_time);
        let plan = time_domain_windows(session.len(), window_length, self.config.session_gap)?;

        debug!(
            "{}: {} readings -> {} windows of {} samples (gap {})",
            session.name(),
            session.len(),
            plan.windows.len(),
            window_length,
            self.config.session_gap
        );
        if plan.is_padded() {
            debug!(
                "{}: padded {} readings to one window of {}",
                session.name(),
                session.len(),
                window_length
            );
        }
        if plan.discarded > 0 {
            warn!(
                "{}: discarding {} trailing readings that do not fill a window",
                session.name(),
                plan.discarded
            );
        }
        Ok(plan)
    }

    pub fn spectral(&self, session: &Session) -> Result<ChunkPlan> {
        let chunk_length = session.samples_for(self.config.effective_chunk_size());
        let separation = session.samples_for(self.config.effective_chunk_separation());
        let plan = spectral_chunks(
            &session.name(),
            session.len(),
            chunk_length,
            separation,
            self.config.boundary(),
        )?;

        debug!(
            "{}: {} readings -> {} chunks of {} samples every {} (boundary {})",
            session.name(),
            session.len(),
            plan.len(),
            chunk_length,
            separation,
            plan.boundary
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple_has_no_remainder() {
        let plan = time_domain_windows(64 * 4, 64, 64).unwrap();
        assert_eq!(plan.windows.len(), 4);
        assert_eq!(plan.discarded, 0);
        assert_eq!(plan.windows.len() * plan.window_length, plan.covered_length());
        assert_eq!(plan.windows[3], Window::new(192, 64));
    }

    #[test]
    fn uneven_session_truncates_remainder() {
        let plan = time_domain_windows(64 * 3 + 17, 64, 64).unwrap();
        assert_eq!(plan.windows.len(), 3);
        assert_eq!(plan.covered_length(), 192);
        assert_eq!(plan.discarded, 17);
        assert_eq!(plan.windows.len() * plan.window_length, plan.covered_length());
    }

    #[test]
    fn short_session_yields_one_padded_window() {
        let plan = time_domain_windows(3, 64, 1).unwrap();
        assert_eq!(plan.windows, vec![Window::new(0, 64)]);
        assert_eq!(plan.sequence_length, 64);
        assert_eq!(plan.padding, 61);
        assert_eq!(plan.covered_length(), plan.window_length);
        assert!(plan.is_padded());
    }

    #[test]
    fn sliding_gap_counts() {
        // 64-sample windows stepping one sample at a time
        let counts: Vec<usize> = [73, 64, 66, 3]
            .iter()
            .map(|&len| time_domain_windows(len, 64, 1).unwrap().windows.len())
            .collect();
        assert_eq!(counts, vec![10, 1, 3, 1]);
    }

    #[test]
    fn windows_never_exceed_sequence() {
        for len in 1..300 {
            let plan = time_domain_windows(len, 32, 5).unwrap();
            for w in &plan.windows {
                assert!(w.end() <= plan.sequence_length);
            }
        }
    }

    #[test]
    fn edge_padding_repeats_last_reading() {
        let readings = vec![
            SensorReading::new([1.0; 3], [2.0; 3]),
            SensorReading::new([3.0; 3], [4.0; 3]),
        ];
        let padded = pad_readings(&readings, 4, PaddingMode::Edge);
        assert_eq!(padded.len(), 4);
        assert_eq!(padded[3], readings[1]);

        let zeroed = pad_readings(&readings, 4, PaddingMode::Zero);
        assert_eq!(zeroed[2], SensorReading::zero());
        assert!(matches!(pad_readings(&readings, 2, PaddingMode::Edge), Cow::Borrowed(_)));
    }

    #[test]
    fn chunks_respect_boundary() {
        let plan = spectral_chunks("s", 400, 100, 25, 64).unwrap();
        assert!(!plan.is_empty());
        for chunk in &plan.chunks {
            let padded = plan.padded(chunk);
            assert!(chunk.start >= 64);
            assert!(padded.end() < 400);
            assert_eq!(padded.length, 228);
        }
        // starts 64, 89, ..., last start s with s + 100 < 336
        assert_eq!(plan.chunks.first().unwrap().start, 64);
        assert_eq!(plan.chunks.last().unwrap().start, 214);
        assert_eq!(plan.len(), 7);
    }

    #[test]
    fn chunks_overlap_when_separation_is_short() {
        let plan = spectral_chunks("s", 1000, 128, 32, 64).unwrap();
        let a = plan.chunks[0];
        let b = plan.chunks[1];
        assert!(b.start < a.end());
    }

    #[test]
    fn too_short_for_a_chunk_is_an_error() {
        match spectral_chunks("short.eimu", 200, 100, 25, 64) {
            Err(PipelineError::InsufficientData {
                session,
                required,
                available,
            }) => {
                assert_eq!(session, "short.eimu");
                assert_eq!(required, 228);
                assert_eq!(available, 200);
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
        assert!(spectral_chunks("tiny", 50, 10, 5, 64).is_err());
    }

    #[test]
    fn exact_fit_produces_no_chunks() {
        let plan = spectral_chunks("s", 228, 100, 25, 64).unwrap();
        assert!(plan.is_empty());
    }
}
