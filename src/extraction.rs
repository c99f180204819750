use crate::config::{ExtractorKind, PipelineConfig};
use crate::filters::DataFilter;
use crate::labeling::Labeler;
use crate::reshape::time_distribute;
use crate::spectrogram::Spectrogram;
use crate::windowing::{pad_readings, ChunkPlan, Windower};
use crate::{AnnotatedData, PipelineError, Result, SensorReading, Session, Window, NUM_AXES};
use log::debug;
use ndarray::{s, Array2, Array3, Array4, Ix3, Ix4, Ix5, IxDyn};

/// Run `filter` over every channel of the session.
///
/// A filter that changes a channel's length is a programming error and is
/// reported as a shape mismatch.
fn filter_channels(session: &Session, filter: &dyn DataFilter) -> Result<Vec<Vec<f64>>> {
    (0..NUM_AXES)
        .map(|axis| {
            let filtered = filter.apply(&session.channel(axis));
            if filtered.len() != session.len() {
                return Err(PipelineError::ShapeMismatch(format!(
                    "{}: filter returned {} samples for axis {} of {}",
                    session.name(),
                    filtered.len(),
                    axis,
                    session.len()
                )));
            }
            Ok(filtered)
        })
        .collect()
}

/// A padded chunk running past a filtered channel means the chunk plan and
/// the channels disagree, which is a programming error.
fn check_axis_bounds(
    session: &str,
    channels: &[Vec<f64>],
    plan: &ChunkPlan,
    chunks: &[Window],
) -> Result<()> {
    let Some(last) = chunks.last() else {
        return Ok(());
    };
    let padded = plan.padded(last);
    for (axis, channel) in channels.iter().enumerate() {
        if padded.end() > channel.len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "{}: padded chunk {:?} runs past axis {} of {} samples",
                session,
                padded.range(),
                axis,
                channel.len()
            )));
        }
    }
    Ok(())
}

fn labels_column(labels: impl Iterator<Item = bool>) -> Array2<u8> {
    let labels: Vec<u8> = labels.map(u8::from).collect();
    Array2::from_shape_fn((labels.len(), 1), |(i, _)| labels[i])
}

/// Raw (filtered) samples per window, for sequence models.
///
/// Output: examples `[windows, window_length, 6]`, labels `[windows, 1]`
/// using the marker presence policy.
pub struct TimeDomainExtractor {
    config: PipelineConfig,
}

impl TimeDomainExtractor {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, session: &Session) -> Result<AnnotatedData<Ix3>> {
        let plan = Windower::new(&self.config).time_domain(session)?;
        let windows = Labeler::new(&self.config).label_windows(session, &plan);

        let filter = self.config.filter.build(session.sample_rate())?;
        let channels = filter_channels(session, filter.as_ref())?;
        let filtered: Vec<SensorReading> = (0..session.len())
            .map(|i| {
                SensorReading::new(
                    [channels[0][i], channels[1][i], channels[2][i]],
                    [channels[3][i], channels[4][i], channels[5][i]],
                )
            })
            .collect();
        let sequence = pad_readings(&filtered, plan.sequence_length, self.config.padding);

        let examples = Array3::from_shape_fn(
            (windows.len(), plan.window_length, NUM_AXES),
            |(w, t, axis)| sequence[windows[w].start + t].axis(axis),
        );
        let labels = labels_column(windows.iter().map(|w| w.label));

        AnnotatedData::new(examples, labels)
    }
}

/// Per-window spectrograms of every channel.
///
/// Output: examples `[chunks, time_bins, freq_bins, 6]`, labels
/// `[chunks, 1]` using the marker coverage policy.
pub struct SpectralExtractor {
    config: PipelineConfig,
    spectrogram: Spectrogram,
}

impl SpectralExtractor {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let spectrogram = Spectrogram::new(config.segment_size)?;
        Ok(Self {
            config,
            spectrogram,
        })
    }

    pub fn extract(&self, session: &Session) -> Result<AnnotatedData<Ix4>> {
        let plan = Windower::new(&self.config).spectral(session)?;
        let chunks = Labeler::new(&self.config).label_chunks(session, &plan);

        let filter = self.config.filter.build(session.sample_rate())?;
        let channels = filter_channels(session, filter.as_ref())?;

        // every axis must hold every padded chunk before anything is allocated
        check_axis_bounds(&session.name(), &channels, &plan, &chunks)?;

        let padded_length = plan.chunk_length + 2 * plan.boundary;
        let time_bins = self.spectrogram.time_bins(padded_length);
        let freq_bins = self.spectrogram.freq_bins();
        let rate = session.sample_rate() as f64;

        let mut examples = Array4::<f64>::zeros((chunks.len(), time_bins, freq_bins, NUM_AXES));
        for (axis, channel) in channels.iter().enumerate() {
            let mut per_axis = Array3::<f64>::zeros((chunks.len(), time_bins, freq_bins));
            for (i, core) in chunks.iter().enumerate() {
                let sxx = self.spectrogram.compute(&channel[plan.padded(core).range()], rate)?;
                if sxx.dim() != (time_bins, freq_bins) {
                    return Err(PipelineError::ShapeMismatch(format!(
                        "{}: axis {} chunk {} produced {:?}, expected {:?}",
                        session.name(),
                        axis,
                        i,
                        sxx.dim(),
                        (time_bins, freq_bins)
                    )));
                }
                per_axis.slice_mut(s![i, .., ..]).assign(&sxx);
            }
            examples.slice_mut(s![.., .., .., axis]).assign(&per_axis);
        }

        debug!(
            "{}: spectral output {:?}, {} positive chunks",
            session.name(),
            examples.dim(),
            chunks.iter().filter(|c| c.label).count()
        );

        let labels = labels_column(chunks.iter().map(|c| c.label));
        AnnotatedData::new(examples, labels)
    }
}

/// Spectral extraction followed by time-distributed grouping
pub struct TimeDistributedExtractor {
    spectral: SpectralExtractor,
    group_size: usize,
}

impl TimeDistributedExtractor {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let group_size = config.time_distribution;
        Ok(Self {
            spectral: SpectralExtractor::new(config)?,
            group_size,
        })
    }

    pub fn extract(&self, session: &Session) -> Result<AnnotatedData<Ix5>> {
        time_distribute(self.spectral.extract(session)?, self.group_size)
    }
}

/// The representations the pipeline can build
pub enum Extractor {
    TimeDomain(TimeDomainExtractor),
    TimeDistributed(TimeDistributedExtractor),
}

impl Extractor {
    pub fn new(kind: ExtractorKind, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(match kind {
            ExtractorKind::TimeDomain => Extractor::TimeDomain(TimeDomainExtractor::new(config)),
            ExtractorKind::TimeDistributed => {
                Extractor::TimeDistributed(TimeDistributedExtractor::new(config)?)
            }
        })
    }

    pub fn kind(&self) -> ExtractorKind {
        match self {
            Extractor::TimeDomain(_) => ExtractorKind::TimeDomain,
            Extractor::TimeDistributed(_) => ExtractorKind::TimeDistributed,
        }
    }

    pub fn extract(&self, session: &Session) -> Result<AnnotatedData<IxDyn>> {
        match self {
            Extractor::TimeDomain(e) => e.extract(session).map(AnnotatedData::into_dyn),
            Extractor::TimeDistributed(e) => e.extract(session).map(AnnotatedData::into_dyn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterSelection, PaddingMode};
    use crate::EventMarker;
    use std::f64::consts::PI;

    fn config() -> PipelineConfig {
        PipelineConfig {
            yawn_time: 2.0,
            session_gap: 64,
            ..PipelineConfig::default()
        }
    }

    fn ramp_session(len: usize, rate: u32, markers: Vec<EventMarker>) -> Session {
        let readings = (0..len)
            .map(|i| {
                let v = i as f64;
                SensorReading::new([v, v + 0.1, v + 0.2], [v + 0.3, v + 0.4, v + 0.5])
            })
            .collect();
        Session::new(readings, markers, rate, 1).unwrap()
    }

    #[test]
    fn time_domain_exact_windows() {
        let session = ramp_session(64 * 3, 32, vec![EventMarker::new(70, "yawn")]);
        let data = TimeDomainExtractor::new(config()).extract(&session).unwrap();
        assert_eq!(data.examples().dim(), (3, 64, 6));
        assert_eq!(data.labels().dim(), (3, 1));
        assert_eq!(data.labels().column(0).to_vec(), vec![0, 1, 0]);
        // second window starts at reading 64, gyro-z is v + 0.5
        assert!((data.examples()[[1, 0, 5]] - 64.5).abs() < 1e-12);
    }

    #[test]
    fn time_domain_short_session_is_padded() {
        let session = ramp_session(3, 32, vec![EventMarker::new(1, "yawn")]);
        let data = TimeDomainExtractor::new(config()).extract(&session).unwrap();
        assert_eq!(data.examples().dim(), (1, 64, 6));
        assert_eq!(data.labels()[[0, 0]], 1);
        assert_eq!(data.examples()[[0, 63, 0]], 2.0);

        let zero = PipelineConfig {
            padding: PaddingMode::Zero,
            ..config()
        };
        let data = TimeDomainExtractor::new(zero).extract(&session).unwrap();
        assert_eq!(data.examples()[[0, 63, 0]], 0.0);
        assert_eq!(data.examples()[[0, 2, 0]], 2.0);
    }

    #[test]
    fn time_domain_applies_filter() {
        let session = ramp_session(64, 32, Vec::new());
        let cfg = PipelineConfig {
            filter: "moving-average:2".parse::<FilterSelection>().unwrap(),
            ..config()
        };
        let data = TimeDomainExtractor::new(cfg).extract(&session).unwrap();
        assert!((data.examples()[[0, 10, 0]] - 9.5).abs() < 1e-12);
    }

    fn tone_session(len: usize, rate: u32, markers: Vec<EventMarker>) -> Session {
        let readings = (0..len)
            .map(|i| {
                let t = i as f64 / rate as f64;
                let v = (2.0 * PI * 4.0 * t).sin();
                SensorReading::new([v, 2.0 * v, 3.0 * v], [-v, 0.5 * v, 0.0])
            })
            .collect();
        Session::new(readings, markers, rate, 1).unwrap()
    }

    #[test]
    fn spectral_shape_and_channel_order() {
        // chunk 4 s = 128 samples, separation 1 s = 32, boundary 64
        let session = tone_session(640, 32, Vec::new());
        let data = SpectralExtractor::new(config()).unwrap().extract(&session).unwrap();
        let (chunks, time_bins, freq_bins, axes) = data.examples().dim();
        // starts 64, 96, ... while start + 128 < 576
        assert_eq!(chunks, 12);
        assert_eq!(time_bins, 129);
        assert_eq!(freq_bins, 65);
        assert_eq!(axes, NUM_AXES);
        assert_eq!(data.labels().dim(), (12, 1));

        // power scales with amplitude squared: accel-y is 4x accel-x
        let ax = data.examples()[[0, 10, 16, 0]];
        let ay = data.examples()[[0, 10, 16, 1]];
        let gz = data.examples()[[0, 10, 16, 5]];
        assert!(ax > 0.0);
        assert!((ay / ax - 4.0).abs() < 1e-6);
        assert!(gz.abs() < 1e-20);
    }

    #[test]
    fn spectral_labels_use_coverage() {
        let session = tone_session(640, 32, vec![EventMarker::new(300, "yawn")]);
        let data = SpectralExtractor::new(config()).unwrap().extract(&session).unwrap();
        let labels: Vec<u8> = data.labels().iter().copied().collect();
        // marker covers [268, 332); chunk k spans [64 + 32k, 192 + 32k)
        // and needs more than 12 covered samples
        let expected: Vec<u8> = (0..12)
            .map(|k| {
                let start: usize = 64 + 32 * k;
                let end = start + 128;
                let covered = end.min(332).saturating_sub(start.max(268));
                u8::from(covered > 12)
            })
            .collect();
        assert_eq!(labels, expected);
        assert!(labels.iter().any(|&l| l == 1));
        assert!(labels.iter().any(|&l| l == 0));
    }

    #[test]
    fn spectral_rejects_short_session() {
        let session = ramp_session(200, 32, Vec::new());
        let result = SpectralExtractor::new(config()).unwrap().extract(&session);
        assert!(matches!(
            result,
            Err(PipelineError::InsufficientData {
                required: 256,
                available: 200,
                ..
            })
        ));
    }

    #[test]
    fn chunk_past_a_channel_is_a_shape_mismatch() {
        let plan = ChunkPlan {
            chunk_length: 10,
            separation: 5,
            boundary: 4,
            chunks: vec![Window::new(4, 10), Window::new(9, 10)],
        };
        let full = vec![vec![0.0; 30]; NUM_AXES];
        assert!(check_axis_bounds("s", &full, &plan, &plan.chunks).is_ok());

        let mut short = full.clone();
        short[3].truncate(20);
        assert!(matches!(
            check_axis_bounds("s", &short, &plan, &plan.chunks),
            Err(PipelineError::ShapeMismatch(_))
        ));
        assert!(check_axis_bounds("s", &short, &plan, &[]).is_ok());
    }

    #[test]
    fn time_distributed_groups_spectral_output() {
        let session = tone_session(640, 32, vec![EventMarker::new(300, "yawn")]);
        let spectral = SpectralExtractor::new(config()).unwrap().extract(&session).unwrap();
        let grouped = TimeDistributedExtractor::new(config())
            .unwrap()
            .extract(&session)
            .unwrap();
        assert_eq!(grouped.examples().dim(), (2, 5, 129, 65, 6));
        assert_eq!(grouped.labels()[[0, 0]], spectral.labels()[[2, 0]]);
        assert_eq!(grouped.labels()[[1, 0]], spectral.labels()[[7, 0]]);
    }

    #[test]
    fn extractor_enum_dispatches() {
        let session = ramp_session(64 * 2, 32, Vec::new());
        let extractor = Extractor::new(ExtractorKind::TimeDomain, config()).unwrap();
        assert_eq!(extractor.kind(), ExtractorKind::TimeDomain);
        let data = extractor.extract(&session).unwrap();
        assert_eq!(data.examples().shape(), &[2, 64, 6]);
    }
}
