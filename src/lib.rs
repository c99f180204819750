pub mod config;
pub mod data_loading;
pub mod dataset;
pub mod error;
pub mod extraction;
pub mod filters;
pub mod labeling;
pub mod output;
pub mod reshape;
pub mod spectrogram;
pub mod windowing;

pub use error::{PipelineError, Result};

use ndarray::{Array, Array2, ArrayView, Axis, Dimension, IxDyn, RemoveAxis, Slice};
use std::ops::Range;
use std::path::PathBuf;

/// Number of channels in every reading: accel-x,y,z then gyro-x,y,z
pub const NUM_AXES: usize = 6;

pub const AXIS_NAMES: [&str; NUM_AXES] = [
    "accel-x", "accel-y", "accel-z", "gyro-x", "gyro-y", "gyro-z",
];

/// One timestep of a recording
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
}

impl SensorReading {
    pub fn new(accel: [f64; 3], gyro: [f64; 3]) -> Self {
        Self { accel, gyro }
    }

    pub fn zero() -> Self {
        Self::new([0.0; 3], [0.0; 3])
    }

    /// Channel value in the fixed accel-then-gyro order
    pub fn axis(&self, axis: usize) -> f64 {
        if axis < 3 {
            self.accel[axis]
        } else {
            self.gyro[axis - 3]
        }
    }

    pub fn channels(&self) -> [f64; NUM_AXES] {
        [
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
        ]
    }
}

/// A labeled point-in-time event, indexed by sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMarker {
    pub index: usize,
    pub kind: String,
}

impl EventMarker {
    pub fn new(index: usize, kind: impl Into<String>) -> Self {
        Self {
            index,
            kind: kind.into(),
        }
    }
}

/// A fixed-rate recording plus its event markers.
///
/// Construction validates that the recording is non-empty, the sample rate
/// is positive and every marker falls inside the recording. Markers are
/// kept sorted by index.
#[derive(Debug, Clone)]
pub struct Session {
    readings: Vec<SensorReading>,
    markers: Vec<EventMarker>,
    sample_rate: u32,
    version: u32,
    source: Option<PathBuf>,
    position: Option<(usize, usize)>,
}

impl Session {
    pub fn new(
        readings: Vec<SensorReading>,
        mut markers: Vec<EventMarker>,
        sample_rate: u32,
        version: u32,
    ) -> Result<Self> {
        if readings.is_empty() {
            return Err(PipelineError::InvalidSession(
                "session contains no readings".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(PipelineError::InvalidSession(
                "sample rate must be positive".to_string(),
            ));
        }
        if let Some(marker) = markers.iter().find(|m| m.index >= readings.len()) {
            return Err(PipelineError::InvalidSession(format!(
                "marker '{}' at index {} is outside a session of {} readings",
                marker.kind,
                marker.index,
                readings.len()
            )));
        }

        markers.sort_by_key(|m| m.index);

        Ok(Self {
            readings,
            markers,
            sample_rate,
            version,
            source: None,
            position: None,
        })
    }

    /// Attach the file this session came from and its place in a batch load
    pub fn with_source(mut self, path: PathBuf, position: Option<(usize, usize)>) -> Self {
        self.source = Some(path);
        self.position = position;
        self
    }

    pub fn readings(&self) -> &[SensorReading] {
        &self.readings
    }

    pub fn markers(&self) -> &[EventMarker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    /// `(file_index, total_files)` when loaded as part of a directory
    pub fn position(&self) -> Option<(usize, usize)> {
        self.position
    }

    /// Human readable name for logs and error messages
    pub fn name(&self) -> String {
        self.source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<in-memory session>".to_string())
    }

    /// All samples of one channel
    pub fn channel(&self, axis: usize) -> Vec<f64> {
        self.readings.iter().map(|r| r.axis(axis)).collect()
    }

    /// Sample indices of markers with the given tag, ascending
    pub fn marker_indices<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.markers
            .iter()
            .filter(move |m| m.kind == kind)
            .map(|m| m.index)
    }

    /// Convert a duration to a sample count at this session's rate
    pub fn samples_for(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate as f64).round() as usize
    }
}

/// Half-open `[start, start + length)` range into a reading sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub length: usize,
    pub label: bool,
}

impl Window {
    pub fn new(start: usize, length: usize) -> Self {
        Self {
            start,
            length,
            label: false,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    pub fn with_label(self, label: bool) -> Self {
        Self { label, ..self }
    }
}

/// Examples paired with one `{0,1}` label each.
///
/// The leading dimension of `examples` always equals the number of label
/// rows; `labels` has shape `[n, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedData<D: Dimension> {
    examples: Array<f64, D>,
    labels: Array2<u8>,
}

impl<D: Dimension> AnnotatedData<D> {
    pub fn new(examples: Array<f64, D>, labels: Array2<u8>) -> Result<Self> {
        if examples.ndim() == 0 {
            return Err(PipelineError::ShapeMismatch(
                "examples must have a leading example axis".to_string(),
            ));
        }
        if labels.ncols() != 1 {
            return Err(PipelineError::ShapeMismatch(format!(
                "labels must have shape [n, 1], got {:?}",
                labels.shape()
            )));
        }
        if examples.len_of(Axis(0)) != labels.nrows() {
            return Err(PipelineError::ShapeMismatch(format!(
                "{} examples but {} labels",
                examples.len_of(Axis(0)),
                labels.nrows()
            )));
        }
        Ok(Self { examples, labels })
    }

    pub fn examples(&self) -> &Array<f64, D> {
        &self.examples
    }

    pub fn labels(&self) -> &Array2<u8> {
        &self.labels
    }

    pub fn into_parts(self) -> (Array<f64, D>, Array2<u8>) {
        (self.examples, self.labels)
    }

    pub fn len(&self) -> usize {
        self.labels.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape of a single example (everything after the leading axis)
    pub fn example_shape(&self) -> &[usize] {
        &self.examples.shape()[1..]
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l != 0).count()
    }

    pub fn negatives(&self) -> usize {
        self.len() - self.positives()
    }

    /// Split into `[0, at)` and `[at, len)`
    pub fn split_at(&self, at: usize) -> (Self, Self) {
        let at = at.min(self.len());
        let head = Self {
            examples: self.examples.slice_axis(Axis(0), Slice::from(..at)).to_owned(),
            labels: self.labels.slice_axis(Axis(0), Slice::from(..at)).to_owned(),
        };
        let tail = Self {
            examples: self.examples.slice_axis(Axis(0), Slice::from(at..)).to_owned(),
            labels: self.labels.slice_axis(Axis(0), Slice::from(at..)).to_owned(),
        };
        (head, tail)
    }

    pub fn into_dyn(self) -> AnnotatedData<IxDyn> {
        AnnotatedData {
            examples: self.examples.into_dyn(),
            labels: self.labels,
        }
    }
}

impl<D: RemoveAxis> AnnotatedData<D> {
    /// Examples (and labels) at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            examples: self.examples.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        }
    }

    /// Append parts along the example axis, preserving their order
    pub fn concatenate(parts: &[Self]) -> Result<Self> {
        if parts.is_empty() {
            return Err(PipelineError::ShapeMismatch(
                "nothing to concatenate".to_string(),
            ));
        }
        let example_views: Vec<ArrayView<f64, D>> = parts.iter().map(|p| p.examples.view()).collect();
        let label_views: Vec<_> = parts.iter().map(|p| p.labels.view()).collect();

        let examples = ndarray::concatenate(Axis(0), &example_views)?;
        let labels = ndarray::concatenate(Axis(0), &label_views)?;
        Self::new(examples, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};

    fn reading(v: f64) -> SensorReading {
        SensorReading::new([v, v + 1.0, v + 2.0], [v + 3.0, v + 4.0, v + 5.0])
    }

    #[test]
    fn session_sorts_markers() {
        let readings = (0..10).map(|i| reading(i as f64)).collect();
        let markers = vec![EventMarker::new(7, "yawn"), EventMarker::new(2, "yawn")];
        let session = Session::new(readings, markers, 32, 1).unwrap();
        let indices: Vec<usize> = session.marker_indices("yawn").collect();
        assert_eq!(indices, vec![2, 7]);
    }

    #[test]
    fn session_rejects_out_of_range_marker() {
        let readings = (0..4).map(|i| reading(i as f64)).collect();
        let markers = vec![EventMarker::new(4, "yawn")];
        assert!(matches!(
            Session::new(readings, markers, 32, 1),
            Err(PipelineError::InvalidSession(_))
        ));
    }

    #[test]
    fn session_rejects_empty_and_zero_rate() {
        assert!(Session::new(Vec::new(), Vec::new(), 32, 1).is_err());
        assert!(Session::new(vec![reading(0.0)], Vec::new(), 0, 1).is_err());
    }

    #[test]
    fn channel_order_is_accel_then_gyro() {
        let r = reading(10.0);
        assert_eq!(r.channels(), [10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        for axis in 0..NUM_AXES {
            assert_eq!(r.axis(axis), r.channels()[axis]);
        }
    }

    #[test]
    fn annotated_data_rejects_mismatched_lengths() {
        let examples = Array3::<f64>::zeros((3, 4, NUM_AXES));
        let labels = arr2(&[[0u8], [1]]);
        assert!(matches!(
            AnnotatedData::new(examples, labels),
            Err(PipelineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn split_and_concatenate_preserve_count() {
        let examples = Array3::from_shape_fn((5, 2, NUM_AXES), |(i, _, _)| i as f64);
        let labels = arr2(&[[0u8], [1], [0], [1], [1]]);
        let data = AnnotatedData::new(examples, labels).unwrap();

        let (train, test) = data.split_at(4);
        assert_eq!(train.len(), 4);
        assert_eq!(test.len(), 1);

        let joined = AnnotatedData::concatenate(&[train, test]).unwrap();
        assert_eq!(joined, data);
        assert_eq!(joined.positives(), 3);
        assert_eq!(joined.negatives(), 2);
    }

    #[test]
    fn select_keeps_examples_and_labels_paired() {
        let examples = Array3::from_shape_fn((3, 1, NUM_AXES), |(i, _, _)| i as f64);
        let labels = arr2(&[[0u8], [1], [0]]);
        let data = AnnotatedData::new(examples, labels).unwrap();

        let picked = data.select(&[2, 1]);
        assert_eq!(picked.examples()[[0, 0, 0]], 2.0);
        assert_eq!(picked.labels()[[0, 0]], 0);
        assert_eq!(picked.examples()[[1, 0, 0]], 1.0);
        assert_eq!(picked.labels()[[1, 0]], 1);
    }
}
