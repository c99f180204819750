use crate::{PipelineError, Result};
use log::warn;
use sci_rs::signal::filter::design::{
    butter_dyn, DigitalFilter, FilterBandType, FilterOutputType, Sos, SosFormatFilter,
};
use sci_rs::signal::filter::sosfiltfilt_dyn;
use std::f64::consts::PI;

/// A transform over one channel's samples.
///
/// Implementations must return exactly as many samples as they receive
/// and must not carry state between calls.
pub trait DataFilter: Send + Sync {
    fn apply(&self, data: &[f64]) -> Vec<f64>;
}

/// Passes samples through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneFilter;

impl DataFilter for NoneFilter {
    fn apply(&self, data: &[f64]) -> Vec<f64> {
        data.to_vec()
    }
}

/// Trailing moving average; the first `window - 1` outputs average over
/// the samples seen so far.
#[derive(Debug, Clone, Copy)]
pub struct MovingAverageFilter {
    window: usize,
}

impl MovingAverageFilter {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(PipelineError::InvalidConfig(
                "moving average window must be at least 1".to_string(),
            ));
        }
        Ok(Self { window })
    }
}

impl DataFilter for MovingAverageFilter {
    fn apply(&self, data: &[f64]) -> Vec<f64> {
        let mut result = Vec::with_capacity(data.len());
        let mut sum = 0.0;
        for i in 0..data.len() {
            sum += data[i];
            if i >= self.window {
                sum -= data[i - self.window];
            }
            let count = (i + 1).min(self.window);
            result.push(sum / count as f64);
        }
        result
    }
}

/// Number of samples `sosfiltfilt` needs beyond its edge padding
fn min_filtfilt_len(sections: usize) -> usize {
    3 * (2 * sections + 1)
}

fn zero_phase(data: &[f64], sos: &[Sos<f64>], name: &str) -> Vec<f64> {
    if data.len() <= min_filtfilt_len(sos.len()) {
        warn!(
            "{} filter skipped: {} samples is too short for zero-phase filtering",
            name,
            data.len()
        );
        return data.to_vec();
    }
    sosfiltfilt_dyn(data.iter(), sos)
}

/// Zero-phase Butterworth low-pass
pub struct LowPassFilter {
    sos: Vec<Sos<f64>>,
}

impl LowPassFilter {
    pub const ORDER: usize = 4;

    pub fn new(sample_rate: f64, cutoff: f64) -> Result<Self> {
        if !(cutoff > 0.0 && cutoff < sample_rate / 2.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "low-pass cutoff {} Hz must lie in (0, {}) for a {} Hz session",
                cutoff,
                sample_rate / 2.0,
                sample_rate
            )));
        }

        let filter = butter_dyn(
            Self::ORDER,
            vec![cutoff],
            Some(FilterBandType::Lowpass),
            Some(false),
            Some(FilterOutputType::Sos),
            Some(sample_rate),
        );
        let DigitalFilter::Sos(SosFormatFilter { sos }) = filter else {
            return Err(PipelineError::InvalidConfig(
                "butterworth design did not produce second-order sections".to_string(),
            ));
        };
        Ok(Self { sos })
    }
}

impl DataFilter for LowPassFilter {
    fn apply(&self, data: &[f64]) -> Vec<f64> {
        zero_phase(data, &self.sos, "low-pass")
    }
}

/// Zero-phase notch, used to strip a narrow band such as baseline drift
pub struct NotchFilter {
    sos: Vec<Sos<f64>>,
}

impl NotchFilter {
    /// Quality factor: `Q = w0 / bandwidth`
    pub const Q: f64 = 30.0;

    pub fn new(sample_rate: f64, frequency: f64) -> Result<Self> {
        let (b, a) = design_notch(frequency, Self::Q, sample_rate)?;
        // one biquad: normalise by a0
        let sos = vec![Sos::new([b[0], b[1], b[2]], [1.0, a[1] / a[0], a[2] / a[0]])];
        Ok(Self { sos })
    }
}

impl DataFilter for NotchFilter {
    fn apply(&self, data: &[f64]) -> Vec<f64> {
        zero_phase(data, &self.sos, "notch")
    }
}

/// Second-order IIR notch design.
///
/// `w0` is in the same units as `fs` and must lie strictly between 0 and
/// the Nyquist frequency.
fn design_notch(w0: f64, q: f64, fs: f64) -> Result<([f64; 3], [f64; 3])> {
    if !(fs > 0.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "sample rate must be positive, got {}",
            fs
        )));
    }
    let w0 = 2.0 * w0 / fs;
    if !(w0 > 0.0 && w0 < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "notch frequency must lie in (0, {}) Hz",
            fs / 2.0
        )));
    }

    let bw = w0 / q * PI;
    let w0 = w0 * PI;
    let beta = (bw / 2.0).tan();
    let gain = 1.0 / (1.0 + beta);

    let b = [gain, -2.0 * w0.cos() * gain, gain];
    let a = [1.0, -2.0 * gain * w0.cos(), 2.0 * gain - 1.0];
    Ok((b, a))
}

/// Applies its filters in order
pub struct FilterCollection {
    filters: Vec<Box<dyn DataFilter>>,
}

impl FilterCollection {
    pub fn new(filters: Vec<Box<dyn DataFilter>>) -> Self {
        Self { filters }
    }
}

impl DataFilter for FilterCollection {
    fn apply(&self, data: &[f64]) -> Vec<f64> {
        self.filters
            .iter()
            .fold(data.to_vec(), |acc, filter| filter.apply(&acc))
    }
}
