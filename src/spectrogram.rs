use crate::{PipelineError, Result};
use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Tukey taper fraction of the analysis window
const TUKEY_ALPHA: f64 = 0.25;

/// Periodic Tukey window of `size` samples (symmetric window of `size + 1`
/// with the last sample dropped)
fn create_tukey_window(size: usize, alpha: f64) -> Vec<f64> {
    let m = size + 1;
    let width = (alpha * (m - 1) as f64 / 2.0).floor() as usize;
    (0..size)
        .map(|n| {
            if width == 0 {
                1.0
            } else if n < width {
                0.5 * (1.0 + (PI * (-1.0 + 2.0 * n as f64 / (alpha * (m - 1) as f64))).cos())
            } else if n <= m - 1 - width {
                1.0
            } else {
                0.5 * (1.0
                    + (PI * (-2.0 / alpha + 1.0 + 2.0 * n as f64 / (alpha * (m - 1) as f64)))
                        .cos())
            }
        })
        .collect()
}

/// Segment-wise one-sided power spectral density.
///
/// Segments of `segment_size` samples advance by one sample (overlap
/// `segment_size - 1`), each detrended to zero mean and tapered before the
/// FFT. Output is `[time_bins, freq_bins]` with
/// `time_bins = len - segment_size + 1` and `freq_bins = segment_size / 2 + 1`.
pub struct Spectrogram {
    segment_size: usize,
    window: Vec<f64>,
    window_power: f64,
    fft: Arc<dyn Fft<f64>>,
}

impl Spectrogram {
    pub fn new(segment_size: usize) -> Result<Self> {
        if segment_size < 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "spectrogram segment size must be at least 2, got {}",
                segment_size
            )));
        }
        let window = create_tukey_window(segment_size, TUKEY_ALPHA);
        let window_power = window.iter().map(|w| w * w).sum();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(segment_size);

        Ok(Self {
            segment_size,
            window,
            window_power,
            fft,
        })
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn freq_bins(&self) -> usize {
        self.segment_size / 2 + 1
    }

    pub fn time_bins(&self, len: usize) -> usize {
        (len + 1).saturating_sub(self.segment_size)
    }

    /// Centre frequency of every bin, in Hz
    pub fn frequencies(&self, sample_rate: f64) -> Vec<f64> {
        (0..self.freq_bins())
            .map(|k| k as f64 * sample_rate / self.segment_size as f64)
            .collect()
    }

    pub fn compute(&self, data: &[f64], sample_rate: f64) -> Result<Array2<f64>> {
        if data.len() < self.segment_size {
            return Err(PipelineError::ShapeMismatch(format!(
                "spectrogram input of {} samples is shorter than one segment of {}",
                data.len(),
                self.segment_size
            )));
        }

        let time_bins = self.time_bins(data.len());
        let freq_bins = self.freq_bins();
        let scale = 1.0 / (sample_rate * self.window_power);
        let nyquist = if self.segment_size % 2 == 0 {
            Some(self.segment_size / 2)
        } else {
            None
        };

        let mut out = Array2::<f64>::zeros((time_bins, freq_bins));
        let mut buffer = vec![Complex::new(0.0, 0.0); self.segment_size];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.fft.get_inplace_scratch_len()];

        for (t, segment) in data.windows(self.segment_size).enumerate() {
            let mean = segment.iter().sum::<f64>() / self.segment_size as f64;
            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&self.window) {
                *slot = Complex::new((x - mean) * w, 0.0);
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            let mut row = out.row_mut(t);
            for k in 0..freq_bins {
                let mut power = buffer[k].norm_sqr() * scale;
                // fold negative frequencies into the one-sided spectrum
                if k != 0 && Some(k) != nyquist {
                    power *= 2.0;
                }
                row[k] = power;
            }
        }

        Ok(out)
    }
}
