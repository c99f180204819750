use crate::filters::{
    DataFilter, FilterCollection, LowPassFilter, MovingAverageFilter, NoneFilter, NotchFilter,
};
use crate::{PipelineError, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How sessions shorter than one window are filled out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingMode {
    Edge, // repeat the last reading
    Zero, // append all-zero readings
}

impl FromStr for PaddingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "edge" => Ok(PaddingMode::Edge),
            "zero" => Ok(PaddingMode::Zero),
            _ => Err(format!("Invalid padding mode: {}. Use 'edge' or 'zero'", s)),
        }
    }
}

/// Which representation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractorKind {
    TimeDomain,      // [windows, samples, 6] for sequence models
    TimeDistributed, // [groups, G, time, freq, 6] for time-distributed CNNs
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "time-domain" | "lstm" => Ok(ExtractorKind::TimeDomain),
            "time-distributed" | "spectral" => Ok(ExtractorKind::TimeDistributed),
            _ => Err(format!(
                "Invalid extractor: {}. Use 'time-domain' or 'time-distributed'",
                s
            )),
        }
    }
}

/// One filter stage as written on the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FilterStage {
    None,
    MovingAverage { window: usize },
    LowPass { cutoff: f64 },
    Notch { frequency: f64 },
}

/// Filter chain applied to every channel before extraction.
///
/// Parsed from `none`, `moving-average:<n>`, `low-pass:<hz>`, `notch:<hz>`
/// or a comma-joined list of those.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSelection {
    pub stages: Vec<FilterStage>,
}

impl FromStr for FilterSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut stages = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, arg) = match part.split_once(':') {
                Some((name, arg)) => (name, Some(arg)),
                None => (part, None),
            };
            let stage = match (name, arg) {
                ("none", None) => FilterStage::None,
                ("moving-average", Some(arg)) => FilterStage::MovingAverage {
                    window: arg
                        .parse()
                        .map_err(|e| format!("Invalid moving average window '{}': {}", arg, e))?,
                },
                ("low-pass", Some(arg)) => FilterStage::LowPass {
                    cutoff: arg
                        .parse()
                        .map_err(|e| format!("Invalid low-pass cutoff '{}': {}", arg, e))?,
                },
                ("notch", Some(arg)) => FilterStage::Notch {
                    frequency: arg
                        .parse()
                        .map_err(|e| format!("Invalid notch frequency '{}': {}", arg, e))?,
                },
                _ => {
                    return Err(format!(
                        "Invalid filter: {}. Use none, moving-average:<n>, low-pass:<hz> or notch:<hz>",
                        part
                    ))
                }
            };
            stages.push(stage);
        }
        Ok(FilterSelection { stages })
    }
}

impl FilterSelection {
    /// Build the filter chain for a session recorded at `sample_rate`
    pub fn build(&self, sample_rate: u32) -> Result<Box<dyn DataFilter>> {
        let mut filters: Vec<Box<dyn DataFilter>> = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let filter: Box<dyn DataFilter> = match *stage {
                FilterStage::None => Box::new(NoneFilter),
                FilterStage::MovingAverage { window } => Box::new(MovingAverageFilter::new(window)?),
                FilterStage::LowPass { cutoff } => {
                    Box::new(LowPassFilter::new(sample_rate as f64, cutoff)?)
                }
                FilterStage::Notch { frequency } => {
                    Box::new(NotchFilter::new(sample_rate as f64, frequency)?)
                }
            };
            filters.push(filter);
        }

        Ok(match filters.len() {
            0 => Box::new(NoneFilter),
            1 => filters.remove(0),
            _ => Box::new(FilterCollection::new(filters)),
        })
    }
}

/// Every tunable of the pipeline, threaded explicitly through each stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Duration of one time-domain window (and of a marker's coverage), seconds
    pub yawn_time: f64,
    /// Samples between consecutive time-domain window starts
    pub session_gap: usize,
    /// Spectral chunk duration, seconds; `2 * yawn_time` when unset
    pub chunk_size: Option<f64>,
    /// Spacing between spectral chunk starts, seconds; `yawn_time / 2` when unset
    pub chunk_separation: Option<f64>,
    /// Samples per spectrogram segment; overlap is always `segment_size - 1`
    pub segment_size: usize,
    /// Windows per time-distributed group
    pub time_distribution: usize,
    pub train_percent: f64,
    pub shuffle: bool,
    /// Downsample the majority label in each split until counts match
    pub equalize: bool,
    pub seed: u64,
    pub padding: PaddingMode,
    pub marker_type: String,
    pub file_extension: String,
    pub filter: FilterSelection,
}

pub const DEFAULT_YAWN_TIME: f64 = 2.0;

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            yawn_time: DEFAULT_YAWN_TIME,
            session_gap: 3,
            chunk_size: None,
            chunk_separation: None,
            segment_size: 128,
            time_distribution: 5,
            train_percent: 0.8,
            shuffle: true,
            equalize: true,
            seed: 42,
            padding: PaddingMode::Edge,
            marker_type: "yawn".to_string(),
            file_extension: "eimu".to_string(),
            filter: FilterSelection::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| PipelineError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if !(self.yawn_time > 0.0) {
            return invalid(format!("yawn_time must be positive, got {}", self.yawn_time));
        }
        if !(self.effective_chunk_size() > 0.0) {
            return invalid(format!(
                "chunk_size must be positive, got {}",
                self.effective_chunk_size()
            ));
        }
        if !(self.effective_chunk_separation() > 0.0) {
            return invalid(format!(
                "chunk_separation must be positive, got {}",
                self.effective_chunk_separation()
            ));
        }
        if self.session_gap == 0 {
            return invalid("session_gap must be at least 1 sample".to_string());
        }
        if self.segment_size < 2 {
            return invalid(format!(
                "segment_size must be at least 2, got {}",
                self.segment_size
            ));
        }
        if self.time_distribution == 0 {
            return invalid("time_distribution must be at least 1".to_string());
        }
        if !(self.train_percent > 0.0 && self.train_percent < 1.0) {
            return invalid(format!(
                "train_percent must lie in (0, 1), got {}",
                self.train_percent
            ));
        }
        if self.file_extension.is_empty() {
            return invalid("file_extension must not be empty".to_string());
        }
        Ok(())
    }

    pub fn effective_chunk_size(&self) -> f64 {
        self.chunk_size.unwrap_or(self.yawn_time * 2.0)
    }

    pub fn effective_chunk_separation(&self) -> f64 {
        self.chunk_separation.unwrap_or(self.yawn_time / 2.0)
    }

    /// Margin needed on each side of a chunk for the spectrogram
    pub fn boundary(&self) -> usize {
        self.segment_size / 2
    }
}

/// Build training datasets from a directory of IMU session files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing session files
    #[arg(help = "Directory containing session files")]
    pub input_dir: PathBuf,

    /// Representation to build (time-domain or time-distributed)
    #[arg(long, default_value = "time-domain")]
    pub extractor: ExtractorKind,

    /// JSON file with pipeline settings; flags below override it
    #[arg(long, env = "YAWN_DATASET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Window duration in seconds
    #[arg(long)]
    pub yawn_time: Option<f64>,

    /// Samples between time-domain window starts
    #[arg(long)]
    pub session_gap: Option<usize>,

    /// Spectral chunk duration in seconds (defaults to 2 * yawn time)
    #[arg(long)]
    pub chunk_size: Option<f64>,

    /// Spectral chunk separation in seconds (defaults to yawn time / 2)
    #[arg(long)]
    pub chunk_separation: Option<f64>,

    /// Windows per time-distributed group
    #[arg(long)]
    pub time_distribution: Option<usize>,

    /// Fraction of each file's examples used for training (0.0 to 1.0)
    #[arg(long)]
    pub train_percent: Option<f64>,

    /// Keep each file's windows in recording order
    #[arg(long)]
    pub no_shuffle: bool,

    /// Keep the natural positive/negative balance
    #[arg(long)]
    pub no_equalize: bool,

    /// Seed for shuffling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Padding for sessions shorter than one window (edge or zero)
    #[arg(long)]
    pub padding: Option<PaddingMode>,

    /// Filter chain, e.g. "low-pass:5,moving-average:3"
    #[arg(long)]
    pub filter: Option<FilterSelection>,

    /// Session file extension to scan for
    #[arg(long)]
    pub extension: Option<String>,

    /// Write the assembled dataset as CBOR
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Write per-file window counts as CSV
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

impl Args {
    /// Resolve the effective configuration: file (if any), then flags
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(v) = self.yawn_time {
            config.yawn_time = v;
        }
        if let Some(v) = self.session_gap {
            config.session_gap = v;
        }
        if self.chunk_size.is_some() {
            config.chunk_size = self.chunk_size;
        }
        if self.chunk_separation.is_some() {
            config.chunk_separation = self.chunk_separation;
        }
        if let Some(v) = self.time_distribution {
            config.time_distribution = v;
        }
        if let Some(v) = self.train_percent {
            config.train_percent = v;
        }
        if self.no_shuffle {
            config.shuffle = false;
        }
        if self.no_equalize {
            config.equalize = false;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.padding {
            config.padding = v;
        }
        if let Some(v) = &self.filter {
            config.filter = v.clone();
        }
        if let Some(v) = &self.extension {
            config.file_extension = v.trim_start_matches('.').to_string();
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.boundary(), 64);
        assert_eq!(config.effective_chunk_size(), 4.0);
        assert_eq!(config.effective_chunk_separation(), 1.0);
    }

    #[test]
    fn rejects_bad_train_percent_and_gap() {
        let mut config = PipelineConfig::default();
        config.train_percent = 1.0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));

        let mut config = PipelineConfig::default();
        config.session_gap = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.time_distribution = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_filter_chain() {
        let selection: FilterSelection = "low-pass:5, moving-average:3".parse().unwrap();
        assert_eq!(
            selection.stages,
            vec![
                FilterStage::LowPass { cutoff: 5.0 },
                FilterStage::MovingAverage { window: 3 },
            ]
        );
        assert!("band-pass:3".parse::<FilterSelection>().is_err());
        assert!("moving-average".parse::<FilterSelection>().is_err());
    }

    #[test]
    fn parses_extractor_kind() {
        assert_eq!("lstm".parse(), Ok(ExtractorKind::TimeDomain));
        assert_eq!("time-distributed".parse(), Ok(ExtractorKind::TimeDistributed));
        assert!("cnn".parse::<ExtractorKind>().is_err());
    }

    #[test]
    fn json_overrides_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"yawn_time": 1.5, "padding": "zero"}"#).unwrap();
        assert_eq!(config.yawn_time, 1.5);
        assert_eq!(config.padding, PaddingMode::Zero);
        assert_eq!(config.segment_size, 128);
    }

    #[test]
    fn cli_flags_override_config() {
        let args = Args::parse_from([
            "yawn-dataset",
            "data",
            "--yawn-time",
            "3",
            "--session-gap",
            "1",
            "--no-shuffle",
            "--extension",
            ".EIMU",
        ]);
        let config = args.pipeline_config().unwrap();
        assert_eq!(config.yawn_time, 3.0);
        assert_eq!(config.effective_chunk_size(), 6.0);
        assert_eq!(config.session_gap, 1);
        assert!(!config.shuffle);
        assert_eq!(config.file_extension, "EIMU");
    }

    fn config_file(dir: &tempfile::TempDir, json: &str) -> String {
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, json).unwrap();
        path.display().to_string()
    }

    #[test]
    fn chunk_timings_follow_yawn_time_from_any_source() {
        let dir = tempfile::tempdir().unwrap();

        let path = config_file(&dir, r#"{"yawn_time": 1.0}"#);
        let from_file = Args::parse_from(["yawn-dataset", "data", "--config", path.as_str()])
            .pipeline_config()
            .unwrap();
        assert_eq!(from_file.effective_chunk_size(), 2.0);
        assert_eq!(from_file.effective_chunk_separation(), 0.5);

        let from_flag = Args::parse_from(["yawn-dataset", "data", "--yawn-time", "1"])
            .pipeline_config()
            .unwrap();
        assert_eq!(from_flag, from_file);
    }

    #[test]
    fn yawn_time_flag_keeps_chunk_timings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file(&dir, r#"{"chunk_size": 5.0}"#);
        let config = Args::parse_from([
            "yawn-dataset",
            "data",
            "--config",
            path.as_str(),
            "--yawn-time",
            "3",
        ])
        .pipeline_config()
        .unwrap();
        assert_eq!(config.yawn_time, 3.0);
        assert_eq!(config.effective_chunk_size(), 5.0);
        assert_eq!(config.effective_chunk_separation(), 1.5);

        let config = Args::parse_from([
            "yawn-dataset",
            "data",
            "--config",
            path.as_str(),
            "--chunk-size",
            "7",
        ])
        .pipeline_config()
        .unwrap();
        assert_eq!(config.effective_chunk_size(), 7.0);
    }

    #[test]
    fn rejects_non_positive_chunk_timings() {
        let config = PipelineConfig {
            chunk_separation: Some(0.0),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
