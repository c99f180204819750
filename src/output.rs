use crate::config::{ExtractorKind, PipelineConfig};
use crate::dataset::{Dataset, FileSummary};
use crate::{AnnotatedData, AXIS_NAMES};
use anyhow::{Context, Result};
use ndarray::{Array2, ArrayD, Dimension, IxDyn, RemoveAxis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// One split flattened in row-major order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRecord {
    pub shape: Vec<usize>,
    pub examples: Vec<f64>,
    pub labels: Vec<u8>,
}

impl SplitRecord {
    pub fn from_data<D: Dimension>(data: &AnnotatedData<D>) -> Self {
        Self {
            shape: data.examples().shape().to_vec(),
            examples: data.examples().iter().copied().collect(),
            labels: data.labels().iter().copied().collect(),
        }
    }

    pub fn into_data(self) -> Result<AnnotatedData<IxDyn>> {
        let rows = self.labels.len();
        let examples = ArrayD::from_shape_vec(IxDyn(&self.shape), self.examples)
            .context("Example values do not match the recorded shape")?;
        let labels = Array2::from_shape_vec((rows, 1), self.labels)?;
        Ok(AnnotatedData::new(examples, labels)?)
    }
}

/// Everything needed to reload an assembled dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub extractor: ExtractorKind,
    pub config: PipelineConfig,
    pub axes: Vec<String>,
    pub train: SplitRecord,
    pub test: SplitRecord,
}

pub fn write_dataset_cbor<D: RemoveAxis>(
    path: &Path,
    extractor: ExtractorKind,
    config: &PipelineConfig,
    dataset: &Dataset<D>,
) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let record = DatasetFile {
        extractor,
        config: config.clone(),
        axes: AXIS_NAMES.iter().map(|s| s.to_string()).collect(),
        train: SplitRecord::from_data(&dataset.train),
        test: SplitRecord::from_data(&dataset.test),
    };

    println!("Writing dataset to {}", path.display());
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    ciborium::into_writer(&record, &mut writer)
        .with_context(|| format!("Failed to encode dataset into {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

pub fn read_dataset_cbor(path: &Path) -> Result<DatasetFile> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let record: DatasetFile = ciborium::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to decode dataset from {}", path.display()))?;
    Ok(record)
}

pub fn write_summary_csv(path: &Path, files: &[FileSummary]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    println!("Writing summary to {}", path.display());
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(["file", "windows", "positives", "train", "test"])?;
    for summary in files {
        writer.write_record(&[
            summary.path.display().to_string(),
            summary.examples.to_string(),
            summary.positives.to_string(),
            summary.train.to_string(),
            summary.test.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
