use crate::config::PipelineConfig;
use crate::data_loading::{load_session, scan_session_files};
use crate::extraction::Extractor;
use crate::{AnnotatedData, PipelineError, Result, Session};
use log::{debug, info};
use ndarray::{IxDyn, RemoveAxis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// How much one session file contributed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub path: PathBuf,
    pub examples: usize,
    pub positives: usize,
    pub train: usize,
    pub test: usize,
}

/// Train and test splits concatenated across all files
#[derive(Debug, Clone)]
pub struct Dataset<D: RemoveAxis> {
    pub train: AnnotatedData<D>,
    pub test: AnnotatedData<D>,
    pub files: Vec<FileSummary>,
}

impl<D: RemoveAxis> Dataset<D> {
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shuffle (optionally) and cut one file's pool at `train_percent`.
///
/// The shuffle RNG is seeded from `seed + file_index`, so a file's split
/// does not depend on which thread processed it.
pub fn split_pool<D: RemoveAxis>(
    data: AnnotatedData<D>,
    config: &PipelineConfig,
    file_index: usize,
) -> (AnnotatedData<D>, AnnotatedData<D>) {
    let data = if config.shuffle {
        let mut indices: Vec<usize> = (0..data.len()).collect();
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(file_index as u64));
        indices.shuffle(&mut rng);
        data.select(&indices)
    } else {
        data
    };

    let train_len = (data.len() as f64 * config.train_percent) as usize;
    data.split_at(train_len)
}

/// Drop majority-label examples until both labels are equally common.
///
/// Every minority example is kept together with the first
/// `minority_count` majority examples; relative order is preserved.
pub fn equalize<D: RemoveAxis>(data: &AnnotatedData<D>) -> AnnotatedData<D> {
    let positives = data.positives();
    let negatives = data.negatives();
    let keep_per_class = positives.min(negatives);

    let (mut kept_pos, mut kept_neg) = (0, 0);
    let indices: Vec<usize> = data
        .labels()
        .column(0)
        .iter()
        .enumerate()
        .filter_map(|(i, &label)| {
            let counter = if label != 0 { &mut kept_pos } else { &mut kept_neg };
            if *counter < keep_per_class {
                *counter += 1;
                Some(i)
            } else {
                None
            }
        })
        .collect();

    debug!(
        "equalized {} positive / {} negative to {} each",
        positives, negatives, keep_per_class
    );
    data.select(&indices)
}

/// Builds one dataset from many session files
pub struct DatasetAssembler {
    config: PipelineConfig,
}

impl DatasetAssembler {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract, split and merge every file in `files`.
    ///
    /// Files are processed in parallel but merged in the order given. Any
    /// file failing to load or extract aborts the whole assembly.
    pub fn assemble<D, F>(&self, files: &[PathBuf], extract: F) -> Result<Dataset<D>>
    where
        D: RemoveAxis,
        F: Fn(&Session) -> Result<AnnotatedData<D>> + Sync,
    {
        let total = files.len();
        let parts: Vec<(FileSummary, AnnotatedData<D>, AnnotatedData<D>)> = files
            .par_iter()
            .enumerate()
            .map(|(i, path)| {
                let session = load_session(path, Some((i + 1, total)))?;
                let data = extract(&session)?;
                let summary_examples = data.len();
                let summary_positives = data.positives();
                let (train, test) = split_pool(data, &self.config, i);

                debug!(
                    "{}: {} examples ({} positive) -> {} train / {} test",
                    path.display(),
                    summary_examples,
                    summary_positives,
                    train.len(),
                    test.len()
                );

                let summary = FileSummary {
                    path: path.clone(),
                    examples: summary_examples,
                    positives: summary_positives,
                    train: train.len(),
                    test: test.len(),
                };
                Ok((summary, train, test))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut files_summary = Vec::with_capacity(parts.len());
        let mut trains = Vec::with_capacity(parts.len());
        let mut tests = Vec::with_capacity(parts.len());
        for (summary, train, test) in parts {
            files_summary.push(summary);
            trains.push(train);
            tests.push(test);
        }

        let mut train = AnnotatedData::concatenate(&trains)?;
        let mut test = AnnotatedData::concatenate(&tests)?;

        if self.config.equalize {
            train = equalize(&train);
            test = equalize(&test);
        }

        info!(
            "Assembled {} files: train {:?} ({} positive), test {:?} ({} positive)",
            files_summary.len(),
            train.examples().shape(),
            train.positives(),
            test.examples().shape(),
            test.positives()
        );

        Ok(Dataset {
            train,
            test,
            files: files_summary,
        })
    }

    /// Scan `root` for session files and assemble them with `extractor`
    pub fn from_directory(&self, root: &Path, extractor: &Extractor) -> Result<Dataset<IxDyn>> {
        let files = scan_session_files(root, &self.config.file_extension)?;
        if files.is_empty() {
            return Err(PipelineError::NoSessions {
                root: root.to_path_buf(),
            });
        }
        info!(
            "Found {} .{} files under {}",
            files.len(),
            self.config.file_extension,
            root.display()
        );
        self.assemble(&files, |session| extractor.extract(session))
    }
}
