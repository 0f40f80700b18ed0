//! Class-folder image dataset index
//!
//! Every immediate sub-directory of the root is a class; class indices follow
//! the sorted directory names.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use train_core::{ClassToIdx, Error, Result};
use walkdir::WalkDir;

use crate::split::{split_indices, Split};

/// One labelled image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    pub label: usize,
}

/// Index over a directory of class sub-directories
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<Sample>,
}

impl ImageFolder {
    /// Scan `root` for images whose extension is one of `extensions`
    pub fn scan(root: impl AsRef<Path>, extensions: &[String]) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::DatasetNotFound {
                path: root.display().to_string(),
            });
        }

        let mut classes: Vec<String> = std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.'))
            .collect();
        classes.sort();

        if classes.is_empty() {
            return Err(Error::InvalidDataset {
                message: format!("no class directories under {}", root.display()),
            });
        }

        let mut samples = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let mut paths: Vec<PathBuf> = WalkDir::new(root.join(class))
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && has_extension(e.path(), extensions))
                .map(|e| e.into_path())
                .collect();
            paths.sort();

            debug!(class = %class, label, count = paths.len(), "Indexed class");
            samples.extend(paths.into_iter().map(|path| Sample { path, label }));
        }

        info!(
            root = %root.display(),
            classes = classes.len(),
            samples = samples.len(),
            "Indexed image folder"
        );

        Ok(Self {
            root: root.to_path_buf(),
            classes,
            samples,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn class_to_idx(&self) -> ClassToIdx {
        self.classes
            .iter()
            .enumerate()
            .map(|(idx, class)| (class.clone(), idx))
            .collect()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples per class, in class-index order
    pub fn class_counts(&self) -> Vec<(String, usize)> {
        let mut counts = vec![0usize; self.classes.len()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        self.classes.iter().cloned().zip(counts).collect()
    }

    /// Seeded train/validation partition of the samples
    pub fn split(&self, validation_fraction: f64, seed: u64) -> SplitManifest {
        let Split { train, validation } = split_indices(self.len(), validation_fraction, seed);
        let pick = |indices: Vec<usize>| -> Vec<Sample> {
            indices.into_iter().map(|i| self.samples[i].clone()).collect()
        };

        SplitManifest {
            root: self.root.clone(),
            class_to_idx: self.class_to_idx(),
            seed,
            validation_split: validation_fraction,
            train: pick(train),
            validation: pick(validation),
        }
    }
}

/// Train/validation file lists handed to the training step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitManifest {
    pub root: PathBuf,
    pub class_to_idx: ClassToIdx,
    pub seed: u64,
    pub validation_split: f64,
    pub train: Vec<Sample>,
    pub validation: Vec<Sample>,
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
