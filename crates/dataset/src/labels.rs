//! CSV label table and class-folder organizer
//!
//! The label file has an `ID` column (image file stem) and a `LABEL` column
//! (class index). Organizing copies each image into `<dest>/<class name>/`.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use train_core::{Error, Result};
use walkdir::WalkDir;

/// Class names of the tuberculosis screening dataset, by label index
pub const TB_CLASSES: [&str; 2] = ["negative", "positive"];

#[derive(Debug, Deserialize)]
struct LabelRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "LABEL")]
    label: usize,
}

/// Image id to label index
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    labels: HashMap<String, usize>,
}

impl LabelTable {
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|_| Error::DatasetNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::Reader::from_reader(reader);
        let mut labels = HashMap::new();
        for row in csv.deserialize::<LabelRow>() {
            let row = row?;
            labels.insert(row.id, row.label);
        }
        Ok(Self { labels })
    }

    pub fn get(&self, id: &str) -> Option<usize> {
        self.labels.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Outcome of [`organize_by_label`]
#[derive(Debug, Clone, Default)]
pub struct OrganizeReport {
    /// Images copied per class name
    pub copied: BTreeMap<String, usize>,

    /// Images with no row in the label table
    pub unlabeled: Vec<PathBuf>,
}

impl OrganizeReport {
    pub fn total_copied(&self) -> usize {
        self.copied.values().sum()
    }
}

/// Copy every `*.png` below `source` into `dest/<class>/` according to `table`
///
/// The image id is the file name up to its first dot.
pub fn organize_by_label(
    source: &Path,
    dest: &Path,
    table: &LabelTable,
    classes: &[&str],
) -> Result<OrganizeReport> {
    if !source.is_dir() {
        return Err(Error::DatasetNotFound {
            path: source.display().to_string(),
        });
    }

    // Never walk into the output tree; copying a file onto itself truncates it
    std::fs::create_dir_all(dest)?;
    let dest_root = dest.canonicalize()?;

    let mut report = OrganizeReport::default();

    for entry in WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.path().canonicalize().is_ok_and(|p| p == dest_root))
        })
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if !entry.file_type().is_file() || !is_png {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        let id = file_name.split('.').next().unwrap_or_default();

        let Some(label) = table.get(id) else {
            warn!(image = %path.display(), "No label for image, skipping");
            report.unlabeled.push(path.to_path_buf());
            continue;
        };

        let class = classes.get(label).ok_or_else(|| Error::InvalidDataset {
            message: format!("label {} for {} has no class name", label, id),
        })?;

        let class_dir = dest.join(class);
        std::fs::create_dir_all(&class_dir)?;
        std::fs::copy(path, class_dir.join(&file_name))?;
        debug!(image = %path.display(), class = %class, "Copied image");

        *report.copied.entry(class.to_string()).or_default() += 1;
    }

    info!(
        copied = report.total_copied(),
        unlabeled = report.unlabeled.len(),
        dest = %dest.display(),
        "Organized images by label"
    );

    Ok(report)
}
