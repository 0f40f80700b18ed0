//! Dataset preparation for chest X-ray training
//!
//! This crate provides:
//! - **Label organization**: copy images into class folders from a CSV label table
//! - **Class-folder indexing** with a stable class-to-index mapping
//! - **Seeded splits** into training and validation samples
//!
//! # Example
//!
//! ```no_run
//! use dataset::{ImageFolder, LabelTable, organize_by_label, TB_CLASSES};
//! use std::path::Path;
//!
//! # fn example() -> train_core::Result<()> {
//! let labels = LabelTable::from_csv("data/train.csv")?;
//! organize_by_label(Path::new("data/tb_data/train"), Path::new("data/proc_tb"), &labels, &TB_CLASSES)?;
//!
//! let folder = ImageFolder::scan("data/proc_tb", &["png".to_string()])?;
//! let manifest = folder.split(0.2, 42);
//! # Ok(())
//! # }
//! ```

mod folder;
mod labels;
mod split;

pub use folder::{ImageFolder, Sample, SplitManifest};
pub use labels::{organize_by_label, LabelTable, OrganizeReport, TB_CLASSES};
pub use split::{split_indices, Split};

pub use train_core::ClassToIdx;
