//! Operations behind the `cxr-train` subcommands

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use checkpoint::{CheckpointRecord, CheckpointStore, CheckpointStoreHandle, BEST_CHECKPOINT};
use dataset::{organize_by_label, ImageFolder, LabelTable, OrganizeReport, TB_CLASSES};
use serde::Serialize;
use storage::LocalStorage;
use tracing::{info, instrument, warn};
use train_core::{
    ClassToIdx, DeviceBackend, DeviceKind, Epoch, Error, Result, RuntimeManager, TrainingConfig,
};

use crate::controller::{TrainingLoopController, TrainingSummary};
use crate::epoch_log::CsvEpochLog;
use crate::sink::StoreSink;
use crate::step::{CommandStep, EpochStep};

/// Split manifest written into the save directory
pub const SPLIT_FILE: &str = "split.json";

/// Per-epoch metric log written into the save directory
pub const METRICS_FILE: &str = "metrics.csv";

/// Extra variables handed to the step program
pub const SAVE_DIR_ENV: &str = "TRAINER_SAVE_DIR";
pub const DATA_DIR_ENV: &str = "TRAINER_DATA_DIR";
pub const SPLIT_ENV: &str = "TRAINER_SPLIT";

#[derive(Debug, Clone, Default)]
pub struct TrainOptions {
    /// Continue from the latest epoch checkpoint in the save directory
    pub resume: bool,

    /// Overrides the configured device
    pub device: Option<DeviceKind>,
}

/// Run a full training session with the configured step program
pub fn train(
    config: &TrainingConfig,
    options: &TrainOptions,
    runtime: &RuntimeManager,
) -> Result<TrainingSummary> {
    config.validate()?;
    let step_config = config
        .step
        .clone()
        .ok_or_else(|| Error::invalid_config("a step program is required to train"))?;

    let save_dir = config.save_dir.clone();
    fs::create_dir_all(&save_dir)?;

    let store = open_store(runtime, &save_dir, config.checkpoint.keep_count)?;
    let resume_from = if options.resume {
        let record = runtime.block_on(store.latest())?;
        if record.is_none() {
            warn!(
                dir = %save_dir.display(),
                "No checkpoint to resume from, starting fresh"
            );
        }
        record
    } else {
        if let Some(epoch) = store.latest_epoch() {
            return Err(Error::invalid_config(format!(
                "{} already holds checkpoints up to epoch {}; resume or pick another save_dir",
                save_dir.display(),
                epoch
            )));
        }
        None
    };

    let backend = DeviceBackend::detect(options.device.or(config.device));
    let arch = config.arch.clone().unwrap_or_else(|| config.name.clone());

    let mut step = CommandStep::new(step_config, arch.clone(), &backend)
        .with_env(SAVE_DIR_ENV, save_dir.display().to_string());

    let class_to_idx = match &config.data {
        Some(data) => {
            let folder = ImageFolder::scan(&data.data_dir, &data.extensions)?;
            let manifest = folder.split(data.validation_split, data.seed);
            let split_path = save_dir.join(SPLIT_FILE);
            fs::write(&split_path, serde_json::to_vec_pretty(&manifest)?)?;
            info!(
                path = %split_path.display(),
                train = manifest.train.len(),
                validation = manifest.validation.len(),
                "Wrote dataset split"
            );

            step = step
                .with_env(DATA_DIR_ENV, data.data_dir.display().to_string())
                .with_env(SPLIT_ENV, split_path.display().to_string());
            Some(manifest.class_to_idx)
        }
        None => None,
    };

    let mut controller = TrainingLoopController::new(config)?
        .with_class_to_idx(class_to_idx)
        .with_interrupt(runtime.interrupt_flag());

    if config.checkpoint.metrics_log {
        let path = save_dir.join(METRICS_FILE);
        let last_kept = resume_from.as_ref().map_or(0, |record| record.epoch);
        let removed = CsvEpochLog::truncate_after(&path, last_kept)?;
        if removed > 0 {
            info!(
                rows = removed,
                after = last_kept,
                "Dropped metric rows that will be rerun"
            );
        }
        controller = controller.with_observer(CsvEpochLog::open(path)?);
    }

    if let Some(record) = resume_from {
        if record.arch != arch {
            warn!(
                checkpoint = %record.arch,
                config = %arch,
                "Architecture differs from the checkpoint; loading state anyway"
            );
        }
        step.restore(&record.state())?;
        controller = controller
            .with_best(record.monitor_best)
            .with_start_epoch(record.epoch + 1);
        info!(
            epoch = record.epoch,
            best = record.monitor_best,
            "Checkpoint loaded, resuming"
        );
    }

    let mut sink = StoreSink::new(runtime, store);
    controller.run(&mut step, &mut sink)
}

/// Copy labelled images into one folder per class
pub fn prepare(labels: &Path, source: &Path, out: &Path) -> Result<OrganizeReport> {
    let table = LabelTable::from_csv(labels)?;
    info!(labels = table.len(), "Loaded label table");
    organize_by_label(source, out, &table, &TB_CLASSES)
}

/// Summary of one stored checkpoint
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointInfo {
    pub key: String,
    pub epoch: Epoch,
    pub arch: String,

    /// `None` while the best value is still the initial sentinel
    pub monitor_best: Option<f64>,

    pub model_bytes: usize,
    pub optimizer_bytes: usize,
    pub class_to_idx: Option<ClassToIdx>,
    pub created_at: DateTime<Utc>,
}

impl CheckpointInfo {
    fn new(key: impl Into<String>, record: &CheckpointRecord) -> Self {
        Self {
            key: key.into(),
            epoch: record.epoch,
            arch: record.arch.clone(),
            monitor_best: Some(record.monitor_best).filter(|v| v.is_finite()),
            model_bytes: record.model.len(),
            optimizer_bytes: record.optimizer.len(),
            class_to_idx: record.class_to_idx.clone(),
            created_at: record.created_at,
        }
    }
}

/// Stored checkpoints in epoch order, followed by the best slot if present
#[instrument(skip(runtime))]
pub fn inspect(dir: &Path, runtime: &RuntimeManager) -> Result<Vec<CheckpointInfo>> {
    if !dir.is_dir() {
        return Err(Error::StoragePathNotFound {
            path: dir.display().to_string(),
        });
    }
    let store = open_store(runtime, dir, None)?;

    runtime.block_on(async {
        let mut infos = Vec::new();
        for epoch in store.epochs() {
            let record = store.load_epoch(epoch).await?;
            infos.push(CheckpointInfo::new(checkpoint::epoch_key(epoch), &record));
        }
        if store.has_best().await? {
            let record = store.load_best().await?;
            infos.push(CheckpointInfo::new(BEST_CHECKPOINT, &record));
        }
        Ok::<_, Error>(infos)
    })
}

/// Files produced by [`export`]
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub source: String,
    pub model: PathBuf,
    pub optimizer: Option<PathBuf>,
    pub metadata: PathBuf,
}

#[derive(Serialize)]
struct ExportMetadata<'a> {
    #[serde(flatten)]
    info: CheckpointInfo,
    config: &'a serde_json::Value,
}

/// Extract a checkpoint's state blobs and metadata into `out`
///
/// Exports the best checkpoint unless `epoch` is given.
#[instrument(skip(runtime))]
pub fn export(
    dir: &Path,
    epoch: Option<Epoch>,
    out: &Path,
    runtime: &RuntimeManager,
) -> Result<ExportReport> {
    let store = open_store(runtime, dir, None)?;
    let (source, record) = runtime.block_on(async {
        match epoch {
            Some(epoch) => {
                let record = store.load_epoch(epoch).await?;
                Ok::<_, Error>((checkpoint::epoch_key(epoch), record))
            }
            None => Ok((BEST_CHECKPOINT.to_string(), store.load_best().await?)),
        }
    })?;

    fs::create_dir_all(out)?;

    let model = out.join("model.bin");
    fs::write(&model, &record.model)?;

    let optimizer = if record.optimizer.is_empty() {
        None
    } else {
        let path = out.join("optimizer.bin");
        fs::write(&path, &record.optimizer)?;
        Some(path)
    };

    let metadata = out.join("metadata.json");
    let sidecar = ExportMetadata {
        info: CheckpointInfo::new(source.clone(), &record),
        config: &record.config,
    };
    fs::write(&metadata, serde_json::to_vec_pretty(&sidecar)?)?;

    info!(source = %source, out = %out.display(), "Exported checkpoint");

    Ok(ExportReport {
        source,
        model,
        optimizer,
        metadata,
    })
}

fn open_store(
    runtime: &RuntimeManager,
    dir: &Path,
    keep_count: Option<usize>,
) -> Result<CheckpointStoreHandle> {
    let backend = Arc::new(LocalStorage::new(dir));
    let store = runtime.block_on(CheckpointStore::open(backend, keep_count))?;
    Ok(Arc::new(store))
}
