//! End-to-end training runs against on-disk checkpoint storage

use anyhow::Result;
use bytes::Bytes;
use checkpoint::{CheckpointStore, BEST_CHECKPOINT};
use std::sync::Arc;
use storage::LocalStorage;
use train_core::{
    Epoch, EpochResult, ModelState, MonitorMode, MonitorSpec, RuntimeManager, TerminationReason,
    TrainingConfig,
};
use trainer::{CheckpointSink, EpochStep, StoreSink, TrainingLoopController};

/// Replays a fixed list of validation losses
struct ReplayStep {
    losses: Vec<f64>,
    current: Epoch,
}

impl EpochStep for ReplayStep {
    fn run_epoch(&mut self, epoch: Epoch) -> train_core::Result<EpochResult> {
        self.current = epoch;
        Ok(EpochResult::new()
            .with("val_loss", self.losses[(epoch - 1) as usize])
            .with("accuracy", 0.5))
    }

    fn snapshot(&self) -> train_core::Result<ModelState> {
        Ok(ModelState {
            arch: "ResNet18".to_string(),
            model: Bytes::from(format!("epoch-{}", self.current)),
            optimizer: Bytes::from_static(b"sgd"),
        })
    }
}

fn open_store(runtime: &RuntimeManager, dir: &std::path::Path) -> Result<Arc<CheckpointStore>> {
    let backend = Arc::new(LocalStorage::new(dir));
    Ok(Arc::new(runtime.block_on(CheckpointStore::open(backend, None))?))
}

#[test]
fn test_early_stop_writes_period_checkpoints() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let runtime = RuntimeManager::new(1)?;
    let store = open_store(&runtime, dir.path())?;

    let mut config = TrainingConfig::new(10, 2, MonitorSpec::new(MonitorMode::Min, "val_loss"));
    config.early_stop = Some(2);

    let mut step = ReplayStep {
        losses: vec![5.0, 4.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0],
        current: 0,
    };
    let mut sink = StoreSink::new(&runtime, store.clone());
    let summary = TrainingLoopController::new(&config)?.run(&mut step, &mut sink)?;

    // Counter reads 1, 2, 3 at epochs 4, 5, 6
    assert_eq!(summary.reason, TerminationReason::EarlyStopped);
    assert_eq!(summary.last_epoch, Some(6));
    assert_eq!(summary.best_epoch, Some(3));
    assert_eq!(store.epochs(), vec![2, 4]);

    // Epoch 3 was the best but not a save epoch, so the best slot holds epoch 2
    let best = runtime.block_on(store.load_best())?;
    assert_eq!(best.epoch, 2);
    assert_eq!(best.monitor_best, 4.0);
    assert_eq!(&best.model[..], b"epoch-2");

    let latest = runtime.block_on(store.latest())?.expect("latest checkpoint");
    assert_eq!(latest.epoch, 4);
    assert_eq!(latest.monitor_best, 3.0);
    assert_eq!(latest.config["save_period"], 2);

    Ok(())
}

#[test]
fn test_repeated_epoch_write_overwrites() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let runtime = RuntimeManager::new(1)?;
    let store = open_store(&runtime, dir.path())?;
    let mut sink = StoreSink::new(&runtime, store.clone());

    let config = serde_json::json!({});
    let first = checkpoint::CheckpointRecord::new(2, ModelState::default(), 1.0, config.clone());
    let second = checkpoint::CheckpointRecord::new(
        2,
        ModelState {
            arch: "ResNet18".to_string(),
            model: Bytes::from_static(b"second"),
            optimizer: Bytes::new(),
        },
        0.5,
        config,
    );
    sink.write(&first, true)?;
    sink.write(&second, true)?;

    assert_eq!(store.epochs(), vec![2]);
    assert_eq!(&runtime.block_on(store.load_best())?.model[..], b"second");
    assert!(dir.path().join(BEST_CHECKPOINT).exists());
    Ok(())
}

#[cfg(unix)]
mod cli {
    use super::*;
    use std::fs;
    use std::path::Path;
    use trainer::commands::{self, TrainOptions, METRICS_FILE, SPLIT_FILE};

    /// Writes the epoch into the model file, logs the call and prints a loss of 100 / epoch
    const STEP_SCRIPT: &str = r#"mkdir -p state
echo "$TRAINER_EPOCH" >> calls.log
printf 'epoch-%s' "$TRAINER_EPOCH" > state/model.bin
test -f "$TRAINER_SPLIT" || exit 9
echo "epoch $TRAINER_EPOCH on $TRAINER_DEVICE"
echo "{\"val_loss\": $((100 / TRAINER_EPOCH)), \"accuracy\": 0.$TRAINER_EPOCH}"
"#;

    fn write_dataset(root: &Path) -> Result<()> {
        for (class, count) in [("negative", 3), ("positive", 2)] {
            let class_dir = root.join(class);
            fs::create_dir_all(&class_dir)?;
            for i in 0..count {
                fs::write(class_dir.join(format!("{}_{}.png", class, i)), b"png")?;
            }
        }
        Ok(())
    }

    fn write_config(dir: &Path, epochs: Epoch) -> Result<std::path::PathBuf> {
        let yaml = format!(
            r#"name: tb-classifier
arch: ResNet18
epochs: {epochs}
save_period: 2
monitor: [min, val_loss]
early_stop: 5
verbosity: 1
save_dir: {save_dir}
device: cpu
data:
  data_dir: {data_dir}
  validation_split: 0.4
  seed: 7
step:
  program: sh
  args: [step.sh]
  model_state: {state}
  working_dir: {work}
"#,
            epochs = epochs,
            save_dir = dir.join("saved").display(),
            data_dir = dir.join("data").display(),
            state = dir.join("state/model.bin").display(),
            work = dir.display(),
        );
        let path = dir.join("config.yaml");
        fs::write(&path, yaml)?;
        fs::write(dir.join("step.sh"), STEP_SCRIPT)?;
        Ok(path)
    }

    #[test]
    fn test_train_command_end_to_end() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_dataset(&dir.path().join("data"))?;
        let config = TrainingConfig::from_file(write_config(dir.path(), 4)?)?;
        let runtime = RuntimeManager::new(1)?;

        let summary = commands::train(&config, &TrainOptions::default(), &runtime)?;
        assert_eq!(summary.reason, TerminationReason::Completed);
        assert_eq!(summary.monitor.best_value, 25.0);

        let saved = dir.path().join("saved");
        let split: serde_json::Value = serde_json::from_slice(&fs::read(saved.join(SPLIT_FILE))?)?;
        assert_eq!(split["train"].as_array().map(Vec::len), Some(3));
        assert_eq!(split["validation"].as_array().map(Vec::len), Some(2));

        let metrics = fs::read_to_string(saved.join(METRICS_FILE))?;
        assert_eq!(metrics.lines().count(), 1 + 4 * 2);
        assert!(metrics.contains("3,val_loss,33"));

        let store = open_store(&runtime, &saved)?;
        assert_eq!(store.epochs(), vec![2, 4]);
        let best = runtime.block_on(store.load_best())?;
        assert_eq!(best.epoch, 4);
        assert_eq!(&best.model[..], b"epoch-4");
        assert_eq!(best.arch, "ResNet18");
        let class_to_idx = best.class_to_idx.expect("class mapping");
        assert_eq!(class_to_idx["negative"], 0);
        assert_eq!(class_to_idx["positive"], 1);

        let infos = commands::inspect(&saved, &runtime)?;
        assert_eq!(infos.len(), 3);

        let out = dir.path().join("export");
        let report = commands::export(&saved, None, &out, &runtime)?;
        assert_eq!(fs::read(report.model)?, b"epoch-4");
        assert!(report.optimizer.is_none());
        Ok(())
    }

    #[test]
    fn test_resume_continues_after_latest_checkpoint() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_dataset(&dir.path().join("data"))?;
        let runtime = RuntimeManager::new(1)?;

        let config = TrainingConfig::from_file(write_config(dir.path(), 3)?)?;
        commands::train(&config, &TrainOptions::default(), &runtime)?;

        // The step left epoch 3 weights behind; resuming restores epoch 2
        let config = TrainingConfig::from_file(write_config(dir.path(), 6)?)?;
        let options = TrainOptions {
            resume: true,
            device: None,
        };
        let summary = commands::train(&config, &options, &runtime)?;

        assert_eq!(summary.reason, TerminationReason::Completed);
        assert_eq!(summary.epochs_run, 4);
        assert_eq!(summary.best_epoch, Some(6));
        let calls = fs::read_to_string(dir.path().join("calls.log"))?;
        assert_eq!(calls, "1\n2\n3\n3\n4\n5\n6\n");

        // Epoch 3 ran twice but is logged once
        let metrics = fs::read_to_string(dir.path().join("saved").join(METRICS_FILE))?;
        assert_eq!(metrics.lines().count(), 1 + 6 * 2);
        assert_eq!(metrics.matches("3,val_loss,33").count(), 1);

        let store = open_store(&runtime, &dir.path().join("saved"))?;
        assert_eq!(store.epochs(), vec![2, 4, 6]);
        let best = runtime.block_on(store.load_best())?;
        assert_eq!(best.epoch, 6);
        assert_eq!(best.monitor_best, 16.0);
        Ok(())
    }

    #[test]
    fn test_fresh_run_refuses_used_save_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_dataset(&dir.path().join("data"))?;
        let runtime = RuntimeManager::new(1)?;

        let config = TrainingConfig::from_file(write_config(dir.path(), 2)?)?;
        commands::train(&config, &TrainOptions::default(), &runtime)?;

        let err = commands::train(&config, &TrainOptions::default(), &runtime).unwrap_err();
        assert!(matches!(err, train_core::Error::InvalidConfig { .. }));

        // The earlier run is untouched and the step never ran again
        let calls = fs::read_to_string(dir.path().join("calls.log"))?;
        assert_eq!(calls, "1\n2\n");
        let store = open_store(&runtime, &dir.path().join("saved"))?;
        assert_eq!(store.epochs(), vec![2]);
        Ok(())
    }
}
