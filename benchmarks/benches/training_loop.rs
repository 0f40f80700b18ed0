//! Controller overhead per epoch with an in-memory step and sink

use bytes::Bytes;
use checkpoint::CheckpointRecord;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use train_core::{
    Epoch, EpochResult, ModelState, MonitorMode, MonitorSpec, Result, TrainingConfig,
};
use trainer::{CheckpointSink, EpochStep, TrainingLoopController};

struct NoisyLoss;

impl EpochStep for NoisyLoss {
    fn run_epoch(&mut self, epoch: Epoch) -> Result<EpochResult> {
        let loss = 1.0 / epoch as f64 + ((epoch * 7919) % 13) as f64 * 1e-3;
        Ok(EpochResult::new().with("val_loss", loss).with("accuracy", 1.0 - loss))
    }

    fn snapshot(&self) -> Result<ModelState> {
        Ok(ModelState {
            arch: "ResNet18".to_string(),
            model: Bytes::from_static(&[0u8; 1024]),
            optimizer: Bytes::new(),
        })
    }
}

#[derive(Default)]
struct CountingSink {
    writes: usize,
}

impl CheckpointSink for CountingSink {
    fn write(&mut self, _record: &CheckpointRecord, _is_best: bool) -> Result<()> {
        self.writes += 1;
        Ok(())
    }
}

fn training_loop_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("training_loop");

    for epochs in [100u64, 1_000, 10_000].iter() {
        let config = TrainingConfig::new(
            *epochs,
            10,
            MonitorSpec::new(MonitorMode::Min, "val_loss"),
        );

        group.bench_with_input(BenchmarkId::from_parameter(epochs), &config, |b, config| {
            b.iter(|| {
                let mut controller = TrainingLoopController::new(config).unwrap();
                let mut sink = CountingSink::default();
                controller.run(&mut NoisyLoss, &mut sink).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, training_loop_benchmark);
criterion_main!(benches);
