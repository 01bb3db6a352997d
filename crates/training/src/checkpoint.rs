//! Single-file training checkpoints: epoch, model and optimizer state.

use anyhow::Context;
use burn::module::Module;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Optimizer, Sgd};
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Record, Recorder};
use burn::tensor::backend::AutodiffBackend;
use models::RgbdNet;
use std::fs;
use std::path::Path;

/// SGD over every parameter of the network.
pub type SgdOptimizer<B> =
    OptimizerAdaptor<Sgd<<B as AutodiffBackend>::InnerBackend>, RgbdNet<B>, B>;

pub type ModelRecord<B> = <RgbdNet<B> as Module<B>>::Record;
pub type OptimizerRecord<B> = <SgdOptimizer<B> as Optimizer<RgbdNet<B>, B>>::Record;

#[derive(Record)]
pub struct CheckpointRecord<B>
where
    B: AutodiffBackend,
{
    /// Next epoch to run.
    pub epoch: usize,
    pub model_state: ModelRecord<B>,
    pub optimizer_state: OptimizerRecord<B>,
}

type CheckpointRecorder = BinBytesRecorder<FullPrecisionSettings>;

/// Overwrites `path` with the checkpoint; the path is used as given.
pub fn save_checkpoint<B: AutodiffBackend>(
    path: &Path,
    record: CheckpointRecord<B>,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let recorder = CheckpointRecorder::default();
    let bytes = Recorder::<B>::record(&recorder, record, ())
        .with_context(|| format!("failed to serialize checkpoint for {}", path.display()))?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_checkpoint<B: AutodiffBackend>(
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<CheckpointRecord<B>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let recorder = CheckpointRecorder::default();
    Recorder::<B>::load(&recorder, bytes, device)
        .with_context(|| format!("checkpoint {} does not match the model", path.display()))
}
