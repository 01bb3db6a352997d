//! Epoch/batch training loop with per-epoch checkpointing.

use burn::module::{AutodiffModule, Module};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use models::RgbdNet;
use rgbd_dataset::{RgbdBatch, RgbdDataset, RgbdLoader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::checkpoint::{load_checkpoint, save_checkpoint, CheckpointRecord, SgdOptimizer};
use crate::loss::{loss_function, Target};

#[derive(Debug, Clone)]
pub struct TrainerOptions {
    pub epochs: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    /// Emit a step line every `log_every` batches.
    pub log_every: usize,
    /// Checkpoint overwritten at the end of every epoch.
    pub output_path: PathBuf,
}

impl TrainerOptions {
    pub fn new(epochs: usize, learning_rate: f64, output_path: impl Into<PathBuf>) -> Self {
        Self {
            epochs,
            learning_rate,
            momentum: 0.0,
            weight_decay: 0.0,
            log_every: 1000,
            output_path: output_path.into(),
        }
    }

    fn sgd(&self) -> SgdConfig {
        let momentum = (self.momentum > 0.0).then(|| {
            MomentumConfig::new()
                .with_momentum(self.momentum)
                .with_dampening(0.0)
        });
        let weight_decay =
            (self.weight_decay > 0.0).then(|| WeightDecayConfig::new(self.weight_decay as f32));
        SgdConfig::new()
            .with_momentum(momentum)
            .with_weight_decay(weight_decay)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EpochSummary {
    /// Zero-based epoch index.
    pub epoch: usize,
    pub steps: usize,
    pub last_loss: f32,
    pub mean_loss: f32,
    pub elapsed: Duration,
}

pub struct Trainer<B: AutodiffBackend> {
    model: RgbdNet<B>,
    optim: SgdOptimizer<B>,
    options: TrainerOptions,
    num_classes: usize,
    epoch: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(
        model: RgbdNet<B>,
        options: TrainerOptions,
        num_classes: usize,
        device: B::Device,
    ) -> Self {
        let optim = options.sgd().init();
        Self {
            model,
            optim,
            options: TrainerOptions {
                log_every: options.log_every.max(1),
                ..options
            },
            num_classes,
            epoch: 0,
            device,
        }
    }

    /// Restores parameters, optimizer state and the epoch counter.
    pub fn resume_from(mut self, path: &Path) -> anyhow::Result<Self> {
        let record: CheckpointRecord<B> = load_checkpoint(path, &self.device)?;
        self.model = self.model.load_record(record.model_state);
        self.optim = self.optim.load_record(record.optimizer_state);
        self.epoch = record.epoch;
        tracing::info!(path = %path.display(), epoch = self.epoch, "resumed from checkpoint");
        Ok(self)
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn model(&self) -> &RgbdNet<B> {
        &self.model
    }

    pub fn into_model(self) -> RgbdNet<B> {
        self.model
    }

    /// Inference copy of the current parameters.
    pub fn valid_model(&self) -> RgbdNet<B::InnerBackend> {
        self.model.valid()
    }

    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }

    /// Forward, loss, backward and one SGD update; returns the batch loss.
    pub fn train_step(&mut self, batch: RgbdBatch<B>) -> f32 {
        let (rgb, depth, target) = Target::from_batch(batch);
        let prediction = self.model.forward(rgb, depth);
        let loss = loss_function(&prediction, &target, self.num_classes);
        let value: f32 = loss.clone().into_scalar().elem();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optim
            .step(self.options.learning_rate, self.model.clone(), grads);
        value
    }

    /// One pass over the dataset. Does not advance the epoch counter.
    pub fn run_epoch(
        &mut self,
        dataset: &RgbdDataset,
        loader: &mut RgbdLoader,
    ) -> anyhow::Result<EpochSummary> {
        let started = Instant::now();
        let mut batches = loader.epoch(dataset);
        let total = batches.num_batches();
        let mut steps = 0;
        let mut last_loss = f32::NAN;
        let mut sum = 0.0f64;

        while let Some(batch) = batches.next_batch::<B>(&self.device)? {
            last_loss = self.train_step(batch);
            sum += last_loss as f64;
            steps += 1;
            if steps % self.options.log_every == 0 {
                tracing::info!(
                    "Epoch [{}/{}], Step [{}/{}], Loss: {:.4}",
                    self.epoch + 1,
                    self.options.epochs,
                    steps,
                    total,
                    last_loss
                );
            }
        }

        Ok(EpochSummary {
            epoch: self.epoch,
            steps,
            last_loss,
            mean_loss: if steps > 0 {
                (sum / steps as f64) as f32
            } else {
                f32::NAN
            },
            elapsed: started.elapsed(),
        })
    }

    /// Writes `{epoch, model_state, optimizer_state}` to the output path.
    pub fn save_checkpoint(&self) -> anyhow::Result<()> {
        let record = CheckpointRecord::<B> {
            epoch: self.epoch,
            model_state: self.model.clone().into_record(),
            optimizer_state: self.optim.to_record(),
        };
        save_checkpoint(&self.options.output_path, record)
    }

    /// Trains from the current epoch up to `options.epochs`, checkpointing
    /// after every epoch.
    pub fn fit(
        &mut self,
        dataset: &RgbdDataset,
        loader: &mut RgbdLoader,
    ) -> anyhow::Result<Vec<EpochSummary>> {
        let mut summaries = Vec::new();
        while self.epoch < self.options.epochs {
            let summary = self.run_epoch(dataset, loader)?;
            self.epoch += 1;
            self.save_checkpoint()?;
            tracing::info!(
                "Epoch [{}/{}], Step [{}/{}], Loss: {:.4}, Time: {:.4}s",
                self.epoch,
                self.options.epochs,
                summary.steps,
                summary.steps,
                summary.last_loss,
                summary.elapsed.as_secs_f64()
            );
            tracing::debug!(
                mean_loss = summary.mean_loss,
                checkpoint = %self.options.output_path.display(),
                "saved checkpoint"
            );
            summaries.push(summary);
        }
        tracing::info!("Finished Training");
        Ok(summaries)
    }
}
