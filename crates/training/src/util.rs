use anyhow::Context;
use burn::backend::Autodiff;
use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use models::{ResNetEncoder, RgbdNet};
use rgbd_dataset::{DatasetTransforms, LoaderConfig, RgbdDataset, RgbdLoader};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use crate::config::TrainConfig;
use crate::trainer::{Trainer, TrainerOptions};

/// Backend alias for training (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

pub type ADBackend = Autodiff<TrainBackend>;

pub type TrainDevice = <TrainBackend as Backend>::Device;

/// Picks the compute device once at startup.
#[cfg(feature = "backend-wgpu")]
pub fn resolve_device(use_gpu: bool) -> TrainDevice {
    if use_gpu {
        burn_wgpu::WgpuDevice::DefaultDevice
    } else {
        burn_wgpu::WgpuDevice::Cpu
    }
}

#[cfg(not(feature = "backend-wgpu"))]
pub fn resolve_device(use_gpu: bool) -> TrainDevice {
    if use_gpu {
        tracing::warn!("--use_gpu requested but built without `backend-wgpu`; using CPU");
    }
    burn_ndarray::NdArrayDevice::Cpu
}

/// Installs a `RUST_LOG`-driven fmt subscriber; defaults to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

type WeightsRecorder = BinBytesRecorder<FullPrecisionSettings>;
type EncoderRecord<B> = <ResNetEncoder<B> as Module<B>>::Record;

/// Writes image-encoder weights to exactly `path`.
pub fn save_image_encoder<B: Backend>(
    encoder: &ResNetEncoder<B>,
    path: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let record = encoder.clone().into_record();
    let bytes = Recorder::<B>::record(&WeightsRecorder::default(), record, ())
        .with_context(|| format!("failed to serialize weights for {}", path.display()))?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Replaces the image encoder's parameters with weights stored at `path`.
/// The path is read as given, whatever its extension.
pub fn load_pretrained_image_encoder<B: Backend>(
    mut model: RgbdNet<B>,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<RgbdNet<B>> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read pretrained weights {}", path.display()))?;
    let record: EncoderRecord<B> = Recorder::<B>::load(&WeightsRecorder::default(), bytes, device)
        .with_context(|| {
            format!("pretrained weights {} do not match the encoder", path.display())
        })?;
    model.image_encoder = model.image_encoder.load_record(record);
    tracing::info!(path = %path.display(), "loaded pretrained image encoder");
    Ok(model)
}

pub fn run_train(config: TrainConfig) -> anyhow::Result<()> {
    let device = resolve_device(config.use_gpu);
    let settings = &config.model;

    let dataset = RgbdDataset::open(
        &config.dataset_path,
        &config.manifest,
        &config.classes,
        DatasetTransforms::for_size(settings.image_size),
    )
    .with_context(|| format!("failed to open dataset {}", config.dataset_path.display()))?;
    let num_classes = dataset.num_classes();
    if num_classes == 0 {
        anyhow::bail!("class list under {} is empty", config.dataset_path.display());
    }

    let net_config = settings.net_config(config.backbone, num_classes);
    net_config.validate().context("invalid model settings")?;
    if net_config.head_activation == models::HeadActivation::Relu {
        tracing::warn!("head_activation = relu clamps logits and boxes to be non-negative");
    }
    let mut model = RgbdNet::<ADBackend>::new(net_config, &device);
    if let Some(path) = &config.pretrained {
        model = load_pretrained_image_encoder(model, path, &device)?;
    }

    let mut options = TrainerOptions::new(
        config.epochs,
        config.learning_rate,
        config.output_path.clone(),
    );
    options.momentum = config.momentum;
    options.weight_decay = config.weight_decay;
    options.log_every = config.log_every;

    let mut trainer = Trainer::new(model, options, num_classes, device);
    if let Some(path) = &config.checkpoint {
        trainer = trainer.resume_from(path)?;
    }

    let mut loader = RgbdLoader::new(LoaderConfig {
        batch_size: config.batch_size,
        shuffle: settings.shuffle,
        seed: config.seed,
        drop_last: false,
    });

    tracing::info!(
        samples = dataset.len(),
        classes = num_classes,
        backbone = ?config.backbone,
        start_epoch = trainer.epoch(),
        epochs = config.epochs,
        batches = loader.num_batches(dataset.len()),
        "starting training"
    );
    trainer.fit(&dataset, &mut loader)?;
    Ok(())
}
