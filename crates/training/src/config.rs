//! Command-line arguments and the optional TOML settings file.

use anyhow::Context;
use clap::Parser;
use models::{Backbone, HeadActivation, ResNetDepth, ResNetEncoderConfig, RgbdNetConfig};
use rgbd_dataset::{DEFAULT_CLASSES, DEFAULT_MANIFEST};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone)]
#[command(name = "train", about = "Train the RGB-D multi-task network")]
pub struct TrainArgs {
    /// Dataset root containing the manifest, class list and images.
    #[arg(long = "dataset_path")]
    pub dataset_path: PathBuf,
    /// Number of epochs.
    #[arg(long, default_value_t = 5)]
    pub epochs: usize,
    /// Batch size.
    #[arg(long = "batch_size", default_value_t = 4)]
    pub batch_size: usize,
    /// SGD learning rate.
    #[arg(long = "learning_rate", default_value_t = 1e-3)]
    pub learning_rate: f64,
    /// SGD momentum (0 disables it).
    #[arg(long, default_value_t = 0.0)]
    pub momentum: f64,
    /// L2 weight decay (0 disables it).
    #[arg(long = "weight_decay", default_value_t = 0.0)]
    pub weight_decay: f64,
    /// Train on the GPU (requires the `backend-wgpu` feature).
    #[arg(long = "use_gpu")]
    pub use_gpu: bool,
    /// Checkpoint written at the end of every epoch.
    #[arg(long = "output_path", default_value = "./checkpoint.pth")]
    pub output_path: PathBuf,
    /// Checkpoint to resume from.
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
    /// Image-only backbone instead of RGB-D fusion.
    #[arg(long)]
    pub resnet: bool,
    /// Initialize the image encoder from `--pretrained_path`.
    #[arg(long)]
    pub pretrained: bool,
    /// Image-encoder weights used with `--pretrained`
    /// [default: ./pretrained/resnet<depth>.bin].
    #[arg(long = "pretrained_path")]
    pub pretrained_path: Option<PathBuf>,
    /// Optional TOML file with model and loader settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Log the running loss every N steps.
    #[arg(long = "log_every", default_value_t = 1000)]
    pub log_every: usize,
    /// Seed for shuffling.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Manifest file name under the dataset root.
    #[arg(long, default_value = DEFAULT_MANIFEST)]
    pub manifest: String,
    /// Class list file name under the dataset root.
    #[arg(long, default_value = DEFAULT_CLASSES)]
    pub classes: String,
}

/// Settings that rarely change between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSettings {
    /// Image encoder depth: 18, 34, 50, 101 or 152.
    pub depth: ResNetDepth,
    /// Embedding width of each encoder.
    pub out_size: usize,
    /// Side of the square inputs and masks after resizing.
    pub image_size: usize,
    pub mask_grid: usize,
    pub head_activation: HeadActivation,
    pub zero_init_residual: bool,
    pub shuffle: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            depth: ResNetDepth::R18,
            out_size: 512,
            image_size: 256,
            mask_grid: 8,
            head_activation: HeadActivation::Identity,
            zero_init_residual: true,
            shuffle: true,
        }
    }
}

impl ModelSettings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Where `--pretrained` looks when no path is given.
    pub fn default_pretrained_path(&self) -> PathBuf {
        PathBuf::from(format!("./pretrained/resnet{}.bin", u32::from(self.depth)))
    }

    pub fn net_config(&self, backbone: Backbone, num_classes: usize) -> RgbdNetConfig {
        let mut config = RgbdNetConfig::new(num_classes, [self.image_size, self.image_size])
            .with_backbone(backbone);
        config.image = ResNetEncoderConfig::from_depth(self.depth)
            .with_zero_init_residual(self.zero_init_residual);
        config.mask_grid = self.mask_grid;
        config.head_activation = self.head_activation;
        config.with_out_size(self.out_size)
    }
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub dataset_path: PathBuf,
    pub manifest: String,
    pub classes: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub use_gpu: bool,
    pub output_path: PathBuf,
    pub checkpoint: Option<PathBuf>,
    pub backbone: Backbone,
    /// Image-encoder weights to start from.
    pub pretrained: Option<PathBuf>,
    pub log_every: usize,
    pub seed: Option<u64>,
    pub model: ModelSettings,
}

impl TrainConfig {
    pub fn from_args(args: TrainArgs) -> anyhow::Result<Self> {
        let model = match &args.config {
            Some(path) => ModelSettings::from_file(path)?,
            None => ModelSettings::default(),
        };
        if args.batch_size == 0 {
            anyhow::bail!("--batch_size must be at least 1");
        }
        Ok(Self {
            dataset_path: args.dataset_path,
            manifest: args.manifest,
            classes: args.classes,
            epochs: args.epochs,
            batch_size: args.batch_size,
            learning_rate: args.learning_rate,
            momentum: args.momentum,
            weight_decay: args.weight_decay,
            use_gpu: args.use_gpu,
            output_path: args.output_path,
            checkpoint: args.checkpoint,
            backbone: if args.resnet {
                Backbone::ImageOnly
            } else {
                Backbone::DepthFusion
            },
            pretrained: args.pretrained.then(|| {
                args.pretrained_path
                    .unwrap_or_else(|| model.default_pretrained_path())
            }),
            log_every: args.log_every.max(1),
            seed: args.seed,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_when_keys_missing() {
        let settings = ModelSettings::from_toml("out_size = 128\n").unwrap();
        assert_eq!(settings.out_size, 128);
        assert_eq!(settings.image_size, 256);
        assert!(settings.zero_init_residual);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ModelSettings::from_toml("learning_rate = 0.1\n").is_err());
    }
}
