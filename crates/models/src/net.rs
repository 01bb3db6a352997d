//! Dual-branch RGB-D network: encoders + multi-task head.

use burn::module::Module;
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::depth::{DepthEncoder, DepthEncoderConfig};
use crate::error::{non_zero, ConfigError};
use crate::head::{HeadActivation, MultiTaskHead, MultiTaskHeadConfig, Prediction};
use crate::resnet::{ResNetEncoder, ResNetEncoderConfig};

/// Which encoders feed the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backbone {
    /// RGB encoder only; depth input is ignored.
    ImageOnly,
    /// RGB and depth embeddings concatenated.
    #[default]
    DepthFusion,
}

#[derive(Debug, Clone)]
pub struct RgbdNetConfig {
    pub backbone: Backbone,
    pub num_classes: usize,
    /// Segmentation output size as (height, width).
    pub mask_size: [usize; 2],
    pub image: ResNetEncoderConfig,
    pub depth: DepthEncoderConfig,
    pub mask_grid: usize,
    pub head_activation: HeadActivation,
}

impl RgbdNetConfig {
    pub fn new(num_classes: usize, mask_size: [usize; 2]) -> Self {
        Self {
            backbone: Backbone::default(),
            num_classes,
            mask_size,
            image: ResNetEncoderConfig::resnet18().with_zero_init_residual(true),
            depth: DepthEncoderConfig::default(),
            mask_grid: 8,
            head_activation: HeadActivation::default(),
        }
    }

    pub fn with_backbone(mut self, backbone: Backbone) -> Self {
        self.backbone = backbone;
        self
    }

    /// Sets the embedding width of both encoders.
    pub fn with_out_size(mut self, out_size: usize) -> Self {
        self.image.out_size = out_size;
        self.depth.out_size = out_size;
        self
    }

    /// Checks every encoder and head setting before any weights are built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.image.validate()?;
        if self.backbone == Backbone::DepthFusion {
            self.depth.validate()?;
        }
        non_zero(self.num_classes, "num_classes")?;
        non_zero(self.mask_size[0], "mask height")?;
        non_zero(self.mask_size[1], "mask width")?;
        non_zero(self.mask_grid, "mask grid")
    }

    pub fn embed_dim(&self) -> usize {
        match self.backbone {
            Backbone::ImageOnly => self.image.out_size,
            Backbone::DepthFusion => self.image.out_size + self.depth.out_size,
        }
    }
}

#[derive(Module, Debug)]
pub struct RgbdNet<B: Backend> {
    pub image_encoder: ResNetEncoder<B>,
    pub depth_encoder: Option<DepthEncoder<B>>,
    pub head: MultiTaskHead<B>,
}

impl<B: Backend> RgbdNet<B> {
    /// # Panics
    ///
    /// If [`RgbdNetConfig::validate`] rejects the config.
    pub fn new(config: RgbdNetConfig, device: &B::Device) -> Self {
        if let Err(err) = config.validate() {
            panic!("invalid network config: {err}");
        }
        let embed_dim = config.embed_dim();
        let image_encoder = ResNetEncoder::new(config.image.clone(), device);
        let depth_encoder = match config.backbone {
            Backbone::ImageOnly => None,
            Backbone::DepthFusion => Some(DepthEncoder::new(config.depth.clone(), device)),
        };
        let head = MultiTaskHead::new(
            MultiTaskHeadConfig {
                embed_dim,
                num_classes: config.num_classes,
                mask_size: config.mask_size,
                grid: config.mask_grid,
                activation: config.head_activation,
            },
            device,
        );
        Self {
            image_encoder,
            depth_encoder,
            head,
        }
    }

    pub fn backbone(&self) -> Backbone {
        if self.depth_encoder.is_some() {
            Backbone::DepthFusion
        } else {
            Backbone::ImageOnly
        }
    }

    /// Fused embedding `[B, embed_dim]`.
    pub fn embed(&self, rgb: Tensor<B, 4>, depth: Tensor<B, 4>) -> Tensor<B, 2> {
        let image = self.image_encoder.forward(rgb);
        match &self.depth_encoder {
            Some(encoder) => Tensor::cat(vec![image, encoder.forward(depth)], 1),
            None => image,
        }
    }

    pub fn forward(&self, rgb: Tensor<B, 4>, depth: Tensor<B, 4>) -> Prediction<B> {
        self.head.forward(self.embed(rgb, depth))
    }
}
