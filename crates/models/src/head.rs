//! Multi-task prediction head over a fused embedding.

use burn::module::{Ignored, Module};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{non_zero, ConfigError};

/// Activation applied to all three head outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadActivation {
    #[default]
    Identity,
    /// Clamps logits and box regressions to be non-negative.
    Relu,
}

/// Head outputs for one batch.
#[derive(Debug, Clone)]
pub struct Prediction<B: Backend> {
    /// `[B, num_classes]`
    pub class_logits: Tensor<B, 2>,
    /// `[B, 4]`
    pub bbox: Tensor<B, 2>,
    /// `[B, num_classes, H, W]`
    pub seg_logits: Tensor<B, 4>,
}

#[derive(Debug, Clone)]
pub struct MultiTaskHeadConfig {
    pub embed_dim: usize,
    pub num_classes: usize,
    /// Output mask size as (height, width).
    pub mask_size: [usize; 2],
    /// Side of the coarse mask grid predicted before upsampling.
    pub grid: usize,
    pub activation: HeadActivation,
}

impl MultiTaskHeadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero(self.embed_dim, "embed_dim")?;
        non_zero(self.num_classes, "num_classes")?;
        non_zero(self.mask_size[0], "mask height")?;
        non_zero(self.mask_size[1], "mask width")?;
        non_zero(self.grid, "mask grid")
    }
}

#[derive(Module, Debug)]
pub struct MultiTaskHead<B: Backend> {
    pub class_head: Linear<B>,
    pub box_head: Linear<B>,
    pub mask_head: Linear<B>,
    num_classes: usize,
    grid: usize,
    mask_height: usize,
    mask_width: usize,
    activation: Ignored<HeadActivation>,
}

impl<B: Backend> MultiTaskHead<B> {
    /// # Panics
    ///
    /// If [`MultiTaskHeadConfig::validate`] rejects the config.
    pub fn new(config: MultiTaskHeadConfig, device: &B::Device) -> Self {
        if let Err(err) = config.validate() {
            panic!("invalid multi-task head config: {err}");
        }
        let num_classes = config.num_classes;
        let grid = config.grid;
        Self {
            class_head: LinearConfig::new(config.embed_dim, num_classes).init(device),
            box_head: LinearConfig::new(config.embed_dim, 4).init(device),
            mask_head: LinearConfig::new(config.embed_dim, num_classes * grid * grid).init(device),
            num_classes,
            grid,
            mask_height: config.mask_size[0],
            mask_width: config.mask_size[1],
            activation: Ignored(config.activation),
        }
    }

    pub fn activation(&self) -> HeadActivation {
        self.activation.0
    }

    pub fn forward(&self, embedding: Tensor<B, 2>) -> Prediction<B> {
        let [batch, _] = embedding.dims();
        let class_logits = self.class_head.forward(embedding.clone());
        let bbox = self.box_head.forward(embedding.clone());
        let coarse = self
            .mask_head
            .forward(embedding)
            .reshape([batch, self.num_classes, self.grid, self.grid]);
        // Nearest keeps the op differentiable on every backend.
        let seg_logits = interpolate(
            coarse,
            [self.mask_height, self.mask_width],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );

        match self.activation.0 {
            HeadActivation::Identity => Prediction {
                class_logits,
                bbox,
                seg_logits,
            },
            HeadActivation::Relu => Prediction {
                class_logits: relu(class_logits),
                bbox: relu(bbox),
                seg_logits: relu(seg_logits),
            },
        }
    }
}
