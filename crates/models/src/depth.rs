//! Shallow convolutional encoder for single-channel depth maps.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, Linear, LinearConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn::tensor::{backend::Backend, Tensor};

use crate::error::{non_zero, ConfigError};
use crate::init::batch_norm;

const WIDTHS: [usize; 3] = [1, 16, 64];

/// Smallest spatial side fed to the first convolution. Shorter sides are
/// upsampled (nearest) so the second 11x11 stage still sees a map at least
/// as wide as its padding.
pub const MIN_DEPTH_SIDE: usize = 96;

#[derive(Debug, Clone)]
pub struct DepthEncoderConfig {
    pub out_size: usize,
    /// Spatial grid the second stage is pooled to before flattening.
    /// 8 reproduces the 4096-wide projection used with 256x256 inputs.
    pub grid: usize,
}

impl Default for DepthEncoderConfig {
    fn default() -> Self {
        Self {
            out_size: 512,
            grid: 8,
        }
    }
}

impl DepthEncoderConfig {
    pub fn with_out_size(mut self, out_size: usize) -> Self {
        self.out_size = out_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero(self.out_size, "out_size")?;
        non_zero(self.grid, "grid")
    }

    pub fn flattened_dim(&self) -> usize {
        WIDTHS[2] * self.grid * self.grid
    }
}

#[derive(Module, Debug)]
pub struct DepthEncoder<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    pool: MaxPool2d,
    grid_pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> DepthEncoder<B> {
    /// # Panics
    ///
    /// If [`DepthEncoderConfig::validate`] rejects the config.
    pub fn new(config: DepthEncoderConfig, device: &B::Device) -> Self {
        if let Err(err) = config.validate() {
            panic!("invalid depth encoder config: {err}");
        }
        let conv1 = Conv2dConfig::new([WIDTHS[0], WIDTHS[1]], [11, 11])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(5, 5))
            .with_bias(false)
            .init(device);
        let conv2 = Conv2dConfig::new([WIDTHS[1], WIDTHS[2]], [11, 11])
            .with_stride([4, 4])
            .with_padding(PaddingConfig2d::Explicit(5, 5))
            .with_bias(false)
            .init(device);
        let pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();
        let grid = config.grid;
        Self {
            conv1,
            bn1: batch_norm(WIDTHS[1], device),
            conv2,
            bn2: batch_norm(WIDTHS[2], device),
            pool,
            grid_pool: AdaptiveAvgPool2dConfig::new([grid, grid]).init(),
            fc: LinearConfig::new(WIDTHS[2] * grid * grid, config.out_size).init(device),
        }
    }

    /// `[B, 1, H, W]` -> `[B, out_size]` for any `H, W >= 1`.
    pub fn forward(&self, depth: Tensor<B, 4>) -> Tensor<B, 2> {
        let y = relu(self.bn1.forward(self.conv1.forward(fit_min_side(depth))));
        let y = self.pool.forward(y);
        let y = relu(self.bn2.forward(self.conv2.forward(y)));
        let y = self.pool.forward(y);
        let y = self.grid_pool.forward(y).flatten::<2>(1, 3);
        relu(self.fc.forward(y))
    }
}

fn fit_min_side<B: Backend>(depth: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, height, width] = depth.dims();
    if height >= MIN_DEPTH_SIDE && width >= MIN_DEPTH_SIDE {
        return depth;
    }
    interpolate(
        depth,
        [height.max(MIN_DEPTH_SIDE), width.max(MIN_DEPTH_SIDE)],
        InterpolateOptions::new(InterpolateMode::Nearest),
    )
}
