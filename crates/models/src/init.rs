//! Weight initialization helpers and the residual-block visitor.

use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::tensor::backend::Backend;

use crate::resnet::{BasicBlock, BottleneckBlock};

/// Kaiming-normal in fan-out mode with the ReLU gain.
pub fn kaiming_fan_out() -> Initializer {
    Initializer::KaimingNormal {
        gain: std::f64::consts::SQRT_2,
        fan_out_only: true,
    }
}

/// Bias-free square convolution initialized with [`kaiming_fan_out`].
pub(crate) fn conv_kaiming<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .with_initializer(kaiming_fan_out())
        .init(device)
}

/// Batch-norm with scale 1 and shift 0.
pub(crate) fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B> {
    BatchNormConfig::new(channels).init(device)
}

/// Visits each constructed residual block, dispatched on its kind.
pub trait BlockVisitor<B: Backend> {
    fn visit_basic(&mut self, block: &mut BasicBlock<B>);
    fn visit_bottleneck(&mut self, block: &mut BottleneckBlock<B>);
}

/// Sets the scale of the last batch-norm on every block's main path to zero,
/// so each block starts out as its skip connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroInitResidual {
    pub visited: usize,
}

impl<B: Backend> BlockVisitor<B> for ZeroInitResidual {
    fn visit_basic(&mut self, block: &mut BasicBlock<B>) {
        zero_scale(block.last_norm_mut());
        self.visited += 1;
    }

    fn visit_bottleneck(&mut self, block: &mut BottleneckBlock<B>) {
        zero_scale(block.last_norm_mut());
        self.visited += 1;
    }
}

fn zero_scale<B: Backend>(norm: &mut BatchNorm<B>) {
    let gamma = norm.gamma.val();
    norm.gamma = Param::from_tensor(gamma.zeros_like());
}
