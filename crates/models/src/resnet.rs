//! ResNet-style image encoder.
//!
//! Shapes:
//! - Input: `[B, 3, H, W]`
//! - `forward_features`: `[B, 512 * expansion]` (globally pooled)
//! - `forward`: `[B, out_size]`

use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, Linear, LinearConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{non_zero, ConfigError};
use crate::init::{batch_norm, conv_kaiming, BlockVisitor, ZeroInitResidual};

const STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];

/// Residual block variant used by every stage of an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Two 3x3 convolutions.
    Basic,
    /// 1x1 reduce, 3x3, 1x1 expand.
    Bottleneck,
}

impl BlockKind {
    pub fn expansion(&self) -> usize {
        match self {
            BlockKind::Basic => 1,
            BlockKind::Bottleneck => 4,
        }
    }
}

/// Standard ResNet depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ResNetDepth {
    #[default]
    R18,
    R34,
    R50,
    R101,
    R152,
}

impl ResNetDepth {
    pub fn block(&self) -> BlockKind {
        match self {
            ResNetDepth::R18 | ResNetDepth::R34 => BlockKind::Basic,
            _ => BlockKind::Bottleneck,
        }
    }

    pub fn layers(&self) -> [usize; 4] {
        match self {
            ResNetDepth::R18 => [2, 2, 2, 2],
            ResNetDepth::R34 | ResNetDepth::R50 => [3, 4, 6, 3],
            ResNetDepth::R101 => [3, 4, 23, 3],
            ResNetDepth::R152 => [3, 8, 36, 3],
        }
    }
}

impl TryFrom<u32> for ResNetDepth {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            18 => Ok(ResNetDepth::R18),
            34 => Ok(ResNetDepth::R34),
            50 => Ok(ResNetDepth::R50),
            101 => Ok(ResNetDepth::R101),
            152 => Ok(ResNetDepth::R152),
            other => Err(format!(
                "unsupported resnet depth {other}; expected one of 18, 34, 50, 101, 152"
            )),
        }
    }
}

impl From<ResNetDepth> for u32 {
    fn from(depth: ResNetDepth) -> Self {
        match depth {
            ResNetDepth::R18 => 18,
            ResNetDepth::R34 => 34,
            ResNetDepth::R50 => 50,
            ResNetDepth::R101 => 101,
            ResNetDepth::R152 => 152,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResNetEncoderConfig {
    pub block: BlockKind,
    /// Block count per stage.
    pub layers: [usize; 4],
    /// Zero the last batch-norm scale of every block's main path.
    pub zero_init_residual: bool,
    pub out_size: usize,
}

impl Default for ResNetEncoderConfig {
    fn default() -> Self {
        Self::resnet18()
    }
}

impl ResNetEncoderConfig {
    pub fn from_depth(depth: ResNetDepth) -> Self {
        Self {
            block: depth.block(),
            layers: depth.layers(),
            zero_init_residual: false,
            out_size: 512,
        }
    }

    pub fn resnet18() -> Self {
        Self::from_depth(ResNetDepth::R18)
    }

    pub fn resnet34() -> Self {
        Self::from_depth(ResNetDepth::R34)
    }

    pub fn resnet50() -> Self {
        Self::from_depth(ResNetDepth::R50)
    }

    pub fn resnet101() -> Self {
        Self::from_depth(ResNetDepth::R101)
    }

    pub fn resnet152() -> Self {
        Self::from_depth(ResNetDepth::R152)
    }

    pub fn with_out_size(mut self, out_size: usize) -> Self {
        self.out_size = out_size;
        self
    }

    pub fn with_zero_init_residual(mut self, enabled: bool) -> Self {
        self.zero_init_residual = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(stage) = self.layers.iter().position(|&count| count == 0) {
            return Err(ConfigError::EmptyStage { stage });
        }
        non_zero(self.out_size, "out_size")
    }

    /// Width of the pooled feature vector before the output projection.
    pub fn feature_dim(&self) -> usize {
        STAGE_PLANES[3] * self.block.expansion()
    }
}

/// 1x1 projection applied to the skip path when shape changes.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: conv_kaiming([in_channels, out_channels], 1, stride, 0, device),
            norm: batch_norm(out_channels, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(self.conv.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(
        inplanes: usize,
        planes: usize,
        stride: usize,
        downsample: Option<Downsample<B>>,
        device: &B::Device,
    ) -> Self {
        Self {
            conv1: conv_kaiming([inplanes, planes], 3, stride, 1, device),
            bn1: batch_norm(planes, device),
            conv2: conv_kaiming([planes, planes], 3, 1, 1, device),
            bn2: batch_norm(planes, device),
            downsample,
        }
    }

    fn residual(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = relu(self.bn1.forward(self.conv1.forward(x)));
        self.bn2.forward(self.conv2.forward(out))
    }

    pub fn last_norm(&self) -> &BatchNorm<B> {
        &self.bn2
    }

    pub(crate) fn last_norm_mut(&mut self) -> &mut BatchNorm<B> {
        &mut self.bn2
    }
}

#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B>,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> BottleneckBlock<B> {
    pub fn new(
        inplanes: usize,
        planes: usize,
        stride: usize,
        downsample: Option<Downsample<B>>,
        device: &B::Device,
    ) -> Self {
        let expanded = planes * BlockKind::Bottleneck.expansion();
        Self {
            conv1: conv_kaiming([inplanes, planes], 1, 1, 0, device),
            bn1: batch_norm(planes, device),
            conv2: conv_kaiming([planes, planes], 3, stride, 1, device),
            bn2: batch_norm(planes, device),
            conv3: conv_kaiming([planes, expanded], 1, 1, 0, device),
            bn3: batch_norm(expanded, device),
            downsample,
        }
    }

    fn residual(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = relu(self.bn1.forward(self.conv1.forward(x)));
        let out = relu(self.bn2.forward(self.conv2.forward(out)));
        self.bn3.forward(self.conv3.forward(out))
    }

    pub fn last_norm(&self) -> &BatchNorm<B> {
        &self.bn3
    }

    pub(crate) fn last_norm_mut(&mut self) -> &mut BatchNorm<B> {
        &mut self.bn3
    }
}

/// A residual block tagged by kind.
#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    Basic(BasicBlock<B>),
    Bottleneck(BottleneckBlock<B>),
}

impl<B: Backend> ResidualBlock<B> {
    pub fn new(
        kind: BlockKind,
        inplanes: usize,
        planes: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let out_channels = planes * kind.expansion();
        let downsample = (stride != 1 || inplanes != out_channels)
            .then(|| Downsample::new(inplanes, out_channels, stride, device));
        match kind {
            BlockKind::Basic => {
                ResidualBlock::Basic(BasicBlock::new(inplanes, planes, stride, downsample, device))
            }
            BlockKind::Bottleneck => ResidualBlock::Bottleneck(BottleneckBlock::new(
                inplanes, planes, stride, downsample, device,
            )),
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            ResidualBlock::Basic(_) => BlockKind::Basic,
            ResidualBlock::Bottleneck(_) => BlockKind::Bottleneck,
        }
    }

    pub fn has_downsample(&self) -> bool {
        match self {
            ResidualBlock::Basic(block) => block.downsample.is_some(),
            ResidualBlock::Bottleneck(block) => block.downsample.is_some(),
        }
    }

    /// Last batch-norm on the main path.
    pub fn last_norm(&self) -> &BatchNorm<B> {
        match self {
            ResidualBlock::Basic(block) => block.last_norm(),
            ResidualBlock::Bottleneck(block) => block.last_norm(),
        }
    }

    /// Skip path alone: identity, or the downsample projection.
    pub fn shortcut(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let downsample = match self {
            ResidualBlock::Basic(block) => block.downsample.as_ref(),
            ResidualBlock::Bottleneck(block) => block.downsample.as_ref(),
        };
        match downsample {
            Some(projection) => projection.forward(x),
            None => x,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = self.shortcut(x.clone());
        let out = match self {
            ResidualBlock::Basic(block) => block.residual(x),
            ResidualBlock::Bottleneck(block) => block.residual(x),
        };
        relu(out + identity)
    }

    pub fn accept<V: BlockVisitor<B>>(&mut self, visitor: &mut V) {
        match self {
            ResidualBlock::Basic(block) => visitor.visit_basic(block),
            ResidualBlock::Bottleneck(block) => visitor.visit_bottleneck(block),
        }
    }
}

#[derive(Module, Debug)]
pub struct ResNetStage<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> ResNetStage<B> {
    fn new(
        kind: BlockKind,
        inplanes: &mut usize,
        planes: usize,
        count: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let mut blocks = Vec::with_capacity(count);
        blocks.push(ResidualBlock::new(kind, *inplanes, planes, stride, device));
        *inplanes = planes * kind.expansion();
        for _ in 1..count {
            blocks.push(ResidualBlock::new(kind, *inplanes, planes, 1, device));
        }
        Self { blocks }
    }

    pub fn blocks(&self) -> &[ResidualBlock<B>] {
        &self.blocks
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct ResNetEncoder<B: Backend> {
    stem_conv: Conv2d<B>,
    stem_norm: BatchNorm<B>,
    stem_pool: MaxPool2d,
    stages: Vec<ResNetStage<B>>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> ResNetEncoder<B> {
    /// # Panics
    ///
    /// If [`ResNetEncoderConfig::validate`] rejects the config.
    pub fn new(config: ResNetEncoderConfig, device: &B::Device) -> Self {
        if let Err(err) = config.validate() {
            panic!("invalid resnet encoder config: {err}");
        }
        let mut inplanes = STAGE_PLANES[0];
        let stem_conv = conv_kaiming([3, inplanes], 7, 2, 3, device);
        let stem_norm = batch_norm(inplanes, device);
        let stem_pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let stages = STAGE_PLANES
            .iter()
            .zip(config.layers.iter())
            .enumerate()
            .map(|(idx, (&planes, &count))| {
                let stride = if idx == 0 { 1 } else { 2 };
                ResNetStage::new(config.block, &mut inplanes, planes, count, stride, device)
            })
            .collect();

        let avgpool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = LinearConfig::new(config.feature_dim(), config.out_size).init(device);

        let mut encoder = Self {
            stem_conv,
            stem_norm,
            stem_pool,
            stages,
            avgpool,
            fc,
        };
        if config.zero_init_residual {
            encoder.visit_blocks(&mut ZeroInitResidual::default());
        }
        encoder
    }

    /// Pooled, flattened features ahead of the output projection.
    pub fn forward_features(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.stem_norm.forward(self.stem_conv.forward(x)));
        let x = self.stem_pool.forward(x);
        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));
        self.avgpool.forward(x).flatten::<2>(1, 3)
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        relu(self.fc.forward(self.forward_features(x)))
    }

    pub fn stages(&self) -> &[ResNetStage<B>] {
        &self.stages
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ResidualBlock<B>> {
        self.stages.iter().flat_map(|stage| stage.blocks.iter())
    }

    pub fn visit_blocks<V: BlockVisitor<B>>(&mut self, visitor: &mut V) {
        for stage in self.stages.iter_mut() {
            for block in stage.blocks.iter_mut() {
                block.accept(visitor);
            }
        }
    }
}
