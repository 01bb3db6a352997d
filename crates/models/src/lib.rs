//! Burn models for RGB-D multi-task training.
//!
//! This crate defines the network architectures:
//! - `ResNetEncoder`: residual image encoder (basic or bottleneck blocks).
//! - `DepthEncoder`: shallow encoder for single-channel depth maps.
//! - `MultiTaskHead`: class logits, box regression and segmentation logits.
//! - `RgbdNet`: image-only or depth-fusion backbone feeding the head.
//!
//! These are pure Burn modules; losses, optimizers and checkpoints live in
//! the `training` crate.

pub mod depth;
pub mod error;
pub mod head;
pub mod init;
pub mod net;
pub mod resnet;

pub use depth::{DepthEncoder, DepthEncoderConfig, MIN_DEPTH_SIDE};
pub use error::ConfigError;
pub use head::{HeadActivation, MultiTaskHead, MultiTaskHeadConfig, Prediction};
pub use init::{kaiming_fan_out, BlockVisitor, ZeroInitResidual};
pub use net::{Backbone, RgbdNet, RgbdNetConfig};
pub use resnet::{
    BasicBlock, BlockKind, BottleneckBlock, ResNetDepth, ResNetEncoder, ResNetEncoderConfig,
    ResidualBlock,
};

pub mod prelude {
    pub use super::{
        Backbone, DepthEncoder, DepthEncoderConfig, HeadActivation, Prediction, ResNetEncoder,
        ResNetEncoderConfig, RgbdNet, RgbdNetConfig,
    };
}
