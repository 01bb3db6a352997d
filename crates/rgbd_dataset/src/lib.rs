//! Dataset loading, transform pipelines and Burn batching for RGB-D training.
//!
//! This crate provides:
//! - CSV manifest and class-list parsing
//! - Per-modality transform pipelines (render, depth, segmentation)
//! - An indexable dataset yielding (rgb, depth, label, bbox, mask)
//! - Shuffled, parallel batch iteration into Burn tensors

pub mod batch;
pub mod dataset;
pub mod manifest;
pub mod transform;
pub mod types;

pub use batch::{collate, BatchIter, LoaderConfig, RgbdBatch, RgbdLoader};
pub use dataset::{DatasetTransforms, RgbdDataset, DEFAULT_CLASSES, DEFAULT_MANIFEST};
pub use manifest::{read_classes, read_manifest, write_classes, write_manifest, ManifestRow};
pub use transform::{PixelMode, ResizeFilter, Transform, TransformPipeline};
pub use types::*;
