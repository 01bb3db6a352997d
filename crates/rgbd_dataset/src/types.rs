//! Core types and error definitions for rgbd_dataset.

use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("unknown class {class:?} in {path} (known: {known})")]
    UnknownClass {
        path: PathBuf,
        class: String,
        known: usize,
    },
    #[error("mask {path} holds class index {value}, but only {classes} classes are known")]
    MaskIndex {
        path: PathBuf,
        value: f32,
        classes: usize,
    },
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("dataset at {0} has no samples")]
    Empty(PathBuf),
    #[error("index {index} out of range for dataset of {len} samples")]
    OutOfRange { index: usize, len: usize },
}

/// Channel-major float image: `data[c * height * width + y * width + x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl Raster {
    pub fn new(
        channels: usize,
        height: usize,
        width: usize,
        data: Vec<f32>,
    ) -> DatasetResult<Self> {
        if data.len() != channels * height * width {
            return Err(DatasetError::Shape(format!(
                "raster buffer of {} values does not match {channels}x{height}x{width}",
                data.len()
            )));
        }
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    pub fn plane(&self, channel: usize) -> &[f32] {
        let len = self.height * self.width;
        &self.data[channel * len..(channel + 1) * len]
    }
}

/// One decoded and transformed sample.
#[derive(Debug, Clone)]
pub struct RgbdSample {
    /// `[3, H, W]`
    pub rgb: Raster,
    /// `[1, H, W]`
    pub depth: Raster,
    pub label: usize,
    /// Normalized `[x_min, y_min, x_max, y_max]`.
    pub bbox: [f32; 4],
    /// `[1, H, W]`, class index per pixel.
    pub mask: Raster,
}
