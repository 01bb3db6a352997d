//! Composable, side-effect free transform pipelines.
//!
//! A pipeline decodes an image into a channel-major [`Raster`] on a 0..255
//! scale, then applies its steps in order.

use crate::types::{DatasetError, DatasetResult, Raster};
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

/// How pixels are decoded before the first step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelMode {
    /// Three channels.
    Rgb,
    /// One channel; 16-bit sources keep their precision.
    Luma,
    /// One channel of raw 8-bit values, read as class indices.
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeFilter {
    Nearest,
    Bilinear,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Bilinear => FilterType::Triangle,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Scale 0..255 values into 0..1.
    ToTensor,
    Resize {
        width: usize,
        height: usize,
        filter: ResizeFilter,
    },
    /// Per-channel `(x - mean) / std`; single values broadcast.
    Normalize { mean: Vec<f32>, std: Vec<f32> },
}

impl Transform {
    pub fn apply(&self, raster: Raster) -> DatasetResult<Raster> {
        match self {
            Transform::ToTensor => {
                let mut raster = raster;
                raster.data.iter_mut().for_each(|v| *v /= 255.0);
                Ok(raster)
            }
            Transform::Resize {
                width,
                height,
                filter,
            } => resize(raster, *width, *height, *filter),
            Transform::Normalize { mean, std } => normalize(raster, mean, std),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformPipeline {
    pub mode: PixelMode,
    pub steps: Vec<Transform>,
}

impl TransformPipeline {
    pub fn new(mode: PixelMode) -> Self {
        Self {
            mode,
            steps: Vec::new(),
        }
    }

    pub fn then(mut self, step: Transform) -> Self {
        self.steps.push(step);
        self
    }

    /// RGB renders: scale, resize, normalize to [-1, 1].
    pub fn render(size: (usize, usize)) -> Self {
        Self::new(PixelMode::Rgb)
            .then(Transform::ToTensor)
            .then(Transform::Resize {
                width: size.0,
                height: size.1,
                filter: ResizeFilter::Bilinear,
            })
            .then(Transform::Normalize {
                mean: vec![0.5, 0.5, 0.5],
                std: vec![0.5, 0.5, 0.5],
            })
    }

    /// Depth maps: scale, resize, normalize to [-1, 1].
    pub fn depth(size: (usize, usize)) -> Self {
        Self::new(PixelMode::Luma)
            .then(Transform::ToTensor)
            .then(Transform::Resize {
                width: size.0,
                height: size.1,
                filter: ResizeFilter::Bilinear,
            })
            .then(Transform::Normalize {
                mean: vec![0.5],
                std: vec![0.5],
            })
    }

    /// Segmentation masks: nearest resize, raw class indices.
    pub fn segmentation(size: (usize, usize)) -> Self {
        Self::new(PixelMode::Index).then(Transform::Resize {
            width: size.0,
            height: size.1,
            filter: ResizeFilter::Nearest,
        })
    }

    /// `(width, height)` of the last resize step, if any.
    pub fn output_size(&self) -> Option<(usize, usize)> {
        self.steps.iter().rev().find_map(|step| match step {
            Transform::Resize { width, height, .. } => Some((*width, *height)),
            _ => None,
        })
    }

    pub fn channels(&self) -> usize {
        match self.mode {
            PixelMode::Rgb => 3,
            PixelMode::Luma | PixelMode::Index => 1,
        }
    }

    pub fn decode(&self, img: &DynamicImage) -> Raster {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let data: Vec<f32> = match self.mode {
            PixelMode::Rgb => {
                let rgb = img.to_rgb8();
                let raw = rgb.as_raw();
                (0..3)
                    .flat_map(|c| raw.iter().skip(c).step_by(3).map(|v| *v as f32))
                    .collect()
            }
            PixelMode::Luma => img
                .to_luma16()
                .as_raw()
                .iter()
                .map(|v| *v as f32 / 257.0)
                .collect(),
            PixelMode::Index => img.to_luma8().as_raw().iter().map(|v| *v as f32).collect(),
        };
        Raster {
            channels: self.channels(),
            height,
            width,
            data,
        }
    }

    pub fn apply(&self, img: &DynamicImage) -> DatasetResult<Raster> {
        self.apply_raster(self.decode(img))
    }

    pub fn apply_raster(&self, raster: Raster) -> DatasetResult<Raster> {
        self.steps
            .iter()
            .try_fold(raster, |raster, step| step.apply(raster))
    }

    pub fn describe(&self) -> String {
        let steps: Vec<String> = self
            .steps
            .iter()
            .map(|step| match step {
                Transform::ToTensor => "to_tensor".to_string(),
                Transform::Resize {
                    width,
                    height,
                    filter,
                } => format!("resize({width}x{height},{filter:?})"),
                Transform::Normalize { mean, std } => format!("normalize({mean:?},{std:?})"),
            })
            .collect();
        format!("{:?}[{}]", self.mode, steps.join(" -> "))
    }
}

fn resize(
    raster: Raster,
    width: usize,
    height: usize,
    filter: ResizeFilter,
) -> DatasetResult<Raster> {
    if raster.width == width && raster.height == height {
        return Ok(raster);
    }
    if raster.data.is_empty() || width == 0 || height == 0 {
        return Err(DatasetError::Shape(format!(
            "cannot resize {}x{} raster to {width}x{height}",
            raster.width, raster.height
        )));
    }
    // Float buffers are clamped to 0..1 by the resampler; map into that range and back.
    let (lo, hi) = raster
        .data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let span = if hi > lo { hi - lo } else { 1.0 };

    let mut data = Vec::with_capacity(raster.channels * width * height);
    for c in 0..raster.channels {
        let plane: Vec<f32> = raster.plane(c).iter().map(|v| (v - lo) / span).collect();
        let buf = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(
            raster.width as u32,
            raster.height as u32,
            plane,
        )
        .ok_or_else(|| DatasetError::Shape("raster plane does not fit its dimensions".into()))?;
        let resized = image::imageops::resize(&buf, width as u32, height as u32, filter.into());
        data.extend(resized.into_raw().into_iter().map(|v| v * span + lo));
    }
    Raster::new(raster.channels, height, width, data)
}

fn normalize(raster: Raster, mean: &[f32], std: &[f32]) -> DatasetResult<Raster> {
    let pick = |values: &[f32], c: usize, what: &str| -> DatasetResult<f32> {
        match values.len() {
            1 => Ok(values[0]),
            n if n == raster.channels => Ok(values[c]),
            n => Err(DatasetError::Shape(format!(
                "normalize {what} has {n} values for {} channels",
                raster.channels
            ))),
        }
    };
    let plane = raster.height * raster.width;
    let mut out = raster.clone();
    for c in 0..raster.channels {
        let m = pick(mean, c, "mean")?;
        let s = pick(std, c, "std")?;
        if s == 0.0 {
            return Err(DatasetError::Shape(format!("normalize std is zero for channel {c}")));
        }
        out.data[c * plane..(c + 1) * plane]
            .iter_mut()
            .for_each(|v| *v = (*v - m) / s);
    }
    Ok(out)
}
