#![allow(dead_code)]

use burn::tensor::{backend::Backend, Distribution, Int, Tensor, TensorData};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use models::{Backbone, RgbdNet};
use rgbd_dataset::{write_classes, write_manifest, ManifestRow, RgbdBatch};
use std::path::Path;
use training::ModelSettings;

pub const NUM_CLASSES: usize = 3;
pub const SIZE: usize = 32;

pub fn small_settings() -> ModelSettings {
    ModelSettings {
        image_size: SIZE,
        out_size: 8,
        mask_grid: 4,
        ..Default::default()
    }
}

pub fn small_net<B: Backend>(device: &B::Device) -> RgbdNet<B> {
    RgbdNet::new(
        small_settings().net_config(Backbone::DepthFusion, NUM_CLASSES),
        device,
    )
}

/// A two-sample batch with random inputs and fixed targets.
pub fn synthetic_batch<B: Backend>(device: &B::Device) -> RgbdBatch<B> {
    let dist = Distribution::Uniform(-1.0, 1.0);
    let masks: Vec<i64> = (0..2 * SIZE * SIZE).map(|i| (i % NUM_CLASSES) as i64).collect();
    RgbdBatch {
        rgb: Tensor::random([2, 3, SIZE, SIZE], dist, device),
        depth: Tensor::random([2, 1, SIZE, SIZE], dist, device),
        labels: Tensor::<B, 1, Int>::from_data(TensorData::new(vec![1i64, 2], [2]), device),
        bboxes: Tensor::from_data(
            TensorData::new(vec![0.1f32, 0.2, 0.5, 0.6, 0.3, 0.3, 0.9, 0.8], [2, 4]),
            device,
        ),
        masks: Tensor::<B, 4, Int>::from_data(TensorData::new(masks, [2, 1, SIZE, SIZE]), device),
    }
}

/// Stages `count` tiny samples with the manifest and class list under `root`.
pub fn stage_dataset(root: &Path, count: usize) {
    for dir in ["render", "depth", "seg"] {
        std::fs::create_dir_all(root.join(dir)).unwrap();
    }
    let side = SIZE as u32;
    let mut rows = Vec::new();
    for i in 0..count {
        let class = i % NUM_CLASSES;
        let shade = (40 * i % 256) as u8;
        RgbImage::from_pixel(side, side, Rgb([shade, 100, 200]))
            .save(root.join(format!("render/{i}.png")))
            .unwrap();
        ImageBuffer::<Luma<u16>, Vec<u16>>::from_pixel(side, side, Luma([1000 * i as u16]))
            .save(root.join(format!("depth/{i}.png")))
            .unwrap();
        GrayImage::from_fn(side, side, |x, _| Luma([if x < side / 2 { 0 } else { class as u8 }]))
            .save(root.join(format!("seg/{i}.png")))
            .unwrap();
        rows.push(ManifestRow {
            render: format!("render/{i}.png"),
            depth: format!("depth/{i}.png"),
            segmentation: format!("seg/{i}.png"),
            class: class.to_string(),
            x_min: 0.25,
            y_min: 0.25,
            x_max: 0.75,
            y_max: 0.75,
        });
    }
    write_manifest(&root.join("train.csv"), &rows).unwrap();
    write_classes(&root.join("class.csv"), &["background", "cube", "sphere"]).unwrap();
}

pub fn max_abs_diff<B: Backend, const D: usize>(a: Tensor<B, D>, b: Tensor<B, D>) -> f32 {
    let a = a.into_data().to_vec::<f32>().unwrap();
    let b = b.into_data().to_vec::<f32>().unwrap();
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(&b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}
