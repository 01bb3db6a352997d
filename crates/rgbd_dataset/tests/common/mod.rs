#![allow(dead_code)]

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use rgbd_dataset::{write_classes, write_manifest, ManifestRow};
use std::path::Path;

pub const CLASSES: [&str; 3] = ["background", "cube", "sphere"];

/// Stages `count` samples of `width x height` under `root`.
///
/// Sample `i` has class `i % 3`, a left/right split mask with indices 0 and
/// the sample's class, and a flat mid-range depth map.
pub fn stage_dataset(root: &Path, count: usize, width: u32, height: u32) {
    std::fs::create_dir_all(root.join("render")).unwrap();
    std::fs::create_dir_all(root.join("depth")).unwrap();
    std::fs::create_dir_all(root.join("seg")).unwrap();

    let mut rows = Vec::with_capacity(count);
    for i in 0..count {
        let class = i % CLASSES.len();
        let render = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([0, 128, 255])
            } else {
                Rgb([255, 128, 0])
            }
        });
        let depth: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_pixel(width, height, Luma([32_768]));
        let seg = GrayImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Luma([0])
            } else {
                Luma([class as u8])
            }
        });

        let render_rel = format!("render/{i:03}.png");
        let depth_rel = format!("depth/{i:03}.png");
        let seg_rel = format!("seg/{i:03}.png");
        render.save(root.join(&render_rel)).unwrap();
        depth.save(root.join(&depth_rel)).unwrap();
        seg.save(root.join(&seg_rel)).unwrap();

        rows.push(ManifestRow {
            render: render_rel,
            depth: depth_rel,
            segmentation: seg_rel,
            class: CLASSES[class].to_string(),
            x_min: 0.1,
            y_min: 0.2,
            x_max: 0.6,
            y_max: 0.9,
        });
    }
    write_manifest(&root.join("train.csv"), &rows).unwrap();
    write_classes(&root.join("class.csv"), &CLASSES).unwrap();
}
