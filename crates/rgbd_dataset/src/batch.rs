//! Shuffled batch iteration producing Burn tensors.

use crate::dataset::RgbdDataset;
use crate::types::{DatasetError, DatasetResult, Raster, RgbdSample};
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::time::Instant;

/// One mini-batch of the five-tuple (rgb, depth, label, bbox, mask).
#[derive(Debug, Clone)]
pub struct RgbdBatch<B: Backend> {
    /// `[B, 3, H, W]`
    pub rgb: Tensor<B, 4>,
    /// `[B, 1, H, W]`
    pub depth: Tensor<B, 4>,
    /// `[B]`
    pub labels: Tensor<B, 1, Int>,
    /// `[B, 4]`
    pub bboxes: Tensor<B, 2>,
    /// `[B, 1, H, W]`
    pub masks: Tensor<B, 4, Int>,
}

impl<B: Backend> RgbdBatch<B> {
    pub fn len(&self) -> usize {
        self.rgb.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// Reshuffle sample order at the start of every epoch.
    pub shuffle: bool,
    /// Seed for reproducible shuffling.
    pub seed: Option<u64>,
    /// Drop the last partial batch.
    pub drop_last: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            shuffle: true,
            seed: None,
            drop_last: false,
        }
    }
}

/// Hands out one [`BatchIter`] per epoch.
pub struct RgbdLoader {
    config: LoaderConfig,
    rng: StdRng,
}

impl RgbdLoader {
    pub fn new(config: LoaderConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn num_batches(&self, len: usize) -> usize {
        batches_for(len, self.config.batch_size.max(1), self.config.drop_last)
    }

    pub fn epoch<'a>(&mut self, dataset: &'a RgbdDataset) -> BatchIter<'a> {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        if self.config.shuffle {
            order.shuffle(&mut self.rng);
        }
        BatchIter {
            dataset,
            order,
            cursor: 0,
            batch_size: self.config.batch_size.max(1),
            drop_last: self.config.drop_last,
        }
    }
}

fn batches_for(len: usize, batch_size: usize, drop_last: bool) -> usize {
    if drop_last {
        len / batch_size
    } else {
        len.div_ceil(batch_size)
    }
}

pub struct BatchIter<'a> {
    dataset: &'a RgbdDataset,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    drop_last: bool,
}

impl BatchIter<'_> {
    /// Sample indices in the order this epoch visits them.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn num_batches(&self) -> usize {
        batches_for(self.order.len(), self.batch_size, self.drop_last)
    }

    pub fn next_batch<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<RgbdBatch<B>>> {
        let remaining = self.order.len().saturating_sub(self.cursor);
        if remaining == 0 || (self.drop_last && remaining < self.batch_size) {
            return Ok(None);
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let slice = &self.order[self.cursor..end];
        self.cursor = end;

        let started = Instant::now();
        let dataset = self.dataset;
        let samples = slice
            .par_iter()
            .map(|&idx| dataset.get(idx))
            .collect::<DatasetResult<Vec<_>>>()?;
        tracing::trace!(
            samples = samples.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded batch"
        );
        collate(&samples, device).map(Some)
    }
}

fn check_shape(expected: [usize; 3], raster: &Raster, what: &str) -> DatasetResult<()> {
    if raster.shape() != expected {
        return Err(DatasetError::Shape(format!(
            "{what} raster {:?} differs from {:?} within batch",
            raster.shape(),
            expected
        )));
    }
    Ok(())
}

/// Stacks samples into batch tensors; all samples must share shapes.
pub fn collate<B: Backend>(
    samples: &[RgbdSample],
    device: &B::Device,
) -> DatasetResult<RgbdBatch<B>> {
    let first = samples
        .first()
        .ok_or_else(|| DatasetError::Shape("cannot collate empty batch".into()))?;
    let rgb_shape = first.rgb.shape();
    let depth_shape = first.depth.shape();
    let mask_shape = first.mask.shape();
    let batch = samples.len();

    let mut rgb = Vec::with_capacity(batch * first.rgb.data.len());
    let mut depth = Vec::with_capacity(batch * first.depth.data.len());
    let mut masks: Vec<i64> = Vec::with_capacity(batch * first.mask.data.len());
    let mut labels: Vec<i64> = Vec::with_capacity(batch);
    let mut bboxes = Vec::with_capacity(batch * 4);

    for sample in samples {
        check_shape(rgb_shape, &sample.rgb, "rgb")?;
        check_shape(depth_shape, &sample.depth, "depth")?;
        check_shape(mask_shape, &sample.mask, "mask")?;
        rgb.extend_from_slice(&sample.rgb.data);
        depth.extend_from_slice(&sample.depth.data);
        masks.extend(sample.mask.data.iter().map(|v| v.round().max(0.0) as i64));
        labels.push(sample.label as i64);
        bboxes.extend_from_slice(&sample.bbox);
    }

    let [c, h, w] = rgb_shape;
    let [dc, dh, dw] = depth_shape;
    let [mc, mh, mw] = mask_shape;
    Ok(RgbdBatch {
        rgb: Tensor::from_data(TensorData::new(rgb, [batch, c, h, w]), device),
        depth: Tensor::from_data(TensorData::new(depth, [batch, dc, dh, dw]), device),
        labels: Tensor::from_data(TensorData::new(labels, [batch]), device),
        bboxes: Tensor::from_data(TensorData::new(bboxes, [batch, 4]), device),
        masks: Tensor::from_data(TensorData::new(masks, [batch, mc, mh, mw]), device),
    })
}
