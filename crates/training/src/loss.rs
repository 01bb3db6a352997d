//! Multi-task loss over class logits, box regression and segmentation logits.

use burn::tensor::activation::log_softmax;
use burn::tensor::{backend::Backend, Int, Tensor};
use models::Prediction;
use rgbd_dataset::RgbdBatch;

/// Ground truth for one batch.
#[derive(Debug, Clone)]
pub struct Target<B: Backend> {
    /// `[B]`
    pub labels: Tensor<B, 1, Int>,
    /// `[B, 4]`
    pub boxes: Tensor<B, 2>,
    /// `[B, 1, H, W]`, class index per pixel.
    pub masks: Tensor<B, 4, Int>,
}

impl<B: Backend> Target<B> {
    /// Splits a loader batch into network inputs `(rgb, depth)` and targets.
    pub fn from_batch(batch: RgbdBatch<B>) -> (Tensor<B, 4>, Tensor<B, 4>, Self) {
        let target = Self {
            labels: batch.labels,
            boxes: batch.bboxes,
            masks: batch.masks,
        };
        (batch.rgb, batch.depth, target)
    }
}

/// The three loss terms, each a single-element tensor.
#[derive(Debug, Clone)]
pub struct LossComponents<B: Backend> {
    /// Summed cross-entropy over the batch.
    pub classification: Tensor<B, 1>,
    /// Summed L1 box error, already divided by the class count.
    pub bbox: Tensor<B, 1>,
    /// Mean per-pixel cross-entropy.
    pub segmentation: Tensor<B, 1>,
}

impl<B: Backend> LossComponents<B> {
    pub fn total(&self) -> Tensor<B, 1> {
        self.classification.clone() + self.bbox.clone() + self.segmentation.clone()
    }
}

/// Negative log-likelihood of each row's target class: `[N, C]` x `[N]` -> `[N]`.
fn cross_entropy_rows<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let [rows, _] = logits.dims();
    log_softmax(logits, 1)
        .gather(1, targets.reshape([rows, 1]))
        .reshape([rows])
        .neg()
}

pub fn loss_components<B: Backend>(
    prediction: &Prediction<B>,
    target: &Target<B>,
    num_classes: usize,
) -> LossComponents<B> {
    let classification =
        cross_entropy_rows(prediction.class_logits.clone(), target.labels.clone()).sum();

    let bbox = (prediction.bbox.clone() - target.boxes.clone())
        .abs()
        .sum()
        .div_scalar(num_classes.max(1) as f32);

    let [batch, classes, height, width] = prediction.seg_logits.dims();
    let pixels = batch * height * width;
    let seg_logits = prediction
        .seg_logits
        .clone()
        .permute([0, 2, 3, 1])
        .reshape([pixels, classes]);
    // Drop the mask's channel axis: [B, 1, H, W] -> [B*H*W].
    let seg_targets = target.masks.clone().reshape([pixels]);
    let segmentation = cross_entropy_rows(seg_logits, seg_targets).mean();

    LossComponents {
        classification,
        bbox,
        segmentation,
    }
}

/// Scalar training loss: classification + bbox / num_classes + segmentation.
pub fn loss_function<B: Backend>(
    prediction: &Prediction<B>,
    target: &Target<B>,
    num_classes: usize,
) -> Tensor<B, 1> {
    loss_components(prediction, target, num_classes).total()
}
