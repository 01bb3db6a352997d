mod common;

use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use common::{
    max_abs_diff, small_net, small_settings, stage_dataset, synthetic_batch, NUM_CLASSES, SIZE,
};
use models::{Backbone, RgbdNet};
use rgbd_dataset::{DatasetTransforms, LoaderConfig, RgbdDataset, RgbdLoader};
use training::{load_checkpoint, Trainer, TrainerOptions};

type Backend = NdArray<f32>;
type ADBackend = Autodiff<Backend>;

fn options(epochs: usize, output: &std::path::Path) -> TrainerOptions {
    let mut options = TrainerOptions::new(epochs, 0.01, output);
    options.momentum = 0.9;
    options.log_every = 1;
    options
}

fn loader() -> RgbdLoader {
    RgbdLoader::new(LoaderConfig {
        batch_size: 2,
        shuffle: true,
        seed: Some(7),
        drop_last: false,
    })
}

#[test]
fn one_step_yields_finite_loss_and_updates_parameters() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let model = small_net::<ADBackend>(&device);
    let mut trainer = Trainer::new(
        model,
        options(1, &dir.path().join("ckpt.pth")),
        NUM_CLASSES,
        device,
    );

    let before = trainer.model().head.class_head.weight.val().inner();
    let loss = trainer.train_step(synthetic_batch::<ADBackend>(&device));
    assert!(loss.is_finite(), "loss = {loss}");
    assert!(loss > 0.0);

    let after = trainer.model().head.class_head.weight.val().inner();
    assert!(max_abs_diff(before, after) > 0.0);
}

#[test]
fn image_only_backbone_trains_through_train_step() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let config = small_settings().net_config(Backbone::ImageOnly, NUM_CLASSES);
    let model = RgbdNet::<ADBackend>::new(config, &device);
    assert!(model.depth_encoder.is_none());

    let mut trainer = Trainer::new(
        model,
        options(1, &dir.path().join("ckpt.pth")),
        NUM_CLASSES,
        device,
    );
    let x = Tensor::<Backend, 4>::random([1, 3, SIZE, SIZE], Distribution::Default, &device);
    let head_before = trainer.model().head.class_head.weight.val().inner();
    let image_before = trainer.model().valid().image_encoder.forward(x.clone());

    let loss = trainer.train_step(synthetic_batch::<ADBackend>(&device));
    assert!(loss.is_finite(), "loss = {loss}");

    let head_after = trainer.model().head.class_head.weight.val().inner();
    let image_after = trainer.model().valid().image_encoder.forward(x);
    assert!(max_abs_diff(head_before, head_after) > 0.0);
    assert!(max_abs_diff(image_before, image_after) > 0.0);
}

#[test]
fn fit_checkpoints_every_epoch_and_resumes() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    stage_dataset(&data, 5);
    let dataset =
        RgbdDataset::open(&data, "train.csv", "class.csv", DatasetTransforms::for_size(SIZE))
            .unwrap();
    let ckpt = dir.path().join("out").join("checkpoint.pth");

    let mut trainer = Trainer::new(
        small_net::<ADBackend>(&device),
        options(2, &ckpt),
        dataset.num_classes(),
        device,
    );
    let summaries = trainer.fit(&dataset, &mut loader()).unwrap();
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|s| s.steps == 3 && s.last_loss.is_finite()));
    assert_eq!(trainer.epoch(), 2);
    assert!(ckpt.exists());
    assert_eq!(load_checkpoint::<ADBackend>(&ckpt, &device).unwrap().epoch, 2);

    let mut resumed = Trainer::new(
        small_net::<ADBackend>(&device),
        options(3, &ckpt),
        dataset.num_classes(),
        device,
    )
    .resume_from(&ckpt)
    .unwrap();
    assert_eq!(resumed.epoch(), 2);
    let summaries = resumed.fit(&dataset, &mut loader()).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].epoch, 2);
    assert_eq!(resumed.epoch(), 3);

    // Already at the target epoch: nothing to do.
    let mut done = Trainer::new(
        small_net::<ADBackend>(&device),
        options(3, &ckpt),
        dataset.num_classes(),
        device,
    )
    .resume_from(&ckpt)
    .unwrap();
    assert!(done.fit(&dataset, &mut loader()).unwrap().is_empty());
}

#[test]
fn checkpoint_round_trip_restores_parameters_and_optimizer_state() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let ckpt = dir.path().join("checkpoint.pth");
    let batch = synthetic_batch::<ADBackend>(&device);

    let mut original = Trainer::new(
        small_net::<ADBackend>(&device),
        options(1, &ckpt),
        NUM_CLASSES,
        device,
    );
    original.train_step(batch.clone());
    original.train_step(batch.clone());
    original.save_checkpoint().unwrap();

    let mut restored = Trainer::new(
        small_net::<ADBackend>(&device),
        options(1, &ckpt),
        NUM_CLASSES,
        device,
    )
    .resume_from(&ckpt)
    .unwrap();
    assert_eq!(restored.epoch(), original.epoch());

    let rgb = Tensor::<Backend, 4>::random([1, 3, SIZE, SIZE], Distribution::Default, &device);
    let depth = Tensor::<Backend, 4>::random([1, 1, SIZE, SIZE], Distribution::Default, &device);
    let expected = original.model().valid().forward(rgb.clone(), depth.clone());
    let actual = restored.model().valid().forward(rgb.clone(), depth.clone());
    assert!(max_abs_diff(expected.class_logits, actual.class_logits) < 1e-5);
    assert!(max_abs_diff(expected.seg_logits, actual.seg_logits) < 1e-5);

    // Momentum buffers must match too, so the next update is identical.
    original.train_step(batch.clone());
    restored.train_step(batch);
    let expected = original.model().valid().forward(rgb.clone(), depth.clone());
    let actual = restored.model().valid().forward(rgb, depth);
    assert!(max_abs_diff(expected.bbox, actual.bbox) < 1e-4);
}
