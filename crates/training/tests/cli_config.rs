mod common;

use clap::Parser;
use common::{stage_dataset, SIZE};
use models::{Backbone, HeadActivation, ResNetDepth};
use std::path::PathBuf;
use training::{load_checkpoint, run_train, ADBackend, ModelSettings, TrainArgs, TrainConfig};

#[test]
fn cli_defaults_match_documented_values() {
    let args = TrainArgs::try_parse_from(["train", "--dataset_path", "data"]).unwrap();
    assert_eq!(args.epochs, 5);
    assert_eq!(args.batch_size, 4);
    assert!((args.learning_rate - 0.001).abs() < 1e-12);
    assert!(!args.use_gpu);
    assert_eq!(args.output_path, PathBuf::from("./checkpoint.pth"));
    assert!(args.checkpoint.is_none());
    assert_eq!(args.log_every, 1000);
    assert_eq!(args.manifest, "train.csv");
    assert_eq!(args.classes, "class.csv");

    let config = TrainConfig::from_args(args).unwrap();
    assert_eq!(config.backbone, Backbone::DepthFusion);
    assert!(config.pretrained.is_none());
    assert_eq!(config.model, ModelSettings::default());
}

#[test]
fn resnet_and_pretrained_flags() {
    let args = TrainArgs::try_parse_from([
        "train",
        "--dataset_path",
        "data",
        "--resnet",
        "--pretrained",
        "--pretrained_path",
        "weights/enc.bin",
        "--use_gpu",
        "--checkpoint",
        "old.pth",
    ])
    .unwrap();
    let config = TrainConfig::from_args(args).unwrap();
    assert_eq!(config.backbone, Backbone::ImageOnly);
    assert_eq!(config.pretrained, Some(PathBuf::from("weights/enc.bin")));
    assert_eq!(config.checkpoint, Some(PathBuf::from("old.pth")));
    assert!(config.use_gpu);
}

#[test]
fn missing_dataset_path_is_rejected() {
    assert!(TrainArgs::try_parse_from(["train"]).is_err());
}

#[test]
fn settings_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.toml");
    std::fs::write(
        &path,
        "depth = 50\nout_size = 256\nhead_activation = \"relu\"\nzero_init_residual = false\n",
    )
    .unwrap();

    let settings = ModelSettings::from_file(&path).unwrap();
    assert_eq!(settings.depth, ResNetDepth::R50);
    assert_eq!(settings.out_size, 256);
    assert_eq!(settings.head_activation, HeadActivation::Relu);
    assert!(!settings.zero_init_residual);
    assert_eq!(settings.image_size, 256);

    let net = settings.net_config(Backbone::DepthFusion, 7);
    assert_eq!(net.embed_dim(), 512);
    assert_eq!(net.mask_size, [256, 256]);
    assert!(!net.image.zero_init_residual);

    std::fs::write(&path, "depth = 20\n").unwrap();
    assert!(ModelSettings::from_file(&path).is_err());
}

#[test]
fn run_train_writes_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    stage_dataset(&data, 3);
    let settings = dir.path().join("model.toml");
    std::fs::write(
        &settings,
        format!("image_size = {SIZE}\nout_size = 8\nmask_grid = 4\n"),
    )
    .unwrap();
    let output = dir.path().join("checkpoint.pth");

    let args = TrainArgs::try_parse_from([
        "train".to_string(),
        "--dataset_path".into(),
        data.display().to_string(),
        "--epochs".into(),
        "1".into(),
        "--batch_size".into(),
        "2".into(),
        "--output_path".into(),
        output.display().to_string(),
        "--config".into(),
        settings.display().to_string(),
        "--seed".into(),
        "1".into(),
    ])
    .unwrap();
    run_train(TrainConfig::from_args(args).unwrap()).unwrap();

    let record = load_checkpoint::<ADBackend>(&output, &Default::default()).unwrap();
    assert_eq!(record.epoch, 1);
}

#[test]
fn pretrained_default_follows_settings_depth() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.toml");
    std::fs::write(&path, "depth = 50\n").unwrap();
    let config_arg = path.display().to_string();

    let args = TrainArgs::try_parse_from([
        "train",
        "--dataset_path",
        "data",
        "--config",
        config_arg.as_str(),
        "--pretrained",
    ])
    .unwrap();
    let config = TrainConfig::from_args(args).unwrap();
    assert_eq!(
        config.pretrained,
        Some(PathBuf::from("./pretrained/resnet50.bin"))
    );

    let args = TrainArgs::try_parse_from(["train", "--dataset_path", "data", "--pretrained"])
        .unwrap();
    let config = TrainConfig::from_args(args).unwrap();
    assert_eq!(
        config.pretrained,
        Some(PathBuf::from("./pretrained/resnet18.bin"))
    );

    let args = TrainArgs::try_parse_from([
        "train",
        "--dataset_path",
        "data",
        "--config",
        config_arg.as_str(),
    ])
    .unwrap();
    assert!(TrainConfig::from_args(args).unwrap().pretrained.is_none());
}

#[test]
fn run_train_rejects_zero_sized_settings() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    stage_dataset(&data, 2);
    let settings = dir.path().join("model.toml");
    std::fs::write(&settings, format!("image_size = {SIZE}\nout_size = 0\n")).unwrap();

    let args = TrainArgs::try_parse_from([
        "train".to_string(),
        "--dataset_path".into(),
        data.display().to_string(),
        "--config".into(),
        settings.display().to_string(),
        "--output_path".into(),
        dir.path().join("checkpoint.pth").display().to_string(),
    ])
    .unwrap();
    let err = run_train(TrainConfig::from_args(args).unwrap()).unwrap_err();
    assert!(format!("{err:#}").contains("out_size must be at least 1"));
    assert!(!dir.path().join("checkpoint.pth").exists());
}
