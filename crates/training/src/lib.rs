#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod loss;
pub mod trainer;
pub mod util;

pub use checkpoint::{load_checkpoint, save_checkpoint, CheckpointRecord, SgdOptimizer};
pub use config::{ModelSettings, TrainArgs, TrainConfig};
pub use loss::{loss_components, loss_function, LossComponents, Target};
pub use trainer::{EpochSummary, Trainer, TrainerOptions};
pub use util::{
    init_tracing, load_pretrained_image_encoder, resolve_device, run_train, save_image_encoder,
    ADBackend, TrainBackend, TrainDevice,
};
