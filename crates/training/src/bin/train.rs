use clap::Parser;
use training::{init_tracing, run_train, TrainArgs, TrainConfig};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = TrainArgs::parse();
    run_train(TrainConfig::from_args(args)?)
}
