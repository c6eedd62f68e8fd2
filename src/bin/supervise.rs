use bahasa_tts::supervisor::{Supervisor, DEFAULT_MASTER_PORT};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Launches distributed training under a relaunch-on-crash loop. Only a clean exit from
/// torchrun stops the loop; kill this process to stop a run that keeps crashing.
#[derive(Parser, Debug)]
pub struct Args {
    /// Training config, e.g. configs/my_model/config.json. The model name is taken from the
    /// parent directory
    config: PathBuf,
    /// Number of GPUs to hand to torchrun
    num_gpus: u32,
    /// Rendezvous port for torchrun
    #[clap(long, default_value_t = DEFAULT_MASTER_PORT)]
    master_port: u16,
    /// Seconds to wait between a crash and the relaunch
    #[clap(long, default_value_t = 30)]
    retry_delay: u64,
    /// Give up after this many retries instead of retrying forever
    #[clap(long)]
    max_retries: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    bahasa_tts::setup_logging();
    let args = Args::parse();

    let supervisor = Supervisor::new(args.config, args.num_gpus)
        .with_master_port(args.master_port)
        .with_retry_delay(Duration::from_secs(args.retry_delay))
        .with_max_retries(args.max_retries);

    let retries = supervisor.run()?;
    println!("Training finished successfully ({} retries)", retries);
    Ok(())
}
