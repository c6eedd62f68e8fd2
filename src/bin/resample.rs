use bahasa_tts::audio::resample_dir;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Resamples every wav in a directory to a fixed rate via ffmpeg, mirroring filenames into the
/// output directory. Re-running reprocesses everything, there is no resume bookkeeping.
#[derive(Parser, Debug)]
pub struct Args {
    /// Directory with the original wav files
    src: PathBuf,
    /// Directory to write the resampled files into, created if absent
    dst: PathBuf,
    /// Target sample rate in Hz
    #[clap(long, default_value_t = 16000)]
    rate: u32,
}

fn main() -> anyhow::Result<()> {
    bahasa_tts::setup_logging();
    let args = Args::parse();

    let converted = resample_dir(&args.src, &args.dst, args.rate)?;
    info!(
        "Converted {} files from {} into {}",
        converted,
        args.src.display(),
        args.dst.display()
    );
    Ok(())
}
