use bahasa_tts::bert::{Device, IndoBert};
use bahasa_tts::g2p::{self, EspeakBackend};
use bahasa_tts::text_normaliser::normalise;
use clap::{Parser, ValueEnum};
use ndarray_npy::write_npy;
use std::path::PathBuf;
use tracing::info;

/// One-shot frontend check: normalises the text, runs g2p, and prints phones/tones/word2ph as
/// JSON so the output can be diffed against the Python frontend.
#[derive(Parser, Debug)]
pub struct Args {
    /// Text to convert
    input: String,
    /// Skip the sentinel padding at each end of the sequence
    #[clap(long)]
    no_pad: bool,
    /// Also run IndoBERT and write the phone-level feature matrix to this .npy file
    #[clap(long)]
    features: Option<PathBuf>,
    /// Device for the feature extraction, defaults to CUDA
    #[clap(long)]
    device: Option<DeviceArg>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DeviceArg {
    Cpu,
    Cuda,
    Coreml,
}

impl From<DeviceArg> for Device {
    fn from(d: DeviceArg) -> Device {
        match d {
            DeviceArg::Cpu => Device::Cpu,
            DeviceArg::Cuda => Device::Cuda,
            DeviceArg::Coreml => Device::CoreMl,
        }
    }
}

fn main() -> anyhow::Result<()> {
    bahasa_tts::setup_logging();
    let args = Args::parse();

    let normalised = normalise(&args.input);
    info!("Normalized: {}", normalised);

    // The tokenizer has to be the IndoBERT one even when we aren't extracting features,
    // otherwise word2ph won't line up with the embedding stage downstream.
    let bert = IndoBert::from_env(args.device.map(Into::into))?;
    let backend = EspeakBackend::indonesian();
    let output = g2p::g2p(&normalised, !args.no_pad, &backend, bert.tokenizer())?;

    println!(
        "{}",
        serde_json::json!({
            "input": args.input,
            "normalized": normalised,
            "phones": output.phones,
            "tones": output.tones,
            "word2ph": output.word2ph,
        })
    );

    if let Some(path) = args.features {
        let features = bert.phone_level_features(&normalised, &output.word2ph)?;
        write_npy(&path, &features)?;
        info!("Features {:?} written to {}", features.dim(), path.display());
    }
    Ok(())
}
