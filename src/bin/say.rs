use bahasa_tts::infer::InferenceRunner;
use clap::Parser;
use std::path::PathBuf;

/// Runs the MeloTTS inference script for one utterance and prints where the audio landed.
#[derive(Parser, Debug)]
pub struct Args {
    /// Text to synthesise speech for
    #[clap(
        default_value = "hello, this is a test inference. I love patricia indry ely",
        trailing_var_arg = true
    )]
    text: Vec<String>,
    /// Path to the trained checkpoint
    #[clap(short, long, default_value = "melo/logs/LJSpeech-1.1/testing/G_644000.pth")]
    model: PathBuf,
    /// Directory the inference script writes into
    #[clap(short, long, default_value = "output_gradio")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    bahasa_tts::setup_logging();
    let args = Args::parse();

    let runner = InferenceRunner::new(args.model, args.output);
    let artifact = runner.synthesize(&args.text.join(" "))?;
    println!("{}", artifact.display());
    Ok(())
}
