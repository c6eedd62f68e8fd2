use bahasa_tts::audio::survey_sample_rates;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Tallies the header-declared sample rates of every wav in a dataset directory. Read-only, the
/// first thing to run when a freshly delivered corpus sounds off.
#[derive(Parser, Debug)]
pub struct Args {
    /// Directory containing the wav files
    #[clap(default_value = "datasets/Bahasa-Kita/wavs")]
    dir: PathBuf,
    /// Write the tally as JSON to this path as well as printing it
    #[clap(long)]
    report: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    bahasa_tts::setup_logging();
    let args = Args::parse();

    info!("Surveying {}", args.dir.display());
    let survey = survey_sample_rates(&args.dir)?;

    println!("=== Sample Rate Count ===");
    for (rate, count) in survey.rates.iter() {
        println!("{} Hz : {} files", rate, count);
    }
    println!();
    println!("Total files read: {}", survey.files_read());
    if survey.unreadable > 0 {
        println!("Unreadable files: {}", survey.unreadable);
    }

    if let Some(report) = args.report {
        std::fs::write(&report, serde_json::to_string_pretty(&survey)?)?;
        info!("Report written to {}", report.display());
    }
    Ok(())
}
