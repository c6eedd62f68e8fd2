//! Wrapper around the MeloTTS inference entry point. Synthesis still lives in the Python
//! checkout (`melo/infer.py`); this side launches it, waits, and hands back the wav it wrote.
//! The contract with the script is entirely filesystem-shaped: success means exit code 0 *and*
//! the expected artifact existing under the output directory, because the script has been known
//! to exit 0 after silently writing nothing.
use anyhow::{bail, Context};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::{error, info};

/// Path of the generated wav relative to the output directory. Fixed by the inference script's
/// speaker layout.
pub const ARTIFACT_RELATIVE_PATH: &str = "LJSpeech/output.wav";

/// Launches `melo/infer.py` for one utterance at a time. Calls block until the subprocess
/// finishes, there is no timeout, which mirrors how the demos use it: one operator, one
/// sentence, one wait.
pub struct InferenceRunner {
    python: PathBuf,
    script: PathBuf,
    model_path: PathBuf,
    output_dir: PathBuf,
}

impl InferenceRunner {
    pub fn new(model_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: PathBuf::from("python3"),
            script: PathBuf::from("melo/infer.py"),
            model_path: model_path.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Replaces the interpreter, mainly so tests can point at a stub script.
    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = script.into();
        self
    }

    /// Where a successful run will leave the audio.
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(ARTIFACT_RELATIVE_PATH)
    }

    /// Synthesizes `text`, returning the path of the generated wav.
    pub fn synthesize(&self, text: &str) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("creating output directory {}", self.output_dir.display())
        })?;

        let output = Command::new(&self.python)
            .arg(&self.script)
            .arg("--text")
            .arg(text)
            .arg("-m")
            .arg(&self.model_path)
            .arg("-o")
            .arg(&self.output_dir)
            .output()
            .with_context(|| format!("launching {}", self.python.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Inference failed ({}): {}", output.status, stderr.trim());
            bail!("inference exited with {}: {}", output.status, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!("Inference output: {}", stdout.trim());
        }

        let artifact = self.artifact_path();
        if artifact.exists() {
            info!("Generated {}", artifact.display());
            Ok(artifact)
        } else {
            bail!("inference succeeded but {} was not written", artifact.display());
        }
    }
}
