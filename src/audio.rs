//! Dataset audio utilities: a read-only sample-rate survey and an ffmpeg-driven batch resampler.
//! Both operate on flat directories of wav files because that's the shape every corpus we've
//! trained on arrives in. Neither touches audio samples in-process, the survey only reads
//! headers and the resampler delegates the transcoding to ffmpeg.
use hound::WavReader;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to read directory {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create output directory {dir}: {source}")]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// ffmpeg itself couldn't be spawned. Per-file transcode failures are logged, not raised.
    #[error("could not launch '{tool}': {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Tally of header-declared sample rates over a directory. Serialisable so the audit binary can
/// dump it as JSON for whoever asked why training sounds chipmunked.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRateSurvey {
    /// Sample rate in Hz to number of files declaring it.
    pub rates: BTreeMap<u32, usize>,
    /// Files whose header couldn't be parsed. These are skipped, never fatal.
    pub unreadable: usize,
}

impl SampleRateSurvey {
    /// Number of files that were successfully read.
    pub fn files_read(&self) -> usize {
        self.rates.values().sum()
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

/// Reads the header of every wav file directly under `dir` and tallies the declared sample
/// rates. Directory order is whatever the OS gives us, the tally doesn't care.
pub fn survey_sample_rates(dir: impl AsRef<Path>) -> Result<SampleRateSurvey, AudioError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| AudioError::ReadDir {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut survey = SampleRateSurvey::default();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !is_wav(&path) {
            continue;
        }
        match WavReader::open(&path) {
            Ok(reader) => {
                *survey.rates.entry(reader.spec().sample_rate).or_insert(0) += 1;
            }
            Err(e) => {
                warn!("Error reading {}: {}", path.display(), e);
                survey.unreadable += 1;
            }
        }
    }
    info!(
        "Surveyed {} files ({} unreadable)",
        survey.files_read(),
        survey.unreadable
    );
    Ok(survey)
}

/// Transcodes every wav in `src` to `target_hz` under the same filename in `dst`, creating `dst`
/// if needed. Returns how many files were handed to ffmpeg.
///
/// A non-zero ffmpeg exit for one file is logged and skipped rather than aborting the batch -
/// the whole operation is fire-and-forget per file and re-running simply reprocesses everything.
pub fn resample_dir(
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
    target_hz: u32,
) -> Result<usize, AudioError> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    fs::create_dir_all(dst).map_err(|source| AudioError::CreateDir {
        dir: dst.to_path_buf(),
        source,
    })?;

    let entries = fs::read_dir(src).map_err(|source| AudioError::ReadDir {
        dir: src.to_path_buf(),
        source,
    })?;

    let mut converted = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !is_wav(&path) {
            continue;
        }
        // file_name is present for anything read_dir yields
        let out_file = dst.join(path.file_name().unwrap());

        let status = Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(&path)
            .arg("-ar")
            .arg(target_hz.to_string())
            .arg(&out_file)
            .status()
            .map_err(|source| AudioError::ToolUnavailable {
                tool: "ffmpeg".to_string(),
                source,
            })?;

        if status.success() {
            converted += 1;
            info!("Converted: {} -> {}", path.display(), out_file.display());
        } else {
            warn!("ffmpeg exited with {} for {}", status, path.display());
        }
    }
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_wav(path: &Path, sample_rate: u32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..100i16 {
            writer.write_sample(i).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn survey_tallies_rates() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 16000);
        write_wav(&dir.path().join("b.wav"), 16000);
        write_wav(&dir.path().join("c.wav"), 44100);
        // Not a wav header at all
        fs::write(dir.path().join("broken.wav"), b"definitely not RIFF").unwrap();
        // Wrong extension, ignored entirely
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let survey = survey_sample_rates(dir.path()).unwrap();
        assert_eq!(survey.rates.get(&16000), Some(&2));
        assert_eq!(survey.rates.get(&44100), Some(&1));
        assert_eq!(survey.unreadable, 1);
        assert_eq!(survey.files_read(), 3);
    }

    #[test]
    fn survey_of_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let survey = survey_sample_rates(dir.path()).unwrap();
        assert!(survey.rates.is_empty());
        assert_eq!(survey.unreadable, 0);
    }

    #[test]
    fn survey_missing_dir_errors() {
        assert!(survey_sample_rates("/definitely/not/here").is_err());
    }
}
