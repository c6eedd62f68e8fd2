//! Phone-level contextual features from IndoBERT. The language model itself stays external: we
//! load an ONNX export of `indobenchmark/indobert-base-p2` (or whatever `ID_MODEL_DIR` points at)
//! plus its `tokenizer.json` and only own the bookkeeping around it.
//!
//! The ONNX graph is expected to expose a single hidden-state layer as output `hidden_states`
//! with shape `[1, T, H]` - the layer choice (we export third-from-last, which sounded best in
//! listening tests) is baked in at export time rather than picked here at runtime.
//!
//! The expansion itself is simple: the tokenizer emits T tokens, the caller hands us a word2ph
//! list of length T, and each token's embedding row is repeated by its word2ph entry to give one
//! column per phone. The length agreement is a hard contract with [`crate::g2p`]: the caller must
//! pass the exact text that produced word2ph (after accounting for the special tokens the
//! tokenizer adds), otherwise we refuse to produce a misaligned feature matrix.
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use ort::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    GraphOptimizationLevel, Session,
};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Environment variable overriding where the IndoBERT export lives.
pub const MODEL_DIR_ENV: &str = "ID_MODEL_DIR";

/// Default location of the IndoBERT export relative to the working directory.
pub const DEFAULT_MODEL_DIR: &str = "./models/indobert";

#[derive(Debug, Error)]
pub enum BertError {
    /// Weights or tokenizer couldn't be loaded. Fatal, there is no fallback model.
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    /// The tokenizer produced a different number of tokens than word2ph has entries. This means
    /// the text doesn't match what produced word2ph upstream and any output would be misaligned.
    #[error("word2ph has {word2ph} entries but the tokenizer produced {tokens} tokens")]
    TokenCountMismatch { word2ph: usize, tokens: usize },
    /// The ONNX runtime failed during the forward pass.
    #[error(transparent)]
    Inference(#[from] ort::Error),
    /// The graph output didn't have the `[1, T, H]` shape we expect from the export.
    #[error("unexpected output shape: {0}")]
    Shape(String),
}

/// Where to run the forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
    /// Apple's accelerator, only meaningful on macOS.
    CoreMl,
}

impl Device {
    /// Applies the selection policy: an explicit request wins, no request falls back to CUDA.
    /// The one quirk kept from production use is that on macOS a CPU request is upgraded to
    /// CoreML, since the CPU request there is invariably someone avoiding a missing CUDA stack
    /// rather than actually wanting CPU inference.
    pub fn resolve(requested: Option<Device>) -> Device {
        match requested {
            Some(Device::Cpu) if cfg!(target_os = "macos") => Device::CoreMl,
            Some(d) => d,
            None => Device::Cuda,
        }
    }
}

/// Resolves the model directory from the environment override or the default location.
pub fn model_dir() -> PathBuf {
    match env::var(MODEL_DIR_ENV) {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => PathBuf::from(DEFAULT_MODEL_DIR),
    }
}

/// Owned handle to the IndoBERT tokenizer and ONNX session. Load this once and pass it around;
/// the weights are read at construction so a typo'd model path fails at startup rather than on
/// the first utterance.
pub struct IndoBert {
    tokenizer: Tokenizer,
    session: Session,
}

impl IndoBert {
    /// Loads `tokenizer.json` and `model.onnx` from a directory on the requested device.
    pub fn load(dir: impl AsRef<Path>, device: Option<Device>) -> Result<Self, BertError> {
        let dir = dir.as_ref();
        let device = Device::resolve(device);
        info!("Loading IndoBERT from {} on {:?}", dir.display(), device);

        // ort's global init can be called multiple times so there's no harm if the caller also
        // holds other sessions.
        let init = ort::init().with_name("bahasa_tts");
        match device {
            Device::Cpu => init.with_execution_providers([CPUExecutionProvider::default().build()]),
            Device::Cuda => {
                init.with_execution_providers([CUDAExecutionProvider::default().build()])
            }
            Device::CoreMl => {
                init.with_execution_providers([CoreMLExecutionProvider::default().build()])
            }
        }
        .commit()
        .map_err(|e| BertError::ModelLoad(e.to_string()))?;

        let tokenizer = Tokenizer::from_file(dir.join("tokenizer.json"))
            .map_err(|e| BertError::ModelLoad(e.to_string()))?;

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
            .and_then(|b| b.commit_from_file(dir.join("model.onnx")))
            .map_err(|e| BertError::ModelLoad(e.to_string()))?;

        Ok(Self { tokenizer, session })
    }

    /// Loads from [`MODEL_DIR_ENV`] or the default directory.
    pub fn from_env(device: Option<Device>) -> Result<Self, BertError> {
        Self::load(model_dir(), device)
    }

    /// The tokenizer, shared with the g2p stage so both sides see the same subword split.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Runs one forward pass over `text` and expands the per-token hidden states into a
    /// `[hidden_dim, n_phones]` feature matrix using `word2ph`.
    ///
    /// `word2ph` must cover the special tokens too - the g2p caller extends it by one entry at
    /// each end for `[CLS]`/`[SEP]`, which is exactly what the padded output of
    /// [`crate::g2p::g2p`] provides.
    pub fn phone_level_features(
        &self,
        text: &str,
        word2ph: &[usize],
    ) -> Result<Array2<f32>, BertError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| BertError::ModelLoad(e.to_string()))?;

        let n_tokens = encoding.get_ids().len();
        if n_tokens != word2ph.len() {
            return Err(BertError::TokenCountMismatch {
                word2ph: word2ph.len(),
                tokens: n_tokens,
            });
        }

        let to_row = |v: &[u32]| {
            Array2::from_shape_vec(
                (1, v.len()),
                v.iter().map(|x| *x as i64).collect::<Vec<i64>>(),
            )
            .map_err(|e| BertError::Shape(e.to_string()))
        };
        let input_ids = to_row(encoding.get_ids())?;
        let attention_mask = to_row(encoding.get_attention_mask())?;
        let token_type_ids = to_row(encoding.get_type_ids())?;

        let outputs = self.session.run(ort::inputs![
            "input_ids" => input_ids.view(),
            "attention_mask" => attention_mask.view(),
            "token_type_ids" => token_type_ids.view(),
        ]?)?;

        let hidden = outputs["hidden_states"]
            .try_extract_tensor::<f32>()?
            .view()
            .clone()
            .remove_axis(Axis(0))
            .into_dimensionality()
            .map_err(|e| BertError::Shape(e.to_string()))?
            .into_owned();
        debug!("Hidden states: {:?}", hidden.dim());

        expand_by_word2ph(hidden.view(), word2ph)
    }
}

/// Repeats row i of `hidden` (`[T, H]`) `word2ph[i]` times and returns the transpose,
/// `[H, n_phones]`. Split out from the session plumbing so the alignment logic is testable
/// without model weights.
pub fn expand_by_word2ph(
    hidden: ArrayView2<f32>,
    word2ph: &[usize],
) -> Result<Array2<f32>, BertError> {
    if hidden.nrows() != word2ph.len() {
        return Err(BertError::TokenCountMismatch {
            word2ph: word2ph.len(),
            tokens: hidden.nrows(),
        });
    }

    let n_phones: usize = word2ph.iter().sum();
    let mut rows = Vec::with_capacity(n_phones);
    for (i, count) in word2ph.iter().enumerate() {
        for _ in 0..*count {
            rows.push(hidden.row(i));
        }
    }

    let phone_level = if rows.is_empty() {
        Array2::zeros((0, hidden.ncols()))
    } else {
        concatenate(Axis(0), &rows)
            .map_err(|e| BertError::Shape(e.to_string()))?
            .into_shape((n_phones, hidden.ncols()))
            .map_err(|e| BertError::Shape(e.to_string()))?
    };

    Ok(phone_level.reversed_axes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn expansion_repeats_rows() {
        let hidden = array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let features = expand_by_word2ph(hidden.view(), &[1, 2, 1]).unwrap();
        // [H, n_phones] with the middle token's column repeated
        assert_eq!(features.dim(), (2, 4));
        assert_eq!(
            features,
            array![[1.0, 3.0, 3.0, 5.0], [2.0, 4.0, 4.0, 6.0]]
        );
    }

    #[test]
    fn expansion_rejects_mismatch() {
        let hidden = array![[1.0f32, 2.0], [3.0, 4.0]];
        match expand_by_word2ph(hidden.view(), &[1, 1, 1]) {
            Err(BertError::TokenCountMismatch { word2ph, tokens }) => {
                assert_eq!(word2ph, 3);
                assert_eq!(tokens, 2);
            }
            other => panic!("expected TokenCountMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn zero_counts_drop_tokens() {
        let hidden = array![[1.0f32], [2.0], [3.0]];
        let features = expand_by_word2ph(hidden.view(), &[0, 3, 0]).unwrap();
        assert_eq!(features, array![[2.0, 2.0, 2.0]]);
    }

    #[test]
    fn device_policy() {
        assert_eq!(Device::resolve(None), Device::Cuda);
        assert_eq!(Device::resolve(Some(Device::Cuda)), Device::Cuda);
        if cfg!(target_os = "macos") {
            assert_eq!(Device::resolve(Some(Device::Cpu)), Device::CoreMl);
        } else {
            assert_eq!(Device::resolve(Some(Device::Cpu)), Device::Cpu);
        }
    }
}
