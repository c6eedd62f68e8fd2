//! Grapheme-to-phoneme conversion for Indonesian. Indonesian spelling is shallow enough that we
//! don't carry a pronunciation dictionary - we lean on espeak-ng's `id` voice for the phones and
//! keep the bookkeeping that MeloTTS-style models need on top of it: a tone per phone (always 0,
//! Indonesian has no lexical tone or stress marking we care about) and `word2ph`, the number of
//! phones each subword token of the BERT tokenizer expands to.
//!
//! The word2ph accounting is the part worth reading closely. The acoustic model consumes one
//! embedding per phone, the language model emits one embedding per subword token, and word2ph is
//! the bridge: phones are produced per *word*, then the word's phone count is split across its
//! subword tokens with [`distribute_phone`]. [`crate::bert`] later repeats each token embedding
//! by its word2ph entry, so `sum(word2ph) == phones.len()` is load-bearing, not cosmetic.
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tokenizers::Tokenizer;
use tracing::debug;

/// Sentinel phone padded onto each end of a sequence when `pad_start_end` is set. Matches the
/// padding symbol in the acoustic model's symbol table.
pub const PAD_PHONE: &str = "_";

#[derive(Debug, Error)]
pub enum G2pError {
    /// The phonemizer binary couldn't be spawned at all, usually espeak-ng isn't installed.
    #[error("phonemizer backend '{backend}' unavailable: {source}")]
    BackendUnavailable {
        backend: String,
        #[source]
        source: io::Error,
    },
    /// The phonemizer ran but exited non-zero.
    #[error("phonemizer backend failed with {status}: {stderr}")]
    BackendFailed { status: String, stderr: String },
    /// The subword tokenizer file couldn't be loaded or the text couldn't be encoded.
    #[error("tokenizer model error: {0}")]
    ModelLoad(String),
}

/// The external tool that turns a written word into phone symbols. Behind a trait so tests can
/// substitute a deterministic stub and so another backend can be slotted in for a new language
/// without touching the word2ph accounting.
pub trait PhonemizerBackend {
    /// Phonemize a single word, returning its phones in order. Punctuation-only tokens never
    /// reach the backend, [`g2p_tokenized`] passes them through as phones directly.
    fn phonemize_word(&self, word: &str) -> Result<Vec<String>, G2pError>;
}

/// Production backend shelling out to espeak-ng. One process per word keeps the word-to-phone
/// alignment trivial; throughput has never mattered here as g2p runs offline during dataset
/// preparation or once per utterance at inference.
pub struct EspeakBackend {
    binary: PathBuf,
    language: String,
}

impl EspeakBackend {
    /// Backend for the Indonesian voice using `espeak-ng` from `PATH`.
    pub fn indonesian() -> Self {
        Self::new("espeak-ng", "id")
    }

    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

impl PhonemizerBackend for EspeakBackend {
    fn phonemize_word(&self, word: &str) -> Result<Vec<String>, G2pError> {
        // -q suppresses audio, --ipa=3 emits IPA with phones separated so we can split without
        // knowing which IPA sequences are multi-character phones.
        let output = Command::new(&self.binary)
            .arg("-q")
            .arg("--ipa=3")
            .arg("--sep=-")
            .arg("-v")
            .arg(&self.language)
            .arg("--")
            .arg(word)
            .output()
            .map_err(|source| G2pError::BackendUnavailable {
                backend: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(G2pError::BackendFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let phones = stdout
            .split_whitespace()
            .flat_map(|chunk| chunk.split('-'))
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        Ok(phones)
    }
}

/// Whether a token is punctuation rather than something pronounceable.
fn is_punctuation(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| !c.is_alphanumeric())
}

/// Splits `n_phone` phones across `n_word` subword tokens as evenly as possible. Each phone goes
/// to the currently smallest bucket, earliest index winning ties, so leftovers land on the front
/// tokens: 7 phones over 3 tokens gives `[3, 2, 2]`.
pub fn distribute_phone(n_phone: usize, n_word: usize) -> Vec<usize> {
    if n_word == 0 {
        return vec![];
    }
    let mut phones_per_word = vec![0usize; n_word];
    for _ in 0..n_phone {
        let min_index = phones_per_word
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| **v)
            .map(|(i, _)| i)
            .unwrap_or(0);
        phones_per_word[min_index] += 1;
    }
    phones_per_word
}

/// Groups WordPiece tokens back into the words they were split from. A token starting with the
/// `##` continuation marker glues onto the previous group with the marker stripped; anything else
/// opens a new group.
pub fn group_subwords(tokens: &[String]) -> Vec<Vec<String>> {
    let mut groups: Vec<Vec<String>> = vec![];
    for token in tokens {
        if token.starts_with('#') {
            let stripped = token.trim_start_matches('#').to_string();
            // A continuation with nothing to glue to opens its own group, marker still stripped
            match groups.last_mut() {
                Some(group) => group.push(stripped),
                None => groups.push(vec![stripped]),
            }
        } else {
            groups.push(vec![token.clone()]);
        }
    }
    groups
}

/// The three parallel outputs a MeloTTS-style frontend needs for one utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct G2pOutput {
    /// Phone symbols in utterance order.
    pub phones: Vec<String>,
    /// One tone per phone. All zero for Indonesian, kept so the output shape matches tonal
    /// languages sharing the same model.
    pub tones: Vec<i64>,
    /// Phone count per subword token (plus a 1 at each end when padded).
    pub word2ph: Vec<usize>,
}

impl G2pOutput {
    /// Total number of phones, which always equals `word2ph`'s sum.
    pub fn len(&self) -> usize {
        self.phones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phones.is_empty()
    }
}

/// Runs g2p over already-tokenized text. Word-units are phonemized strictly in order so phone
/// order matches word order, and each word's phone count is distributed over its subword tokens.
///
/// With `pad_start_end` a [`PAD_PHONE`] sentinel (tone 0, word2ph 1) is added at both ends, which
/// is what the acoustic model expects for a full utterance. Callers slicing utterances into
/// fragments should pass `false` and pad once at the end.
pub fn g2p_tokenized(
    tokens: &[String],
    pad_start_end: bool,
    backend: &dyn PhonemizerBackend,
) -> Result<G2pOutput, G2pError> {
    let mut phones = vec![];
    let mut tones = vec![];
    let mut word2ph = vec![];

    for group in group_subwords(tokens) {
        let word: String = group.concat();
        let before = phones.len();

        // Punctuation tokens become their own phone rather than going through the backend,
        // which stays silent on them. The acoustic model has symbols for `. , ! ?` and losing
        // the terminal full stop audibly clips the end of an utterance.
        if is_punctuation(&word) {
            phones.push(word.clone());
            tones.push(0);
        } else {
            for phone in backend.phonemize_word(&word)? {
                phones.push(phone);
                tones.push(0);
            }
        }

        let phone_len = phones.len() - before;
        debug!("'{}' -> {} phones over {} tokens", word, phone_len, group.len());
        word2ph.extend(distribute_phone(phone_len, group.len()));
    }

    if pad_start_end {
        phones.insert(0, PAD_PHONE.to_string());
        phones.push(PAD_PHONE.to_string());
        tones.insert(0, 0);
        tones.push(0);
        word2ph.insert(0, 1);
        word2ph.push(1);
    }

    Ok(G2pOutput {
        phones,
        tones,
        word2ph,
    })
}

/// Convenience wrapper that tokenizes with the same subword tokenizer the BERT stage uses. The
/// text must already be through [`crate::text_normaliser::normalise`]; feeding the exact same
/// string to [`crate::bert::IndoBert::phone_level_features`] afterwards is what keeps the token
/// count and `word2ph` in agreement.
pub fn g2p(
    text: &str,
    pad_start_end: bool,
    backend: &dyn PhonemizerBackend,
    tokenizer: &Tokenizer,
) -> Result<G2pOutput, G2pError> {
    let encoding = tokenizer
        .encode(text, false)
        .map_err(|e| G2pError::ModelLoad(e.to_string()))?;
    g2p_tokenized(encoding.get_tokens(), pad_start_end, backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One phone per letter, deterministic, no external binary needed. Silent on anything
    /// unpronounceable, the same way the real espeak voice is.
    struct SpellOut;

    impl PhonemizerBackend for SpellOut {
        fn phonemize_word(&self, word: &str) -> Result<Vec<String>, G2pError> {
            Ok(word
                .chars()
                .filter(|c| c.is_alphabetic())
                .map(|c| c.to_string())
                .collect())
        }
    }

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn distribute_phone_near_even() {
        assert_eq!(distribute_phone(7, 3), vec![3, 2, 2]);
        assert_eq!(distribute_phone(4, 2), vec![2, 2]);
        assert_eq!(distribute_phone(2, 3), vec![1, 1, 0]);
        assert_eq!(distribute_phone(0, 2), vec![0, 0]);
        // No tokens to distribute over, even if phones somehow exist
        assert_eq!(distribute_phone(0, 0), Vec::<usize>::new());
        assert_eq!(distribute_phone(1, 0), Vec::<usize>::new());
        // Sum is preserved and buckets differ by at most one
        for (n_phone, n_word) in [(13, 4), (9, 9), (1, 5), (20, 3)] {
            let split = distribute_phone(n_phone, n_word);
            assert_eq!(split.iter().sum::<usize>(), n_phone);
            let max = *split.iter().max().unwrap();
            let min = *split.iter().min().unwrap();
            assert!(max - min <= 1, "{:?}", split);
        }
    }

    #[test]
    fn subword_grouping() {
        let groups = group_subwords(&toks(&["ber", "##warna", "merah", "tua"]));
        assert_eq!(
            groups,
            vec![
                vec!["ber".to_string(), "warna".to_string()],
                vec!["merah".to_string()],
                vec!["tua".to_string()],
            ]
        );
    }

    #[test]
    fn leading_continuation_still_loses_marker() {
        let groups = group_subwords(&toks(&["##kata", "dua"]));
        assert_eq!(
            groups,
            vec![vec!["kata".to_string()], vec!["dua".to_string()]]
        );
    }

    #[test]
    fn terminal_punctuation_kept_as_phone() {
        // Matches the reference frontend: "saya." comes out as _ s a y a . _
        let out = g2p_tokenized(&toks(&["saya", "."]), true, &SpellOut).unwrap();
        assert_eq!(out.phones, vec!["_", "s", "a", "y", "a", ".", "_"]);
        assert_eq!(out.word2ph, vec![1, 4, 1, 1]);
        assert_eq!(out.word2ph.iter().sum::<usize>(), out.phones.len());
    }

    #[test]
    fn mid_sentence_punctuation_kept_as_phone() {
        let out = g2p_tokenized(&toks(&["ya", ",", "tentu", "!"]), false, &SpellOut).unwrap();
        assert_eq!(out.phones, vec!["y", "a", ",", "t", "e", "n", "t", "u", "!"]);
        assert_eq!(out.word2ph, vec![2, 1, 5, 1]);
    }

    #[test]
    fn parallel_lengths_hold() {
        let out = g2p_tokenized(&toks(&["saya", "suka", "baju"]), true, &SpellOut).unwrap();
        assert_eq!(out.phones.len(), out.tones.len());
        assert_eq!(out.word2ph.iter().sum::<usize>(), out.phones.len());
        assert!(out.tones.iter().all(|t| *t == 0));
    }

    #[test]
    fn padding_sentinels() {
        let out = g2p_tokenized(&toks(&["saya"]), true, &SpellOut).unwrap();
        assert_eq!(out.phones.first().map(String::as_str), Some(PAD_PHONE));
        assert_eq!(out.phones.last().map(String::as_str), Some(PAD_PHONE));
        assert_eq!(out.word2ph.first(), Some(&1));
        assert_eq!(out.word2ph.last(), Some(&1));

        let unpadded = g2p_tokenized(&toks(&["saya"]), false, &SpellOut).unwrap();
        assert_eq!(unpadded.phones.len() + 2, out.phones.len());
    }

    #[test]
    fn word2ph_follows_subword_split() {
        // "berwarna" as two subwords: 8 phones distributed [4, 4]
        let out = g2p_tokenized(&toks(&["ber", "##warna"]), false, &SpellOut).unwrap();
        assert_eq!(out.phones.len(), 8);
        assert_eq!(out.word2ph, vec![4, 4]);
    }

    #[test]
    fn deterministic_for_fixed_backend() {
        let tokens = toks(&["saya"]);
        let a = g2p_tokenized(&tokens, true, &SpellOut).unwrap();
        let b = g2p_tokenized(&tokens, true, &SpellOut).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_binary_is_backend_unavailable() {
        let backend = EspeakBackend::new("/nonexistent/espeak-ng", "id");
        match backend.phonemize_word("saya") {
            Err(G2pError::BackendUnavailable { .. }) => {}
            other => panic!("expected BackendUnavailable, got {:?}", other.map(|_| ())),
        }
    }
}
