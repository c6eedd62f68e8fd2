//! Text normalisation for Indonesian transcripts before they hit the g2p stage. The datasets
//! we've worked with are scraped or OCR'd so they carry characters with no phonetic value (stray
//! guillemets, curly quotes, brackets) plus the odd bit of broken UTF-8 like non-breaking spaces
//! and NEXT LINE control characters. Everything here is plain string surgery, the phonetic
//! decisions live in [`crate::g2p`].
use once_cell::sync::OnceCell;
use regex::Regex;

/// Characters stripped outright because they carry no phonetic value. Sentence punctuation the
/// g2p stage emits as its own phones (`. , ! ?`) is deliberately kept.
const BAD_CHARS: [char; 10] = [';', '»', '”', '“', '‘', '’', '(', ')', '[', ']'];

/// Normalises a raw transcript or user input into the form the g2p stage expects:
///
/// 1. strips the punctuation blacklist
/// 2. maps non-breaking spaces and NEL control characters to plain spaces
/// 3. collapses newlines/tabs/runs of whitespace into single spaces and trims
/// 4. appends a full stop if the text doesn't already end a sentence
///
/// Running this on already-normalised text is a no-op, which lets callers normalise defensively
/// without tracking whether an input has been through the pipeline before.
pub fn normalise(text: &str) -> String {
    static WHITESPACE: OnceCell<Regex> = OnceCell::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").unwrap());

    let mut s: String = text
        .chars()
        .filter(|c| !BAD_CHARS.contains(c))
        .map(|c| match c {
            '\u{00a0}' | '\u{0085}' => ' ',
            '\r' | '\n' | '\t' => ' ',
            c => c,
        })
        .collect();

    s = whitespace.replace_all(&s, " ").trim().to_string();

    if !s.is_empty() && !s.ends_with(['.', '!', '?']) {
        s.push('.');
    }
    s
}

/// Whether the text ends in sentence-final punctuation. Used by the dataset tooling to spot
/// transcripts that got truncated mid-sentence.
pub fn ends_sentence(text: &str) -> bool {
    text.ends_with(['.', '!', '?'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bad_characters() {
        assert_eq!(normalise("“saya suka” (sekali)"), "saya suka sekali.");
        assert_eq!(normalise("dia; “berkata” [pelan]"), "dia berkata pelan.");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(
            normalise("saya\tsuka\r\nbaju   merah"),
            "saya suka baju merah."
        );
        assert_eq!(normalise("halo\u{00a0}dunia\u{0085}baru"), "halo dunia baru.");
    }

    #[test]
    fn terminal_punctuation_added_once() {
        assert_eq!(normalise("apa kabar?"), "apa kabar?");
        assert_eq!(normalise("selamat pagi"), "selamat pagi.");
        assert_eq!(normalise("bagus!"), "bagus!");
    }

    #[test]
    fn idempotent_on_normalised_input() {
        let once = normalise("  saya suka “baju”  berwarna \n merah tua ");
        assert_eq!(normalise(&once), once);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalise(""), "");
        assert_eq!(normalise("   \n\t "), "");
    }
}
