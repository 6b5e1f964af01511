//! RFC 2047 header values <-> ordered (text, charset) fragments.
//!
//! `decode` keeps the charset each run of text arrived in so that `encode`
//! can write untouched runs back in the same charset after a rewrite.

use std::borrow::Cow;
use std::sync::LazyLock;

use base64::{Engine as _, engine::general_purpose};
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;

use crate::domain::header::EncodedHeaderFragment;

/// RFC 2047 caps an encoded word at 75 characters and a line holding one at 76.
const MAX_WORD_LEN: usize = 75;
const MAX_LINE_LEN: usize = 76;
const MIN_PAYLOAD: usize = 8;

static ENCODED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=\?([^?]*?)\?([qQbB])\?(.*?)\?=").expect("encoded-word pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("header value is not valid UTF-8")]
    NotUtf8,
    #[error("invalid base64 in encoded word {0:?}")]
    Base64(String),
    #[error("invalid quoted-printable escape in encoded word {0:?}")]
    QuotedPrintable(String),
    #[error("unknown charset {0:?}")]
    UnknownCharset(String),
    #[error("encoded word is not valid {0}")]
    InvalidText(String),
}

#[derive(Debug)]
enum Word {
    Plain(String),
    Encoded { charset: String, bytes: Vec<u8> },
}

impl Word {
    fn is_encoded(&self) -> bool {
        matches!(self, Word::Encoded { .. })
    }

    fn is_blank(&self) -> bool {
        matches!(self, Word::Plain(s) if s.chars().all(char::is_whitespace))
    }

    /// Merges `next` into `self` when both are encoded in the same charset.
    fn absorb(&mut self, next: &Word) -> bool {
        match (self, next) {
            (
                Word::Encoded { charset, bytes },
                Word::Encoded {
                    charset: next_charset,
                    bytes: next_bytes,
                },
            ) if charset == next_charset => {
                bytes.extend_from_slice(next_bytes);
                true
            }
            _ => false,
        }
    }
}

/// Splits a raw header value into fragments.
///
/// A value without any encoded word comes back as a single native fragment,
/// byte for byte (folding included). Otherwise the value is unfolded first:
/// line breaks go, the whitespace after them stays as part of the text.
pub fn decode(raw: &str) -> Result<Vec<EncodedHeaderFragment>, DecodeError> {
    if !ENCODED_WORD.is_match(raw) {
        return Ok(vec![EncodedHeaderFragment::native(raw)]);
    }

    let unfolded = unfold(raw);
    let mut words = Vec::new();
    let mut cursor = 0;
    for caps in ENCODED_WORD.captures_iter(&unfolded) {
        let Some(whole) = caps.get(0) else { continue };
        push_plain(&mut words, &unfolded[cursor..whole.start()]);
        words.push(Word::Encoded {
            charset: normalize_charset(&caps[1]),
            bytes: decode_payload(&caps[2], &caps[3])?,
        });
        cursor = whole.end();
    }
    push_plain(&mut words, &unfolded[cursor..]);

    // whitespace between two encoded words is not part of the value
    let keep: Vec<bool> = (0..words.len())
        .map(|i| {
            !(i > 0
                && i + 1 < words.len()
                && words[i].is_blank()
                && words[i - 1].is_encoded()
                && words[i + 1].is_encoded())
        })
        .collect();

    let mut runs: Vec<Word> = Vec::with_capacity(words.len());
    for word in words.into_iter().zip(keep).filter_map(|(w, k)| k.then_some(w)) {
        if let Some(last) = runs.last_mut()
            && last.absorb(&word)
        {
            continue;
        }
        runs.push(word);
    }

    runs.into_iter()
        .map(|run| match run {
            Word::Plain(text) => Ok(EncodedHeaderFragment::native(text)),
            Word::Encoded { charset, bytes } => {
                let text = charset_text(&charset, &bytes)?;
                Ok(EncodedHeaderFragment::encoded(text, charset))
            }
        })
        .collect()
}

/// Joins fragments back into one header value starting at column 0.
pub fn encode(fragments: &[EncodedHeaderFragment]) -> String {
    encode_at(fragments, 0)
}

/// Joins fragments back into one transport-safe header value.
///
/// `column` is where the value starts on its line (`Subject: ` puts it at 9).
/// Encoded words go back exactly where their text was; consecutive encoded
/// fragments are separated by a space. A value holding encoded words is folded
/// before whitespace so no line passes 76 characters. A value without any is
/// returned verbatim.
pub fn encode_at(fragments: &[EncodedHeaderFragment], column: usize) -> String {
    let mut out = String::new();
    let mut after_word = false;
    let mut any_word = false;

    for fragment in fragments {
        match fragment.charset.as_deref() {
            None => {
                if fragment.text.is_empty() {
                    continue;
                }
                out.push_str(&fragment.text);
                after_word = false;
            }
            Some(charset) => {
                if after_word {
                    out.push(' ');
                }
                out.push_str(&encode_words(&fragment.text, charset).join(" "));
                after_word = true;
                any_word = true;
            }
        }
    }

    if any_word { fold(&out, column) } else { out }
}

fn unfold(raw: &str) -> String {
    raw.replace("\r\n", "").replace('\n', "")
}

/// Breaks `value` with CRLF before a space or tab wherever the current line
/// would otherwise pass `MAX_LINE_LEN`. Unfolding gives back `value`.
fn fold(value: &str, column: usize) -> String {
    let mut out = String::with_capacity(value.len() + 16);
    let mut line_len = column;
    let mut line_has_text = false;

    for piece in split_before_whitespace(value) {
        let has_text = !piece.trim().is_empty();
        if line_has_text
            && has_text
            && line_len + piece.len() > MAX_LINE_LEN
            && piece.starts_with([' ', '\t'])
        {
            out.push_str("\r\n");
            line_len = 0;
        }
        out.push_str(piece);
        line_len = match piece.rfind('\n') {
            Some(i) => piece.len() - i - 1,
            None => line_len + piece.len(),
        };
        line_has_text |= has_text;
    }
    out
}

/// `"a b  c"` -> `["a", " b", " ", " c"]`
fn split_before_whitespace(value: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, c) in value.char_indices() {
        if i > start && matches!(c, ' ' | '\t') {
            pieces.push(&value[start..i]);
            start = i;
        }
    }
    if start < value.len() {
        pieces.push(&value[start..]);
    }
    pieces
}

fn push_plain(words: &mut Vec<Word>, text: &str) {
    if !text.is_empty() {
        words.push(Word::Plain(text.to_string()));
    }
}

/// Lower-cases the label and drops an RFC 2231 language suffix (`utf-8*en`).
fn normalize_charset(label: &str) -> String {
    label
        .split('*')
        .next()
        .unwrap_or(label)
        .trim()
        .to_ascii_lowercase()
}

fn decode_payload(scheme: &str, payload: &str) -> Result<Vec<u8>, DecodeError> {
    if scheme.eq_ignore_ascii_case("q") {
        decode_q(payload)
    } else {
        decode_b(payload)
    }
}

fn decode_q(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let byte = bytes
                    .get(i + 1..i + 3)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or_else(|| DecodeError::QuotedPrintable(payload.to_string()))?;
                out.push(byte);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Ok(out)
}

fn decode_b(payload: &str) -> Result<Vec<u8>, DecodeError> {
    // senders routinely drop the trailing padding
    let padded = match payload.len() % 4 {
        0 => Cow::Borrowed(payload),
        1 => return Err(DecodeError::Base64(payload.to_string())),
        n => Cow::Owned(format!("{payload}{}", &"=="[..4 - n])),
    };
    general_purpose::STANDARD
        .decode(padded.as_bytes())
        .map_err(|_| DecodeError::Base64(payload.to_string()))
}

fn charset_text(charset: &str, bytes: &[u8]) -> Result<String, DecodeError> {
    let encoding = Encoding::for_label(charset.as_bytes())
        .ok_or_else(|| DecodeError::UnknownCharset(charset.to_string()))?;
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
        .ok_or_else(|| DecodeError::InvalidText(charset.to_string()))
}

#[derive(Clone, Copy)]
enum Scheme {
    Q,
    B,
}

impl Scheme {
    fn tag(self) -> &'static str {
        match self {
            Scheme::Q => "q",
            Scheme::B => "b",
        }
    }

    fn payload(self, bytes: &[u8]) -> String {
        match self {
            Scheme::Q => encode_q(bytes),
            Scheme::B => general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// Picks the encoding to write `text` in. Falls back to UTF-8 when the
/// fragment's own charset is unknown, cannot represent the text, or is one
/// encoding_rs only decodes (UTF-16).
fn target_encoding<'a>(text: &str, label: &'a str) -> (&'static Encoding, &'a str) {
    if matches!(label, "us-ascii" | "ascii") && !text.is_ascii() {
        return (UTF_8, "utf-8");
    }
    match Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            let (_, used, unmappable) = encoding.encode(text);
            if used == encoding && !unmappable {
                (encoding, label)
            } else {
                (UTF_8, "utf-8")
            }
        }
        None => (UTF_8, "utf-8"),
    }
}

fn encode_words(text: &str, label: &str) -> Vec<String> {
    let (encoding, label) = target_encoding(text, label);
    if text.is_empty() {
        return vec![format!("=?{label}?q??=")];
    }
    let scheme = if prefers_q(text) {
        Scheme::Q
    } else {
        Scheme::B
    };
    let budget = MAX_WORD_LEN
        .saturating_sub(label.len() + 7)
        .max(MIN_PAYLOAD);

    // grow each chunk a character at a time so no character is split
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        let mut candidate = current.clone();
        candidate.push(ch);
        let len = scheme.payload(&encoding.encode(&candidate).0).len();
        if len > budget && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current.push(ch);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
        .iter()
        .map(|chunk| {
            let payload = scheme.payload(&encoding.encode(chunk).0);
            format!("=?{label}?{}?{payload}?=", scheme.tag())
        })
        .collect()
}

fn is_q_literal(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'!' | b'*' | b'+' | b'-' | b'/')
}

/// Q reads better than B unless a third or more of the characters need escaping.
fn prefers_q(text: &str) -> bool {
    let total = text.chars().count();
    let escaped = text
        .chars()
        .filter(|&c| c != ' ' && !(c.is_ascii() && is_q_literal(c as u8)))
        .count();
    escaped * 3 < total
}

fn encode_q(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        if b == b' ' {
            out.push('_');
        } else if is_q_literal(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("={b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str, charset: Option<&str>) -> EncodedHeaderFragment {
        EncodedHeaderFragment {
            text: text.to_string(),
            charset: charset.map(str::to_string),
        }
    }

    #[test]
    fn plain_value_is_one_native_fragment() {
        let raw = "[jira] Commented: (HADOOP-5649) Enable ServicePlugins for the\r\n JobTracker";
        assert_eq!(decode(raw).unwrap(), vec![frag(raw, None)]);
    }

    #[test]
    fn decodes_q_and_b_words_with_their_charsets() {
        let raw = "Re: =?UTF-8?Q?Hello_w=C3=B6rld?= and =?iso-8859-1?B?6XTp?=";
        assert_eq!(
            decode(raw).unwrap(),
            vec![
                frag("Re: ", None),
                frag("Hello wörld", Some("utf-8")),
                frag(" and ", None),
                frag("été", Some("iso-8859-1")),
            ]
        );
    }

    #[test]
    fn adjacent_words_in_one_charset_merge_before_decoding() {
        // "Grüße" split in the middle of the two-byte "ü"
        let raw = "=?utf-8?q?Gr=C3?=\r\n =?utf-8?q?=BC=C3=9Fe?=";
        assert_eq!(decode(raw).unwrap(), vec![frag("Grüße", Some("utf-8"))]);
    }

    #[test]
    fn whitespace_between_different_charsets_is_dropped() {
        let raw = "=?iso-8859-1?q?=E9t=E9?= =?utf-8?b?5pel5pys6Kqe?=";
        assert_eq!(
            decode(raw).unwrap(),
            vec![frag("été", Some("iso-8859-1")), frag("日本語", Some("utf-8"))]
        );
    }

    #[test]
    fn unpadded_base64_is_accepted() {
        let raw = "=?utf-8?b?R3LDvMOfZQ?=";
        assert_eq!(decode(raw).unwrap(), vec![frag("Grüße", Some("utf-8"))]);
    }

    #[test]
    fn malformed_words_are_errors() {
        assert_eq!(
            decode("=?utf-8?b?!!!!?="),
            Err(DecodeError::Base64("!!!!".to_string()))
        );
        assert_eq!(
            decode("=?utf-8?q?bad=ZZ?="),
            Err(DecodeError::QuotedPrintable("bad=ZZ".to_string()))
        );
        assert_eq!(
            decode("=?x-no-such-charset?q?abc?="),
            Err(DecodeError::UnknownCharset("x-no-such-charset".to_string()))
        );
        assert_eq!(
            decode("=?utf-8?q?=FF?="),
            Err(DecodeError::InvalidText("utf-8".to_string()))
        );
    }

    #[test]
    fn encode_prefers_q_for_mostly_ascii() {
        assert_eq!(
            encode(&[frag("Hello wörld", Some("utf-8"))]),
            "=?utf-8?q?Hello_w=C3=B6rld?="
        );
    }

    #[test]
    fn encode_uses_b_for_mostly_non_ascii() {
        assert_eq!(
            encode(&[frag("日本語", Some("utf-8"))]),
            "=?utf-8?b?5pel5pys6Kqe?="
        );
    }

    #[test]
    fn encode_keeps_native_text_verbatim() {
        assert_eq!(
            encode(&[frag("Re: ", None), frag("wörld", Some("utf-8")), frag(" ok", None)]),
            "Re: =?utf-8?q?w=C3=B6rld?= ok"
        );
    }

    #[test]
    fn encode_puts_words_back_against_touching_text() {
        assert_eq!(
            encode(&[frag("(", None), frag("wörld", Some("utf-8")), frag(")", None)]),
            "(=?utf-8?q?w=C3=B6rld?=)"
        );
        assert_eq!(
            encode(&[frag("été", Some("iso-8859-1")), frag("日本", Some("utf-8"))]),
            "=?iso-8859-1?b?6XTp?= =?utf-8?b?5pel5pys?="
        );
    }

    #[test]
    fn empty_encoded_fragment_is_kept() {
        assert_eq!(
            encode(&[frag("x ", None), frag("", Some("utf-8"))]),
            "x =?utf-8?q??="
        );
    }

    #[test]
    fn folded_value_keeps_whitespace_next_to_words() {
        let raw = "Fix for\r\n =?utf-8?q?M=C3=BCller?=\r\n report";
        assert_eq!(
            decode(raw).unwrap(),
            vec![
                frag("Fix for ", None),
                frag("Müller", Some("utf-8")),
                frag(" report", None),
            ]
        );
    }

    #[test]
    fn long_values_fold_under_the_line_limit() {
        let fragments = vec![
            frag("(HDFS-1) ", None),
            frag(&"ü".repeat(40), Some("utf-8")),
            frag(" and ", None),
            frag(&"日本語".repeat(8), Some("utf-8")),
            frag(" end", None),
        ];
        let encoded = encode_at(&fragments, "Subject: ".len());
        let mut lines = encoded.split("\r\n");
        let first = lines.next().unwrap();
        assert!("Subject: ".len() + first.len() <= MAX_LINE_LEN, "{encoded}");
        for line in lines {
            assert!(line.starts_with(' '), "{encoded}");
            assert!(line.len() <= MAX_LINE_LEN, "{encoded}");
        }
        assert!(encoded.contains("\r\n"));
        assert_eq!(decode(&encoded).unwrap(), fragments);
    }

    #[test]
    fn plain_values_are_never_refolded() {
        let text = "word ".repeat(30);
        assert_eq!(encode_at(&[frag(&text, None)], 9), text);
    }

    #[test]
    fn long_fragments_split_into_short_words() {
        let text = "ü".repeat(60);
        let encoded = encode(&[frag(&text, Some("utf-8"))]);
        assert!(encoded.split_whitespace().count() > 1);
        assert!(encoded.split_whitespace().all(|w| w.len() <= MAX_WORD_LEN));
        assert_eq!(decode(&encoded).unwrap(), vec![frag(&text, Some("utf-8"))]);
    }

    #[test]
    fn unrepresentable_text_falls_back_to_utf8() {
        assert_eq!(
            encode(&[frag("日本", Some("iso-8859-1"))]),
            "=?utf-8?b?5pel5pys?="
        );
    }

    #[test]
    fn round_trip_preserves_fragments() {
        for raw in [
            "plain subject",
            "Re: =?UTF-8?Q?Hello_w=C3=B6rld?= and =?iso-8859-1?B?6XTp?=",
            "=?iso-8859-1?q?=E9t=E9?= =?utf-8?b?5pel5pys6Kqe?= (HADOOP-1) tail",
            "=?koi8-r?b?8NLJ18XU?= =?utf-8?q?=3F_question?=",
            "[jira] Commented: (HADOOP-1) Fix for\r\n =?utf-8?q?M=C3=BCller?=\r\n report",
            "=?utf-8?q?a?=\r\n\t=?iso-8859-1?q?=E9?=\r\n tail",
            "x =?utf-8?q??=",
            "(=?utf-8?q?a?=)",
        ] {
            let fragments = decode(raw).unwrap();
            assert_eq!(decode(&encode(&fragments)).unwrap(), fragments, "{raw}");
        }
    }
}
