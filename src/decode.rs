use std::path::PathBuf;

use anyhow::Context as _;
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

use crate::cli::DetectArgs;

/// Candidate encodings for `bytes`, most plausible first.
///
/// Order: the encoding declared by a byte-order mark, UTF-8 when the bytes are valid
/// UTF-8, then the statistical guess. Duplicates are dropped.
pub fn detect_encodings(bytes: &[u8]) -> Vec<&'static Encoding> {
    let mut candidates = Vec::new();
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        candidates.push(encoding);
    }
    if std::str::from_utf8(bytes).is_ok() {
        candidates.push(UTF_8);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    candidates.push(detector.guess(None, true));

    let mut unique = Vec::with_capacity(candidates.len());
    for encoding in candidates {
        if !unique.contains(&encoding) {
            unique.push(encoding);
        }
    }
    unique
}

/// Decodes `bytes` as `encoding`, replacing malformed sequences with U+FFFD.
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        tracing::warn!(
            encoding = encoding.name(),
            "input had malformed sequences; replaced with U+FFFD"
        );
    }
    text.into_owned()
}

/// The encoding named by `label`, or the best detected candidate.
pub fn resolve_encoding(label: Option<&str>, bytes: &[u8]) -> anyhow::Result<&'static Encoding> {
    if let Some(label) = label {
        return Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| anyhow::anyhow!("unknown encoding label: {label}"));
    }
    detect_encodings(bytes)
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no encoding candidates"))
}

pub fn run(args: DetectArgs) -> anyhow::Result<()> {
    let path = PathBuf::from(&args.input);
    let bytes = std::fs::read(&path).with_context(|| format!("read input: {}", path.display()))?;
    for encoding in detect_encodings(&bytes) {
        println!("{}", encoding.name());
    }
    Ok(())
}
