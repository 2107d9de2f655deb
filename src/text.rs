use std::path::{Path, PathBuf};

use anyhow::Context as _;
use encoding_rs::Encoding;

use crate::decode;

/// A decoded plain-text novel.
#[derive(Debug, Clone)]
pub struct NovelText {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub encoding: &'static Encoding,
    pub content: String,
}

impl NovelText {
    pub fn read(path: &Path, encoding_label: Option<&str>) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read input: {}", path.display()))?;
        let encoding = decode::resolve_encoding(encoding_label, &bytes)
            .with_context(|| format!("resolve encoding: {}", path.display()))?;
        let content = decode::decode(&bytes, encoding);
        tracing::info!(
            input = %path.display(),
            encoding = encoding.name(),
            chars = content.chars().count(),
            "decoded input"
        );
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            encoding,
            content,
        })
    }

    pub fn lines(&self, remove_empty: bool) -> Vec<&str> {
        split_lines(&self.content, remove_empty)
    }

    /// File name with a trailing `.txt` removed.
    pub fn default_title(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.strip_suffix(".txt") {
            Some(stem) => stem.to_owned(),
            None => name,
        }
    }
}

/// Splits on `\n`, dropping a trailing `\r` from each line.
///
/// Unlike [`str::lines`], a trailing newline yields a final empty line.
pub fn split_lines(content: &str, remove_empty: bool) -> Vec<&str> {
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !remove_empty || !line.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_lines_strips_carriage_returns() {
        assert_eq!(split_lines("a\r\nb\n", false), vec!["a", "b", ""]);
    }

    #[test]
    fn split_lines_can_drop_blank_lines() {
        assert_eq!(split_lines("a\n\n  \nb", true), vec!["a", "b"]);
    }

    #[test]
    fn empty_content_is_one_empty_line() {
        assert_eq!(split_lines("", false), vec![""]);
        assert!(split_lines("", true).is_empty());
    }

    #[test]
    fn read_decodes_and_derives_title() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("我的小說.txt");
        std::fs::write(&path, "序\n第一章\n")?;

        let text = NovelText::read(&path, None)?;
        assert_eq!(text.encoding, encoding_rs::UTF_8);
        assert_eq!(text.lines(false), vec!["序", "第一章", ""]);
        assert_eq!(text.default_title(), "我的小說");
        Ok(())
    }
}
