use std::fmt;

use serde::Serialize;

use crate::rules::TitleRules;

/// Title of the chapter collecting everything before the first detected title.
pub const HEAD_TITLE: &str = "Head";

/// Chapters with more body lines than this usually mean the title rules missed something.
pub const LARGE_CHAPTER_LINES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub title: String,
    pub lines: Vec<String>,
}

impl Chapter {
    fn head() -> Self {
        Self::titled(HEAD_TITLE)
    }

    fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Body joined with `\n`, optionally limited to the first `line_limit` lines.
    pub fn text(&self, line_limit: Option<usize>) -> String {
        let limit = line_limit.unwrap_or(self.lines.len());
        self.lines
            .iter()
            .take(limit)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Splits `lines` into chapters in a single forward pass.
///
/// The first chapter is always the [`HEAD_TITLE`] chapter holding the lines before the
/// first title (possibly none). Each title line opens a new chapter named after the
/// line verbatim; every other line is appended to the chapter currently open.
pub fn segment<S: AsRef<str>>(lines: &[S], rules: &TitleRules) -> Vec<Chapter> {
    let (mut completed, current) = lines.iter().map(|line| line.as_ref()).fold(
        (Vec::new(), Chapter::head()),
        |(mut completed, mut current), line: &str| {
            if rules.is_title(line) {
                tracing::trace!(
                    title = line,
                    pattern = rules.matching_pattern(line),
                    "title line"
                );
                completed.push(current);
                (completed, Chapter::titled(line))
            } else {
                current.lines.push(line.to_owned());
                (completed, current)
            }
        },
    );
    completed.push(current);
    completed
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The same literal appears in both the allow and the block list.
    SharedRuleEntry(String),
    LargeChapter {
        index: usize,
        title: String,
        lines: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedRuleEntry(entry) => {
                write!(f, "block list and allow list share the entry {entry:?}")
            }
            Self::LargeChapter {
                index,
                title,
                lines,
            } => write!(
                f,
                "chapter {index} ({title:?}) has {lines} lines (> {LARGE_CHAPTER_LINES}); the title rules may be wrong"
            ),
        }
    }
}

/// Non-fatal anomalies in the rules or the resulting chapters.
pub fn warnings(rules: &TitleRules, chapters: &[Chapter]) -> Vec<Warning> {
    let shared = rules
        .shared_entries()
        .into_iter()
        .map(|entry| Warning::SharedRuleEntry(entry.to_owned()));
    let large = chapters
        .iter()
        .enumerate()
        .filter(|(_, ch)| ch.line_count() > LARGE_CHAPTER_LINES)
        .map(|(index, ch)| Warning::LargeChapter {
            index,
            title: ch.title.clone(),
            lines: ch.line_count(),
        });
    shared.chain(large).collect()
}
