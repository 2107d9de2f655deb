use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::Context as _;

use crate::cache::{self, Fingerprint, Memo};
use crate::cli::{RuleArgs, SplitArgs, TextArgs};
use crate::formats::ChapterRecord;
use crate::rules::{self, TitleRules};
use crate::segment::{self, Chapter};
use crate::text::NovelText;

static SEGMENTS: LazyLock<Memo<Vec<Chapter>>> = LazyLock::new(Memo::new);

/// A decoded input split into chapters.
#[derive(Debug)]
pub struct Segmented {
    pub text: NovelText,
    pub rules: TitleRules,
    pub fingerprint: Fingerprint,
    pub chapters: Arc<Vec<Chapter>>,
}

/// Reads, decodes and segments the input, logging any warnings.
pub fn load(text_args: &TextArgs, rule_args: &RuleArgs) -> anyhow::Result<Segmented> {
    let input = PathBuf::from(&text_args.input);
    let rules = rules::load(
        rule_args.rules.as_deref().map(Path::new),
        &rule_args.allow,
        &rule_args.block,
    )
    .context("load title rules")?;

    let text = NovelText::read(&input, text_args.encoding.as_deref())?;
    let lines = text.lines(text_args.remove_empty_lines);
    // Keyed on the lines actually segmented, so `--remove-empty-lines` gets its own entry.
    let segmented_text = lines.join("\n");
    let fingerprint = Fingerprint::of_text(segmented_text.as_bytes(), &rules);
    let chapters = cache::segment_cached(&SEGMENTS, segmented_text.as_bytes(), &lines, &rules);

    tracing::info!(
        input = %input.display(),
        lines = lines.len(),
        chapters = chapters.len(),
        %fingerprint,
        "segmented"
    );
    for warning in segment::warnings(&rules, &chapters) {
        tracing::warn!("{warning}");
    }

    Ok(Segmented {
        text,
        rules,
        fingerprint,
        chapters,
    })
}

pub fn run(args: SplitArgs) -> anyhow::Result<()> {
    let segmented = load(&args.text, &args.rules)?;

    let mut out = std::io::stdout().lock();
    for (index, chapter) in segmented.chapters.iter().enumerate() {
        let record = ChapterRecord {
            index,
            title: chapter.title.clone(),
            line_count: chapter.line_count(),
            preview: chapter.text(Some(args.preview_lines)),
        };
        serde_json::to_writer(&mut out, &record).context("serialize chapter record")?;
        out.write_all(b"\n").context("write chapter record newline")?;
    }
    out.flush().context("flush chapter records")?;
    Ok(())
}
