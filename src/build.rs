use std::path::{Path, PathBuf};

use anyhow::Context as _;
use sha2::{Digest as _, Sha256};

use crate::book::{self, BookOptions, ImageFile};
use crate::cache::Fingerprint;
use crate::cli::{BuildArgs, MetadataArgs};
use crate::cover;
use crate::epub;
use crate::segment::Chapter;
use crate::split;

/// Lines of the head chapter used as the introduction when none is given.
const DEFAULT_INTRO_LINES: usize = 500;

pub fn run(args: BuildArgs) -> anyhow::Result<()> {
    let out_path = PathBuf::from(&args.out);
    if out_path.exists() && !args.metadata.force {
        anyhow::bail!("epub output already exists: {}", out_path.display());
    }

    tracing::info!(input = %args.text.input, "build: split");
    let segmented = split::load(&args.text, &args.rules).context("split")?;

    let title = args
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| segmented.text.default_title());
    let mut options = book_options(&args.metadata, title)?;
    if options.intro.is_none() {
        options.intro = default_intro(&segmented.chapters);
    }
    options.identifier = Some(book_identifier(&segmented.fingerprint, &options));

    tracing::info!(
        title = %options.title,
        chapters = segmented.chapters.len().saturating_sub(1),
        "build: assemble"
    );
    let book = book::build_book(options, &segmented.chapters).context("assemble book")?;

    tracing::info!(out = %out_path.display(), "build: write epub");
    epub::write_epub(&book, &out_path, args.metadata.force).context("write epub")?;
    Ok(())
}

/// Book options shared by the text and image commands.
pub(crate) fn book_options(metadata: &MetadataArgs, title: String) -> anyhow::Result<BookOptions> {
    let intro = match (&metadata.intro, &metadata.intro_file) {
        (Some(intro), _) => Some(intro.clone()),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path).with_context(|| format!("read intro: {path}"))?,
        ),
        (None, None) => None,
    };

    Ok(BookOptions {
        title,
        author: metadata.author.clone(),
        intro: intro.map(|i| i.trim().to_owned()),
        cover: load_cover(metadata)?,
        language: metadata.lang.clone(),
        identifier: None,
        modified: None,
    })
}

fn load_cover(metadata: &MetadataArgs) -> anyhow::Result<Option<ImageFile>> {
    if let Some(path) = &metadata.cover {
        return ImageFile::read(Path::new(path))
            .context("read cover")
            .map(Some);
    }
    let Some(url) = &metadata.cover_url else {
        return Ok(None);
    };
    match cover::fetch_image(url) {
        Ok(image) => Ok(downloaded_cover(image)),
        Err(err) => {
            tracing::warn!(error = %err, "cover download failed; building without a cover");
            Ok(None)
        }
    }
}

/// A downloaded cover is optional, so one the book cannot package is dropped.
fn downloaded_cover(image: ImageFile) -> Option<ImageFile> {
    if epub::media_type_for_image(&image.name).is_none() {
        tracing::warn!(
            name = %image.name,
            "downloaded cover is not a supported image; building without a cover"
        );
        return None;
    }
    Some(image)
}

/// `urn:uuid:` v5 over the segmented text's fingerprint and the book metadata.
///
/// Rebuilding the same input with the same options keeps the identifier.
fn book_identifier(fingerprint: &Fingerprint, options: &BookOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    for field in [
        Some(options.title.as_str()),
        options.author.as_deref(),
        options.intro.as_deref(),
        options.language.as_deref(),
        options.cover.as_ref().map(|c| c.name.as_str()),
    ] {
        match field {
            Some(value) => {
                hasher.update([1u8]);
                hasher.update((value.len() as u64).to_le_bytes());
                hasher.update(value.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    if let Some(cover) = &options.cover {
        hasher.update(&cover.data);
    }
    let uuid = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, &hasher.finalize());
    format!("urn:uuid:{uuid}")
}

fn default_intro(chapters: &[Chapter]) -> Option<String> {
    let head = chapters.first()?;
    let intro = head.text(Some(DEFAULT_INTRO_LINES));
    let intro = intro.trim();
    (!intro.is_empty()).then(|| intro.to_owned())
}
