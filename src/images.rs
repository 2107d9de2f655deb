use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::book::{self, ImageFile, ImageLayout};
use crate::build::book_options;
use crate::cli::ImagesArgs;
use crate::epub;

pub fn run(args: ImagesArgs) -> anyhow::Result<()> {
    let out_path = PathBuf::from(&args.out);
    if out_path.exists() && !args.metadata.force {
        anyhow::bail!("epub output already exists: {}", out_path.display());
    }

    let images = args
        .images
        .iter()
        .map(|path| ImageFile::read(Path::new(path)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let bytes = images.iter().map(|i| i.data.len()).sum::<usize>();
    tracing::info!(images = images.len(), bytes, "images: read");

    let layout = if args.single_page {
        ImageLayout::Single
    } else {
        ImageLayout::PerPage
    };
    let options = book_options(&args.metadata, args.title.clone())?;
    let book = book::build_image_book(options, &images, layout).context("assemble book")?;

    tracing::info!(out = %out_path.display(), ?layout, "images: write epub");
    epub::write_epub(&book, &out_path, args.metadata.force).context("write epub")?;
    Ok(())
}
