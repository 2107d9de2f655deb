use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{Cursor, Write as _};
use std::path::Path;

use anyhow::Context as _;
use zip::write::SimpleFileOptions;

use crate::book::{Book, NAV_HREF, NAV_ID, XHTML_MEDIA_TYPE};

pub const MIMETYPE: &str = "application/epub+zip";
pub const CONTAINER_PATH: &str = "META-INF/container.xml";
pub const PACKAGE_PATH: &str = "OEBPS/content.opf";

/// Directory holding the package document; manifest hrefs are relative to it.
const CONTENT_DIR: &str = "OEBPS";

#[derive(Debug, thiserror::Error)]
pub enum EpubError {
    #[error("resource {id:?} is missing its {field}")]
    MissingResource { id: String, field: &'static str },

    #[error("duplicate manifest {field}: {value}")]
    DuplicateResource { field: &'static str, value: String },

    #[error("spine references unknown manifest item: {0}")]
    UnknownSpineItem(String),

    #[error("spine references {0} more than once")]
    DuplicateSpineItem(String),

    #[error("content document {0} is missing from the spine")]
    MissingSpineItem(String),

    #[error("unsupported media type for {0}")]
    UnsupportedMediaType(String),

    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Serializes `book` into EPUB archive bytes.
///
/// The book is validated before anything is written and the archive is assembled in
/// memory, so an error never leaves a partial archive behind. Identical books produce
/// identical bytes.
pub fn serialize(book: &Book) -> Result<Vec<u8>, EpubError> {
    validate(book)?;

    let container_xml = render_container_xml();
    let content_opf = render_content_opf(book);
    let nav_xhtml = render_nav_xhtml(book);

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));

    // OCF: `mimetype` MUST be the first entry and MUST be stored (no compression).
    let mimetype_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    zip.start_file("mimetype", mimetype_options)?;
    zip.write_all(MIMETYPE.as_bytes())?;

    let deflated_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    zip.start_file(CONTAINER_PATH, deflated_options)?;
    zip.write_all(container_xml.as_bytes())?;

    zip.start_file(PACKAGE_PATH, deflated_options)?;
    zip.write_all(content_opf.as_bytes())?;

    zip.start_file(content_path(NAV_HREF), deflated_options)?;
    zip.write_all(nav_xhtml.as_bytes())?;

    for doc in &book.documents {
        let xhtml = wrap_xhtml_document(
            &doc.title,
            &book.metadata.language,
            &book.stylesheet.href,
            &doc.body,
        );
        zip.start_file(content_path(&doc.href), deflated_options)?;
        zip.write_all(xhtml.as_bytes())?;
    }

    for resource in book.resources() {
        zip.start_file(content_path(&resource.href), deflated_options)?;
        zip.write_all(&resource.data)?;
    }

    let cursor = zip.finish()?;
    let bytes = cursor.into_inner();
    tracing::debug!(
        bytes = bytes.len(),
        manifest_items = book.manifest_len(),
        "serialized epub"
    );
    Ok(bytes)
}

/// Serializes `book` and writes it to `out_path`, refusing to overwrite unless `force`.
pub fn write_epub(book: &Book, out_path: &Path, force: bool) -> anyhow::Result<()> {
    if out_path.exists() && !force {
        anyhow::bail!("epub output already exists: {}", out_path.display());
    }

    let bytes = serialize(book).context("serialize epub")?;

    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create epub parent dir: {}", parent.display()))?;
    }

    let mut out_options = OpenOptions::new();
    out_options.write(true);
    if force {
        out_options.create(true).truncate(true);
    } else {
        out_options.create_new(true);
    }
    let mut out_file = out_options
        .open(out_path)
        .with_context(|| format!("open epub output: {}", out_path.display()))?;
    out_file
        .write_all(&bytes)
        .with_context(|| format!("write epub: {}", out_path.display()))?;
    out_file
        .flush()
        .with_context(|| format!("flush epub: {}", out_path.display()))?;

    tracing::info!(out = %out_path.display(), bytes = bytes.len(), "wrote epub");
    Ok(())
}

fn content_path(href: &str) -> String {
    format!("{CONTENT_DIR}/{href}")
}

fn validate(book: &Book) -> Result<(), EpubError> {
    let mut ids = HashSet::from([NAV_ID]);
    let mut hrefs = HashSet::from([NAV_HREF]);

    let documents = book
        .documents
        .iter()
        .map(|d| (d.id.as_str(), d.href.as_str(), XHTML_MEDIA_TYPE));
    let resources = book
        .resources()
        .map(|r| (r.id.as_str(), r.href.as_str(), r.media_type.as_str()));

    for (id, href, media_type) in documents.chain(resources) {
        for (field, value) in [("id", id), ("filename", href), ("media type", media_type)] {
            if value.trim().is_empty() {
                return Err(EpubError::MissingResource {
                    id: if id.is_empty() { href } else { id }.to_owned(),
                    field,
                });
            }
        }
        if !ids.insert(id) {
            return Err(EpubError::DuplicateResource {
                field: "id",
                value: id.to_owned(),
            });
        }
        if !hrefs.insert(href) {
            return Err(EpubError::DuplicateResource {
                field: "filename",
                value: href.to_owned(),
            });
        }
    }

    let spine_ids = book
        .documents
        .iter()
        .map(|d| d.id.as_str())
        .chain([NAV_ID])
        .collect::<HashSet<_>>();
    let mut seen = HashSet::with_capacity(book.spine.len());
    for idref in &book.spine {
        if !spine_ids.contains(idref.as_str()) {
            return Err(EpubError::UnknownSpineItem(idref.clone()));
        }
        if !seen.insert(idref.as_str()) {
            return Err(EpubError::DuplicateSpineItem(idref.clone()));
        }
    }
    if let Some(doc) = book.documents.iter().find(|d| !seen.contains(d.id.as_str())) {
        return Err(EpubError::MissingSpineItem(doc.id.clone()));
    }

    Ok(())
}

fn render_container_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{PACKAGE_PATH}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    )
}

fn render_nav_xhtml(book: &Book) -> String {
    let title = &book.metadata.title;
    let lang = &book.metadata.language;

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str(&format!(
        "  <link rel=\"stylesheet\" type=\"text/css\" href=\"{}\" />\n",
        xml_escape(&book.stylesheet.href)
    ));
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&format!("  <h1>{}</h1>\n", xml_escape(title)));
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str("    <ol>\n");
    for entry in &book.toc {
        out.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            xml_escape(&entry.href),
            xml_escape(&entry.label)
        ));
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn render_content_opf(book: &Book) -> String {
    let meta = &book.metadata;
    let modified = meta
        .modified
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{}\">\n",
        xml_escape(&meta.language)
    ));
    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str(&format!(
        "    <dc:identifier id=\"bookid\">{}</dc:identifier>\n",
        xml_escape(&meta.identifier)
    ));
    out.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        xml_escape(&meta.title)
    ));
    out.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        xml_escape(&meta.language)
    ));
    for (idx, author) in meta.authors.iter().enumerate() {
        out.push_str(&format!(
            "    <dc:creator id=\"creator-{}\">{}</dc:creator>\n",
            idx + 1,
            xml_escape(author)
        ));
    }
    if let Some(description) = &meta.description {
        out.push_str(&format!(
            "    <dc:description>{}</dc:description>\n",
            xml_escape(description)
        ));
    }
    out.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        xml_escape(&modified)
    ));
    if let Some(cover) = &book.cover {
        out.push_str(&format!(
            "    <meta name=\"cover\" content=\"{}\" />\n",
            xml_escape(&cover.id)
        ));
    }
    out.push_str("  </metadata>\n");

    out.push_str("  <manifest>\n");
    out.push_str(&format!(
        "    <item id=\"{NAV_ID}\" href=\"{NAV_HREF}\" media-type=\"{XHTML_MEDIA_TYPE}\" properties=\"nav\" />\n"
    ));
    out.push_str(&render_manifest_item(
        &book.stylesheet.id,
        &book.stylesheet.href,
        &book.stylesheet.media_type,
        None,
    ));
    if let Some(cover) = &book.cover {
        out.push_str(&render_manifest_item(
            &cover.id,
            &cover.href,
            &cover.media_type,
            Some("cover-image"),
        ));
    }
    for doc in &book.documents {
        out.push_str(&render_manifest_item(
            &doc.id,
            &doc.href,
            XHTML_MEDIA_TYPE,
            None,
        ));
    }
    for image in &book.images {
        out.push_str(&render_manifest_item(
            &image.id,
            &image.href,
            &image.media_type,
            None,
        ));
    }
    out.push_str("  </manifest>\n");

    out.push_str("  <spine>\n");
    // A book needs at least one linear spine item; without content documents that is the nav.
    let nav_linear = book.documents.is_empty();
    for idref in &book.spine {
        let linear = if idref == NAV_ID && !nav_linear {
            " linear=\"no\""
        } else {
            ""
        };
        out.push_str(&format!(
            "    <itemref idref=\"{}\"{linear} />\n",
            xml_escape(idref)
        ));
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

fn render_manifest_item(id: &str, href: &str, media_type: &str, properties: Option<&str>) -> String {
    let properties = properties
        .map(|p| format!(" properties=\"{}\"", xml_escape(p)))
        .unwrap_or_default();
    format!(
        "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{properties} />\n",
        xml_escape(id),
        xml_escape(href),
        xml_escape(media_type)
    )
}

/// Media type for an image file, keyed by its extension.
pub fn media_type_for_image(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        "webp" => Some("image/webp"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

fn wrap_xhtml_document(title: &str, lang: &str, stylesheet_href: &str, body_html: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str(&format!(
        "  <link rel=\"stylesheet\" type=\"text/css\" href=\"{}\" />\n",
        xml_escape(stylesheet_href)
    ));
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(body_html);
    if !body_html.is_empty() && !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

/// Escapes markup characters and drops characters XML 1.0 does not allow
/// (C0 controls other than tab/LF/CR, U+FFFE and U+FFFF).
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars().filter(|&c| is_xml_char(c)) {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// The `Char` production of XML 1.0. Surrogates cannot occur in a `char`.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\u{9}'
            | '\u{A}'
            | '\u{D}'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}
