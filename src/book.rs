use std::path::Path;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sha2::{Digest as _, Sha256};

use crate::epub::{self, EpubError};
use crate::segment::Chapter;

pub const NAV_ID: &str = "nav";
pub const NAV_HREF: &str = "nav.xhtml";
pub const STYLE_ID: &str = "style_nav";
pub const STYLE_HREF: &str = "style/nav.css";
pub const COVER_ID: &str = "cover-image";
pub const INTRO_ID: &str = "intro";
pub const INTRO_HREF: &str = "intro.html";
pub const INTRO_TITLE: &str = "Introduction";

pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
pub const CSS_MEDIA_TYPE: &str = "text/css";

const IMAGE_CLASS: &str = "max-size-img";

const STYLE_CSS: &str = r#"@charset "utf-8";

body { margin: 0; padding: 0 1em; line-height: 1.6; }
h1 { font-size: 1.4em; text-align: center; }
p { margin: 0; text-indent: 2em; }
.max-size-img { display: block; max-width: 100%; height: auto; margin: 0 auto; }
"#;

/// An image as supplied by the caller: original file name plus bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let data =
            std::fs::read(path).with_context(|| format!("read image: {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("invalid image filename: {}", path.display()))?
            .to_owned();
        Ok(Self { name, data })
    }

    /// File name with directory components removed and characters that are not
    /// safe in an archive path or a `src` attribute replaced by `_`.
    fn base_name(&self) -> String {
        let name = self
            .name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.name.as_str());
        name.chars()
            .map(|c| {
                if c.is_whitespace()
                    || matches!(c, '#' | '?' | '%' | '"' | '\'' | '<' | '>' | '&' | ':')
                {
                    '_'
                } else {
                    c
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    /// BCP-47 language tag.
    pub language: String,
    /// Full identifier, e.g. `urn:uuid:…`.
    pub identifier: String,
    pub modified: DateTime<Utc>,
}

/// An XHTML content document. `body` is the inner markup of `<body>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub href: String,
    pub title: String,
    pub body: String,
}

/// A binary or text resource packaged as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub href: String,
    pub label: String,
}

/// In-memory EPUB: everything [`epub::serialize`] needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub metadata: Metadata,
    pub cover: Option<Resource>,
    pub documents: Vec<Document>,
    pub images: Vec<Resource>,
    pub stylesheet: Resource,
    pub toc: Vec<TocEntry>,
    /// Manifest ids in reading order; [`NAV_ID`] first.
    pub spine: Vec<String>,
}

impl Book {
    /// Every manifest entry except the navigation document.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        std::iter::once(&self.stylesheet)
            .chain(self.cover.iter())
            .chain(self.images.iter())
    }

    pub fn manifest_len(&self) -> usize {
        1 + self.documents.len() + self.resources().count()
    }
}

/// Caller-supplied metadata for [`build_book`] and [`build_image_book`].
#[derive(Debug, Clone, Default)]
pub struct BookOptions {
    pub title: String,
    pub author: Option<String>,
    pub intro: Option<String>,
    pub cover: Option<ImageFile>,
    /// Defaults to `und`.
    pub language: Option<String>,
    /// Defaults to a UUID v5 derived from the book's content.
    pub identifier: Option<String>,
    /// Defaults to the current time.
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageLayout {
    /// One content document per image.
    #[default]
    PerPage,
    /// A single content document stacking every image.
    Single,
}

/// Builds a book with one content document per chapter after the head chapter.
///
/// The head chapter is not packaged; callers fold it into `options.intro`.
pub fn build_book(options: BookOptions, chapters: &[Chapter]) -> Result<Book, EpubError> {
    let mut builder = Builder::new(&options)?;
    for (index, chapter) in chapters.iter().skip(1).enumerate() {
        let mut body = format!("<h1>{}</h1>\n", epub::xml_escape(&chapter.title));
        push_paragraphs(&mut body, chapter.lines.iter().map(String::as_str));
        builder.push_document(
            format!("ch_{index}"),
            format!("ch_{index}.html"),
            chapter.title.clone(),
            body,
        );
    }
    Ok(builder.finish(options))
}

/// Builds a book whose content documents show `images` in order.
pub fn build_image_book(
    options: BookOptions,
    images: &[ImageFile],
    layout: ImageLayout,
) -> Result<Book, EpubError> {
    let mut builder = Builder::new(&options)?;

    let mut resources = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        let href = format!("img_{index:05}_{}", image.base_name());
        let media_type = epub::media_type_for_image(&href)
            .ok_or_else(|| EpubError::UnsupportedMediaType(image.name.clone()))?;
        resources.push(Resource {
            id: format!("img_{index:05}"),
            href,
            media_type: media_type.to_owned(),
            data: image.data.clone(),
        });
    }

    match layout {
        ImageLayout::PerPage => {
            for (index, image) in resources.iter().enumerate() {
                let body = format!(
                    "<img src=\"{}\" class=\"{IMAGE_CLASS}\" alt=\"\" />\n",
                    epub::xml_escape(&image.href)
                );
                builder.push_document(
                    format!("ch_{index}"),
                    format!("ch_{index}.html"),
                    image.href.clone(),
                    body,
                );
            }
        }
        ImageLayout::Single => {
            let href = "ch_0.html".to_owned();
            let mut body = String::new();
            for image in &resources {
                body.push_str(&format!(
                    "<img id=\"{}\" src=\"{}\" class=\"{IMAGE_CLASS}\" alt=\"\" />\n",
                    epub::xml_escape(&image.id),
                    epub::xml_escape(&image.href)
                ));
            }
            if !resources.is_empty() {
                builder.push_document_without_toc(
                    "ch_0".to_owned(),
                    href.clone(),
                    options.title.clone(),
                    body,
                );
                for image in &resources {
                    builder.toc.push(TocEntry {
                        href: format!("{href}#{}", image.id),
                        label: image.href.clone(),
                    });
                }
            }
        }
    }

    builder.images = resources;
    Ok(builder.finish(options))
}

struct Builder {
    cover: Option<Resource>,
    documents: Vec<Document>,
    images: Vec<Resource>,
    toc: Vec<TocEntry>,
}

impl Builder {
    fn new(options: &BookOptions) -> Result<Self, EpubError> {
        let cover = options.cover.as_ref().map(cover_resource).transpose()?;
        let mut builder = Self {
            cover,
            documents: Vec::new(),
            images: Vec::new(),
            toc: Vec::new(),
        };

        if let Some(intro) = options.intro.as_deref().filter(|i| !i.is_empty()) {
            let mut body = String::new();
            push_paragraphs(&mut body, intro.split('\n'));
            builder.push_document(
                INTRO_ID.to_owned(),
                INTRO_HREF.to_owned(),
                INTRO_TITLE.to_owned(),
                body,
            );
        }
        Ok(builder)
    }

    fn push_document(&mut self, id: String, href: String, title: String, body: String) {
        self.toc.push(TocEntry {
            href: href.clone(),
            label: title.clone(),
        });
        self.push_document_without_toc(id, href, title, body);
    }

    fn push_document_without_toc(&mut self, id: String, href: String, title: String, body: String) {
        self.documents.push(Document {
            id,
            href,
            title,
            body,
        });
    }

    fn finish(mut self, options: BookOptions) -> Book {
        // With nothing to read, the nav is the only (linear) content and lists itself.
        if self.documents.is_empty() {
            self.toc.push(TocEntry {
                href: NAV_HREF.to_owned(),
                label: options.title.clone(),
            });
        }

        let mut spine = Vec::with_capacity(self.documents.len() + 1);
        spine.push(NAV_ID.to_owned());
        spine.extend(self.documents.iter().map(|d| d.id.clone()));

        let description = options.intro.clone().filter(|i| !i.is_empty());
        let identifier = options
            .identifier
            .clone()
            .unwrap_or_else(|| {
                content_identifier(&options, self.cover.as_ref(), &self.documents, &self.images)
            });
        let language = options
            .language
            .clone()
            .map(|l| l.trim().to_owned())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "und".to_owned());

        Book {
            metadata: Metadata {
                title: options.title,
                authors: options.author.into_iter().filter(|a| !a.is_empty()).collect(),
                description,
                language,
                identifier,
                modified: options.modified.unwrap_or_else(Utc::now),
            },
            cover: self.cover,
            documents: self.documents,
            images: self.images,
            stylesheet: Resource {
                id: STYLE_ID.to_owned(),
                href: STYLE_HREF.to_owned(),
                media_type: CSS_MEDIA_TYPE.to_owned(),
                data: STYLE_CSS.as_bytes().to_vec(),
            },
            toc: self.toc,
            spine,
        }
    }
}

fn cover_resource(image: &ImageFile) -> Result<Resource, EpubError> {
    let base_name = image.base_name();
    let ext = Path::new(&base_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let href = format!("cover.{ext}");
    let media_type = epub::media_type_for_image(&href)
        .ok_or_else(|| EpubError::UnsupportedMediaType(image.name.clone()))?;
    Ok(Resource {
        id: COVER_ID.to_owned(),
        href,
        media_type: media_type.to_owned(),
        data: image.data.clone(),
    })
}

/// One `<p>` per line; blank lines become empty paragraphs.
fn push_paragraphs<'a>(out: &mut String, lines: impl Iterator<Item = &'a str>) {
    for line in lines {
        if line.is_empty() {
            out.push_str("<p></p>\n");
        } else {
            out.push_str(&format!("<p>{}</p>\n", epub::xml_escape(line)));
        }
    }
}

/// `urn:uuid:` v5 identifier over the title, author, cover and packaged content.
fn content_identifier(
    options: &BookOptions,
    cover: Option<&Resource>,
    documents: &[Document],
    images: &[Resource],
) -> String {
    let mut hasher = Sha256::new();
    for field in [
        options.title.as_str(),
        options.author.as_deref().unwrap_or(""),
    ] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    if let Some(resource) = cover {
        hasher.update(resource.href.as_bytes());
        hasher.update(&resource.data);
    }
    for doc in documents {
        hasher.update(doc.href.as_bytes());
        hasher.update(doc.body.as_bytes());
    }
    for image in images {
        hasher.update(image.href.as_bytes());
        hasher.update(&image.data);
    }
    let digest = hasher.finalize();
    let uuid = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, &digest);
    format!("urn:uuid:{uuid}")
}
