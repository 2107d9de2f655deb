use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use url::Url;

use crate::book::ImageFile;
use crate::epub;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid cover url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("cover url must be http/https: {0}")]
    UnsupportedScheme(Url),

    #[error("GET {url}: {source}")]
    Request {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url}: HTTP {status}")]
    Status { url: Url, status: u16 },
}

/// Downloads an image to use as the book cover.
pub fn fetch_image(url: &str) -> Result<ImageFile, FetchError> {
    let url = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
        url: url.to_owned(),
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::UnsupportedScheme(url));
    }

    let request_error = |source| FetchError::Request {
        url: url.clone(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(request_error)?;

    let response = client
        .get(url.clone())
        .header(USER_AGENT, concat!("txt2epub/", env!("CARGO_PKG_VERSION")))
        .header(ACCEPT, "image/*")
        .send()
        .map_err(request_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.clone(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase());
    let name = file_name(response.url(), content_type.as_deref());
    let data = response.bytes().map_err(request_error)?.to_vec();

    tracing::info!(%url, name = %name, bytes = data.len(), "fetched cover");
    Ok(ImageFile::new(name, data))
}

/// Last non-empty path segment when it has an image extension, otherwise `cover.<ext>`
/// derived from the content type.
///
/// A response without a content type is assumed to be JPEG. A non-image content type
/// yields `cover` with no extension, which the book builder rejects.
fn file_name(url: &Url, content_type: Option<&str>) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .filter(|s| epub::media_type_for_image(s).is_some());
    if let Some(segment) = segment {
        return segment.to_owned();
    }

    let ext = match content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
    {
        None | Some("image/jpeg" | "image/jpg" | "image/pjpeg") => "jpg",
        Some("image/png") => "png",
        Some("image/gif") => "gif",
        Some("image/svg+xml") => "svg",
        Some("image/webp") => "webp",
        Some("image/avif") => "avif",
        Some(other) => {
            tracing::debug!(content_type = other, "cover has no known image type");
            return "cover".to_owned();
        }
    };
    format!("cover.{ext}")
}
