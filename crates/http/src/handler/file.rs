//! Static file serving.

use crate::date::{epoch_secs, format_date};
use crate::handler::{BoxError, Handler, Outcome};
use crate::protocol::conditional::{Validators, evaluate};
use crate::protocol::range::ByteRange;
use crate::protocol::{ContentInfo, Request, Response};
use crate::utils::{approx_size, escape_html};
use async_trait::async_trait;
use http::{Method, StatusCode};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncSeekExt;
use tracing::{debug, trace};

/// Characters escaped when a file path is placed in a URL
const PATH_SET: &AsciiSet =
    &CONTROLS.add(b' ').add(b'"').add(b'#').add(b'%').add(b'<').add(b'>').add(b'?').add(b'`').add(b'{').add(b'}');

/// Serves the files below `root` at the URL prefix `prefix`.
///
/// Hidden files (any path component starting with `.`) are never served, and symbolic links
/// leading outside of `root` are refused. Directories are listed when generated indexes are
/// allowed.
#[derive(Debug, Clone)]
pub struct FileHandler {
    root: PathBuf,
    prefix: String,
    allow_generated_index: bool,
}

/// What a request path resolved to.
#[derive(Debug)]
enum Target {
    File(PathBuf, Metadata),
    Directory(PathBuf),
    /// a directory requested without its trailing `/`
    MissingSlash,
    Refused(StatusCode),
}

impl FileHandler {
    pub fn new(root: impl Into<PathBuf>, prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/').to_string();
        Self { root: root.into(), prefix, allow_generated_index: false }
    }

    pub fn allow_generated_index(mut self, allow: bool) -> Self {
        self.allow_generated_index = allow;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn locate(&self, path: &str) -> Target {
        let Some(relative) = path.strip_prefix(&self.prefix) else {
            return Target::Refused(StatusCode::NOT_FOUND);
        };
        if !relative.is_empty() && !relative.starts_with('/') {
            return Target::Refused(StatusCode::NOT_FOUND);
        }

        let mut full = self.root.clone();
        for component in relative.split('/').filter(|c| !c.is_empty()) {
            if component.starts_with('.') || component.contains(['\\', '\0']) {
                return Target::Refused(StatusCode::NOT_FOUND);
            }
            full.push(component);
        }

        let Ok(metadata) = tokio::fs::metadata(&full).await else {
            return Target::Refused(StatusCode::NOT_FOUND);
        };
        match (tokio::fs::canonicalize(&self.root).await, tokio::fs::canonicalize(&full).await) {
            (Ok(root), Ok(canonical)) if canonical.starts_with(&root) => {}
            _ => {
                debug!(path = %full.display(), "refusing path outside of the served directory");
                return Target::Refused(StatusCode::FORBIDDEN);
            }
        }

        let trailing_slash = path.ends_with('/');
        match (metadata.is_dir(), trailing_slash) {
            (true, true) => Target::Directory(full),
            (true, false) => Target::MissingSlash,
            (false, true) => Target::Refused(StatusCode::NOT_FOUND),
            (false, false) => Target::File(full, metadata),
        }
    }

    async fn send_file(
        &self,
        request: &mut Request<'_>,
        response: &mut Response<'_>,
        path: &Path,
        metadata: &Metadata,
    ) -> Result<Outcome, BoxError> {
        let length = metadata.len();
        let last_modified = metadata.modified().ok();
        let etag = entity_tag(last_modified, length);
        let content_type = mime_guess::from_path(path).first_raw().unwrap_or("application/octet-stream");

        let validators = Validators { last_modified, etag: Some(&etag) };
        let evaluation = evaluate(request.method(), request.headers(), validators, length);
        trace!(path = %path.display(), status = evaluation.status.as_u16(), "evaluated file request");

        match evaluation.status {
            StatusCode::NOT_MODIFIED => {
                response.set_header("ETag", &etag)?;
                if let Some(modified) = last_modified {
                    response.set_header("Last-Modified", format_date(modified.min(SystemTime::now())))?;
                }
                response.send_headers(StatusCode::NOT_MODIFIED).await?;
                response.finish().await?;
                Ok(Outcome::Handled)
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                response.set_header("Content-Range", ByteRange::unsatisfied(length))?;
                response.send_error(StatusCode::RANGE_NOT_SATISFIABLE, None).await?;
                Ok(Outcome::Handled)
            }
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
                response.set_header("Accept-Ranges", "bytes")?;
                let info = ContentInfo {
                    length: Some(length),
                    last_modified,
                    etag: Some(&etag),
                    content_type: Some(content_type),
                    range: evaluation.range,
                };
                response.send_headers_with(StatusCode::OK, info).await?;

                if *request.method() != Method::HEAD {
                    let mut file = tokio::fs::File::open(path).await?;
                    let count = match evaluation.range {
                        Some(range) => {
                            file.seek(SeekFrom::Start(range.start)).await?;
                            range.len()
                        }
                        None => length,
                    };
                    response.send_body(file, Some(count), None).await?;
                }
                response.finish().await?;
                Ok(Outcome::Handled)
            }
            status => Ok(Outcome::Status(status)),
        }
    }

    async fn send_listing(&self, request: &mut Request<'_>, response: &mut Response<'_>, dir: &Path) -> Result<Outcome, BoxError> {
        let html = listing(request.path(), dir, request.path() != format!("{}/", self.prefix)).await?;
        response.set_header("Content-Type", "text/html; charset=utf-8")?;
        let info = ContentInfo { length: Some(html.len() as u64), ..ContentInfo::default() };
        response.send_headers_with(StatusCode::OK, info).await?;
        response.body()?.write(html.as_bytes()).await?;
        response.finish().await?;
        Ok(Outcome::Handled)
    }
}

#[async_trait]
impl Handler for FileHandler {
    async fn serve(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<Outcome, BoxError> {
        let target = self.locate(request.path()).await;
        match target {
            Target::File(path, metadata) => self.send_file(request, response, &path, &metadata).await,
            Target::Directory(dir) if self.allow_generated_index => self.send_listing(request, response, &dir).await,
            Target::Directory(_) => Ok(Outcome::Status(StatusCode::FORBIDDEN)),
            Target::MissingSlash => {
                let mut location = format!("{}/", utf8_percent_encode(request.path(), PATH_SET));
                if let Some(query) = request.head().query() {
                    location.push('?');
                    location.push_str(query);
                }
                response.redirect(&location, true).await?;
                Ok(Outcome::Handled)
            }
            Target::Refused(status) => Ok(Outcome::Status(status)),
        }
    }
}

/// A strong entity tag derived from the modification time and size of a file.
fn entity_tag(last_modified: Option<SystemTime>, length: u64) -> String {
    let modified = last_modified.map(epoch_secs).unwrap_or(0);
    format!("\"{modified:x}-{length:x}\"")
}

/// An HTML index of `dir`, listed at the URL `path`.
async fn listing(path: &str, dir: &Path, with_parent: bool) -> std::io::Result<String> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        entries.push((name, metadata));
    }
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    let title = escape_html(path);
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Index of {title}</title></head>\n<body>\n<h1>Index of {title}</h1>\n<pre>\n"
    );
    if with_parent {
        html.push_str(" <a href=\"../\">../</a>\n");
    }

    let width = entries.iter().map(|(name, _)| name.chars().count() + 1).max().unwrap_or(0).max(20);
    for (name, metadata) in &entries {
        let (shown, href, size) = if metadata.is_dir() {
            (format!("{name}/"), format!("{}/", utf8_percent_encode(name, PATH_SET)), "-".to_string())
        } else {
            (name.clone(), utf8_percent_encode(name, PATH_SET).to_string(), approx_size(metadata.len()))
        };
        let padding = " ".repeat(width - shown.chars().count());
        let modified = metadata.modified().map(format_date).unwrap_or_default();
        html.push_str(&format!(
            " <a href=\"{href}\">{}</a>{padding}  {modified:<29}  {size:>6}\n",
            escape_html(&shown)
        ));
    }
    html.push_str("</pre>\n</body>\n</html>\n");
    Ok(html)
}
