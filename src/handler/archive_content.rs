//! Archive content serving module
//!
//! Serves entries of a zip archive over HTTP with conditional GET support.
//! Range requests are not supported.

use crate::archive::{ArchiveIndex, ContentRecord, Result as ArchiveResult};
use crate::http::body::{channel_body, empty_body, ChunkSender};
use crate::http::cache::{attach_modification_headers, conditional_get, RequestValidators};
use crate::http::{self, ResponseBody};
use crate::logger;
use hyper::body::{Bytes, Frame};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Tolerance for `If-Modified-Since`, covering whole-second truncation plus skew
pub const ACCEPTABLE_AGE: Duration = Duration::from_secs(2);

/// Size of each chunk copied from the archive to the connection
const COPY_CHUNK_SIZE: usize = 32 * 1024;

/// Serves files of one zip archive
///
/// ```no_run
/// use zipserve::handler::ArchiveContentServer;
///
/// let server = ArchiveContentServer::open("/path/to/site.zip", "web/", "index.html")?;
/// // `GET /` now serves `web/index.html` from the archive.
/// server.close();
/// # Ok::<(), zipserve::archive::ArchiveError>(())
/// ```
pub struct ArchiveContentServer {
    index: ArchiveIndex,
}

impl ArchiveContentServer {
    /// Open the archive and index it
    ///
    /// `path_prefix` is the folder inside the archive to serve, empty for the
    /// archive root. `default_path` is served for `/`, relative to the prefix.
    pub fn open(
        archive_path: impl AsRef<Path>,
        path_prefix: &str,
        default_path: &str,
    ) -> ArchiveResult<Self> {
        let index = ArchiveIndex::build(archive_path, path_prefix, default_path)?;
        Ok(Self { index })
    }

    pub const fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    /// Map a request path to the public path looked up in the index
    pub fn resolve_path<'a>(&'a self, request_path: &'a str) -> &'a str {
        let path = request_path.trim_start_matches('/');
        if path.is_empty() {
            self.index.default_path()
        } else {
            path
        }
    }

    /// Answer one request
    pub async fn handle<B>(&self, req: &Request<B>) -> Response<ResponseBody> {
        let path = self.resolve_path(req.uri().path());
        let Some(record) = self.index.lookup(path) else {
            return http::build_404_response();
        };

        let validators = RequestValidators::from_headers(req.headers());
        if let Some(not_modified) =
            conditional_get(&validators, record.etag(), record.modified(), ACCEPTABLE_AGE)
        {
            return not_modified;
        }

        let is_head = *req.method() == Method::HEAD;
        serve_record(record, is_head).await
    }

    /// Release the archive; every later request gets 404
    pub fn close(&self) {
        self.index.close();
    }
}

/// Open `record` on a blocking worker and stream it as a 200 response
async fn serve_record(record: Arc<ContentRecord>, is_head: bool) -> Response<ResponseBody> {
    let size = record.size();
    let (body_tx, body) = if is_head {
        (None, empty_body())
    } else {
        let (tx, body) = channel_body();
        (Some(tx), body)
    };
    let (opened_tx, opened_rx) = oneshot::channel();

    let reader_record = Arc::clone(&record);
    tokio::task::spawn_blocking(move || stream_entry(&reader_record, opened_tx, body_tx));

    match opened_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            logger::log_error(&format!(
                "Failed to open archive entry '{}': {e}",
                record.entry_name()
            ));
            return http::build_500_response(&e.to_string());
        }
        Err(_) => {
            logger::log_error(&format!(
                "Archive reader for '{}' exited before opening the entry",
                record.entry_name()
            ));
            return http::build_500_response("archive reader aborted");
        }
    }

    attach_modification_headers(
        Response::builder().status(StatusCode::OK),
        record.etag(),
        record.modified(),
    )
    .header(CONTENT_TYPE, record.content_type())
    .header(CONTENT_LENGTH, size)
    .body(body)
    .unwrap_or_else(|e| {
        http::response::log_build_error("200", &e);
        http::build_500_response("failed to build response")
    })
}

/// Blocking half of [`serve_record`]
///
/// Reports the open result through `opened`, then copies the entry into
/// `body` unless it is `None` (HEAD request).
fn stream_entry(
    record: &ContentRecord,
    opened: oneshot::Sender<ArchiveResult<()>>,
    body: Option<ChunkSender>,
) {
    let mut opened = Some(opened);
    let result = record.read_with(|reader| {
        if let Some(tx) = opened.take() {
            let _ = tx.send(Ok(()));
        }
        match body {
            Some(tx) => copy_entry(reader, &tx, record.size()),
            None => Ok(0),
        }
    });

    match result {
        Ok(Ok(_)) => {}
        Ok(Err((e, written))) => {
            logger::log_error(&format!(
                "Failed on sending archive content '{}' to remote: {e} (written={written})",
                record.entry_name()
            ));
        }
        Err(e) => {
            if let Some(tx) = opened.take() {
                let _ = tx.send(Err(e));
            }
        }
    }
}

/// Copy exactly `size` bytes from `reader` into the body channel
///
/// On failure returns the error with the number of bytes already handed to the
/// connection. Read failures are also pushed into the body so the response is
/// aborted instead of ending short.
fn copy_entry(reader: &mut dyn Read, tx: &ChunkSender, size: u64) -> Result<u64, (io::Error, u64)> {
    let mut written = 0u64;
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];

    while written < size {
        let want = usize::try_from(size - written).map_or(buf.len(), |left| left.min(buf.len()));
        let n = match reader.read(&mut buf[..want]) {
            Ok(0) => {
                let e = io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("archive entry ended after {written} of {size} bytes"),
                );
                let _ = tx.blocking_send(Err(io::Error::new(e.kind(), e.to_string())));
                return Err((e, written));
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.blocking_send(Err(io::Error::new(e.kind(), e.to_string())));
                return Err((e, written));
            }
        };
        if tx
            .blocking_send(Ok(Frame::data(Bytes::copy_from_slice(&buf[..n]))))
            .is_err()
        {
            let e = io::Error::new(io::ErrorKind::BrokenPipe, "client connection closed");
            return Err((e, written));
        }
        written += n as u64;
    }

    Ok(written)
}
