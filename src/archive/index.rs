//! Archive index
//!
//! Opens a zip archive once, filters it down to servable regular files and maps
//! each public path to a [`ContentRecord`]. The map never changes after
//! construction except for being emptied by [`ArchiveIndex::close`].

use super::error::{ArchiveError, Result};
use super::file::ArchiveFile;
use super::identity::{derive_identity, entry_modified_time, truncate_to_seconds};
use crate::logger;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use zip::ZipArchive;

const S_IFMT: u32 = 0o170_000;
const S_IFREG: u32 = 0o100_000;

/// One servable archive entry
#[derive(Debug)]
pub struct ContentRecord {
    archive: ZipArchive<ArchiveFile>,
    entry_index: usize,
    entry_name: String,
    modified: SystemTime,
    etag: String,
    content_type: &'static str,
    size: u64,
}

impl ContentRecord {
    /// Name of the entry inside the archive, prefix included
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    /// Modification time, whole seconds
    pub const fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub const fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// Uncompressed size in bytes
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Open a fresh decompressing reader for this entry and hand it to `f`
    ///
    /// The reader yields at most [`size`](Self::size) bytes. Each call works on
    /// its own clone of the archive, so calls may run concurrently on any thread.
    /// Returns an error without calling `f` when the entry cannot be opened.
    pub fn read_with<T>(&self, f: impl FnOnce(&mut dyn Read) -> T) -> Result<T> {
        let mut archive = self.archive.clone();
        let entry = archive
            .by_index(self.entry_index)
            .map_err(|source| ArchiveError::Entry {
                index: self.entry_index,
                name: self.entry_name.clone(),
                source,
            })?;
        let mut limited = entry.take(self.size);
        Ok(f(&mut limited))
    }
}

struct IndexState {
    entries: HashMap<String, Arc<ContentRecord>>,
    archive: Option<ZipArchive<ArchiveFile>>,
}

/// Lookup table from public path to archive content
pub struct ArchiveIndex {
    state: RwLock<IndexState>,
    default_path: String,
}

impl ArchiveIndex {
    /// Open the archive at `archive_path` and index its regular files
    ///
    /// `path_prefix` names the folder inside the archive to serve (empty for the
    /// archive root); entries outside it are skipped. `default_path` is the public
    /// path served for requests to `/`.
    pub fn build(
        archive_path: impl AsRef<Path>,
        path_prefix: &str,
        default_path: &str,
    ) -> Result<Self> {
        let archive_path = archive_path.as_ref();
        let file = ArchiveFile::open(archive_path)?;
        let archive_file_len = file.len();
        let mut archive = ZipArchive::new(file)?;

        let prefix = normalize_prefix(path_prefix);
        let mut entries = HashMap::new();

        for i in 0..archive.len() {
            let entry_name = archive.name_for_index(i).unwrap_or_default().to_string();
            let Some(public_path) = strip_prefix(&entry_name, &prefix) else {
                logger::log_debug(&format!(
                    "[Archive] skip-content: {entry_name} (prefix={prefix})"
                ));
                continue;
            };
            if public_path.is_empty() {
                continue;
            }

            // Metadata only; the compression method is checked when the entry is opened
            let (servable, modified, size) = {
                let entry = archive.by_index_raw(i).map_err(|source| ArchiveError::Entry {
                    index: i,
                    name: entry_name.clone(),
                    source,
                })?;
                let modified = truncate_to_seconds(entry_modified_time(
                    entry.extra_data_fields(),
                    entry.last_modified(),
                ));
                (
                    is_servable_entry(entry.is_dir(), entry.unix_mode()),
                    modified,
                    entry.size(),
                )
            };
            if !servable {
                continue;
            }

            let identity = derive_identity(&entry_name, modified);
            let public_path = public_path.to_string();
            let record = ContentRecord {
                archive: archive.clone(),
                entry_index: i,
                entry_name,
                modified,
                etag: identity.etag,
                content_type: identity.content_type,
                size,
            };

            // Later entries replace earlier ones with the same public path.
            if let Some(previous) = entries.insert(public_path, Arc::new(record)) {
                logger::log_debug(&format!(
                    "[Archive] duplicate path replaced: {}",
                    previous.entry_name
                ));
            }
        }

        logger::log_debug(&format!(
            "[Archive] indexed {} of {} entries from {} ({} bytes)",
            entries.len(),
            archive.len(),
            archive_path.display(),
            archive_file_len,
        ));

        Ok(Self {
            state: RwLock::new(IndexState {
                entries,
                archive: Some(archive),
            }),
            default_path: default_path.trim_matches('/').to_string(),
        })
    }

    /// Find the record served under `public_path`
    pub fn lookup(&self, public_path: &str) -> Option<Arc<ContentRecord>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.get(public_path).cloned()
    }

    /// Public path served for the archive root
    pub fn default_path(&self) -> &str {
        &self.default_path
    }

    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.archive.is_none()
    }

    /// Drop every record and release the archive handle
    ///
    /// Lookups afterwards return `None`. Readers already holding a record keep
    /// their own file reference and finish normally; the file is closed once the
    /// last of them is dropped.
    pub fn close(&self) {
        let (entries, archive) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            (
                std::mem::take(&mut state.entries),
                state.archive.take(),
            )
        };
        if archive.is_some() {
            logger::log_info(&format!(
                "[Archive] closed, {} entries released",
                entries.len()
            ));
        }
    }
}

/// Trim separators from `prefix` and give it a single trailing `/`
///
/// An empty or all-separator prefix stays empty, meaning "serve everything".
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Public path for `name`, or `None` if it lies outside `prefix`
pub fn strip_prefix<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        Some(name)
    } else {
        name.strip_prefix(prefix)
    }
}

/// Only regular files are served
///
/// Entries without unix permission bits count as regular unless flagged as
/// directories.
pub const fn is_servable_entry(is_dir: bool, unix_mode: Option<u32>) -> bool {
    if is_dir {
        return false;
    }
    match unix_mode {
        Some(mode) => {
            let file_type = mode & S_IFMT;
            file_type == S_IFREG || file_type == 0
        }
        None => true,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, DateTime, ZipWriter};

    pub(crate) struct TestEntry<'a> {
        pub name: &'a str,
        pub content: &'a [u8],
        pub method: CompressionMethod,
    }

    pub(crate) const fn stored<'a>(name: &'a str, content: &'a [u8]) -> TestEntry<'a> {
        TestEntry {
            name,
            content,
            method: CompressionMethod::Stored,
        }
    }

    pub(crate) const fn deflated<'a>(name: &'a str, content: &'a [u8]) -> TestEntry<'a> {
        TestEntry {
            name,
            content,
            method: CompressionMethod::Deflated,
        }
    }

    /// Write a zip with every entry stamped 2020-01-01T00:00:00
    pub(crate) fn build_zip(entries: &[TestEntry<'_>], dirs: &[&str]) -> tempfile::NamedTempFile {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut writer = ZipWriter::new(tmp.reopen().unwrap());
        let stamp = DateTime::from_date_and_time(2020, 1, 1, 0, 0, 0).unwrap();
        for dir in dirs {
            writer
                .add_directory(*dir, SimpleFileOptions::default().last_modified_time(stamp))
                .unwrap();
        }
        for entry in entries {
            let options = SimpleFileOptions::default()
                .compression_method(entry.method)
                .last_modified_time(stamp);
            writer.start_file(entry.name, options).unwrap();
            writer.write_all(entry.content).unwrap();
        }
        writer.finish().unwrap();
        tmp
    }

    const LOCAL_HEADER: &[u8] = b"PK\x03\x04";
    const CENTRAL_HEADER: &[u8] = b"PK\x01\x02";

    /// Rewrite the local and central headers of the entry named `name`
    ///
    /// `method` replaces the compression method; `new_name` must have the same
    /// length as `name`.
    pub(crate) fn patch_entry(path: &Path, name: &str, method: Option<u16>, new_name: Option<&str>) {
        let mut bytes = std::fs::read(path).unwrap();
        let name = name.as_bytes();
        let mut patched = 0;
        let mut i = 0;
        while i + 46 <= bytes.len() {
            let sig = &bytes[i..i + 4];
            let (name_len_at, name_at, method_at) = if sig == LOCAL_HEADER {
                (i + 26, i + 30, i + 8)
            } else if sig == CENTRAL_HEADER {
                (i + 28, i + 46, i + 10)
            } else {
                i += 1;
                continue;
            };
            let name_len = usize::from(u16::from_le_bytes([bytes[name_len_at], bytes[name_len_at + 1]]));
            if name_len == name.len() && bytes.get(name_at..name_at + name_len) == Some(name) {
                if let Some(method) = method {
                    bytes[method_at..method_at + 2].copy_from_slice(&method.to_le_bytes());
                }
                if let Some(new_name) = new_name {
                    assert_eq!(new_name.len(), name_len);
                    bytes[name_at..name_at + name_len].copy_from_slice(new_name.as_bytes());
                }
                patched += 1;
            }
            i += 4;
        }
        assert_eq!(patched, 2, "expected one local and one central header");
        std::fs::write(path, bytes).unwrap();
    }

    fn read_all(record: &ContentRecord) -> Vec<u8> {
        record
            .read_with(|reader| {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).unwrap();
                buf
            })
            .unwrap()
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("web"), "web/");
        assert_eq!(normalize_prefix("/web/"), "web/");
        assert_eq!(normalize_prefix("site/web//"), "site/web/");
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("web/a.html", "web/"), Some("a.html"));
        assert_eq!(strip_prefix("other/a.html", "web/"), None);
        assert_eq!(strip_prefix("webby/a.html", "web/"), None);
        assert_eq!(strip_prefix("a.html", ""), Some("a.html"));
    }

    #[test]
    fn test_is_servable_entry() {
        assert!(is_servable_entry(false, None));
        assert!(is_servable_entry(false, Some(0o100_644)));
        assert!(!is_servable_entry(true, Some(0o040_755)));
        assert!(!is_servable_entry(false, Some(0o120_777)));
    }

    #[test]
    fn test_build_with_prefix() {
        let zip = build_zip(
            &[
                stored("web/index.html", b"<p>hi</p>\n"),
                deflated("web/css/site.css", b"body { margin: 0 }"),
                stored("README.md", b"not served"),
            ],
            &["web/", "web/css/"],
        );
        let index = ArchiveIndex::build(zip.path(), "/web/", "/index.html").unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.default_path(), "index.html");
        assert!(index.lookup("README.md").is_none());
        assert!(index.lookup("css/").is_none());

        let page = index.lookup("index.html").unwrap();
        assert_eq!(page.entry_name(), "web/index.html");
        assert_eq!(page.size(), 10);
        assert_eq!(page.content_type(), "text/html; charset=utf-8");
        assert_eq!(page.etag(), "\"00e10b5e00000000\"");

        let css = index.lookup("css/site.css").unwrap();
        assert_eq!(css.content_type(), "text/css; charset=utf-8");
    }

    #[test]
    fn test_build_without_prefix_serves_everything() {
        let zip = build_zip(
            &[stored("a.txt", b"a"), stored("nested/b.txt", b"bb")],
            &["nested/"],
        );
        let index = ArchiveIndex::build(zip.path(), "", "a.txt").unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.lookup("nested/b.txt").is_some());
    }

    #[test]
    fn test_streamed_bytes_match_entry() {
        let big: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let zip = build_zip(
            &[deflated("big.bin", &big), stored("small.txt", b"0123456789")],
            &[],
        );
        let index = ArchiveIndex::build(zip.path(), "", "").unwrap();

        let record = index.lookup("big.bin").unwrap();
        assert_eq!(record.size(), big.len() as u64);
        assert_eq!(read_all(&record), big);

        let record = index.lookup("small.txt").unwrap();
        assert_eq!(read_all(&record), b"0123456789");
    }

    #[test]
    fn test_concurrent_reads() {
        let content: Vec<u8> = (0..50_000u32).map(|i| (i % 7) as u8).collect();
        let zip = build_zip(
            &[deflated("a.bin", &content), deflated("b.bin", &content)],
            &[],
        );
        let index = Arc::new(ArchiveIndex::build(zip.path(), "", "").unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = Arc::clone(&index);
                let expected = content.clone();
                std::thread::spawn(move || {
                    let name = if i % 2 == 0 { "a.bin" } else { "b.bin" };
                    let record = index.lookup(name).unwrap();
                    assert_eq!(read_all(&record), expected);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_close_clears_lookups() {
        let zip = build_zip(&[stored("a.txt", b"abc")], &[]);
        let index = ArchiveIndex::build(zip.path(), "", "a.txt").unwrap();
        let held = index.lookup("a.txt").unwrap();

        index.close();
        assert!(index.is_closed());
        assert!(index.lookup("a.txt").is_none());
        assert!(index.is_empty());

        // A record obtained before close still reads.
        assert_eq!(read_all(&held), b"abc");

        // Closing twice is harmless.
        index.close();
    }

    #[test]
    fn test_undecodable_entry_outside_prefix_is_skipped() {
        let zip = build_zip(
            &[
                stored("web/index.html", b"<p>hi</p>\n"),
                stored("other/x.bin", b"opaque"),
            ],
            &[],
        );
        // 12 is bzip2, which this build does not decode
        patch_entry(zip.path(), "other/x.bin", Some(12), None);

        let index = ArchiveIndex::build(zip.path(), "web/", "index.html").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(read_all(&index.lookup("index.html").unwrap()), b"<p>hi</p>\n");
    }

    #[test]
    fn test_undecodable_entry_fails_on_open() {
        let zip = build_zip(
            &[stored("a.txt", b"fine"), stored("b.bin", b"opaque")],
            &[],
        );
        patch_entry(zip.path(), "b.bin", Some(12), None);

        let index = ArchiveIndex::build(zip.path(), "", "a.txt").unwrap();
        assert_eq!(index.len(), 2);
        let record = index.lookup("b.bin").unwrap();
        assert_eq!(record.size(), 6);
        let result = record.read_with(|_| ());
        assert!(matches!(result, Err(ArchiveError::Entry { ref name, .. }) if name == "b.bin"));
        assert_eq!(read_all(&index.lookup("a.txt").unwrap()), b"fine");
    }

    #[test]
    fn test_duplicate_path_last_entry_wins() {
        let zip = build_zip(
            &[stored("dup/a1.txt", b"first"), stored("dup/a2.txt", b"second")],
            &[],
        );
        patch_entry(zip.path(), "dup/a2.txt", None, Some("dup/a1.txt"));

        let index = ArchiveIndex::build(zip.path(), "", "").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(read_all(&index.lookup("dup/a1.txt").unwrap()), b"second");
    }

    #[test]
    fn test_build_missing_file_fails() {
        let result = ArchiveIndex::build("/nonexistent/archive.zip", "", "index.html");
        assert!(matches!(result, Err(ArchiveError::Io(_))));
    }

    #[test]
    fn test_build_corrupt_archive_fails() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"this is not a zip archive at all").unwrap();
        tmp.flush().unwrap();
        let result = ArchiveIndex::build(tmp.path(), "", "index.html");
        assert!(matches!(result, Err(ArchiveError::Zip(_))));
    }
}
