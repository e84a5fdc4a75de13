//! Shared archive file handle
//!
//! A cloneable `Read + Seek` view over one open file. Every clone keeps its own
//! cursor and reads with positional I/O, so clones can decompress different
//! entries on different threads without contending for the OS file offset.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ArchiveFile {
    file: Arc<File>,
    len: u64,
    pos: u64,
}

impl ArchiveFile {
    /// Open the archive container at `path`
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
            pos: 0,
        })
    }

    /// Total length of the underlying file in bytes
    pub const fn len(&self) -> u64 {
        self.len
    }
}

impl Read for ArchiveFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let n = read_at(&self.file, buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ArchiveFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.pos = offset;
                Ok(offset)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn test_clones_keep_independent_cursors() {
        let tmp = sample_file(b"0123456789");
        let mut a = ArchiveFile::open(tmp.path()).unwrap();
        let mut b = a.clone();

        let mut buf = [0u8; 4];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");

        b.seek(SeekFrom::Start(6)).unwrap();
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"6789");

        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"4567");
    }

    #[test]
    fn test_seek_from_end_and_eof() {
        let tmp = sample_file(b"abcdef");
        let mut f = ArchiveFile::open(tmp.path()).unwrap();
        assert_eq!(f.len(), 6);
        assert_eq!(f.seek(SeekFrom::End(-2)).unwrap(), 4);

        let mut rest = Vec::new();
        f.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"ef");
        assert_eq!(f.read(&mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn test_negative_seek_rejected() {
        let tmp = sample_file(b"abc");
        let mut f = ArchiveFile::open(tmp.path()).unwrap();
        assert!(f.seek(SeekFrom::Current(-1)).is_err());
    }
}
