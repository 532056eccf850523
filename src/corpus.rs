//! Byte-seekable corpus sources.
//!
//! Every [`Corpus::open`] call hands out a fresh, independent cursor. The
//! boundary scan and each pre-tokenization worker open their own, so no
//! reader is ever shared between threads.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Result, TrainError};

/// A training corpus that can be read from any byte offset.
pub trait Corpus: Sync {
    type Reader: Read + Seek;

    /// Open a new cursor positioned at byte 0.
    fn open(&self) -> Result<Self::Reader>;
}

/// Corpus stored in a file on disk.
#[derive(Debug, Clone)]
pub struct FileCorpus {
    path: PathBuf,
}

impl FileCorpus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Corpus for FileCorpus {
    type Reader = File;

    fn open(&self) -> Result<File> {
        File::open(&self.path).map_err(|err| TrainError::Io {
            path: self.path.clone(),
            err,
        })
    }
}

/// Corpus borrowed from memory.
#[derive(Debug, Clone, Copy)]
pub struct MemoryCorpus<'a> {
    bytes: &'a [u8],
}

impl<'a> MemoryCorpus<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl<'a> Corpus for MemoryCorpus<'a> {
    type Reader = Cursor<&'a [u8]>;

    fn open(&self) -> Result<Cursor<&'a [u8]>> {
        Ok(Cursor::new(self.bytes))
    }
}

/// Total length of the stream in bytes. Leaves the cursor at the end.
pub(crate) fn stream_len<R: Seek>(reader: &mut R) -> Result<u64> {
    Ok(reader.seek(SeekFrom::End(0))?)
}

/// Read the half-open byte range `[start, end)` from a fresh cursor.
pub(crate) fn read_range<C: Corpus>(corpus: &C, start: u64, end: u64) -> Result<Vec<u8>> {
    let mut reader = corpus.open()?;
    reader.seek(SeekFrom::Start(start))?;
    let len = end.saturating_sub(start);
    let mut buf = Vec::with_capacity(len as usize);
    reader.take(len).read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_corpus_read_range() {
        let corpus = MemoryCorpus::new(b"hello world");
        assert_eq!(read_range(&corpus, 6, 11).unwrap(), b"world");
        assert_eq!(read_range(&corpus, 0, 0).unwrap(), b"");
    }

    #[test]
    fn test_memory_corpus_independent_cursors() {
        let corpus = MemoryCorpus::new(b"abcdef");
        let mut a = corpus.open().unwrap();
        let b = corpus.open().unwrap();
        a.seek(SeekFrom::Start(4)).unwrap();
        assert_eq!(b.position(), 0);
    }

    #[test]
    fn test_file_corpus_read_range_and_len() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"first\nsecond\n").unwrap();
        let corpus = FileCorpus::new(file.path());
        let mut reader = corpus.open().unwrap();
        assert_eq!(stream_len(&mut reader).unwrap(), 13);
        assert_eq!(read_range(&corpus, 6, 12).unwrap(), b"second");
    }

    #[test]
    fn test_file_corpus_missing_path_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let err = FileCorpus::new(&missing).open().unwrap_err();
        match err {
            TrainError::Io { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }
}
