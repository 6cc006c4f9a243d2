//! Gzip-compressed n-gram shard reader
//!
//! Each line is `word \t <ignored> \t count [\t ...]`. Lines with fewer than
//! three fields, or that are not valid UTF-8, are skipped and counted. Word
//! and count are handed on unvalidated; shape checks happen downstream.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::ParseError;

const READ_BUFFER_BYTES: usize = 256 * 1024;

/// One raw `(word, count)` pair from a shard line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub word: String,
    pub count: String,
}

/// Line counters for one pass over a shard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines_read: u64,
    pub malformed_lines: u64,
}

/// Lazy iterator over a shard's entries.
///
/// Not restartable: open a new reader to scan the shard again.
pub struct ShardReader<R> {
    reader: R,
    path: PathBuf,
    buf: Vec<u8>,
    stats: ParseStats,
}

impl ShardReader<BufReader<MultiGzDecoder<File>>> {
    /// Open a gzip shard from disk.
    pub fn open(path: &Path) -> Result<Self, ParseError> {
        let file = File::open(path).map_err(|source| ParseError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::with_capacity(READ_BUFFER_BYTES, MultiGzDecoder::new(file));
        Ok(Self::from_reader(reader, path))
    }
}

impl<R: BufRead> ShardReader<R> {
    /// Wrap an already-decompressed line source.
    pub fn from_reader(reader: R, path: &Path) -> Self {
        Self {
            reader,
            path: path.to_path_buf(),
            buf: Vec::with_capacity(256),
            stats: ParseStats::default(),
        }
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }
}

impl<R: BufRead> Iterator for ShardReader<R> {
    type Item = Result<RawEntry, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(source) => {
                    return Some(Err(ParseError::ReadFailed {
                        path: self.path.clone(),
                        source,
                    }))
                }
            }

            self.stats.lines_read += 1;
            match split_line(&self.buf) {
                Some(entry) => return Some(Ok(entry)),
                None => self.stats.malformed_lines += 1,
            }
        }
    }
}

fn split_line(raw: &[u8]) -> Option<RawEntry> {
    let line = std::str::from_utf8(raw).ok()?;
    let line = line.trim_end_matches(['\n', '\r']);

    let mut fields = line.split('\t');
    let word = fields.next()?;
    let _middle = fields.next()?;
    let count = fields.next()?;

    Some(RawEntry {
        word: word.to_string(),
        count: count.to_string(),
    })
}

/// A word is usable iff it is non-empty ASCII letters only.
pub fn is_valid_word(word: &str) -> bool {
    !word.is_empty() && word.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Aggregation key for a valid word.
pub fn normalize_word(word: &str) -> String {
    word.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    fn entries(input: &str) -> (Vec<RawEntry>, ParseStats) {
        let mut reader = ShardReader::from_reader(Cursor::new(input.as_bytes()), Path::new("mem"));
        let entries = reader.by_ref().map(|e| e.unwrap()).collect();
        (entries, reader.stats())
    }

    #[test]
    fn test_extracts_word_and_third_field() {
        let (entries, stats) = entries("the\t2000\t500000\t1200\nzeppelin\t1999\t42\n");
        assert_eq!(
            entries,
            vec![
                RawEntry {
                    word: "the".into(),
                    count: "500000".into()
                },
                RawEntry {
                    word: "zeppelin".into(),
                    count: "42".into()
                },
            ]
        );
        assert_eq!(stats.lines_read, 2);
        assert_eq!(stats.malformed_lines, 0);
    }

    #[test]
    fn test_short_lines_are_counted_and_skipped() {
        let (entries, stats) = entries("lonely\nword\t2000\n\nok\t2000\t7\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].word, "ok");
        assert_eq!(stats.lines_read, 4);
        assert_eq!(stats.malformed_lines, 3);
    }

    #[test]
    fn test_crlf_and_missing_trailing_newline() {
        let (entries, _) = entries("a\t1\t5\r\nb\t1\t6");
        assert_eq!(entries[0].count, "5");
        assert_eq!(entries[1].count, "6");
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut bytes = b"ok\t1\t2\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\t', b'1', b'\t', b'2', b'\n']);
        let mut reader = ShardReader::from_reader(Cursor::new(bytes), Path::new("mem"));
        let entries: Vec<_> = reader.by_ref().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(reader.stats().malformed_lines, 1);
    }

    #[test]
    fn test_open_gzip_shard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"Queen\t1975\t800\nTh3\t2000\t9999\n").unwrap();
        encoder.finish().unwrap();

        let entries: Vec<_> = ShardReader::open(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].word, "Queen");
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        let first = ShardReader::open(&path).unwrap().next();
        assert!(matches!(first, Some(Err(ParseError::ReadFailed { .. }))));
    }

    #[test]
    fn test_word_validity() {
        assert!(is_valid_word("the"));
        assert!(is_valid_word("Zeppelin"));
        assert!(!is_valid_word(""));
        assert!(!is_valid_word("Th3"));
        assert!(!is_valid_word("rock_NOUN"));
        assert!(!is_valid_word("don't"));
        assert!(!is_valid_word("café"));
    }

    #[test]
    fn test_normalize_word() {
        assert_eq!(normalize_word("QuEEn"), "queen");
    }
}
