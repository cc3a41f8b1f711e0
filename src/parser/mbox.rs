//! Streaming MBOX loader.
//!
//! Reads the archive line by line and hands out one [`RawMessage`] per entry.
//! Never loads the entire file into memory. Malformed entries are logged and
//! skipped; only I/O failures end the sequence with an error.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{BookError, Result};
use crate::model::message::RawMessage;
use crate::parser::header;

/// Size of the internal read buffer (1 MB for fast sequential reads).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB).
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Lazy, single-pass iterator over the entries of an MBOX archive.
///
/// Entries come out in archive order. The iterator is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - A UTF-8 BOM at the start of the file
/// - Junk before the first separator (logged and ignored)
///
/// Entries with truncated headers or an unterminated body are counted in
/// [`skipped`](Self::skipped) and never yielded.
pub struct ArchiveReader<R = BufReader<File>> {
    path: PathBuf,
    reader: R,
    max_message_size: usize,
    offset: u64,
    sequence: u64,
    skipped: u64,
    /// Separator line (and its offset) that opens the next entry.
    next_separator: Option<(u64, Vec<u8>)>,
    line_buf: Vec<u8>,
}

impl ArchiveReader<BufReader<File>> {
    /// Open an archive and position the reader on its first message boundary.
    ///
    /// Fails with [`BookError::UnreadableArchive`] if the file cannot be opened
    /// or read, and with [`BookError::EmptyArchive`] if it contains no
    /// `From ` boundary at all.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| BookError::unreadable(&path, e))?;
        Self::from_reader(path, BufReader::with_capacity(READ_BUFFER_SIZE, file))
    }
}

impl<R: BufRead> ArchiveReader<R> {
    /// Wrap an already opened reader. `path` is only used in diagnostics.
    pub fn from_reader(path: impl Into<PathBuf>, reader: R) -> Result<Self> {
        let mut this = Self {
            path: path.into(),
            reader,
            max_message_size: MAX_MESSAGE_SIZE,
            offset: 0,
            sequence: 0,
            skipped: 0,
            next_separator: None,
            line_buf: Vec::with_capacity(4096),
        };
        this.seek_first_boundary()?;
        Ok(this)
    }

    /// Override the maximum entry size; larger entries are skipped as unterminated.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Number of malformed entries skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Number of entries seen so far, skipped ones included.
    pub fn entries_seen(&self) -> u64 {
        self.sequence
    }

    /// Read one line into `line_buf`. Returns its length, 0 at EOF.
    fn read_line(&mut self) -> Result<usize> {
        self.line_buf.clear();
        let len = self
            .reader
            .read_until(b'\n', &mut self.line_buf)
            .map_err(|e| BookError::unreadable(&self.path, e))?;
        self.offset += len as u64;
        Ok(len)
    }

    fn seek_first_boundary(&mut self) -> Result<()> {
        let mut preamble: u64 = 0;
        loop {
            let start = self.offset;
            if self.read_line()? == 0 {
                return Err(BookError::EmptyArchive(self.path.clone()));
            }
            if is_mbox_separator(&self.line_buf) {
                if preamble > 0 {
                    warn!(bytes = preamble, "Ignoring content before first message boundary");
                }
                self.next_separator = Some((start, strip_bom(&self.line_buf).to_vec()));
                return Ok(());
            }
            if !is_blank_line(&self.line_buf) {
                preamble += self.line_buf.len() as u64;
            }
        }
    }

    /// Collect the lines of the current entry up to the next boundary or EOF.
    fn read_entry(&mut self) -> Result<(Vec<u8>, bool)> {
        let mut message_buf: Vec<u8> = Vec::with_capacity(16 * 1024);
        let mut oversized = false;
        let mut prev_line_was_empty = false;

        loop {
            let start = self.offset;
            if self.read_line()? == 0 {
                return Ok((message_buf, oversized));
            }

            if is_mbox_separator(&self.line_buf) {
                if !prev_line_was_empty {
                    warn!(
                        offset = start,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                self.next_separator = Some((start, self.line_buf.clone()));
                return Ok((message_buf, oversized));
            }

            if message_buf.len() + self.line_buf.len() <= self.max_message_size {
                message_buf.extend_from_slice(&self.line_buf);
            } else {
                oversized = true;
            }
            prev_line_was_empty = is_blank_line(&self.line_buf);
        }
    }
}

impl<R: BufRead> Iterator for ArchiveReader<R> {
    type Item = Result<RawMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (offset, separator) = self.next_separator.take()?;
            let (bytes, oversized) = match self.read_entry() {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };

            let sequence = self.sequence;
            self.sequence += 1;

            if let Err(reason) = check_entry(&bytes, oversized) {
                self.skipped += 1;
                warn!("{}", BookError::MalformedMessage { offset, reason });
                continue;
            }

            let envelope_date = header::parse_envelope_date(&String::from_utf8_lossy(&separator));
            debug!(offset, sequence, len = bytes.len(), "Loaded archive entry");

            return Some(Ok(RawMessage {
                sequence,
                offset,
                envelope_date,
                bytes,
            }));
        }
    }
}

/// Reject entries that cannot be a message: no header fields, a header block
/// that never ends, or a body cut off by the size limit.
fn check_entry(bytes: &[u8], oversized: bool) -> std::result::Result<(), String> {
    if oversized {
        return Err("unterminated body: entry exceeds maximum message size".into());
    }
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err("empty entry".into());
    }

    let first = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    if !is_header_field(first) {
        return Err("truncated headers: entry does not start with a header field".into());
    }
    if find_header_end(bytes).is_none() {
        return Err("truncated headers: no blank line before end of entry".into());
    }
    Ok(())
}

/// Find the byte offset where headers end (position of the first blank line).
pub(crate) fn find_header_end(data: &[u8]) -> Option<usize> {
    (0..data.len().saturating_sub(1)).find(|&i| {
        data[i..].starts_with(b"\n\n") || data[i..].starts_with(b"\r\n\r\n")
    })
}

/// `Name: value` with a printable, space-free field name.
fn is_header_field(line: &[u8]) -> bool {
    match line.iter().position(|&b| b == b':') {
        Some(0) | None => false,
        Some(colon) => line[..colon]
            .iter()
            .all(|&b| b.is_ascii_graphic() && b != b':'),
    }
}

fn strip_bom(line: &[u8]) -> &[u8] {
    line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line)
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    strip_bom(line).starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> Result<ArchiveReader<Cursor<Vec<u8>>>> {
        ArchiveReader::from_reader("test.mbox", Cursor::new(text.as_bytes().to_vec()))
    }

    const TWO: &str = "From a@x Thu Jan 04 10:00:00 2024\n\
Subject: One\n\
\n\
First body\n\
\n\
From b@x Fri Jan 05 10:00:00 2024\n\
Subject: Two\n\
\n\
Second body\n";

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(b"From user@example.com Thu Jan 01 00:00:00 2024\n"));
        assert!(!is_mbox_separator(b"from user@example.com\n"));
        assert!(!is_mbox_separator(b">From user@example.com\n"));
        assert!(!is_mbox_separator(b"Subject: From here\n"));
    }

    #[test]
    fn test_is_mbox_separator_with_bom() {
        let mut line = vec![0xEF, 0xBB, 0xBF];
        line.extend_from_slice(b"From user@example.com Thu Jan 01 00:00:00 2024\n");
        assert!(is_mbox_separator(&line));
    }

    #[test]
    fn test_yields_entries_in_order() {
        let entries: Vec<RawMessage> = reader(TWO).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sequence, 0);
        assert_eq!(entries[1].sequence, 1);
        assert!(entries[0].bytes.starts_with(b"Subject: One"));
        assert!(entries[1].bytes.starts_with(b"Subject: Two"));
        assert_eq!(entries[1].offset, TWO.find("From b@x").unwrap() as u64);
        assert!(entries[0].envelope_date.is_some());
    }

    #[test]
    fn test_zero_boundaries_is_empty_archive() {
        let err = reader("just some text\nwithout separators\n").err().unwrap();
        assert!(matches!(&err, BookError::EmptyArchive(p) if p == Path::new("test.mbox")));
        let err = reader("").err().unwrap();
        assert!(matches!(err, BookError::EmptyArchive(_)));
    }

    #[test]
    fn test_malformed_entries_are_skipped_and_counted() {
        let text = "From a@x Thu Jan 04 10:00:00 2024\n\
this is not a header\n\
\n\
From b@x Thu Jan 04 10:00:00 2024\n\
Subject: ok\n\
\n\
fine\n\
\n\
From c@x Thu Jan 04 10:00:00 2024\n\
Subject: cut off mid-head";
        let mut r = reader(text).unwrap();
        let good: Vec<RawMessage> = r.by_ref().map(|m| m.unwrap()).collect();
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].sequence, 1);
        assert_eq!(r.skipped(), 2);
        assert_eq!(r.entries_seen(), 3);
    }

    #[test]
    fn test_oversized_entry_is_skipped() {
        let mut r = reader(TWO).unwrap().with_max_message_size(20);
        assert_eq!(r.by_ref().count(), 0);
        assert_eq!(r.skipped(), 2);
    }

    #[test]
    fn test_separator_without_blank_line_still_splits() {
        let text = "From a@x Thu Jan 04 10:00:00 2024\n\
Subject: One\n\
\n\
body\n\
From b@x Thu Jan 04 10:00:00 2024\n\
Subject: Two\n\
\n\
body\n";
        assert_eq!(reader(text).unwrap().count(), 2);
    }

    #[test]
    fn test_preamble_is_ignored() {
        let text = format!("garbage line\n\n{TWO}");
        assert_eq!(reader(&text).unwrap().count(), 2);
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"From: a@b.com\nSubject: Hi\n\nBody\n"), Some(25));
        assert_eq!(
            find_header_end(b"From: a@b.com\r\nSubject: Hi\r\n\r\nBody\r\n"),
            Some(26)
        );
        assert_eq!(find_header_end(b"Subject: no body\n"), None);
    }

    #[test]
    fn test_is_header_field() {
        assert!(is_header_field(b"Subject: hi"));
        assert!(is_header_field(b"X-Gmail-Labels: Inbox"));
        assert!(!is_header_field(b"Hello there: friend"));
        assert!(!is_header_field(b": empty name"));
    }
}
