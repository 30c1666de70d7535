//! The append-only completed-session log (`sessions.jsonl`).

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::Path;

use infratrack_core::Session;

use crate::error::{Result, StoreError};

/// Upper bound on one encoded session, newline excluded.
pub const MAX_RECORD_BYTES: usize = 32 * 1024 * 1024;

/// Open the log for appending, creating it if needed.
pub(crate) fn open_append(path: &Path) -> std::io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
}

/// Append one session as a single newline-terminated JSON line and sync it.
pub(crate) fn append_record(path: &Path, session: &Session) -> Result<()> {
    let mut line = serde_json::to_vec(session)?;
    line.push(b'\n');
    let mut file = open_append(path).map_err(StoreError::io("open sessions file"))?;
    file.write_all(&line)
        .map_err(StoreError::io("append session record"))?;
    file.sync_all()
        .map_err(StoreError::io("sync sessions file"))?;
    Ok(())
}

/// Line iterator that refuses to buffer more than `limit` bytes per line.
struct BoundedLines<R> {
    reader: R,
    limit: usize,
    line: usize,
}

impl<R: BufRead> BoundedLines<R> {
    /// Next raw line (without the terminator), `Ok(None)` at EOF.
    fn next_line(&mut self, path: &Path) -> Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let read = (&mut self.reader)
            .take(self.limit as u64 + 1)
            .read_until(b'\n', &mut buf)
            .map_err(StoreError::io("read sessions file"))?;
        if read == 0 {
            return Ok(None);
        }
        self.line += 1;
        if buf.last() == Some(&b'\n') {
            buf.pop();
        } else if buf.len() > self.limit {
            return Err(StoreError::RecordTooLarge {
                path: path.to_path_buf(),
                line: self.line,
                limit: self.limit,
            });
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn decode(path: &Path, line: usize, bytes: &[u8]) -> Result<Session> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        line,
        source,
    })
}

fn open_lines(path: &Path, limit: usize) -> Result<Option<BoundedLines<BufReader<File>>>> {
    match File::open(path) {
        Ok(file) => Ok(Some(BoundedLines {
            reader: BufReader::new(file),
            limit,
            line: 0,
        })),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io("open sessions file")(e)),
    }
}

/// Decode every record in log order. A missing log reads as empty.
pub(crate) fn read_all(path: &Path, limit: usize) -> Result<Vec<Session>> {
    let Some(mut lines) = open_lines(path, limit)? else {
        return Ok(Vec::new());
    };
    let mut sessions = Vec::with_capacity(32);
    while let Some(bytes) = lines.next_line(path)? {
        if is_blank(&bytes) {
            continue;
        }
        sessions.push(decode(path, lines.line, &bytes)?);
    }
    Ok(sessions)
}

/// Decode only the last non-blank record. Every line is still scanned so an
/// oversized line anywhere fails the read.
pub(crate) fn read_last(path: &Path, limit: usize) -> Result<Option<Session>> {
    let Some(mut lines) = open_lines(path, limit)? else {
        return Ok(None);
    };
    let mut last: Option<(usize, Vec<u8>)> = None;
    while let Some(bytes) = lines.next_line(path)? {
        if !is_blank(&bytes) {
            last = Some((lines.line, bytes));
        }
    }
    last.map(|(line, bytes)| decode(path, line, &bytes))
        .transpose()
}
