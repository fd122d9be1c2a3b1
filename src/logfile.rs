use std::fs::{File, OpenOptions};
use std::io;
use std::io::prelude::*;
use std::io::{BufReader, SeekFrom};
use std::path::{Path, PathBuf};

use crate::data::{self, Decoded};
use crate::errors::{Error, Result};

/// Append-only handle on the log file.
///
/// The file is opened append+read and stays open for the engine's lifetime.
/// Appends land at the end regardless of the read cursor, so the recovery
/// scan and later writes share one handle.
pub struct Log {
    path: PathBuf,
    file: File,
}

impl Log {
    /// Opens the log at `path`, creating it if absent. An empty path or a
    /// missing parent directory is `InvalidPath`; everything else that the
    /// filesystem refuses is `Io`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Log> {
        let path = path.as_ref();

        if path.as_os_str().is_empty() {
            return Err(Error::InvalidPath);
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(Error::InvalidPath);
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Ok(Log {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Appends `bytes`, retrying partial writes until everything is handed
    /// to the kernel, then flushes, then fsyncs when `sync` is set. A
    /// failure part-way leaves a truncated tail for recovery to tolerate.
    pub fn append(&mut self, bytes: &[u8], sync: bool) -> Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()?;
        if sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Rewinds and iterates decode outcomes from the first byte.
    pub fn records(&mut self, max_key_bytes: u32, max_value_bytes: u32) -> Result<Records<'_>> {
        self.file.seek(SeekFrom::Start(0))?;
        Ok(Records {
            reader: BufReader::new(&self.file),
            max_key_bytes,
            max_value_bytes,
            done: false,
        })
    }

    /// Replaces the handle with a fresh one on the current path. Used after
    /// compaction renames a rewritten file over the log.
    pub fn reopen(&mut self) -> Result<()> {
        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        Ok(())
    }
}

/// Iterator over the log's records. Yields until the clean end of stream
/// (then `None`) or a terminal outcome (`Truncated`/`BadCrc`, yielded once).
pub struct Records<'a> {
    reader: BufReader<&'a File>,
    max_key_bytes: u32,
    max_value_bytes: u32,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = io::Result<Decoded>;

    fn next(&mut self) -> Option<io::Result<Decoded>> {
        if self.done {
            return None;
        }
        match data::read_record(&mut self.reader, self.max_key_bytes, self.max_value_bytes) {
            Ok(Decoded::Eof) => {
                self.done = true;
                None
            }
            Ok(Decoded::Entry(record)) => Some(Ok(Decoded::Entry(record))),
            Ok(terminal) => {
                self.done = true;
                Some(Ok(terminal))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::Log;
    use crate::data::{Decoded, Record, DEFAULT_MAX_FIELD_BYTES};
    use crate::errors::Error;

    const MAX: u32 = DEFAULT_MAX_FIELD_BYTES;

    #[test]
    fn test_open_rejects_bad_paths() {
        assert!(matches!(Log::open(""), Err(Error::InvalidPath)));
        assert!(matches!(
            Log::open("no-such-directory/x.log"),
            Err(Error::InvalidPath)
        ));
    }

    #[test]
    fn test_append_then_scan() {
        let dir = TempDir::new().unwrap();
        let mut log = Log::open(dir.path().join("t.log")).unwrap();

        let first = Record::put(1, 0, &b"a"[..], &b"1"[..]);
        let second = Record::tombstone(2, &b"a"[..]);
        log.append(&first.encode(), false).unwrap();
        log.append(&second.encode(), true).unwrap();

        let scanned: Vec<_> = log
            .records(MAX, MAX)
            .unwrap()
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(
            scanned,
            vec![Decoded::Entry(first.clone()), Decoded::Entry(second.clone())]
        );

        // appends after a scan still go to the tail
        let third = Record::put(3, 0, &b"b"[..], &b"2"[..]);
        log.append(&third.encode(), false).unwrap();
        assert_eq!(log.records(MAX, MAX).unwrap().count(), 3);
        assert_eq!(log.len().unwrap(), first.size() * 2 + second.size());
    }

    #[test]
    fn test_truncated_tail_is_terminal() {
        let dir = TempDir::new().unwrap();
        let mut log = Log::open(dir.path().join("t.log")).unwrap();

        let whole = Record::put(1, 0, &b"key"[..], &b"value"[..]).encode();
        log.append(&whole, false).unwrap();
        log.append(&whole[..whole.len() - 2], false).unwrap();

        let scanned: Vec<_> = log
            .records(MAX, MAX)
            .unwrap()
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(scanned.len(), 2);
        assert!(matches!(scanned[0], Decoded::Entry(_)));
        assert_eq!(scanned[1], Decoded::Truncated);
    }
}
