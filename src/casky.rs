use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::data::{Decoded, Record, DEFAULT_MAX_FIELD_BYTES};
use crate::errors::{Error, ErrorCode, Result};
use crate::key_dir::{KeyDir, Lookup};
use crate::logfile::Log;
use crate::stats::Stats;
use crate::sync::EngineLock;
use crate::util::now_secs;

/// `Casky` configuration. Provides control over durability and decode
/// limits before opening a database.
///
/// # Examples
///
/// ```rust,no_run
/// use casky::CaskyOptions;
///
/// let db = CaskyOptions::default()
///     .sync_on_write(true)
///     .open("casky.db")
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct CaskyOptions {
    sync_on_write: bool,
    max_key_bytes: u32,
    max_value_bytes: u32,
}

impl Default for CaskyOptions {
    fn default() -> CaskyOptions {
        CaskyOptions {
            sync_on_write: false,
            max_key_bytes: DEFAULT_MAX_FIELD_BYTES,
            max_value_bytes: DEFAULT_MAX_FIELD_BYTES,
        }
    }
}

impl CaskyOptions {
    pub fn new() -> CaskyOptions {
        CaskyOptions::default()
    }

    /// Fsync the log after every mutation before acknowledging it. Maximum
    /// crash tolerance at a throughput cost. Defaults to `false`.
    pub fn sync_on_write(&mut self, sync: bool) -> &mut CaskyOptions {
        self.sync_on_write = sync;
        self
    }

    /// Largest key the decoder will accept. Defaults to 64 MiB.
    pub fn max_key_bytes(&mut self, max: u32) -> &mut CaskyOptions {
        self.max_key_bytes = max;
        self
    }

    /// Largest value the decoder will accept. Defaults to 64 MiB.
    pub fn max_value_bytes(&mut self, max: u32) -> &mut CaskyOptions {
        self.max_value_bytes = max;
        self
    }

    /// Opens/creates a `Casky` database at `path`.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Casky> {
        Casky::open_with(path, self.clone())
    }
}

struct Inner {
    dir: KeyDir,
    log: Log,
    corrupted: bool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Err(err) = self.log.sync() {
            warn!("failed to sync log on drop: {}", err);
        }
    }
}

/// A handle to a `Casky` database: one append-only log file on disk plus an
/// in-memory directory of the live keys.
///
/// Handles are cheap to clone. With the `thread-safe` feature every public
/// operation is serialised by an internal mutex and clones may be shared
/// across threads; without it there is no internal locking and handles stay
/// on the thread that opened the database.
///
/// Mutations update the directory first and append to the log second. If
/// the append fails the in-memory change is kept, so on `Io` the memory
/// state may be ahead of the disk state; callers should close and reopen.
#[derive(Clone)]
pub struct Casky {
    options: CaskyOptions,
    inner: Arc<EngineLock<Inner>>,
    stats: Arc<EngineLock<Stats>>,
    last_error: Arc<AtomicU32>,
}

impl Casky {
    /// Opens/creates a database at `path` with default options, replaying
    /// the log into memory.
    ///
    /// When recovery halts on a bad record the engine is still returned:
    /// [`corrupted`](Casky::corrupted) reads `true`,
    /// [`last_error`](Casky::last_error) reads [`ErrorCode::Corrupt`], and a
    /// compaction is advisable.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Casky> {
        CaskyOptions::default().open(path)
    }

    /// Whether this build serialises operations internally (the
    /// `thread-safe` feature).
    pub fn is_thread_safe() -> bool {
        cfg!(feature = "thread-safe")
    }

    fn open_with<P: AsRef<Path>>(path: P, options: CaskyOptions) -> Result<Casky> {
        let path = path.as_ref();
        info!("opening database {:?}", path);

        let mut log = Log::open(path)?;
        let mut dir = KeyDir::new();
        let mut corrupted = false;

        for item in log.records(options.max_key_bytes, options.max_value_bytes)? {
            match item? {
                Decoded::Entry(record) => {
                    if record.is_tombstone() {
                        dir.delete_in_memory(&record.key);
                    } else {
                        dir.put_in_memory(
                            &record.key,
                            &record.value,
                            record.timestamp,
                            record.expires_at,
                        );
                    }
                }
                Decoded::Truncated => {
                    warn!("recovery halted on a truncated record in {:?}", path);
                    corrupted = true;
                    break;
                }
                Decoded::BadCrc => {
                    warn!("recovery halted on a bad checksum in {:?}", path);
                    corrupted = true;
                    break;
                }
                Decoded::Eof => break,
            }
        }

        let stats = Stats {
            total_keys: dir.len() as u64,
            memory_bytes: dir.entries().map(|entry| entry.footprint() as u64).sum(),
            ..Stats::new()
        };

        if corrupted {
            warn!(
                "opened database {:?} with {} recovered keys; log is corrupt, compaction advised",
                path,
                dir.len()
            );
        } else {
            info!(
                "opened database {:?} ({} live keys, {} bytes on disk)",
                path,
                dir.len(),
                log.len()?
            );
        }

        let initial = if corrupted {
            ErrorCode::Corrupt
        } else {
            ErrorCode::Ok
        };

        Ok(Casky {
            options,
            inner: Arc::new(EngineLock::new(Inner {
                dir,
                log,
                corrupted,
            })),
            stats: Arc::new(EngineLock::new(stats)),
            last_error: Arc::new(AtomicU32::new(initial as u32)),
        })
    }

    /// Flushes and syncs the log, consuming this handle. Other clones of
    /// the handle remain usable.
    pub fn close(self) -> Result<()> {
        let result = self.inner.lock().log.sync();
        self.finish(result)
    }

    /// Inserts or updates `key`. A `ttl_secs` of 0 means the entry never
    /// expires; otherwise it becomes invisible `ttl_secs` seconds from now.
    pub fn put<K, V>(&self, key: K, value: V, ttl_secs: u64) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let result = self.put_inner(key.as_ref(), value.as_ref(), ttl_secs);
        self.finish(result)
    }

    fn put_inner(&self, key: &[u8], value: &[u8], ttl_secs: u64) -> Result<()> {
        // An empty value would frame as a tombstone, so both are invalid.
        if key.is_empty() || value.is_empty() {
            return Err(Error::InvalidKey);
        }
        if key.len() as u64 > u64::from(self.options.max_key_bytes)
            || value.len() as u64 > u64::from(self.options.max_value_bytes)
        {
            return Err(Error::InvalidKey);
        }

        let timestamp = now_secs();
        let expires_at = if ttl_secs > 0 {
            timestamp.saturating_add(ttl_secs)
        } else {
            0
        };

        let mut inner = self.inner.lock();
        let previous = inner.dir.put_in_memory(key, value, timestamp, expires_at);

        {
            let mut stats = self.stats.lock();
            match previous {
                Some(old_value_len) => stats.on_replace(old_value_len, value.len()),
                None => stats.on_insert(key.len() + value.len()),
            }
        }

        let record = Record::put(timestamp, expires_at, key, value);
        inner.log.append(&record.encode(), self.options.sync_on_write)
    }

    /// Returns an owned copy of the live value, or `None` when the key is
    /// absent or expired. Never touches the log.
    pub fn get<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>> {
        let result = self.get_inner(key.as_ref());
        match &result {
            Ok(Some(_)) => self.set_last(ErrorCode::Ok),
            Ok(None) => self.set_last(ErrorCode::KeyNotFound),
            Err(err) => self.set_last(err.code()),
        }
        result
    }

    fn get_inner(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Err(Error::InvalidKey);
        }

        let now = now_secs();
        let mut inner = self.inner.lock();

        match inner.dir.get_in_memory(key, now) {
            Lookup::Found(value) => {
                self.stats.lock().on_get_hit();
                Ok(Some(value))
            }
            Lookup::Expired(entry) => {
                debug!("entry expired on lookup ({} bytes freed)", entry.footprint());
                self.stats.lock().on_evict(1, entry.footprint());
                Ok(None)
            }
            Lookup::NotFound => Ok(None),
        }
    }

    /// Removes `key`, appending a tombstone to the log. A key that is not
    /// live is `KeyNotFound` and nothing is written.
    pub fn delete<K: AsRef<[u8]>>(&self, key: K) -> Result<()> {
        let result = self.delete_inner(key.as_ref());
        self.finish(result)
    }

    fn delete_inner(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidKey);
        }

        let mut inner = self.inner.lock();
        let removed = match inner.dir.delete_in_memory(key) {
            Some(entry) => entry,
            None => return Err(Error::KeyNotFound),
        };

        self.stats.lock().on_delete(removed.footprint());

        let record = Record::tombstone(now_secs(), key);
        inner.log.append(&record.encode(), self.options.sync_on_write)
    }

    /// Rewrites the log so it holds exactly one PUT record per live,
    /// unexpired entry and no tombstones.
    ///
    /// The rewrite goes to a temporary file beside the log, is flushed (and
    /// fsynced under `sync_on_write`), and is renamed over the live path
    /// only once complete; any earlier failure removes the temporary file
    /// and leaves the log untouched. A successful compaction clears the
    /// `corrupted` flag.
    pub fn compact(&self) -> Result<()> {
        let result = self.compact_inner();
        self.finish(result)
    }

    fn compact_inner(&self) -> Result<()> {
        let now = now_secs();
        let mut inner = self.inner.lock();

        let live_path = inner.log.path().to_path_buf();
        let parent = match live_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = match live_path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return Err(Error::InvalidPath),
        };

        // Dropped on any early return, which unlinks the partial file.
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!("{}.", file_name))
            .rand_bytes(6)
            .tempfile_in(parent)?;

        let mut written = 0usize;
        for entry in inner.dir.entries() {
            if entry.is_expired(now) {
                continue;
            }
            let record = Record::put(
                entry.timestamp(),
                entry.expires_at(),
                entry.key(),
                entry.value(),
            );
            tmp.write_all(&record.encode())?;
            written += 1;
        }

        tmp.flush()?;
        if self.options.sync_on_write {
            tmp.as_file().sync_data()?;
        }

        tmp.persist(&live_path).map_err(|err| Error::Io(err.error))?;
        inner.log.reopen()?;
        inner.corrupted = false;

        info!("compacted {:?}: {} live records", live_path, written);
        Ok(())
    }

    /// Sweeps every bucket and drops entries past their expiry. Memory-only:
    /// the underlying records stay in the log until the next compaction.
    pub fn expire(&self) {
        let now = now_secs();
        let mut inner = self.inner.lock();

        let (removed, freed) = inner.dir.sweep_expired(now);
        if removed > 0 {
            debug!("expired {} entries ({} bytes)", removed, freed);
            self.stats.lock().on_evict(removed, freed);
        }
        self.set_last(ErrorCode::Ok);
    }

    /// Writes one PUT record per live, unexpired entry to a fresh file at
    /// `path`. The result is a valid log: opening it yields the state this
    /// engine held at the time of the snapshot.
    pub fn snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let result = self.snapshot_inner(path.as_ref());
        self.finish(result)
    }

    fn snapshot_inner(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidPath);
        }

        let now = now_secs();
        let inner = self.inner.lock();

        let mut file = File::create(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::InvalidPath
            } else {
                Error::Io(err)
            }
        })?;

        let mut written = 0usize;
        for entry in inner.dir.entries() {
            if entry.is_expired(now) {
                continue;
            }
            let record = Record::put(
                entry.timestamp(),
                entry.expires_at(),
                entry.key(),
                entry.value(),
            );
            file.write_all(&record.encode())?;
            written += 1;
        }

        file.flush()?;
        file.sync_data()?;

        info!("snapshot {:?}: {} live records", path, written);
        Ok(())
    }

    /// Number of live entries in the directory.
    pub fn len(&self) -> usize {
        self.inner.lock().dir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().dir.is_empty()
    }

    /// Whether recovery halted on a bad record and the log has not been
    /// compacted since.
    pub fn corrupted(&self) -> bool {
        self.inner.lock().corrupted
    }

    /// Outcome code of the most recent operation on this engine.
    pub fn last_error(&self) -> ErrorCode {
        ErrorCode::from_u32(self.last_error.load(Ordering::Relaxed))
    }

    /// Point-in-time copy of the counters.
    pub fn stats(&self) -> Stats {
        *self.stats.lock()
    }

    fn set_last(&self, code: ErrorCode) {
        self.last_error.store(code as u32, Ordering::Relaxed);
    }

    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.set_last(ErrorCode::Ok),
            Err(err) => self.set_last(err.code()),
        }
        result
    }
}
