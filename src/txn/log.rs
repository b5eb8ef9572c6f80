//! The transaction log (`txn.log`).
//!
//! # File Layout
//! ```text
//! ┌──────────────────────────── header (24 bytes) ─────────────────────────┐
//! │ magic (4) │ format (4) │ next_txn_id (8) │ next_log_id (8)             │
//! └────────────────────────────────────────────────────────────────────────┘
//! ┌────────── record ──────────┐┌────────── record ──────────┐
//! │ len │ log_id │ txn │ type │ payload │ crc32 ││ ...
//! └────────────────────────────┘└────────────────────────────┘
//! ```
//!
//! Records are appended in log-id order and never rewritten. A checkpoint
//! truncates the file back to its header, persisting the next transaction
//! and log ids so that both keep increasing across restarts.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{LogEntry, LogRecord};
use crate::common::{Error, LogId, Result, TxnId};

pub const LOG_FILE: &str = "txn.log";

const MAGIC: u32 = 0x4C54_4C42; // "BLTL"
const FORMAT: u32 = 2;
const HEADER_LEN: u64 = 24;

struct LogInner {
    file: File,
    /// End of the last intact record.
    end: u64,
    next_log_id: LogId,
    next_txn_id: TxnId,
}

/// Append-only write-ahead log of one database.
///
/// # Thread Safety
/// The file and both id counters sit behind one `Mutex`. It is never
/// held while another lock is requested.
pub struct TransactionLog {
    inner: Mutex<LogInner>,
}

impl TransactionLog {
    /// Open `txn.log` in `dir`, creating it if missing.
    ///
    /// A torn or corrupt tail is cut off so later appends follow the last
    /// intact record.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(LOG_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.is_empty() {
            write_header(&mut file, TxnId::new(1), 0)?;
            file.sync_all()?;
            return Ok(Self::with_state(file, HEADER_LEN, 0, TxnId::new(1)));
        }

        let (header_txn, header_log) = parse_header(&bytes)?;
        let (entries, end) = scan(&bytes);
        if end < bytes.len() as u64 {
            file.set_len(end)?;
            file.sync_all()?;
        }

        let next_log_id = entries
            .last()
            .map_or(header_log, |e| header_log.max(e.log_id + 1));
        let next_txn_id = entries
            .iter()
            .map(|e| e.txn_id.next())
            .fold(header_txn, TxnId::max);
        debug!(
            entries = entries.len(),
            next_txn = %next_txn_id,
            next_log_id,
            "transaction log opened"
        );
        Ok(Self::with_state(file, end, next_log_id, next_txn_id))
    }

    fn with_state(file: File, end: u64, next_log_id: LogId, next_txn_id: TxnId) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                file,
                end,
                next_log_id,
                next_txn_id,
            }),
        }
    }

    /// Hand out the next transaction id.
    pub fn next_txn_id(&self) -> TxnId {
        let mut inner = self.inner.lock();
        let id = inner.next_txn_id;
        inner.next_txn_id = id.next();
        id
    }

    /// Append a record. It is durable only after a later sync.
    pub fn append(&self, txn: TxnId, kind: LogRecord) -> Result<LogId> {
        let mut inner = self.inner.lock();
        append_locked(&mut inner, txn, kind)
    }

    /// Append a record and wait for it to reach stable storage.
    pub fn append_sync(&self, txn: TxnId, kind: LogRecord) -> Result<LogId> {
        let mut inner = self.inner.lock();
        let id = append_locked(&mut inner, txn, kind)?;
        inner.file.sync_data()?;
        Ok(id)
    }

    pub fn sync(&self) -> Result<()> {
        self.inner.lock().file.sync_data().map_err(Error::from)
    }

    /// Every intact record, in log order.
    pub fn read_all(&self) -> Result<Vec<LogEntry>> {
        let mut inner = self.inner.lock();
        let end = inner.end;
        let mut bytes = vec![0u8; end as usize];
        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.read_exact(&mut bytes)?;
        Ok(scan(&bytes).0)
    }

    /// Drop every record, persisting the next transaction and log ids.
    pub fn truncate(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let (next_txn, next_log) = (inner.next_txn_id, inner.next_log_id);
        inner.file.set_len(0)?;
        write_header(&mut inner.file, next_txn, next_log)?;
        inner.file.sync_all()?;
        inner.end = HEADER_LEN;
        Ok(())
    }

    /// Bytes of records after the header.
    pub fn len(&self) -> u64 {
        self.inner.lock().end - HEADER_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn append_locked(inner: &mut LogInner, txn: TxnId, kind: LogRecord) -> Result<LogId> {
    let log_id = inner.next_log_id;
    let bytes = LogEntry {
        log_id,
        txn_id: txn,
        kind,
    }
    .encode();

    let end = inner.end;
    inner.file.seek(SeekFrom::Start(end))?;
    inner.file.write_all(&bytes)?;
    inner.end = end + bytes.len() as u64;
    inner.next_log_id = log_id + 1;
    Ok(log_id)
}

fn write_header(file: &mut File, next_txn: TxnId, next_log: LogId) -> Result<()> {
    let mut header = [0u8; HEADER_LEN as usize];
    header[..4].copy_from_slice(&MAGIC.to_le_bytes());
    header[4..8].copy_from_slice(&FORMAT.to_le_bytes());
    header[8..16].copy_from_slice(&next_txn.0.to_le_bytes());
    header[16..24].copy_from_slice(&next_log.to_le_bytes());
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header)?;
    Ok(())
}

fn parse_header(bytes: &[u8]) -> Result<(TxnId, LogId)> {
    let corrupt = |reason: &str| Error::LogCorrupted {
        file: LOG_FILE,
        offset: 0,
        reason: reason.to_string(),
    };
    let header = bytes
        .get(..HEADER_LEN as usize)
        .ok_or_else(|| corrupt("header is truncated"))?;

    let word = |range: std::ops::Range<usize>| {
        let mut out = [0u8; 4];
        out.copy_from_slice(&header[range]);
        u32::from_le_bytes(out)
    };
    if word(0..4) != MAGIC {
        return Err(corrupt("bad magic"));
    }
    if word(4..8) != FORMAT {
        return Err(corrupt("unsupported format"));
    }
    let long = |range: std::ops::Range<usize>| {
        let mut out = [0u8; 8];
        out.copy_from_slice(&header[range]);
        u64::from_le_bytes(out)
    };
    Ok((TxnId::new(long(8..16)), long(16..24)))
}

/// Decode records after the header until the first bad one.
///
/// Returns the records and the offset just past the last intact one.
fn scan(bytes: &[u8]) -> (Vec<LogEntry>, u64) {
    let mut entries = Vec::new();
    let mut pos = HEADER_LEN as usize;
    while pos < bytes.len() {
        match LogEntry::decode(&bytes[pos..]) {
            Some((entry, used)) => {
                entries.push(entry);
                pos += used;
            }
            None => {
                warn!(
                    offset = pos,
                    dropped = bytes.len() - pos,
                    "transaction log has a torn tail"
                );
                break;
            }
        }
    }
    (entries, pos as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple;
    use tempfile::tempdir;

    fn insert(id: i32) -> LogRecord {
        LogRecord::Insert {
            table: "t".into(),
            tuple: tuple![id],
        }
    }

    #[test]
    fn test_fresh_log() {
        let dir = tempdir().unwrap();
        let log = TransactionLog::open(dir.path()).unwrap();
        assert!(log.is_empty());
        assert_eq!(log.next_txn_id(), TxnId::new(1));
        assert_eq!(log.next_txn_id(), TxnId::new(2));
        assert_eq!(
            std::fs::metadata(dir.path().join(LOG_FILE)).unwrap().len(),
            HEADER_LEN
        );
    }

    #[test]
    fn test_append_and_read_all() {
        let dir = tempdir().unwrap();
        let log = TransactionLog::open(dir.path()).unwrap();
        let txn = log.next_txn_id();

        assert_eq!(log.append(txn, LogRecord::Begin).unwrap(), 0);
        assert_eq!(log.append(txn, insert(1)).unwrap(), 1);
        assert_eq!(log.append_sync(txn, LogRecord::Commit).unwrap(), 2);

        let entries = log.read_all().unwrap();
        let kinds: Vec<_> = entries.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(kinds, vec![LogRecord::Begin, insert(1), LogRecord::Commit]);
        assert!(entries.iter().all(|e| e.txn_id == txn));
    }

    #[test]
    fn test_reopen_continues_ids() {
        let dir = tempdir().unwrap();
        {
            let log = TransactionLog::open(dir.path()).unwrap();
            let a = log.next_txn_id();
            let b = log.next_txn_id();
            log.append(a, LogRecord::Begin).unwrap();
            log.append(b, LogRecord::Begin).unwrap();
            log.sync().unwrap();
        }

        let log = TransactionLog::open(dir.path()).unwrap();
        assert_eq!(log.next_txn_id(), TxnId::new(3));
        assert_eq!(log.append(TxnId::new(3), LogRecord::Begin).unwrap(), 2);
    }

    #[test]
    fn test_torn_tail_is_cut() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        {
            let log = TransactionLog::open(dir.path()).unwrap();
            log.append(TxnId::new(1), insert(1)).unwrap();
            log.append(TxnId::new(1), insert(2)).unwrap();
            log.sync().unwrap();
        }
        let full = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 3).unwrap();
        drop(file);

        let log = TransactionLog::open(dir.path()).unwrap();
        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, insert(1));

        // New records follow the last intact one.
        log.append(TxnId::new(2), insert(3)).unwrap();
        let kinds: Vec<_> = log.read_all().unwrap().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![insert(1), insert(3)]);
    }

    #[test]
    fn test_truncate_keeps_txn_ids_increasing() {
        let dir = tempdir().unwrap();
        {
            let log = TransactionLog::open(dir.path()).unwrap();
            for _ in 0..5 {
                log.next_txn_id();
            }
            log.append(TxnId::new(5), LogRecord::Commit).unwrap();
            log.truncate().unwrap();
            assert!(log.is_empty());
            assert!(log.read_all().unwrap().is_empty());
        }

        let log = TransactionLog::open(dir.path()).unwrap();
        assert_eq!(log.next_txn_id(), TxnId::new(6));
    }

    #[test]
    fn test_truncate_keeps_log_ids_increasing() {
        let dir = tempdir().unwrap();
        {
            let log = TransactionLog::open(dir.path()).unwrap();
            let txn = log.next_txn_id();
            for id in 0..4 {
                log.append(txn, insert(id)).unwrap();
            }
            log.truncate().unwrap();
            assert_eq!(log.append(txn, LogRecord::Commit).unwrap(), 4);
            log.truncate().unwrap();
        }

        let log = TransactionLog::open(dir.path()).unwrap();
        assert!(log.is_empty());
        let txn = log.next_txn_id();
        assert_eq!(log.append_sync(txn, LogRecord::Begin).unwrap(), 5);
        drop(log);

        // Records still on file win over an older header value.
        let log = TransactionLog::open(dir.path()).unwrap();
        assert_eq!(log.append(txn, LogRecord::Commit).unwrap(), 6);
    }

    #[test]
    fn test_bad_header_is_corruption() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(LOG_FILE), [0u8; 24]).unwrap();
        assert!(matches!(
            TransactionLog::open(dir.path()),
            Err(Error::LogCorrupted { .. })
        ));
    }
}
