//! Transaction log records.

use crate::catalog::TableSchema;
use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::{Error, LogId, Result, TxnId};
use crate::tuple::Tuple;

/// What a log entry records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Begin,
    Commit,
    Rollback,
    Insert { table: String, tuple: Tuple },
    /// The full new tuple; its key names the row.
    Update { table: String, tuple: Tuple },
    Remove { table: String, key: Tuple },
    CreateTable { schema: TableSchema },
    DropTable { table: String },
}

impl LogRecord {
    pub const BEGIN: u8 = 1;
    pub const COMMIT: u8 = 2;
    pub const ROLLBACK: u8 = 3;
    pub const INSERT: u8 = 4;
    pub const UPDATE: u8 = 5;
    pub const REMOVE: u8 = 6;
    pub const CREATE_TABLE: u8 = 7;
    pub const DROP_TABLE: u8 = 8;

    pub fn entry_type(&self) -> u8 {
        match self {
            LogRecord::Begin => Self::BEGIN,
            LogRecord::Commit => Self::COMMIT,
            LogRecord::Rollback => Self::ROLLBACK,
            LogRecord::Insert { .. } => Self::INSERT,
            LogRecord::Update { .. } => Self::UPDATE,
            LogRecord::Remove { .. } => Self::REMOVE,
            LogRecord::CreateTable { .. } => Self::CREATE_TABLE,
            LogRecord::DropTable { .. } => Self::DROP_TABLE,
        }
    }

    /// Begin, commit and rollback markers.
    pub fn is_marker(&self) -> bool {
        matches!(
            self,
            LogRecord::Begin | LogRecord::Commit | LogRecord::Rollback
        )
    }

    pub fn encode_payload(&self, w: &mut ByteWriter) {
        match self {
            LogRecord::Begin | LogRecord::Commit | LogRecord::Rollback => {}
            LogRecord::Insert { table, tuple } | LogRecord::Update { table, tuple } => {
                w.put_len_prefixed(table.as_bytes());
                tuple.encode(w);
            }
            LogRecord::Remove { table, key } => {
                w.put_len_prefixed(table.as_bytes());
                key.encode(w);
            }
            LogRecord::CreateTable { schema } => schema.encode(w),
            LogRecord::DropTable { table } => w.put_len_prefixed(table.as_bytes()),
        }
    }

    pub fn decode_payload(entry_type: u8, r: &mut ByteReader<'_>) -> Result<Self> {
        let record = match entry_type {
            Self::BEGIN => LogRecord::Begin,
            Self::COMMIT => LogRecord::Commit,
            Self::ROLLBACK => LogRecord::Rollback,
            Self::INSERT => LogRecord::Insert {
                table: r.get_string()?,
                tuple: Tuple::decode(r)?,
            },
            Self::UPDATE => LogRecord::Update {
                table: r.get_string()?,
                tuple: Tuple::decode(r)?,
            },
            Self::REMOVE => LogRecord::Remove {
                table: r.get_string()?,
                key: Tuple::decode(r)?,
            },
            Self::CREATE_TABLE => LogRecord::CreateTable {
                schema: TableSchema::decode(r)?,
            },
            Self::DROP_TABLE => LogRecord::DropTable {
                table: r.get_string()?,
            },
            other => return Err(Error::malformed(format!("unknown log entry type {other}"))),
        };
        if r.remaining() != 0 {
            return Err(Error::malformed("trailing bytes after log payload"));
        }
        Ok(record)
    }
}

/// One appended log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub log_id: LogId,
    pub txn_id: TxnId,
    pub kind: LogRecord,
}

impl LogEntry {
    /// Bytes before the payload, after the length prefix.
    const FIXED_LEN: usize = 8 + 8 + 1;

    /// Encode as `[length][log_id][txn_id][entry_type][payload][crc32]`.
    ///
    /// `length` covers `log_id` through the payload; the CRC covers the
    /// same bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = ByteWriter::new();
        body.put_u64(self.log_id);
        body.put_u64(self.txn_id.0);
        body.put_u8(self.kind.entry_type());
        self.kind.encode_payload(&mut body);

        let mut w = ByteWriter::with_capacity(body.len() + 8);
        w.put_u32(body.len() as u32);
        w.put_bytes(body.as_slice());
        w.put_u32(crc32fast::hash(body.as_slice()));
        w.into_inner()
    }

    /// Decode one record from the start of `bytes`.
    ///
    /// Returns the entry and the number of bytes it occupied, or `None`
    /// if the record is torn, fails its CRC, or does not parse.
    pub fn decode(bytes: &[u8]) -> Option<(LogEntry, usize)> {
        let len_bytes: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len < Self::FIXED_LEN {
            return None;
        }
        let body = bytes.get(4..4 + len)?;
        let crc_bytes: [u8; 4] = bytes.get(4 + len..8 + len)?.try_into().ok()?;
        if crc32fast::hash(body) != u32::from_le_bytes(crc_bytes) {
            return None;
        }

        let mut r = ByteReader::new(body);
        let log_id = r.get_u64().ok()?;
        let txn_id = TxnId::new(r.get_u64().ok()?);
        let entry_type = r.get_u8().ok()?;
        let kind = LogRecord::decode_payload(entry_type, &mut r).ok()?;
        Some((
            LogEntry {
                log_id,
                txn_id,
                kind,
            },
            8 + len,
        ))
    }
}
