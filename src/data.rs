use std::io;
use std::io::prelude::*;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc::{crc32, Hasher32};

/// crc(4) + timestamp(8) + expires_at(8) + key_len(4) + value_len(4)
pub const HEADER_SIZE: usize = 28;

/// Default per-field decode ceiling. Declared lengths above it are treated
/// as invalid records rather than allocation requests.
pub const DEFAULT_MAX_FIELD_BYTES: u32 = 64 * 1024 * 1024;

/// One log record. A record with an empty value is a tombstone: the logical
/// deletion of its key.
///
/// All integer fields are framed little-endian. The leading CRC-32 covers
/// every byte that follows it, in field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: u64,
    pub expires_at: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn put<K, V>(timestamp: u64, expires_at: u64, key: K, value: V) -> Record
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        Record {
            timestamp,
            expires_at,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn tombstone<K: Into<Vec<u8>>>(timestamp: u64, key: K) -> Record {
        Record {
            timestamp,
            expires_at: 0,
            key: key.into(),
            value: Vec::new(),
        }
    }

    /// An empty value is the tombstone marker; see `put`'s validation in the
    /// engine for why empty values are rejected on the write path.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }

    pub fn size(&self) -> u64 {
        HEADER_SIZE as u64 + self.key.len() as u64 + self.value.len() as u64
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::with_capacity(self.size() as usize));
        cursor.set_position(4);
        cursor.write_u64::<LittleEndian>(self.timestamp).unwrap();
        cursor.write_u64::<LittleEndian>(self.expires_at).unwrap();
        cursor.write_u32::<LittleEndian>(self.key.len() as u32).unwrap();
        cursor
            .write_u32::<LittleEndian>(self.value.len() as u32)
            .unwrap();
        cursor.write_all(&self.key).unwrap();
        cursor.write_all(&self.value).unwrap();

        let checksum = crc32::checksum_ieee(&cursor.get_ref()[4..]);
        cursor.set_position(0);
        cursor.write_u32::<LittleEndian>(checksum).unwrap();

        cursor.into_inner()
    }
}

/// CRC-32 (IEEE polynomial, reflected, init and xorout `0xFFFFFFFF`) over
/// the three pieces of a record that follow the stored checksum. Streamed so
/// the decoder never concatenates header, key and value into one buffer.
fn record_digest(header_tail: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut digest = crc32::Digest::new(crc32::IEEE);
    digest.write(header_tail);
    digest.write(key);
    digest.write(value);
    digest.sum32()
}

/// Outcome of decoding one record from a byte stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete record whose digest verified.
    Entry(Record),
    /// Zero bytes available at a record boundary: the clean write frontier.
    Eof,
    /// The stream ended mid-record: header bytes consumed and then a short
    /// read, or key/value bytes incomplete.
    Truncated,
    /// Digest mismatch, a zero-length key, or a declared length above the
    /// sanity ceiling.
    BadCrc,
}

/// Reads one record from `reader`.
///
/// Buffers at most `key_len + value_len` bytes, and only after both lengths
/// pass the `max_key_bytes` / `max_value_bytes` ceilings. Genuine I/O
/// failures (anything other than end of stream) surface as `Err`.
pub fn read_record<R: Read>(
    reader: &mut R,
    max_key_bytes: u32,
    max_value_bytes: u32,
) -> io::Result<Decoded> {
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if filled == 0 {
        return Ok(Decoded::Eof);
    }
    if filled < HEADER_SIZE {
        return Ok(Decoded::Truncated);
    }

    let mut cursor = Cursor::new(&header[..]);
    let checksum = cursor.read_u32::<LittleEndian>().unwrap();
    let timestamp = cursor.read_u64::<LittleEndian>().unwrap();
    let expires_at = cursor.read_u64::<LittleEndian>().unwrap();
    let key_len = cursor.read_u32::<LittleEndian>().unwrap();
    let value_len = cursor.read_u32::<LittleEndian>().unwrap();

    // Keys are required, and absurd lengths mean a garbage header.
    if key_len == 0 || key_len > max_key_bytes || value_len > max_value_bytes {
        return Ok(Decoded::BadCrc);
    }

    let mut key = vec![0u8; key_len as usize];
    match reader.read_exact(&mut key) {
        Ok(()) => {}
        Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Decoded::Truncated),
        Err(e) => return Err(e),
    }

    let mut value = vec![0u8; value_len as usize];
    match reader.read_exact(&mut value) {
        Ok(()) => {}
        Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Decoded::Truncated),
        Err(e) => return Err(e),
    }

    if record_digest(&header[4..], &key, &value) != checksum {
        return Ok(Decoded::BadCrc);
    }

    Ok(Decoded::Entry(Record {
        timestamp,
        expires_at,
        key,
        value,
    }))
}
