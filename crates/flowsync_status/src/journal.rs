//! Append-only journal persistence for status records.
//!
//! Each mutation is appended as one frame:
//!
//! ```text
//! | magic "FSST" (4) | type (1) | len u32 LE (4) | crc32 u32 LE (4) | CBOR payload (len) |
//! ```
//!
//! `Put` frames carry a full [`EntityStatus`]; `Delete` frames carry a
//! [`StatusKey`]. Replay applies frames in order, so the last frame for a key
//! wins.

use crate::error::{StatusError, StatusResult};
use crate::key::StatusKey;
use crate::record::EntityStatus;
use fs2::FileExt;
use parking_lot::RwLock;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Magic bytes opening every journal frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"FSST";

const HEADER_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FrameType {
    Put = 1,
    Delete = 2,
}

impl FrameType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A decoded journal frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JournalEntry {
    Put(EntityStatus),
    Delete(StatusKey),
}

/// Outcome of scanning a journal.
#[derive(Debug)]
pub(crate) struct Replay {
    pub entries: Vec<JournalEntry>,
    /// Length of the intact prefix. Anything past it is a torn tail.
    pub valid_len: u64,
}

/// Byte store holding the journal.
///
/// Backends know nothing about frames; the store owns the format.
pub trait JournalBackend: Send + Sync {
    /// Reads the whole journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read.
    fn read_all(&self) -> StatusResult<Vec<u8>>;

    /// Appends bytes and returns the offset they were written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StatusResult<u64>;

    /// Cuts the journal to `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` exceeds the current size or the cut fails.
    fn truncate(&mut self, len: u64) -> StatusResult<()>;

    /// Atomically replaces the journal contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the new contents cannot be written.
    fn replace(&mut self, data: &[u8]) -> StatusResult<()>;

    /// Makes appended data durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StatusResult<()>;

    /// Returns the journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StatusResult<u64>;
}

/// An in-memory journal.
///
/// Clones share the same buffer, which lets tests reopen a store over the
/// bytes a previous store wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal with existing contents.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the journal contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl JournalBackend for MemoryJournal {
    fn read_all(&self) -> StatusResult<Vec<u8>> {
        Ok(self.data.read().clone())
    }

    fn append(&mut self, bytes: &[u8]) -> StatusResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn truncate(&mut self, len: u64) -> StatusResult<()> {
        let mut data = self.data.write();
        if len > data.len() as u64 {
            return Err(StatusError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate to {len} bytes, journal has {}", data.len()),
            )));
        }
        data.truncate(len as usize);
        Ok(())
    }

    fn replace(&mut self, bytes: &[u8]) -> StatusResult<()> {
        *self.data.write() = bytes.to_vec();
        Ok(())
    }

    fn sync(&mut self) -> StatusResult<()> {
        Ok(())
    }

    fn size(&self) -> StatusResult<u64> {
        Ok(self.data.read().len() as u64)
    }
}

/// A file journal holding an exclusive advisory lock.
///
/// The lock lives on a sidecar `<path>.lock` file so that compaction can
/// swap the journal file itself.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
    size: u64,
    /// Bytes of a failed append may sit past `size`.
    torn: bool,
    _lock: File,
}

impl FileJournal {
    /// Opens or creates a journal file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `Locked` if another process holds the journal, or an I/O
    /// error.
    pub fn open(path: &Path) -> StatusResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(sidecar(path, ".lock"))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StatusError::Locked);
        }

        let file = open_data_file(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
            torn: false,
            _lock: lock,
        })
    }

    /// Returns the journal path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_data_file(path: &Path) -> StatusResult<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl JournalBackend for FileJournal {
    fn read_all(&self) -> StatusResult<Vec<u8>> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::with_capacity(self.size as usize);
        file.take(self.size).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StatusResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }
        if self.torn {
            self.file.set_len(offset)?;
            self.torn = false;
        }
        self.file.seek(SeekFrom::Start(offset))?;
        if let Err(err) = self.file.write_all(data) {
            // Cut off whatever part of the frame reached the file.
            if let Err(trim) = self.file.set_len(offset) {
                tracing::warn!(offset, error = %trim, "could not trim failed journal append");
                self.torn = true;
            }
            return Err(err.into());
        }
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn truncate(&mut self, len: u64) -> StatusResult<()> {
        if len > self.size {
            return Err(StatusError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate to {len} bytes, journal has {}", self.size),
            )));
        }
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.size = len;
        self.torn = false;
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StatusResult<()> {
        let tmp_path = sidecar(&self.path, ".tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(data)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.file = open_data_file(&self.path)?;
        self.size = data.len() as u64;
        self.torn = false;
        Ok(())
    }

    fn sync(&mut self) -> StatusResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StatusResult<u64> {
        Ok(self.size)
    }
}

/// Encodes one frame.
pub(crate) fn encode_entry(entry: &JournalEntry, max_record_size: usize) -> StatusResult<Vec<u8>> {
    let mut payload = Vec::new();
    let frame_type = match entry {
        JournalEntry::Put(status) => {
            ciborium::into_writer(status, &mut payload).map_err(StatusError::codec)?;
            FrameType::Put
        }
        JournalEntry::Delete(key) => {
            ciborium::into_writer(key, &mut payload).map_err(StatusError::codec)?;
            FrameType::Delete
        }
    };

    let max = max_record_size.min(u32::MAX as usize);
    if payload.len() > max {
        return Err(StatusError::RecordTooLarge {
            size: payload.len(),
            max,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.push(frame_type as u8);
    // Bounded by `max` above.
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes every intact frame.
///
/// A truncated or checksum-damaged final frame ends the scan and is reported
/// through `valid_len`. Damage before the final frame is an error.
pub(crate) fn decode_frames(bytes: &[u8]) -> StatusResult<Replay> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_LEN {
            break;
        }
        if rest[..4] != JOURNAL_MAGIC {
            return Err(StatusError::corrupted(offset as u64, "bad frame magic"));
        }
        let frame_type = FrameType::from_byte(rest[4]).ok_or_else(|| {
            StatusError::corrupted(offset as u64, format!("unknown frame type {}", rest[4]))
        })?;
        let len = u32::from_le_bytes([rest[5], rest[6], rest[7], rest[8]]) as usize;
        let crc = u32::from_le_bytes([rest[9], rest[10], rest[11], rest[12]]);

        let end = HEADER_LEN + len;
        if rest.len() < end {
            break;
        }
        let payload = &rest[HEADER_LEN..end];
        if compute_crc32(payload) != crc {
            if offset + end == bytes.len() {
                break;
            }
            return Err(StatusError::corrupted(offset as u64, "checksum mismatch"));
        }

        let entry = match frame_type {
            FrameType::Put => JournalEntry::Put(
                ciborium::from_reader(payload)
                    .map_err(|e| StatusError::corrupted(offset as u64, e.to_string()))?,
            ),
            FrameType::Delete => JournalEntry::Delete(
                ciborium::from_reader(payload)
                    .map_err(|e| StatusError::corrupted(offset as u64, e.to_string()))?,
            ),
        };
        entries.push(entry);
        offset += end;
    }

    Ok(Replay {
        entries,
        valid_len: offset as u64,
    })
}

/// Computes the IEEE CRC32 of `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}
