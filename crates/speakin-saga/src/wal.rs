use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{SagaError, SagaResult};
use crate::record::SagaRecord;

/// Flush strategy for the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every append.
    #[default]
    EveryWrite,
    /// Flush to the OS and let it decide when to hit the disk.
    OsDefault,
}

#[derive(Clone, Debug, Default)]
pub struct WalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct WalWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Append-only, crash-recoverable file of [`SagaRecord`]s.
///
/// On-disk format, repeated per record:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: bincode-serialized SagaRecord]
/// ```
/// Recovery reads front to back, skips records whose CRC does not match,
/// and stops at a torn tail.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    config: WalConfig,
}

impl WriteAheadLog {
    /// Open (or create) the log file at `path`.
    pub fn open(path: &Path, config: WalConfig) -> SagaResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            config,
        })
    }

    /// Append one record. Returns the byte offset it was written at.
    pub fn append(&self, record: &SagaRecord) -> SagaResult<u64> {
        let payload = encode(record)?;
        let mut w = self.writer.lock().map_err(|_| SagaError::LockPoisoned)?;
        let entry_offset = w.offset;

        w.writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        w.writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
        w.writer.write_all(&payload)?;
        w.writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_data()?;
        }

        w.offset += (HEADER_SIZE + payload.len()) as u64;
        debug!(offset = entry_offset, len = payload.len(), saga = %record.saga, step = record.step.label(), "saga log append");
        Ok(entry_offset)
    }

    /// Read back every intact record in append order.
    pub fn recover(&self) -> SagaResult<Vec<SagaRecord>> {
        let _guard = self.writer.lock().map_err(|_| SagaError::LockPoisoned)?;
        let mut bytes = Vec::new();
        BufReader::new(File::open(&self.path)?).read_to_end(&mut bytes)?;
        Ok(decode_all(&bytes))
    }

    /// Replace the log contents with `records`, atomically via rename.
    pub fn rewrite(&self, records: &[SagaRecord]) -> SagaResult<()> {
        let mut w = self.writer.lock().map_err(|_| SagaError::LockPoisoned)?;
        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for record in records {
                let payload = encode(record)?;
                tmp.write_all(&(payload.len() as u32).to_le_bytes())?;
                tmp.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
                tmp.write_all(&payload)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.offset = file.metadata()?.len();
        w.writer = BufWriter::new(file);
        debug!(records = records.len(), "saga log rewritten");
        Ok(())
    }

    /// Current write offset.
    pub fn offset(&self) -> u64 {
        self.writer.lock().map(|w| w.offset).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn encode(record: &SagaRecord) -> SagaResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| SagaError::Serialization(e.to_string()))
}

fn decode_all(bytes: &[u8]) -> Vec<SagaRecord> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset + HEADER_SIZE <= bytes.len() {
        let length = u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        let expected_crc = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]);

        let start = offset + HEADER_SIZE;
        if length == 0 || start + length > bytes.len() {
            warn!(offset, length, file_len = bytes.len(), "torn saga log tail; stopping recovery");
            break;
        }

        let payload = &bytes[start..start + length];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping saga record");
        } else {
            match bincode::deserialize::<SagaRecord>(payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(offset, error = %e, "undecodable saga record; skipping"),
            }
        }
        offset = start + length;
    }

    debug!(recovered = records.len(), "saga log recovery complete");
    records
}
