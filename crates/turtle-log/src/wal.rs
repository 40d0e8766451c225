use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use turtle_types::{CredentialId, Event, EventKind, EventValue, Property};

use crate::error::{LogError, LogResult};

/// One committed batch, written as a single framed record.
///
/// On-disk format:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized batch)]
/// ```
///
/// A batch is either fully present with a valid checksum or it is dropped
/// on recovery, which is what makes an append atomic across restarts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalEntry {
    pub batch: Vec<Event>,
}

/// Flush/sync strategy for the WAL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every batch.
    EveryWrite,
    /// Flush to the OS and let it decide when to sync.
    #[default]
    OsDefault,
}

#[derive(Clone, Debug, Default)]
pub struct WalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

// Bincode cannot read the tagged JSON shape of `EventValue`, so records
// use this flat mirror on disk.
#[derive(Serialize, Deserialize)]
enum StoredValue {
    Null,
    String(String),
    Bool(bool),
    Integer(i64),
    Uuid([u8; 16]),
}

#[derive(Serialize, Deserialize)]
struct StoredEvent {
    sequence: u64,
    entity_id: [u8; 16],
    entity_type: String,
    property: Option<Property>,
    value: StoredValue,
    actor: String,
    kind: EventKind,
}

impl From<&Event> for StoredEvent {
    fn from(event: &Event) -> Self {
        let value = match &event.value {
            EventValue::Null => StoredValue::Null,
            EventValue::String(s) => StoredValue::String(s.clone()),
            EventValue::Bool(b) => StoredValue::Bool(*b),
            EventValue::Integer(i) => StoredValue::Integer(*i),
            EventValue::Uuid(u) => StoredValue::Uuid(*u.as_bytes()),
        };
        Self {
            sequence: event.sequence,
            entity_id: *event.entity_id.as_uuid().as_bytes(),
            entity_type: event.entity_type.clone(),
            property: event.property,
            value,
            actor: event.actor.clone(),
            kind: event.kind,
        }
    }
}

impl From<StoredEvent> for Event {
    fn from(stored: StoredEvent) -> Self {
        let value = match stored.value {
            StoredValue::Null => EventValue::Null,
            StoredValue::String(s) => EventValue::String(s),
            StoredValue::Bool(b) => EventValue::Bool(b),
            StoredValue::Integer(i) => EventValue::Integer(i),
            StoredValue::Uuid(bytes) => EventValue::Uuid(uuid::Uuid::from_bytes(bytes)),
        };
        Event {
            sequence: stored.sequence,
            entity_id: CredentialId::from_uuid(uuid::Uuid::from_bytes(stored.entity_id)),
            entity_type: stored.entity_type,
            property: stored.property,
            value,
            actor: stored.actor,
            kind: stored.kind,
        }
    }
}

struct WalWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Crash-recoverable write-ahead log of event batches.
///
/// On recovery the file is read front-to-back; a torn tail ends recovery
/// and records that fail the CRC check are skipped.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    config: WalConfig,
}

impl WriteAheadLog {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path, config: WalConfig) -> LogResult<Self> {
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

    /// Append one batch. Returns the byte offset of the record.
    pub fn append(&self, entry: &WalEntry) -> LogResult<u64> {
        let stored: Vec<StoredEvent> = entry.batch.iter().map(StoredEvent::from).collect();
        let payload =
            bincode::serialize(&stored).map_err(|e| LogError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len()).map_err(|_| {
            LogError::Serialization(format!("batch of {} bytes is too large", payload.len()))
        })?;
        let crc = crc32fast::hash(&payload);

        let mut record = Vec::with_capacity(HEADER_SIZE + payload.len());
        record.extend_from_slice(&length.to_le_bytes());
        record.extend_from_slice(&crc.to_le_bytes());
        record.extend_from_slice(&payload);

        let mut w = self.writer.lock().map_err(|_| LogError::LockPoisoned)?;
        let entry_offset = w.offset;

        if let Err(e) = self.write_record(&mut w, &record) {
            warn!(offset = entry_offset, error = %e, "WAL append failed; discarding partial record");
            self.truncate_to(&mut w, entry_offset)?;
            return Err(e.into());
        }

        w.offset += record.len() as u64;

        debug!(offset = entry_offset, events = entry.batch.len(), "WAL append");
        Ok(entry_offset)
    }

    fn write_record(&self, w: &mut WalWriter, record: &[u8]) -> io::Result<()> {
        w.writer.write_all(record)?;
        w.writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Cut the file back to `offset` and reopen the writer. Bytes still
    /// buffered by the old writer are dropped, not flushed.
    fn truncate_to(&self, w: &mut WalWriter, offset: u64) -> LogResult<()> {
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        let stale = std::mem::replace(&mut w.writer, BufWriter::new(file));
        let (_, _unwritten) = stale.into_parts();
        w.writer.get_ref().set_len(offset)?;
        w.offset = offset;
        Ok(())
    }

    /// Recover every intact batch in file order.
    pub fn recover(&self) -> LogResult<Vec<WalEntry>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut entries = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            let next = offset + HEADER_SIZE as u64 + length as u64;

            if length == 0 || next > file_len {
                warn!(offset, length, file_len, "torn WAL record; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            file.read_exact(&mut payload)?;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping record");
                offset = next;
                continue;
            }

            match bincode::deserialize::<Vec<StoredEvent>>(&payload) {
                Ok(stored) => entries.push(WalEntry {
                    batch: stored.into_iter().map(Event::from).collect(),
                }),
                Err(e) => warn!(offset, error = %e, "undecodable WAL record; skipping"),
            }

            offset = next;
        }

        debug!(recovered = entries.len(), "WAL recovery complete");
        Ok(entries)
    }

    /// Current write offset.
    pub fn offset(&self) -> LogResult<u64> {
        Ok(self.writer.lock().map_err(|_| LogError::LockPoisoned)?.offset)
    }
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turtle_types::{NewCredential, NewEvent};

    fn make_entry(first_sequence: u64) -> WalEntry {
        let id = CredentialId::new();
        let batch = NewCredential::named("mail")
            .under(Some(CredentialId::new()), 3)
            .to_events(id)
            .into_iter()
            .zip(first_sequence..)
            .map(|(event, seq)| event.sequenced(seq, "Service"))
            .collect();
        WalEntry { batch }
    }

    #[test]
    fn append_and_recover_preserves_batches() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WriteAheadLog::open(&dir.path().join("log.wal"), WalConfig::default()).unwrap();

        let first = make_entry(1);
        let second = WalEntry {
            batch: vec![NewEvent::delete_marker(CredentialId::new()).sequenced(15, "Service")],
        };
        wal.append(&first).unwrap();
        wal.append(&second).unwrap();

        assert_eq!(wal.recover().unwrap(), vec![first, second]);
    }

    #[test]
    fn recover_empty_wal() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WriteAheadLog::open(&dir.path().join("empty.wal"), WalConfig::default()).unwrap();
        assert!(wal.recover().unwrap().is_empty());
    }

    #[test]
    fn crc_mismatch_skips_only_that_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.wal");
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        wal.append(&make_entry(1)).unwrap();
        let second = make_entry(14);
        wal.append(&second).unwrap();
        drop(wal);

        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        assert_eq!(wal.recover().unwrap(), vec![second]);
    }

    #[test]
    fn torn_tail_drops_the_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.wal");
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        let first = make_entry(1);
        wal.append(&first).unwrap();
        wal.append(&make_entry(14)).unwrap();
        let total = wal.offset().unwrap();
        drop(wal);

        OpenOptions::new().write(true).open(&path).unwrap().set_len(total - 4).unwrap();

        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        assert_eq!(wal.recover().unwrap(), vec![first]);
    }

    #[test]
    fn partial_record_is_discarded_before_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.wal");
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        let first = make_entry(1);
        wal.append(&first).unwrap();
        let good_end = wal.offset().unwrap();

        // A failed append leaves a header and part of its payload behind.
        {
            let mut w = wal.writer.lock().unwrap();
            w.writer.write_all(&512u32.to_le_bytes()).unwrap();
            w.writer.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
            w.writer.write_all(&[7u8; 100]).unwrap();
            w.writer.flush().unwrap();
            wal.truncate_to(&mut w, good_end).unwrap();
        }
        assert_eq!(fs::metadata(&path).unwrap().len(), good_end);

        let second = make_entry(14);
        assert_eq!(wal.append(&second).unwrap(), good_end);
        drop(wal);

        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        assert_eq!(wal.recover().unwrap(), vec![first, second]);
    }

    #[test]
    fn unflushed_bytes_are_not_written_on_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffered.wal");
        let wal = WriteAheadLog::open(&path, WalConfig::default()).unwrap();
        {
            let mut w = wal.writer.lock().unwrap();
            w.writer.write_all(&[1u8; 16]).unwrap();
            wal.truncate_to(&mut w, 0).unwrap();
        }
        let entry = make_entry(1);
        assert_eq!(wal.append(&entry).unwrap(), 0);
        assert_eq!(wal.recover().unwrap(), vec![entry]);
    }

    #[test]
    fn sync_every_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalConfig {
            sync_mode: SyncMode::EveryWrite,
        };
        let wal = WriteAheadLog::open(&dir.path().join("sync.wal"), config).unwrap();
        wal.append(&make_entry(1)).unwrap();
        assert_eq!(wal.recover().unwrap().len(), 1);
    }
}
