//! Append-only journal backend.
//!
//! Every write is one length-prefixed, blake3-checksummed JSON record.
//! Opening a journal replays all records into the in-memory state; a torn
//! or corrupt tail is truncated at the last valid record so a crashed
//! writer can never surface a half-committed version.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::state::StoreState;
use super::RecordStore;
use crate::error::{EngineError, Result};
use crate::types::{Confirmation, EditRecord, TimingBlock, Version, VersionMeta, Word};

// Record header: [seq: u64][len: u32][reserved: 4 bytes][checksum: 32 bytes]
const ENTRY_HEADER_SIZE: usize = 48;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum JournalRecord {
    Commit {
        doc: String,
        expected_latest: Option<u32>,
        version: Version,
        edit: Option<EditRecord>,
    },
    Words {
        doc: String,
        version: u32,
        words: Vec<Word>,
        blocks: Vec<TimingBlock>,
    },
    Confirmations {
        doc: String,
        version: u32,
        items: Vec<Confirmation>,
    },
}

#[derive(Debug)]
struct Inner {
    file: File,
    state: StoreState,
    write_offset: u64,
    sequence: u64,
}

/// File-backed store: one journal file per store, shared by all documents.
#[derive(Debug)]
pub struct JournalStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl JournalStore {
    /// Open or create a journal, replaying its records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let (records, valid_end, sequence) = scan_records(&mut file)?;
        let file_len = file.metadata()?.len();
        if valid_end < file_len {
            tracing::warn!(
                journal.path = %path.display(),
                journal.valid_end = valid_end,
                journal.file_len = file_len,
                "truncating corrupt journal tail"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
        }

        let mut state = StoreState::default();
        for record in records {
            if let Err(err) = apply_record(&mut state, record) {
                // A record that replays dirty was written by a buggy or
                // newer writer; surface it rather than diverge silently.
                return Err(EngineError::JournalCorruption {
                    offset: valid_end,
                    reason: format!("replay failed: {err}"),
                });
            }
        }

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                file,
                state,
                write_offset: valid_end,
                sequence,
            }),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn locked<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| EngineError::Lock("journal store poisoned".into()))?;
        f(&mut guard)
    }

    /// Durably append one record, then fold it into the in-memory state.
    fn append(&self, record: JournalRecord) -> Result<()> {
        self.locked(|inner| {
            let payload = serde_json::to_vec(&record)?;
            if payload.len() > u32::MAX as usize {
                return Err(EngineError::invalid_input("journal record too large"));
            }

            let next_sequence = inner.sequence + 1;
            let digest = blake3::hash(&payload);
            let mut frame = Vec::with_capacity(ENTRY_HEADER_SIZE + payload.len());
            frame.extend_from_slice(&next_sequence.to_le_bytes());
            frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            frame.extend_from_slice(&[0u8; 4]);
            frame.extend_from_slice(digest.as_bytes());
            frame.extend_from_slice(&payload);

            // Validate against the current state before touching the file;
            // apply_record mutates, so the CAS check runs inside it and any
            // failure leaves the journal unwritten.
            apply_record(&mut inner.state, record)?;

            inner.file.seek(SeekFrom::Start(inner.write_offset))?;
            inner.file.write_all(&frame)?;
            inner.file.sync_all()?;

            inner.write_offset += frame.len() as u64;
            inner.sequence = next_sequence;
            tracing::debug!(
                journal.sequence = next_sequence,
                journal.payload_len = payload.len(),
                "journal append"
            );
            Ok(())
        })
    }
}

fn apply_record(state: &mut StoreState, record: JournalRecord) -> Result<()> {
    match record {
        JournalRecord::Commit {
            doc,
            expected_latest,
            version,
            edit,
        } => state.commit_version(&doc, expected_latest, version, edit),
        JournalRecord::Words {
            doc,
            version,
            words,
            blocks,
        } => state.replace_words(&doc, version, words, blocks),
        JournalRecord::Confirmations { doc, version, items } => {
            state.replace_confirmations(&doc, version, items)
        }
    }
}

/// Scan the journal from the start. Returns the parsed records, the byte
/// offset just past the last valid record, and its sequence number.
fn scan_records(file: &mut File) -> Result<(Vec<JournalRecord>, u64, u64)> {
    let file_len = file.metadata()?.len();
    let mut records = Vec::new();
    let mut cursor = 0u64;
    let mut sequence = 0u64;

    while cursor + ENTRY_HEADER_SIZE as u64 <= file_len {
        file.seek(SeekFrom::Start(cursor))?;
        let mut header = [0u8; ENTRY_HEADER_SIZE];
        file.read_exact(&mut header)?;

        let seq = u64::from_le_bytes(header[..8].try_into().map_err(|_| {
            EngineError::JournalCorruption {
                offset: cursor,
                reason: "invalid sequence header".into(),
            }
        })?);
        let length = u64::from(u32::from_le_bytes(header[8..12].try_into().map_err(
            |_| EngineError::JournalCorruption {
                offset: cursor,
                reason: "invalid length header".into(),
            },
        )?));
        let checksum = &header[16..48];

        if seq == 0 && length == 0 {
            break;
        }
        if seq != sequence + 1 {
            tracing::warn!(
                journal.offset = cursor,
                journal.sequence = seq,
                journal.expected = sequence + 1,
                "journal sequence break, truncating"
            );
            break;
        }
        if length == 0 || cursor + ENTRY_HEADER_SIZE as u64 + length > file_len {
            tracing::warn!(
                journal.offset = cursor,
                journal.length = length,
                "journal record length invalid, truncating"
            );
            break;
        }

        let mut payload = vec![0u8; length as usize];
        file.read_exact(&mut payload)?;
        if blake3::hash(&payload).as_bytes() != checksum {
            tracing::warn!(
                journal.offset = cursor,
                journal.sequence = seq,
                "journal record checksum mismatch, truncating"
            );
            break;
        }

        let record: JournalRecord = match serde_json::from_slice(&payload) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    journal.offset = cursor,
                    error = %err,
                    "journal record undecodable, truncating"
                );
                break;
            }
        };

        records.push(record);
        sequence = seq;
        cursor += ENTRY_HEADER_SIZE as u64 + length;
    }

    Ok((records, cursor, sequence))
}

impl RecordStore for JournalStore {
    fn latest(&self, doc: &str) -> Result<Option<Version>> {
        self.locked(|inner| Ok(inner.state.latest(doc).cloned()))
    }

    fn get(&self, doc: &str, version: u32) -> Result<Option<Version>> {
        self.locked(|inner| Ok(inner.state.get(doc, version).cloned()))
    }

    fn history(&self, doc: &str) -> Result<Vec<VersionMeta>> {
        self.locked(|inner| Ok(inner.state.history(doc)))
    }

    fn edits(&self, doc: &str) -> Result<Vec<EditRecord>> {
        self.locked(|inner| Ok(inner.state.edits(doc)))
    }

    fn commit_version(
        &self,
        doc: &str,
        expected_latest: Option<u32>,
        version: Version,
        edit: Option<EditRecord>,
    ) -> Result<()> {
        self.append(JournalRecord::Commit {
            doc: doc.to_string(),
            expected_latest,
            version,
            edit,
        })
    }

    fn replace_words(
        &self,
        doc: &str,
        version: u32,
        words: Vec<Word>,
        blocks: Vec<TimingBlock>,
    ) -> Result<()> {
        self.append(JournalRecord::Words {
            doc: doc.to_string(),
            version,
            words,
            blocks,
        })
    }

    fn confirmations(&self, doc: &str, version: u32) -> Result<Vec<Confirmation>> {
        self.locked(|inner| Ok(inner.state.confirmations(doc, version)))
    }

    fn replace_confirmations(
        &self,
        doc: &str,
        version: u32,
        items: Vec<Confirmation>,
    ) -> Result<()> {
        self.append(JournalRecord::Confirmations {
            doc: doc.to_string(),
            version,
            items,
        })
    }

    fn docs(&self) -> Result<Vec<String>> {
        self.locked(|inner| Ok(inner.state.docs()))
    }
}
