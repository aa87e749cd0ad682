//! Checksummed append-only line journal
//!
//! Every record is one line: `<checksum> <json>\n`, where the checksum is the
//! first 8 bytes of the SHA-256 of the JSON payload, hex encoded. Appends are
//! fsynced before they are acknowledged; a failed append is cut back off the
//! file so the next record starts on a clean line. Full rewrites go through a
//! temporary file, fsync and an atomic rename.
//!
//! On open, a damaged final record is treated as a torn write: it is dropped
//! and the file is truncated back to the last good record. Damage anywhere
//! else is reported as [`ShellDockError::Corrupt`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, ShellDockError};

/// Hex characters in a record checksum
const CHECKSUM_LEN: usize = 16;

/// Records recovered from a journal on open
#[derive(Debug)]
pub struct Replay<T> {
    pub records: Vec<T>,
    /// A torn trailing record was dropped
    pub recovered_tail: bool,
}

/// Append-only journal file
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Open (or create) a journal and replay its records
    pub fn open<T: DeserializeOwned>(path: &Path) -> Result<(Self, Replay<T>)> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ShellDockError::io(parent, e))?;
        }

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(ShellDockError::io(path, e)),
        };

        let (records, good_len) = replay(path, &bytes)?;
        let recovered_tail = good_len < bytes.len();
        if recovered_tail {
            warn!(
                path = %path.display(),
                dropped_bytes = bytes.len() - good_len,
                "discarding incomplete trailing record"
            );
            truncate(path, good_len as u64)?;
        }

        let file = open_append(path)?;
        debug!(path = %path.display(), records = records.len(), "journal replayed");

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
            },
            Replay {
                records,
                recovered_tail,
            },
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and fsync it
    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let line = encode(record)?;
        append_line(&mut self.file, line.as_bytes()).map_err(|e| ShellDockError::io(&self.path, e))
    }

    /// Replace the whole journal with `records` atomically
    pub fn rewrite<T: Serialize>(&mut self, records: &[T]) -> Result<()> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut content = String::new();
        for record in records {
            content.push_str(&encode(record)?);
        }

        write_synced(&tmp_path, content.as_bytes())?;
        fs::rename(&tmp_path, &self.path).map_err(|e| ShellDockError::io(&self.path, e))?;
        sync_parent(&self.path);

        self.file = open_append(&self.path)?;
        debug!(path = %self.path.display(), records = records.len(), "journal rewritten");
        Ok(())
    }
}

/// File the journal appends to
trait Sink: Write {
    fn size(&self) -> io::Result<u64>;
    fn truncate(&self, len: u64) -> io::Result<()>;
    fn sync(&self) -> io::Result<()>;
}

impl Sink for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Write one line; on failure the file is cut back to its previous length
fn append_line<S: Sink>(sink: &mut S, line: &[u8]) -> io::Result<()> {
    let len = sink.size()?;
    let written = sink
        .write_all(line)
        .and_then(|_| sink.flush())
        .and_then(|_| sink.sync());
    if let Err(e) = written {
        if let Err(cut) = sink.truncate(len) {
            warn!(error = %cut, "could not remove a partially written record");
        }
        return Err(e);
    }
    Ok(())
}

/// Encode one record as a journal line (newline included)
pub fn encode<T: Serialize>(record: &T) -> Result<String> {
    let payload = serde_json::to_string(record)?;
    Ok(format!("{} {}\n", checksum(payload.as_bytes()), payload))
}

fn checksum(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    hex::encode(&digest[..CHECKSUM_LEN / 2])
}

fn decode<T: DeserializeOwned>(line: &[u8]) -> std::result::Result<T, String> {
    let line = std::str::from_utf8(line).map_err(|_| "record is not valid UTF-8".to_string())?;
    let (sum, payload) = line
        .split_once(' ')
        .ok_or_else(|| "record has no checksum".to_string())?;
    if sum.len() != CHECKSUM_LEN || sum != checksum(payload.as_bytes()) {
        return Err("checksum mismatch".to_string());
    }
    serde_json::from_str(payload).map_err(|e| format!("invalid record: {}", e))
}

/// Decode all records, returning them with the byte length of the good prefix
fn replay<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<(Vec<T>, usize)> {
    let mut records = Vec::new();
    let mut offset = 0;
    let mut line_no = 0;

    while offset < bytes.len() {
        line_no += 1;
        let rest = &bytes[offset..];
        let Some(end) = rest.iter().position(|b| *b == b'\n') else {
            // Unterminated final record
            return Ok((records, offset));
        };

        let line = &rest[..end];
        let next = offset + end + 1;

        if line.iter().all(u8::is_ascii_whitespace) {
            offset = next;
            continue;
        }

        match decode(line) {
            Ok(record) => records.push(record),
            Err(_) if next >= bytes.len() => return Ok((records, offset)),
            Err(reason) => {
                return Err(ShellDockError::Corrupt {
                    path: path.to_path_buf(),
                    line: line_no,
                    reason,
                })
            }
        }
        offset = next;
    }

    Ok((records, offset))
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ShellDockError::io(path, e))
}

fn truncate(path: &Path, len: u64) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| ShellDockError::io(path, e))?;
    file.set_len(len)
        .and_then(|_| file.sync_all())
        .map_err(|e| ShellDockError::io(path, e))
}

/// Write a file and fsync it before returning
pub(crate) fn write_synced(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| ShellDockError::io(path, e))?;
    file.write_all(content)
        .and_then(|_| file.sync_all())
        .map_err(|e| ShellDockError::io(path, e))
}

/// Persist a rename by syncing the containing directory (best effort)
pub(crate) fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
