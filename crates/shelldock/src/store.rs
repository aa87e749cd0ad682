//! Storage engine
//!
//! Entries are kept in memory as an immutable [`Snapshot`] shared through an
//! `Arc`. Every mutation takes the single writer lock, appends the new state
//! of the entry to `entries.log`, and only then swaps in a new snapshot, so a
//! reader sees either the state before a mutation or the state after it.
//!
//! Superseded records are dropped by compaction, which also runs on its own
//! once the journal holds [`COMPACT_RATIO`] times more records than entries.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::entry::Entry;
use crate::error::{Result, ShellDockError};
use crate::journal::Journal;

/// Entry journal file name inside the store directory
pub const ENTRIES_FILE: &str = "entries.log";

/// Journal records per stored entry that trigger a compaction
pub const COMPACT_RATIO: usize = 4;

/// Journals shorter than this are never compacted automatically
pub const COMPACT_MIN_RECORDS: usize = 64;

/// How `put` treats an existing identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fail with `DuplicateKey` if an active entry has the identifier
    Create,
    /// Fail with `NotFound` unless an active entry has the identifier
    Update,
}

/// Result of a mutation closure passed to [`Store::apply`]
#[derive(Debug)]
pub enum Change {
    /// Persist this new state of the entry
    Write(Entry),
    /// Nothing to do; the current entry is returned as is
    Unchanged(Entry),
}

/// One line of the entry journal
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum EntryRecord {
    Put {
        entry: Entry,
    },
    #[serde(other)]
    Unknown,
}

/// Consistent, immutable view of every entry
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: BTreeMap<String, Entry>,
    generation: u64,
}

impl Snapshot {
    /// Changes every time the store is mutated
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Active entry by identifier
    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id).filter(|e| e.is_active())
    }

    /// Entry by identifier, including soft-deleted ones
    pub fn get_any(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    /// Active entries ordered by identifier
    pub fn active(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values().filter(|e| e.is_active())
    }

    pub fn len(&self) -> usize {
        self.active().count()
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }

    /// Content hash of the snapshot, used to validate the on-disk index cache
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in self.entries.values() {
            hasher.update(entry.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.modified_at.to_rfc3339().as_bytes());
            hasher.update(entry.usage_count.to_le_bytes());
            hasher.update([entry.is_active() as u8]);
        }
        hex::encode(&hasher.finalize()[..16])
    }
}

struct Writer {
    journal: Journal,
    /// Records currently in the journal
    records: usize,
}

impl Writer {
    fn needs_compaction(&self, entries: usize) -> bool {
        self.records >= COMPACT_MIN_RECORDS && self.records > entries.max(1) * COMPACT_RATIO
    }

    fn compact(&mut self, snapshot: &Snapshot) -> Result<usize> {
        let records: Vec<EntryRecord> = snapshot
            .entries
            .values()
            .map(|entry| EntryRecord::Put {
                entry: entry.clone(),
            })
            .collect();
        self.journal.rewrite(&records)?;
        self.records = records.len();
        Ok(records.len())
    }
}

/// File-backed entry store
pub struct Store {
    dir: PathBuf,
    state: RwLock<Arc<Snapshot>>,
    writer: Mutex<Writer>,
}

impl Store {
    /// Open the store in `dir`, replaying the entry journal
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| ShellDockError::io(dir, e))?;

        let (journal, replay) = Journal::open::<EntryRecord>(&dir.join(ENTRIES_FILE))?;
        let records = replay.records.len();

        let mut entries = BTreeMap::new();
        let mut generation = 0;
        for record in replay.records {
            generation += 1;
            match record {
                EntryRecord::Put { entry } => {
                    entries.insert(entry.id.clone(), entry);
                }
                EntryRecord::Unknown => {
                    warn!(record = generation, "skipping unknown entry record");
                }
            }
        }

        if replay.recovered_tail {
            info!("recovered entry journal after an interrupted write");
        }
        debug!(entries = entries.len(), "store opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            state: RwLock::new(Arc::new(Snapshot {
                entries,
                generation,
            })),
            writer: Mutex::new(Writer { journal, records }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current snapshot; never blocks on a writer for longer than a pointer swap
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.read().clone()
    }

    pub fn get(&self, id: &str) -> Result<Entry> {
        self.snapshot()
            .get(id)
            .cloned()
            .ok_or_else(|| ShellDockError::NotFound(id.to_string()))
    }

    /// Active entries ordered by identifier
    pub fn list(&self) -> Vec<Entry> {
        self.snapshot().active().cloned().collect()
    }

    pub fn create(&self, entry: Entry) -> Result<Entry> {
        self.put(entry, PutMode::Create)
    }

    pub fn update(&self, entry: Entry) -> Result<Entry> {
        self.put(entry, PutMode::Update)
    }

    pub fn put(&self, entry: Entry, mode: PutMode) -> Result<Entry> {
        self.put_with(entry, mode, |_, _| Ok(()))
    }

    /// Insert or update an entry.
    ///
    /// Create stamps fresh timestamps and a zero usage counter. Update keeps
    /// the creation time and usage counter of the stored entry.
    pub fn put_with<H>(&self, entry: Entry, mode: PutMode, hook: H) -> Result<Entry>
    where
        H: FnOnce(Option<&Entry>, &Entry) -> Result<()>,
    {
        self.apply(
            |snapshot| {
                let mut next = entry;
                next.fields.normalize();
                let now = Utc::now();
                match (mode, snapshot.get(&next.id)) {
                    (PutMode::Create, Some(_)) => {
                        return Err(ShellDockError::DuplicateKey(next.id));
                    }
                    (PutMode::Create, None) => {
                        next.created_at = now;
                        next.usage_count = 0;
                    }
                    (PutMode::Update, None) => {
                        return Err(ShellDockError::NotFound(next.id));
                    }
                    (PutMode::Update, Some(current)) => {
                        next.created_at = current.created_at;
                        next.usage_count = current.usage_count;
                    }
                }
                next.modified_at = now;
                next.deleted_at = None;
                Ok(Change::Write(next))
            },
            hook,
        )
    }

    pub fn delete(&self, id: &str) -> Result<Entry> {
        self.delete_with(id, |_, _| Ok(()))
    }

    /// Soft-delete: the entry is kept, marked inactive
    pub fn delete_with<H>(&self, id: &str, hook: H) -> Result<Entry>
    where
        H: FnOnce(Option<&Entry>, &Entry) -> Result<()>,
    {
        self.apply(
            |snapshot| {
                let mut next = snapshot
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ShellDockError::NotFound(id.to_string()))?;
                let now = Utc::now();
                next.deleted_at = Some(now);
                next.modified_at = now;
                Ok(Change::Write(next))
            },
            hook,
        )
    }

    /// Bump the usage counter of an active entry
    pub fn record_use(&self, id: &str) -> Result<Entry> {
        self.apply(
            |snapshot| {
                let mut next = snapshot
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ShellDockError::NotFound(id.to_string()))?;
                next.usage_count += 1;
                Ok(Change::Write(next))
            },
            |_, _| Ok(()),
        )
    }

    /// Run one mutation under the writer lock.
    ///
    /// `change` computes the new state of a single entry from the current
    /// snapshot; `hook` runs before the entry record is written and aborts
    /// the mutation if it fails. Nothing is written and the hook is skipped
    /// when `change` reports [`Change::Unchanged`].
    pub fn apply<F, H>(&self, change: F, hook: H) -> Result<Entry>
    where
        F: FnOnce(&Snapshot) -> Result<Change>,
        H: FnOnce(Option<&Entry>, &Entry) -> Result<()>,
    {
        let mut writer = self.writer.lock();
        let current = self.snapshot();

        let next = match change(&current)? {
            Change::Write(next) => next,
            Change::Unchanged(entry) => return Ok(entry),
        };
        next.validate()?;
        hook(current.get_any(&next.id), &next)?;

        writer.journal.append(&EntryRecord::Put {
            entry: next.clone(),
        })?;
        writer.records += 1;

        let mut entries = current.entries.clone();
        entries.insert(next.id.clone(), next.clone());
        let snapshot = Arc::new(Snapshot {
            entries,
            generation: current.generation + 1,
        });
        *self.state.write() = Arc::clone(&snapshot);
        debug!(id = %next.id, active = next.is_active(), "entry written");

        if writer.needs_compaction(snapshot.entries.len()) {
            let before = writer.records;
            match writer.compact(&snapshot) {
                Ok(records) => info!(before, records, "entry journal compacted automatically"),
                // The write itself is durable; compaction is retried on a later write
                Err(e) => warn!(error = %e, "automatic compaction failed"),
            }
        }
        Ok(next)
    }

    /// Rewrite the journal with one record per entry
    pub fn compact(&self) -> Result<usize> {
        let mut writer = self.writer.lock();
        let records = writer.compact(&self.snapshot())?;
        info!(records, "entry journal compacted");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::encode;
    use std::io::Write;
    use std::thread;
    use tempfile::TempDir;

    fn open_store() -> (Store, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        (store, tmp)
    }

    #[test]
    fn test_put_get_round_trip() -> Result<()> {
        let (store, _tmp) = open_store();
        let stored = store.create(
            Entry::new("deploy", "kubectl apply -f {{file}}")
                .with_description("Apply a manifest")
                .with_tags(["k8s"]),
        )?;
        assert_eq!(store.get(&stored.id)?, stored);
        Ok(())
    }

    #[test]
    fn test_create_duplicate_fails() -> Result<()> {
        let (store, _tmp) = open_store();
        store.create(Entry::new("ls", "ls -la"))?;
        let err = store.create(Entry::new("ls", "ls -1")).unwrap_err();
        assert!(matches!(err, ShellDockError::DuplicateKey(id) if id == "ls"));
        Ok(())
    }

    #[test]
    fn test_update_missing_fails() {
        let (store, _tmp) = open_store();
        let err = store.update(Entry::new("ghost", "true")).unwrap_err();
        assert!(matches!(err, ShellDockError::NotFound(_)));
    }

    #[test]
    fn test_update_keeps_created_at_and_usage() -> Result<()> {
        let (store, _tmp) = open_store();
        let created = store.create(Entry::new("ls", "ls"))?;
        store.record_use("ls")?;

        let updated = store.update(Entry::new("ls", "ls -la"))?;
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.usage_count, 1);
        assert_eq!(updated.command(), "ls -la");
        assert!(updated.modified_at >= created.modified_at);
        Ok(())
    }

    #[test]
    fn test_delete_is_soft_and_persistent() -> Result<()> {
        let tmp = TempDir::new().unwrap();
        {
            let store = Store::open(tmp.path())?;
            store.create(Entry::new("tmp", "rm -rf /tmp/x"))?;
            store.delete("tmp")?;
            assert!(matches!(store.get("tmp"), Err(ShellDockError::NotFound(_))));
            assert!(matches!(store.delete("tmp"), Err(ShellDockError::NotFound(_))));
        }

        let store = Store::open(tmp.path())?;
        assert!(store.get("tmp").is_err());
        assert!(store.snapshot().get_any("tmp").is_some());
        assert!(store.list().is_empty());
        Ok(())
    }

    #[test]
    fn test_recreate_after_delete() -> Result<()> {
        let (store, _tmp) = open_store();
        store.create(Entry::new("x", "echo one"))?;
        store.delete("x")?;
        let again = store.create(Entry::new("x", "echo two"))?;
        assert!(again.is_active());
        assert_eq!(store.get("x")?.command(), "echo two");
        Ok(())
    }

    #[test]
    fn test_reopen_replays_latest_state() -> Result<()> {
        let tmp = TempDir::new().unwrap();
        let expected = {
            let store = Store::open(tmp.path())?;
            store.create(Entry::new("a", "echo a"))?;
            store.create(Entry::new("b", "echo b"))?;
            store.update(Entry::new("a", "echo A"))?;
            store.record_use("b")?
        };

        let store = Store::open(tmp.path())?;
        assert_eq!(store.get("a")?.command(), "echo A");
        assert_eq!(store.get("b")?, expected);
        assert_eq!(store.snapshot().generation(), 4);
        Ok(())
    }

    #[test]
    fn test_truncated_record_is_discarded_on_reload() -> Result<()> {
        let tmp = TempDir::new().unwrap();
        {
            let store = Store::open(tmp.path())?;
            store.create(Entry::new("a", "echo a"))?;
            store.create(Entry::new("b", "echo b"))?;
        }

        // Simulate a crash halfway through the next append
        let torn = encode(&EntryRecord::Put {
            entry: Entry::new("c", "echo c"),
        })?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(tmp.path().join(ENTRIES_FILE))
            .unwrap();
        file.write_all(&torn.as_bytes()[..torn.len() - 10]).unwrap();
        drop(file);

        let store = Store::open(tmp.path())?;
        assert_eq!(store.get("a")?.command(), "echo a");
        assert_eq!(store.get("b")?.command(), "echo b");
        assert!(store.get("c").is_err());

        store.create(Entry::new("c", "echo c"))?;
        drop(store);
        let store = Store::open(tmp.path())?;
        assert_eq!(store.list().len(), 3);
        Ok(())
    }

    #[test]
    fn test_unknown_record_kind_is_skipped() -> Result<()> {
        let tmp = TempDir::new().unwrap();
        {
            let store = Store::open(tmp.path())?;
            store.create(Entry::new("a", "echo a"))?;
        }
        let future = encode(&serde_json::json!({"op": "tag_rename", "from": "x", "to": "y"}))?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(tmp.path().join(ENTRIES_FILE))
            .unwrap();
        file.write_all(future.as_bytes()).unwrap();
        drop(file);

        let store = Store::open(tmp.path())?;
        assert_eq!(store.list().len(), 1);
        Ok(())
    }

    #[test]
    fn test_failing_hook_aborts_mutation() -> Result<()> {
        let (store, _tmp) = open_store();
        let err = store
            .put_with(Entry::new("a", "echo a"), PutMode::Create, |_, _| {
                Err(ShellDockError::InvalidInput("refused".into()))
            })
            .unwrap_err();
        assert!(matches!(err, ShellDockError::InvalidInput(_)));
        assert!(store.get("a").is_err());
        assert_eq!(store.snapshot().generation(), 0);
        Ok(())
    }

    #[test]
    fn test_compact_preserves_state() -> Result<()> {
        let tmp = TempDir::new().unwrap();
        {
            let store = Store::open(tmp.path())?;
            store.create(Entry::new("a", "echo a"))?;
            for _ in 0..5 {
                store.record_use("a")?;
            }
            store.create(Entry::new("gone", "true"))?;
            store.delete("gone")?;
            assert_eq!(store.compact()?, 2);
        }

        let log = fs::read_to_string(tmp.path().join(ENTRIES_FILE)).unwrap();
        assert_eq!(log.lines().count(), 2);

        let store = Store::open(tmp.path())?;
        assert_eq!(store.get("a")?.usage_count, 5);
        assert!(store.get("gone").is_err());
        Ok(())
    }

    #[test]
    fn test_usage_counting_compacts_automatically() -> Result<()> {
        let tmp = TempDir::new().unwrap();
        {
            let store = Store::open(tmp.path())?;
            store.create(Entry::new("ls", "ls"))?;
            store.create(Entry::new("ps", "ps aux"))?;
            for _ in 0..200 {
                store.record_use("ls")?;
            }
        }

        let log = fs::read_to_string(tmp.path().join(ENTRIES_FILE)).unwrap();
        assert!(log.lines().count() < COMPACT_MIN_RECORDS);

        let store = Store::open(tmp.path())?;
        assert_eq!(store.get("ls")?.usage_count, 200);
        assert_eq!(store.get("ps")?.command(), "ps aux");
        Ok(())
    }

    #[test]
    fn test_readers_see_whole_snapshots() -> Result<()> {
        let (store, _tmp) = open_store();
        let store = Arc::new(store);
        store.create(Entry::new("counter", "echo 0"))?;

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 1..=50 {
                    store.update(Entry::new("counter", &format!("echo {}", i))).unwrap();
                }
            })
        };

        let mut last = 0;
        for _ in 0..200 {
            let snapshot = store.snapshot();
            let entry = snapshot.get("counter").unwrap();
            let n: u64 = entry.command().trim_start_matches("echo ").parse().unwrap();
            assert!(n >= last);
            last = n;
        }
        writer.join().unwrap();
        assert_eq!(store.get("counter")?.command(), "echo 50");
        Ok(())
    }
}
