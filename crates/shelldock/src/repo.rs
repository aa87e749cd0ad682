//! Repository facade
//!
//! [`Repository`] is the one value the CLI talks to. It is constructed
//! explicitly and passed by reference; every mutation goes through the store's
//! writer lock and records its revision before the entry record is written.
//! If writing the entry record then fails, the revision is withdrawn again.

use chrono::Utc;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use shelldock_core::IndexRebuild;

use crate::entry::{Entry, EntryFields};
use crate::error::{Result, ShellDockError};
use crate::history::{History, Revision, RevisionAction, Revisions};
use crate::index::INDEX_FILE;
use crate::resolve::{self, Bindings, Resolved};
use crate::search::{SearchResults, Searcher};
use crate::store::{Change, PutMode, Store};

/// How a repository is opened
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    /// Platform used to pick command variants
    pub platform: String,
    pub index_rebuild: IndexRebuild,
    /// Persist the search index to `index.json`
    pub index_cache: bool,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            platform: shelldock_core::platform::detect(),
            index_rebuild: IndexRebuild::default(),
            index_cache: true,
        }
    }
}

/// Store, history and search index of one data directory
pub struct Repository {
    dir: PathBuf,
    store: Store,
    history: History,
    searcher: Searcher,
    platform: String,
}

impl Repository {
    pub fn open(dir: &Path, options: RepositoryOptions) -> Result<Self> {
        let store = Store::open(dir)?;
        let history = History::open(dir)?;
        let cache = options.index_cache.then(|| dir.join(INDEX_FILE));
        let searcher = Searcher::new(cache, options.index_rebuild);

        info!(
            dir = %dir.display(),
            entries = store.snapshot().len(),
            platform = %options.platform,
            "repository opened"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            store,
            history,
            searcher,
            platform: options.platform,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    /// Run a store write whose hook records a revision into `recorded`.
    ///
    /// A revision recorded for a write that then failed is withdrawn.
    fn recorded<W>(&self, write: W) -> Result<Entry>
    where
        W: FnOnce(&Cell<Option<u64>>) -> Result<Entry>,
    {
        let recorded = Cell::new(None);
        let result = write(&recorded);
        if let (Err(err), Some(revision)) = (&result, recorded.get()) {
            warn!(revision, error = %err, "entry write failed, withdrawing its revision");
            if let Err(e) = self.history.withdraw(revision) {
                warn!(revision, error = %e, "could not withdraw revision");
            }
        }
        result
    }

    /// Create a new entry
    pub fn add(&self, entry: Entry) -> Result<Entry> {
        self.recorded(|recorded| {
            self.store.put_with(entry, PutMode::Create, |before, after| {
                recorded.set(Some(self.history.record(before, after)?.id));
                Ok(())
            })
        })
    }

    pub fn get(&self, id: &str) -> Result<Entry> {
        self.store.get(id)
    }

    /// The entry as it was at a revision
    pub fn get_at(&self, id: &str, revision: u64) -> Result<Entry> {
        let snapshot = self.store.snapshot();
        let current = snapshot
            .get_any(id)
            .ok_or_else(|| ShellDockError::NotFound(id.to_string()))?;
        let revision = self.history.get(id, revision)?;

        let mut entry = current.clone();
        entry.fields = revision.fields;
        entry.modified_at = revision.recorded_at;
        entry.deleted_at = None;
        Ok(entry)
    }

    pub fn list(&self) -> Vec<Entry> {
        self.store.list()
    }

    /// Replace the fields of an entry
    pub fn update(&self, id: &str, fields: EntryFields) -> Result<Entry> {
        self.edit(id, |current| *current = fields)
    }

    /// Modify the fields of an active entry.
    ///
    /// Nothing is written when the fields end up unchanged.
    pub fn edit<F>(&self, id: &str, change: F) -> Result<Entry>
    where
        F: FnOnce(&mut EntryFields),
    {
        self.recorded(|recorded| {
            self.store.apply(
                |snapshot| {
                    let current = snapshot
                        .get(id)
                        .ok_or_else(|| ShellDockError::NotFound(id.to_string()))?;
                    let mut next = current.clone();
                    change(&mut next.fields);
                    next.fields.normalize();
                    if next.fields == current.fields {
                        return Ok(Change::Unchanged(current.clone()));
                    }
                    next.modified_at = Utc::now();
                    Ok(Change::Write(next))
                },
                |before, after| {
                    recorded.set(Some(self.history.record(before, after)?.id));
                    Ok(())
                },
            )
        })
    }

    /// Soft-delete an entry; its history is kept
    pub fn remove(&self, id: &str) -> Result<Entry> {
        self.recorded(|recorded| {
            self.store.delete_with(id, |before, after| {
                recorded.set(Some(self.history.record(before, after)?.id));
                Ok(())
            })
        })
    }

    pub fn search(&self, query: &str) -> SearchResults {
        self.searcher.search(&self.store, query)
    }

    /// Command text for the active platform with arguments bound
    pub fn resolve(&self, id: &str, bindings: &Bindings) -> Result<Resolved> {
        let entry = self.get(id)?;
        resolve::resolve(&entry, &self.platform, bindings)
    }

    /// Like [`Repository::resolve`] with the fields of an older revision
    pub fn resolve_at(&self, id: &str, revision: u64, bindings: &Bindings) -> Result<Resolved> {
        let entry = self.get_at(id, revision)?;
        resolve::resolve(&entry, &self.platform, bindings)
    }

    /// Command text with unbound placeholders left visible
    pub fn preview(&self, entry: &Entry, bindings: &Bindings) -> String {
        resolve::preview(&entry.fields, &self.platform, bindings)
    }

    /// Count one use of an entry
    pub fn record_use(&self, id: &str) -> Result<Entry> {
        self.store.record_use(id)
    }

    /// Revisions of an entry, newest first
    pub fn history(&self, id: &str) -> Result<Revisions> {
        if self.store.snapshot().get_any(id).is_none() && !self.history.has_history(id) {
            return Err(ShellDockError::NotFound(id.to_string()));
        }
        Ok(self.history.history(id))
    }

    pub fn revision(&self, id: &str, revision: u64) -> Result<Revision> {
        self.history.get(id, revision)
    }

    /// Restore the fields recorded in `revision`.
    ///
    /// Recorded as a new revision. A removed entry is brought back.
    pub fn rollback(&self, id: &str, revision: u64) -> Result<Entry> {
        if self.store.snapshot().get_any(id).is_none() {
            return Err(ShellDockError::NotFound(id.to_string()));
        }
        let target = self.history.get(id, revision)?;

        self.recorded(|recorded| {
            self.store.apply(
                |snapshot| {
                    let mut next = snapshot
                        .get_any(id)
                        .cloned()
                        .ok_or_else(|| ShellDockError::NotFound(id.to_string()))?;
                    next.fields = target.fields.clone();
                    next.modified_at = Utc::now();
                    next.deleted_at = None;
                    Ok(Change::Write(next))
                },
                |before, after| {
                    let before = before.filter(|e| e.is_active()).map(|e| &e.fields);
                    let action = RevisionAction::Rollback { from: target.id };
                    let revision = self.history.record_action(id, action, before, &after.fields)?;
                    recorded.set(Some(revision.id));
                    Ok(())
                },
            )
        })
    }

    /// Drop all but the newest `keep` revisions of an entry
    pub fn prune_history(&self, id: &str, keep: usize) -> Result<usize> {
        self.history(id)?;
        self.history.prune(id, keep)
    }

    /// Rewrite the entry journal to one record per entry
    pub fn compact(&self) -> Result<usize> {
        self.store.compact()
    }
}
