//! Versioning layer
//!
//! Every change to an entry's fields is recorded as an immutable [`Revision`]
//! in `revisions.log`, using the same journal framing as the entry store.
//! Revisions are only ever appended; [`History::prune`] is the one operation
//! that drops old ones.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::entry::{Entry, EntryFields};
use crate::error::{Result, ShellDockError};
use crate::journal::Journal;

/// Revision journal file name inside the store directory
pub const REVISIONS_FILE: &str = "revisions.log";

/// What produced a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevisionAction {
    Create,
    Edit,
    Remove,
    Rollback {
        /// Revision whose fields were restored
        from: u64,
    },
    #[serde(other)]
    Other,
}

impl std::fmt::Display for RevisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Edit => write!(f, "edit"),
            Self::Remove => write!(f, "remove"),
            Self::Rollback { from } => write!(f, "rollback to #{}", from),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Immutable snapshot of an entry's fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Store-wide, strictly increasing
    pub id: u64,
    pub entry_id: String,
    pub recorded_at: DateTime<Utc>,
    pub action: RevisionAction,
    /// Fields after the change
    pub fields: EntryFields,
    /// Fields before the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<EntryFields>,
}

struct Writer {
    journal: Journal,
    next_id: u64,
}

/// Revision log of a store
pub struct History {
    revisions: RwLock<Arc<Vec<Revision>>>,
    writer: Mutex<Writer>,
}

impl History {
    pub fn open(dir: &Path) -> Result<Self> {
        let (journal, replay) = Journal::open::<Revision>(&dir.join(REVISIONS_FILE))?;
        if replay.recovered_tail {
            info!("recovered revision journal after an interrupted write");
        }

        let revisions = replay.records;
        let next_id = revisions.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        debug!(revisions = revisions.len(), next_id, "history opened");

        Ok(Self {
            revisions: RwLock::new(Arc::new(revisions)),
            writer: Mutex::new(Writer { journal, next_id }),
        })
    }

    /// Record a transition from `before` to `after`, inferring the action
    pub fn record(&self, before: Option<&Entry>, after: &Entry) -> Result<Revision> {
        let action = match before {
            None => RevisionAction::Create,
            Some(prev) if !prev.is_active() => RevisionAction::Create,
            Some(_) if !after.is_active() => RevisionAction::Remove,
            Some(_) => RevisionAction::Edit,
        };
        let before = before.filter(|prev| prev.is_active()).map(|prev| &prev.fields);
        self.record_action(&after.id, action, before, &after.fields)
    }

    /// Append a revision with an explicit action
    pub fn record_action(
        &self,
        entry_id: &str,
        action: RevisionAction,
        before: Option<&EntryFields>,
        fields: &EntryFields,
    ) -> Result<Revision> {
        let mut writer = self.writer.lock();
        let revision = Revision {
            id: writer.next_id,
            entry_id: entry_id.to_string(),
            recorded_at: Utc::now(),
            action,
            fields: fields.clone(),
            before: before.cloned(),
        };

        writer.journal.append(&revision)?;
        writer.next_id += 1;

        let mut revisions = self.revisions.write();
        Arc::make_mut(&mut *revisions).push(revision.clone());

        debug!(id = revision.id, entry = %entry_id, action = %revision.action, "revision recorded");
        Ok(revision)
    }

    /// Drop a revision whose change never reached the entry journal
    pub fn withdraw(&self, revision: u64) -> Result<()> {
        let mut writer = self.writer.lock();
        let current = self.revisions.read().clone();
        if !current.iter().any(|r| r.id == revision) {
            return Ok(());
        }

        let kept: Vec<Revision> = current.iter().filter(|r| r.id != revision).cloned().collect();
        writer.journal.rewrite(&kept)?;
        *self.revisions.write() = Arc::new(kept);

        info!(revision, "revision withdrawn");
        Ok(())
    }

    /// Revisions of an entry, newest first
    pub fn history(&self, entry_id: &str) -> Revisions {
        let revisions = self.revisions.read().clone();
        let pos = revisions.len();
        Revisions {
            revisions,
            entry_id: entry_id.to_string(),
            pos,
        }
    }

    pub fn has_history(&self, entry_id: &str) -> bool {
        self.revisions.read().iter().any(|r| r.entry_id == entry_id)
    }

    pub fn latest(&self, entry_id: &str) -> Option<Revision> {
        self.history(entry_id).next()
    }

    /// One revision of an entry
    pub fn get(&self, entry_id: &str, revision: u64) -> Result<Revision> {
        self.revisions
            .read()
            .iter()
            .find(|r| r.id == revision && r.entry_id == entry_id)
            .cloned()
            .ok_or_else(|| ShellDockError::RevisionNotFound {
                entry: entry_id.to_string(),
                revision,
            })
    }

    /// Keep the newest `keep` revisions of an entry; returns how many were dropped
    pub fn prune(&self, entry_id: &str, keep: usize) -> Result<usize> {
        if keep == 0 {
            return Err(ShellDockError::InvalidInput(
                "history pruning must keep at least one revision".to_string(),
            ));
        }

        let mut writer = self.writer.lock();
        let current = self.revisions.read().clone();

        let total = current.iter().filter(|r| r.entry_id == entry_id).count();
        let drop_count = total.saturating_sub(keep);
        if drop_count == 0 {
            return Ok(0);
        }

        let mut skipped = 0;
        let kept: Vec<Revision> = current
            .iter()
            .filter(|r| {
                if r.entry_id == entry_id && skipped < drop_count {
                    skipped += 1;
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();

        writer.journal.rewrite(&kept)?;
        *self.revisions.write() = Arc::new(kept);

        info!(entry = %entry_id, dropped = drop_count, kept = keep, "history pruned");
        Ok(drop_count)
    }
}

/// Lazy, newest-first iterator over one entry's revisions
pub struct Revisions {
    revisions: Arc<Vec<Revision>>,
    entry_id: String,
    pos: usize,
}

impl Iterator for Revisions {
    type Item = Revision;

    fn next(&mut self) -> Option<Revision> {
        while self.pos > 0 {
            self.pos -= 1;
            let revision = &self.revisions[self.pos];
            if revision.entry_id == self.entry_id {
                return Some(revision.clone());
            }
        }
        None
    }
}
