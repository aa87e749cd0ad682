//! Query/search layer
//!
//! [`Searcher`] owns the current [`Index`] and keeps it in step with the
//! store. [`SearchResults`] is a lazy, restartable view over one query: a
//! tier is only evaluated when iteration reaches it.

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::vec;
use tracing::{debug, warn};

use shelldock_core::IndexRebuild;

use crate::cancel::CancelToken;
use crate::error::{Result, ShellDockError};
use crate::index::{Index, Tier};
use crate::store::{Snapshot, Store};

type Shared = Arc<RwLock<Option<Arc<Index>>>>;

/// Keeps the search index current and answers queries
pub struct Searcher {
    cache_path: Option<PathBuf>,
    mode: IndexRebuild,
    current: Shared,
    /// Serializes index builds and cache writes
    build_lock: Arc<Mutex<()>>,
    rebuilding: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Searcher {
    pub fn new(cache_path: Option<PathBuf>, mode: IndexRebuild) -> Self {
        Self {
            cache_path,
            mode,
            current: Arc::new(RwLock::new(None)),
            build_lock: Arc::new(Mutex::new(())),
            rebuilding: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> IndexRebuild {
        self.mode
    }

    /// Index for the store, rebuilt as the rebuild mode dictates
    pub fn index(&self, store: &Store) -> Arc<Index> {
        let snapshot = store.snapshot();
        let existing = self.current.read().clone();

        match existing {
            Some(index) if index.is_current(&snapshot) => index,
            Some(stale) if self.mode == IndexRebuild::Background => {
                self.spawn_rebuild(snapshot);
                stale
            }
            Some(_) => self.rebuild(&snapshot),
            None => self.load_or_rebuild(&snapshot),
        }
    }

    /// Query the store. Never mutates it.
    pub fn search(&self, store: &Store, query: &str) -> SearchResults {
        SearchResults {
            index: self.index(store),
            query: query.trim().to_lowercase(),
            cancel: None,
        }
    }

    /// Block until any background rebuild has finished
    pub fn wait_for_rebuild(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("index rebuild thread panicked");
            }
        }
    }

    fn load_or_rebuild(&self, snapshot: &Snapshot) -> Arc<Index> {
        if let Some(path) = &self.cache_path {
            if let Some(mut index) = Index::load_cache(path, &snapshot.fingerprint()) {
                index.set_generation(snapshot.generation());
                let index = Arc::new(index);
                *self.current.write() = Some(Arc::clone(&index));
                return index;
            }
        }
        self.rebuild(snapshot)
    }

    fn rebuild(&self, snapshot: &Snapshot) -> Arc<Index> {
        let _build = self.build_lock.lock();
        let existing = self.current.read().clone();
        if let Some(index) = existing.filter(|i| i.is_current(snapshot)) {
            return index;
        }

        let index = Arc::new(Index::build(snapshot));
        if let Some(path) = &self.cache_path {
            index.save_cache(path);
        }
        install(&self.current, Arc::clone(&index));
        index
    }

    fn spawn_rebuild(&self, snapshot: Arc<Snapshot>) {
        if self.rebuilding.swap(true, Ordering::SeqCst) {
            debug!("index rebuild already running");
            return;
        }

        let current = Arc::clone(&self.current);
        let build_lock = Arc::clone(&self.build_lock);
        let rebuilding = Arc::clone(&self.rebuilding);
        let cache_path = self.cache_path.clone();

        debug!(generation = snapshot.generation(), "rebuilding index in background");
        let handle = thread::spawn(move || {
            let _running = RebuildFlag(rebuilding);
            let _build = build_lock.lock();
            let index = Arc::new(Index::build(&snapshot));
            if let Some(path) = &cache_path {
                index.save_cache(path);
            }
            install(&current, index);
        });

        let previous = self.worker.lock().replace(handle);
        if let Some(previous) = previous {
            let _ = previous.join();
        }
    }
}

/// Clears the "rebuild running" flag when the worker ends, even by panic
struct RebuildFlag(Arc<AtomicBool>);

impl Drop for RebuildFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Swap in `index` unless a newer one is already installed
fn install(current: &Shared, index: Arc<Index>) {
    let mut slot = current.write();
    let newer_installed = matches!(
        (slot.as_ref().and_then(|i| i.generation()), index.generation()),
        (Some(installed), Some(candidate)) if installed > candidate
    );
    if !newer_installed {
        *slot = Some(index);
    }
}

/// Ranked results of one query
#[derive(Debug, Clone)]
pub struct SearchResults {
    index: Arc<Index>,
    query: String,
    cancel: Option<CancelToken>,
}

impl SearchResults {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Iterate from the best match; every call starts over
    pub fn iter(&self) -> SearchIter<'_> {
        SearchIter {
            results: self,
            tiers: if self.query.is_empty() {
                Vec::new().into_iter()
            } else {
                Tier::ALL.to_vec().into_iter()
            },
            pending: if self.query.is_empty() {
                self.index.all().into_iter()
            } else {
                Vec::new().into_iter()
            },
            seen: HashSet::new(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Collect identifiers, at most `limit` of them
    pub fn collect_ids(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let ids: Vec<String> = match limit {
            Some(limit) => self.iter().take(limit).collect(),
            None => self.iter().collect(),
        };
        if self.is_cancelled() {
            return Err(ShellDockError::Cancelled);
        }
        Ok(ids)
    }
}

impl<'a> IntoIterator for &'a SearchResults {
    type Item = String;
    type IntoIter = SearchIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over ranked identifiers
pub struct SearchIter<'a> {
    results: &'a SearchResults,
    tiers: vec::IntoIter<Tier>,
    pending: vec::IntoIter<String>,
    seen: HashSet<String>,
}

impl Iterator for SearchIter<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if self.results.is_cancelled() {
                return None;
            }
            match self.pending.next() {
                Some(id) => {
                    if self.seen.insert(id.clone()) {
                        return Some(id);
                    }
                }
                None => {
                    let tier = self.tiers.next()?;
                    self.pending = self
                        .results
                        .index
                        .matches(tier, &self.results.query)
                        .into_iter();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::index::INDEX_FILE;
    use tempfile::TempDir;

    fn store_with_docker() -> (Store, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        store
            .create(Entry::new("ps", "docker ps").with_tags(["docker"]))
            .unwrap();
        store
            .create(Entry::new("images", "docker images").with_tags(["docker"]))
            .unwrap();
        store.create(Entry::new("dockerfile-lint", "hadolint Dockerfile")).unwrap();
        store.create(Entry::new("du", "du -sh . # disk usage of docker volumes")).unwrap();
        (store, tmp)
    }

    #[test]
    fn test_tiers_rank_in_order() -> Result<()> {
        let (store, tmp) = store_with_docker();
        store.record_use("images")?;
        let searcher = Searcher::new(Some(tmp.path().join(INDEX_FILE)), IndexRebuild::Inline);

        let ids = searcher.search(&store, "Docker").collect_ids(None)?;
        assert_eq!(ids, vec!["images", "ps", "dockerfile-lint", "du"]);
        Ok(())
    }

    #[test]
    fn test_results_are_restartable() -> Result<()> {
        let (store, _tmp) = store_with_docker();
        let searcher = Searcher::new(None, IndexRebuild::Inline);
        let results = searcher.search(&store, "docker");
        let first: Vec<String> = results.iter().collect();
        let second: Vec<String> = results.iter().collect();
        assert_eq!(first, second);
        assert_eq!(results.iter().next(), first.first().cloned());
        Ok(())
    }

    #[test]
    fn test_empty_query_lists_everything() -> Result<()> {
        let (store, _tmp) = store_with_docker();
        store.record_use("du")?;
        let searcher = Searcher::new(None, IndexRebuild::Inline);
        let ids = searcher.search(&store, "  ").collect_ids(None)?;
        assert_eq!(ids, vec!["du", "dockerfile-lint", "images", "ps"]);
        Ok(())
    }

    #[test]
    fn test_inline_rebuild_sees_mutation() -> Result<()> {
        let (store, _tmp) = store_with_docker();
        let searcher = Searcher::new(None, IndexRebuild::Inline);
        assert!(searcher.search(&store, "kubectl").collect_ids(None)?.is_empty());

        store.create(Entry::new("k", "kubectl get pods"))?;
        assert_eq!(searcher.search(&store, "kubectl").collect_ids(None)?, vec!["k"]);
        Ok(())
    }

    #[test]
    fn test_background_rebuild_is_eventually_consistent() -> Result<()> {
        let (store, _tmp) = store_with_docker();
        let searcher = Searcher::new(None, IndexRebuild::Background);
        // No index yet: built inline
        assert_eq!(searcher.search(&store, "docker").collect_ids(None)?.len(), 4);

        store.create(Entry::new("k", "kubectl get pods"))?;
        let stale = searcher.search(&store, "kubectl").collect_ids(None)?;
        assert!(stale.is_empty() || stale == vec!["k"]);

        searcher.wait_for_rebuild();
        assert_eq!(searcher.search(&store, "kubectl").collect_ids(None)?, vec!["k"]);
        Ok(())
    }

    #[test]
    fn test_rebuild_flag_clears_after_panic() {
        let flag = Arc::new(AtomicBool::new(true));
        let worker = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || {
                let _running = RebuildFlag(flag);
                panic!("index build failed");
            })
        };
        assert!(worker.join().is_err());
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancelled_search() -> Result<()> {
        let (store, _tmp) = store_with_docker();
        let searcher = Searcher::new(None, IndexRebuild::Inline);
        let token = CancelToken::new();
        let results = searcher.search(&store, "docker").with_cancel(token.clone());

        let mut iter = results.iter();
        assert!(iter.next().is_some());
        token.cancel();
        assert_eq!(iter.next(), None);
        assert!(matches!(
            results.collect_ids(None),
            Err(ShellDockError::Cancelled)
        ));
        Ok(())
    }

    #[test]
    fn test_limit() -> Result<()> {
        let (store, _tmp) = store_with_docker();
        let searcher = Searcher::new(None, IndexRebuild::Inline);
        assert_eq!(searcher.search(&store, "docker").collect_ids(Some(2))?.len(), 2);
        Ok(())
    }
}
