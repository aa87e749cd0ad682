//! Search index
//!
//! Derived from a store [`Snapshot`] and never authoritative. The index can be
//! written to `index.json` as a cache; it carries the fingerprint of the
//! snapshot it was built from so a stale cache is detected and rebuilt.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::store::Snapshot;

/// Index cache file name inside the store directory
pub const INDEX_FILE: &str = "index.json";

/// Match tiers, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Tag,
    Prefix,
    Substring,
    Fuzzy,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Tag, Tier::Prefix, Tier::Substring, Tier::Fuzzy];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Doc {
    /// Lowercased identifier
    name: String,
    /// Lowercased identifier, commands and description
    text: String,
    usage: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Index {
    fingerprint: String,

    /// Store generation this index was built from, only valid in-process
    #[serde(skip)]
    generation: Option<u64>,

    tags: BTreeMap<String, BTreeSet<String>>,
    /// (lowercased identifier, identifier), for prefix range scans
    names: BTreeSet<(String, String)>,
    docs: BTreeMap<String, Doc>,
}

impl Index {
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut index = Index {
            fingerprint: snapshot.fingerprint(),
            generation: Some(snapshot.generation()),
            ..Default::default()
        };

        for entry in snapshot.active() {
            for tag in &entry.fields.tags {
                index
                    .tags
                    .entry(tag.to_lowercase())
                    .or_default()
                    .insert(entry.id.clone());
            }

            let name = entry.id.to_lowercase();
            let mut text = name.clone();
            text.push('\n');
            text.push_str(&entry.fields.command.to_lowercase());
            for command in entry.fields.platforms.values() {
                text.push('\n');
                text.push_str(&command.to_lowercase());
            }
            if let Some(desc) = &entry.fields.description {
                text.push('\n');
                text.push_str(&desc.to_lowercase());
            }

            index.names.insert((name.clone(), entry.id.clone()));
            index.docs.insert(
                entry.id.clone(),
                Doc {
                    name,
                    text,
                    usage: entry.usage_count,
                },
            );
        }

        debug!(entries = index.docs.len(), "index built");
        index
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = Some(generation);
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Whether this index reflects `snapshot`
    pub fn is_current(&self, snapshot: &Snapshot) -> bool {
        match self.generation {
            Some(generation) if generation == snapshot.generation() => true,
            _ => self.fingerprint == snapshot.fingerprint(),
        }
    }

    fn usage(&self, id: &str) -> u64 {
        self.docs.get(id).map(|d| d.usage).unwrap_or(0)
    }

    /// Sort identifiers by usage descending, then identifier ascending
    fn rank(&self, mut ids: Vec<String>) -> Vec<String> {
        ids.sort_by(|a, b| {
            Reverse(self.usage(a))
                .cmp(&Reverse(self.usage(b)))
                .then_with(|| a.cmp(b))
        });
        ids
    }

    /// Every indexed identifier in tie-break order
    pub fn all(&self) -> Vec<String> {
        self.rank(self.docs.keys().cloned().collect())
    }

    /// Identifiers matching `query` (already lowercased) in one tier, ranked
    pub fn matches(&self, tier: Tier, query: &str) -> Vec<String> {
        match tier {
            Tier::Tag => self.rank(
                self.tags
                    .get(query)
                    .map(|ids| ids.iter().cloned().collect())
                    .unwrap_or_default(),
            ),
            Tier::Prefix => self.rank(
                self.names
                    .range((query.to_string(), String::new())..)
                    .take_while(|(name, _)| name.starts_with(query))
                    .map(|(_, id)| id.clone())
                    .collect(),
            ),
            Tier::Substring => self.rank(
                self.docs
                    .iter()
                    .filter(|(_, doc)| doc.text.contains(query))
                    .map(|(id, _)| id.clone())
                    .collect(),
            ),
            Tier::Fuzzy => {
                let matcher = SkimMatcherV2::default();
                let mut scored: Vec<(i64, &String, u64)> = self
                    .docs
                    .iter()
                    .filter_map(|(id, doc)| {
                        matcher
                            .fuzzy_match(&doc.text, query)
                            .map(|score| (score, id, doc.usage))
                    })
                    .collect();
                scored.sort_by(|a, b| {
                    b.0.cmp(&a.0)
                        .then_with(|| b.2.cmp(&a.2))
                        .then_with(|| a.1.cmp(b.1))
                });
                scored.into_iter().map(|(_, id, _)| id.clone()).collect()
            }
        }
    }

    /// Load a cached index if it was built from the given fingerprint
    pub fn load_cache(path: &Path, fingerprint: &str) -> Option<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no index cache");
                return None;
            }
        };
        match serde_json::from_str::<Index>(&content) {
            Ok(index) if index.fingerprint == fingerprint => {
                debug!(entries = index.len(), "index cache loaded");
                Some(index)
            }
            Ok(_) => {
                debug!("index cache is stale");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable index cache");
                None
            }
        }
    }

    /// Write the index cache; failures are logged, never fatal
    pub fn save_cache(&self, path: &Path) {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let result = serde_json::to_string(self)
            .map_err(|e| e.to_string())
            .and_then(|json| fs::write(&tmp_path, json).map_err(|e| e.to_string()))
            .and_then(|_| fs::rename(&tmp_path, path).map_err(|e| e.to_string()));

        if let Err(error) = result {
            warn!(path = %path.display(), %error, "could not write index cache");
            let _ = fs::remove_file(&tmp_path);
        }
    }
}
