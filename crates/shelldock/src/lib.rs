//! ShellDock - a local, versioned repository of reusable shell commands
//!
//! The [`Repository`] ties together the storage engine ([`store`]), the
//! revision log ([`history`]), the search index ([`search`]) and the command
//! resolver ([`resolve`]). Running a resolved command is done by a
//! [`Launcher`].

pub mod cancel;
pub mod entry;
pub mod error;
pub mod history;
pub mod index;
pub mod journal;
pub mod launch;
pub mod repo;
pub mod resolve;
pub mod search;
pub mod store;
pub mod template;

pub use cancel::CancelToken;
pub use entry::{ArgumentDef, Entry, EntryFields};
pub use error::{Result, ShellDockError};
pub use history::{Revision, RevisionAction};
pub use launch::Launcher;
pub use repo::{Repository, RepositoryOptions};
pub use resolve::{Bindings, Resolved};
pub use search::SearchResults;
pub use store::{Change, PutMode, Snapshot, Store};
