//! Mapping between watched directories and facility tokens.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::hash::Hash;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{MonitorError, Result};
use crate::event::ChangeMask;
use crate::facility::Facility;
use crate::relative::relative_path;

/// One registered directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry<T> {
    /// Facility token for the watch.
    pub token: T,

    /// Absolute path of the directory.
    pub absolute_path: PathBuf,

    /// Path relative to the monitored root, computed at registration.
    pub relative_path: String,
}

/// Result of a recursive [`WatchTree::add`].
#[derive(Debug, Default)]
pub struct AddOutcome {
    /// Number of directories registered.
    pub registered: usize,

    /// Directories that could not be enumerated. Their own watch may still be
    /// active; only their children are missing.
    pub skipped: Vec<MonitorError>,
}

/// Watched directories of one monitored tree.
///
/// Both directions are kept: `paths` for structural updates by path and
/// `entries` for resolving the token carried by each raw event.
#[derive(Debug)]
pub struct WatchTree<T> {
    root: PathBuf,
    mask: ChangeMask,
    paths: BTreeMap<PathBuf, T>,
    entries: HashMap<T, WatchEntry<T>>,
}

impl<T> WatchTree<T>
where
    T: Clone + Eq + Hash + std::fmt::Debug,
{
    /// Create an empty tree for `root`, registering directories with `mask`.
    pub fn new(root: impl Into<PathBuf>, mask: ChangeMask) -> Self {
        Self {
            root: root.into(),
            mask,
            paths: BTreeMap::new(),
            entries: HashMap::new(),
        }
    }

    /// Watch `path` and every directory below it.
    ///
    /// Runs synchronously, depth first, and costs time proportional to the
    /// size of the subtree; the host loop is blocked meanwhile. Directories
    /// vanishing mid-walk are skipped. A refused registration aborts the walk
    /// with [`MonitorError::WatchFailed`], keeping the watches added so far.
    pub fn add<F>(&mut self, facility: &mut F, path: &Path) -> Result<AddOutcome>
    where
        F: Facility<Token = T>,
    {
        let mut outcome = AddOutcome::default();
        let mut visited = HashSet::new();
        let mut walker = WalkDir::new(path).follow_links(false).into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let failed = e.path().unwrap_or(path).to_path_buf();
                    let source = io::Error::from(e);
                    if is_vanished(&source) {
                        debug!("Directory vanished during walk: {}", failed.display());
                    } else {
                        warn!("Failed to read {}: {source}", failed.display());
                        outcome.skipped.push(MonitorError::Unreadable {
                            path: failed,
                            source,
                        });
                    }
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.path();
            let first_visit = match fs::canonicalize(dir) {
                Ok(real) => visited.insert(real),
                Err(e) if is_vanished(&e) => {
                    debug!("Directory vanished during walk: {}", dir.display());
                    walker.skip_current_dir();
                    continue;
                }
                Err(source) => {
                    warn!("Failed to resolve {}: {source}", dir.display());
                    outcome.skipped.push(MonitorError::Unreadable {
                        path: dir.to_path_buf(),
                        source,
                    });
                    walker.skip_current_dir();
                    continue;
                }
            };
            if !first_visit {
                debug!("Not descending into {} again", dir.display());
                walker.skip_current_dir();
                continue;
            }

            match self.watch(facility, dir) {
                Ok(true) => outcome.registered += 1,
                Ok(false) => walker.skip_current_dir(),
                Err(e) if is_vanished(&e) => {
                    debug!("Directory vanished before watch: {}", dir.display());
                    walker.skip_current_dir();
                }
                Err(source) => {
                    return Err(MonitorError::WatchFailed {
                        path: dir.to_path_buf(),
                        source,
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Register a single directory. Returns `false` if the facility handed
    /// back a token already bound to a different path.
    fn watch<F>(&mut self, facility: &mut F, dir: &Path) -> io::Result<bool>
    where
        F: Facility<Token = T>,
    {
        let token = facility.add_watch(dir, self.mask)?;

        if let Some(existing) = self.entries.get(&token) {
            if existing.absolute_path != dir {
                debug!(
                    "{} is already watched as {}",
                    dir.display(),
                    existing.absolute_path.display()
                );
                return Ok(false);
            }
        }

        if let Some(stale) = self.paths.insert(dir.to_path_buf(), token.clone()) {
            if stale != token {
                self.entries.remove(&stale);
            }
        }

        let entry = WatchEntry {
            token: token.clone(),
            absolute_path: dir.to_path_buf(),
            relative_path: relative_path(&self.root, dir, true),
        };
        debug!("Watching {} ({token:?})", dir.display());
        self.entries.insert(token, entry);

        Ok(true)
    }

    /// Stop watching `path` and every directory below it.
    ///
    /// Unknown paths are ignored. Returns the number of entries removed.
    pub fn remove<F>(&mut self, facility: &mut F, path: &Path) -> usize
    where
        F: Facility<Token = T>,
    {
        if !self.paths.contains_key(path) {
            return 0;
        }

        // Descendants sort directly after their ancestor.
        let doomed: Vec<PathBuf> = self
            .paths
            .range(path.to_path_buf()..)
            .map(|(watched, _)| watched)
            .take_while(|watched| watched.starts_with(path))
            .cloned()
            .collect();

        for watched in &doomed {
            let Some(token) = self.paths.remove(watched) else {
                continue;
            };
            self.entries.remove(&token);

            // The kernel drops watches on deleted directories by itself.
            if let Err(e) = facility.remove_watch(token) {
                debug!("Watch on {} already released: {e}", watched.display());
            } else {
                debug!("Stopped watching {}", watched.display());
            }
        }

        doomed.len()
    }

    /// Resolve the entry owning a token.
    pub fn lookup(&self, token: &T) -> Option<&WatchEntry<T>> {
        self.entries.get(token)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Watched directories in path order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.keys().map(PathBuf::as_path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Forget every entry without talking to the facility.
    pub fn clear(&mut self) {
        self.paths.clear();
        self.entries.clear();
    }
}

fn is_vanished(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}
