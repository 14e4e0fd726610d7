//! Translation of raw facility events into monitor events.

use std::path::{Path, PathBuf};

use tracing::{debug, error, trace, warn};

use crate::error::MonitorError;
use crate::event::{ChangeMask, EventKind, MonitorEvent, RawEvent};
use crate::facility::Facility;
use crate::filter::PathFilter;
use crate::relative::relative_path;
use crate::tree::WatchTree;

/// Everything produced by one drain cycle, in order.
#[derive(Debug, Default)]
pub struct Translation {
    pub events: Vec<MonitorEvent>,
    pub errors: Vec<MonitorError>,
}

impl Translation {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.errors.is_empty()
    }
}

/// Drives the watch tree from raw events and classifies what survives the filter.
#[derive(Debug, Clone)]
pub struct EventTranslator {
    root: PathBuf,
}

impl EventTranslator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Consume every pending raw event.
    ///
    /// Failures are collected per raw event and never stop the cycle, except
    /// for a failing read which ends it.
    pub fn drain<F>(
        &self,
        facility: &mut F,
        tree: &mut WatchTree<F::Token>,
        filter: &PathFilter,
    ) -> Translation
    where
        F: Facility,
    {
        let mut out = Translation::default();

        loop {
            let batch = match facility.drain() {
                Ok(batch) => batch,
                Err(e) => {
                    error!("Failed to read events: {e}");
                    out.errors.push(MonitorError::Drain(e));
                    break;
                }
            };

            if batch.is_empty() {
                break;
            }

            for raw in batch {
                self.translate(raw, facility, tree, filter, &mut out);
            }
        }

        out
    }

    fn translate<F>(
        &self,
        raw: RawEvent<F::Token>,
        facility: &mut F,
        tree: &mut WatchTree<F::Token>,
        filter: &PathFilter,
        out: &mut Translation,
    ) where
        F: Facility,
    {
        let Some(entry) = tree.lookup(&raw.token) else {
            if raw.mask.contains(ChangeMask::QUEUE_OVERFLOW) {
                warn!("Event queue overflowed under {}", self.root.display());
                out.errors.push(MonitorError::Overflow);
            } else {
                trace!("Dropping event for released watch {:?}", raw.token);
            }
            return;
        };

        let (path, is_dir) = if raw.is_self() {
            (entry.absolute_path.clone(), true)
        } else {
            (entry.absolute_path.join(&raw.name), raw.mask.is_dir())
        };
        let relative = relative_path(&self.root, &path, is_dir);

        // Keep the tree in shape even for paths nobody listens to.
        if is_dir && !raw.is_self() {
            if raw.mask.is_departure() {
                let removed = tree.remove(facility, &path);
                debug!("Directory gone: {} ({removed} watches)", path.display());
            } else if raw.mask.is_arrival() {
                match tree.add(facility, &path) {
                    Ok(outcome) => {
                        debug!(
                            "Directory appeared: {} ({} watches)",
                            path.display(),
                            outcome.registered
                        );
                        out.errors.extend(outcome.skipped);
                    }
                    Err(e) => {
                        warn!("Failed to extend watch to {}: {e}", path.display());
                        out.errors.push(e);
                    }
                }
            }
        }

        if filter.test(&format!("/{relative}")) {
            trace!("Ignoring event for /{relative}");
            return;
        }

        if let Some(kind) = EventKind::classify(raw.mask) {
            out.events
                .push(MonitorEvent::new(kind, relative.clone(), self.root.clone()));
        }
        out.events
            .push(MonitorEvent::new(EventKind::Notice, relative, self.root.clone()));
    }
}
