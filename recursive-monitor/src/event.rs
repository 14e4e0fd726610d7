//! Raw and semantic change events.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Change bits as reported by the facility.
    ///
    /// Values match the kernel's inotify constants so masks convert losslessly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ChangeMask: u32 {
        /// File content was modified.
        const MODIFY = 0x0000_0002;
        /// Metadata changed.
        const ATTRIB = 0x0000_0004;
        /// File opened for writing was closed.
        const CLOSE_WRITE = 0x0000_0008;
        /// Entry moved out of the watched directory.
        const MOVED_FROM = 0x0000_0040;
        /// Entry moved into the watched directory.
        const MOVED_TO = 0x0000_0080;
        /// Entry created in the watched directory.
        const CREATE = 0x0000_0100;
        /// Entry deleted from the watched directory.
        const DELETE = 0x0000_0200;
        /// The watched directory itself was deleted.
        const DELETE_SELF = 0x0000_0400;
        /// The watched directory itself was moved.
        const MOVE_SELF = 0x0000_0800;
        /// Event queue overflowed.
        const QUEUE_OVERFLOW = 0x0000_4000;
        /// Watch was removed.
        const IGNORED = 0x0000_8000;
        /// Subject of the event is a directory.
        const ISDIR = 0x4000_0000;
    }
}

impl ChangeMask {
    /// Mask used to register every directory unless configured otherwise.
    pub const DEFAULT_WATCH: Self = Self::CLOSE_WRITE
        .union(Self::CREATE)
        .union(Self::DELETE)
        .union(Self::MODIFY)
        .union(Self::MOVED_FROM)
        .union(Self::MOVED_TO);

    /// Bits the tree needs to follow directories appearing and disappearing.
    pub const STRUCTURAL: Self = Self::CREATE
        .union(Self::DELETE)
        .union(Self::MOVED_FROM)
        .union(Self::MOVED_TO);

    /// Subject is a directory.
    pub fn is_dir(self) -> bool {
        self.contains(Self::ISDIR)
    }

    /// Entry left the directory (deleted or moved out).
    pub fn is_departure(self) -> bool {
        self.intersects(Self::MOVED_FROM | Self::DELETE)
    }

    /// Entry appeared in the directory (created or moved in).
    pub fn is_arrival(self) -> bool {
        self.intersects(Self::CREATE | Self::MOVED_TO)
    }
}

impl Default for ChangeMask {
    fn default() -> Self {
        Self::DEFAULT_WATCH
    }
}

/// One unprocessed notification drained from the facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent<T> {
    /// Token of the watch that produced the event.
    pub token: T,

    /// Change bits.
    pub mask: ChangeMask,

    /// Name of the affected child, empty when the event concerns the watched
    /// directory itself.
    pub name: OsString,
}

impl<T> RawEvent<T> {
    /// Create a new raw event.
    pub fn new(token: T, mask: ChangeMask, name: impl Into<OsString>) -> Self {
        Self {
            token,
            mask,
            name: name.into(),
        }
    }

    /// Whether the event concerns the watched directory itself.
    pub fn is_self(&self) -> bool {
        self.name.is_empty()
    }
}

/// Kind of semantic event delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Entry created or moved in.
    Create,

    /// Entry deleted or moved out.
    Delete,

    /// Content modified.
    Modify,

    /// File closed after writing.
    Write,

    /// Emitted for every event that was not ignored.
    Notice,
}

impl EventKind {
    /// Classify a raw mask. The first matching kind wins.
    pub fn classify(mask: ChangeMask) -> Option<Self> {
        if mask.is_departure() {
            Some(Self::Delete)
        } else if mask.is_arrival() {
            Some(Self::Create)
        } else if mask.contains(ChangeMask::MODIFY) {
            Some(Self::Modify)
        } else if mask.contains(ChangeMask::CLOSE_WRITE) {
            Some(Self::Write)
        } else {
            None
        }
    }

    /// Event name as exposed to subscribers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Modify => "modify",
            Self::Write => "write",
            Self::Notice => "notice",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, filtered change inside the monitored tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    /// The kind of event.
    pub kind: EventKind,

    /// Path relative to the root, without a leading separator.
    pub path: String,

    /// The monitored root directory.
    pub root: PathBuf,

    /// When the event was translated.
    pub timestamp: DateTime<Utc>,
}

impl MonitorEvent {
    /// Create a new monitor event.
    pub fn new(kind: EventKind, path: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            root: root.into(),
            timestamp: Utc::now(),
        }
    }

    /// Absolute path of the affected entry.
    pub fn absolute_path(&self) -> PathBuf {
        if self.path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&self.path)
        }
    }
}
