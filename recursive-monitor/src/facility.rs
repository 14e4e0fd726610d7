//! Low-level change notification facility.
//!
//! A facility can only watch one directory per registration and reports
//! changes as a flat queue of [`RawEvent`]s tagged with the registration's
//! token. Recursion is built on top of it by [`crate::tree::WatchTree`].

use std::fmt;
use std::hash::Hash;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use inotify::{Inotify, WatchDescriptor, WatchMask};
use tracing::debug;

use crate::event::{ChangeMask, RawEvent};

/// Enough room for a batch of events with maximum-length names.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Per-directory change notification source.
///
/// The handle exposed through [`AsRawFd`] must be non-blocking: it is polled
/// for readability by the host loop and drained until empty.
pub trait Facility: AsRawFd {
    /// Opaque token identifying one registered directory.
    type Token: Clone + Eq + Hash + fmt::Debug;

    /// Register a non-recursive watch on `path`.
    fn add_watch(&mut self, path: &Path, mask: ChangeMask) -> io::Result<Self::Token>;

    /// Release a watch.
    fn remove_watch(&mut self, token: Self::Token) -> io::Result<()>;

    /// Next batch of pending events; empty when nothing is currently queued.
    fn drain(&mut self) -> io::Result<Vec<RawEvent<Self::Token>>>;

    /// Release the handle and every watch registered through it.
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

/// Linux inotify backed facility.
pub struct InotifyFacility {
    inotify: Inotify,
    buffer: Vec<u8>,
}

impl InotifyFacility {
    /// Open a non-blocking, close-on-exec inotify instance.
    pub fn open() -> io::Result<Self> {
        let inotify = Inotify::init()?;
        debug!("Opened inotify instance (fd {})", inotify.as_raw_fd());

        Ok(Self {
            inotify,
            buffer: vec![0; READ_BUFFER_SIZE],
        })
    }
}

impl fmt::Debug for InotifyFacility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InotifyFacility")
            .field("fd", &self.inotify.as_raw_fd())
            .finish()
    }
}

impl AsRawFd for InotifyFacility {
    fn as_raw_fd(&self) -> RawFd {
        self.inotify.as_raw_fd()
    }
}

impl Facility for InotifyFacility {
    type Token = WatchDescriptor;

    fn add_watch(&mut self, path: &Path, mask: ChangeMask) -> io::Result<WatchDescriptor> {
        self.inotify
            .watches()
            .add(path, WatchMask::from_bits_truncate(mask.bits()))
    }

    fn remove_watch(&mut self, token: WatchDescriptor) -> io::Result<()> {
        self.inotify.watches().remove(token)
    }

    fn drain(&mut self) -> io::Result<Vec<RawEvent<WatchDescriptor>>> {
        let events = match self.inotify.read_events(&mut self.buffer) {
            Ok(events) => events,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(events
            .map(|event| {
                RawEvent::new(
                    event.wd,
                    ChangeMask::from_bits_truncate(event.mask.bits()),
                    event.name.map(ToOwned::to_owned).unwrap_or_default(),
                )
            })
            .collect())
    }

    fn close(self) -> io::Result<()> {
        self.inotify.close()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_inotify_reports_child_events() {
        let temp_dir = TempDir::new().unwrap();
        let mut facility = InotifyFacility::open().unwrap();

        let token = facility
            .add_watch(temp_dir.path(), ChangeMask::DEFAULT_WATCH)
            .unwrap();
        fs::create_dir(temp_dir.path().join("child")).unwrap();

        let events = facility.drain().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].token, token);
        assert_eq!(events[0].name, "child");
        assert!(events[0].mask.contains(ChangeMask::CREATE | ChangeMask::ISDIR));

        assert!(facility.drain().unwrap().is_empty());
        facility.close().unwrap();
    }

    #[test]
    fn test_inotify_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut facility = InotifyFacility::open().unwrap();

        let err = facility
            .add_watch(&temp_dir.path().join("missing"), ChangeMask::DEFAULT_WATCH)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
