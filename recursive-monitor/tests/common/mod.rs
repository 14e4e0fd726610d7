//! Shared helpers for monitor integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;
use std::os::fd::RawFd;
use std::path::Path;
use std::rc::Rc;

use recursive_monitor::{EventKind, HostLoop, Monitor, ReadableCallback};

/// Host loop driven by hand: `fire` runs every registered callback once, as
/// if each handle had just become readable.
#[derive(Default)]
pub struct ManualLoop {
    callbacks: RefCell<HashMap<RawFd, ReadableCallback>>,
    deregistered: RefCell<HashSet<RawFd>>,
}

impl ManualLoop {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn registered(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Invoke every registered callback. Returns how many ran.
    pub fn fire(&self) -> usize {
        let fds: Vec<RawFd> = self.callbacks.borrow().keys().copied().collect();
        let mut fired = 0;

        for fd in fds {
            let Some(mut callback) = self.callbacks.borrow_mut().remove(&fd) else {
                continue;
            };
            self.deregistered.borrow_mut().remove(&fd);

            callback();
            fired += 1;

            if !self.deregistered.borrow_mut().remove(&fd) {
                self.callbacks.borrow_mut().insert(fd, callback);
            }
        }

        fired
    }
}

impl HostLoop for ManualLoop {
    fn register_readable(&self, fd: RawFd, callback: ReadableCallback) -> io::Result<()> {
        self.callbacks.borrow_mut().insert(fd, callback);
        Ok(())
    }

    fn deregister_readable(&self, fd: RawFd) {
        if self.callbacks.borrow_mut().remove(&fd).is_none() {
            // Deregistered from inside its own callback.
            self.deregistered.borrow_mut().insert(fd);
        }
    }
}

pub type EventLog = Rc<RefCell<Vec<(EventKind, String)>>>;

/// Record every event of the given kinds, in delivery order.
pub fn record<F>(monitor: &Monitor<F>, kinds: &[EventKind]) -> EventLog
where
    F: recursive_monitor::Facility,
{
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    for kind in kinds {
        let log = log.clone();
        let kind = *kind;
        monitor.on(kind, move |path: &str, _root: &Path| {
            log.borrow_mut().push((kind, path.to_string()));
        });
    }
    log
}

pub fn entry(kind: EventKind, path: &str) -> (EventKind, String) {
    (kind, path.to_string())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
