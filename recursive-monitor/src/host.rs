//! Host event loop integration.
//!
//! The monitor never blocks or spawns threads of its own. It hands its
//! facility handle to a [`HostLoop`], which calls back whenever the handle
//! becomes readable.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::os::fd::{BorrowedFd, RawFd};

use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Invoked by the host loop each time a registered handle is readable.
pub type ReadableCallback = Box<dyn FnMut()>;

/// Cooperative, single-threaded event loop the monitor plugs into.
pub trait HostLoop {
    /// Call `callback` whenever `fd` becomes readable.
    ///
    /// The caller keeps `fd` open at least until it is deregistered.
    fn register_readable(&self, fd: RawFd, callback: ReadableCallback) -> io::Result<()>;

    /// Stop polling `fd`. Unknown handles are ignored.
    fn deregister_readable(&self, fd: RawFd);
}

/// Host loop running on a tokio [`LocalSet`](tokio::task::LocalSet).
///
/// Each registered handle gets a local task waiting for readability. Must be
/// used from within a `LocalSet` on a tokio runtime with IO enabled.
#[derive(Debug, Default)]
pub struct TokioLoop {
    tasks: RefCell<HashMap<RawFd, JoinHandle<()>>>,
}

impl TokioLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles currently polled.
    pub fn registered(&self) -> usize {
        self.tasks.borrow().len()
    }
}

impl HostLoop for TokioLoop {
    fn register_readable(&self, fd: RawFd, mut callback: ReadableCallback) -> io::Result<()> {
        // SAFETY: callers keep `fd` open until deregistration. The reactor
        // polls a duplicate so a late task teardown never touches a reused
        // descriptor number.
        let owned = unsafe { BorrowedFd::borrow_raw(fd) }.try_clone_to_owned()?;
        // SAFETY: `owned` is a valid descriptor moved into the `AsyncFd`,
        // which keeps it open and unchanged until the task drops it.
        let async_fd = unsafe { AsyncFd::register_with_interest(owned, Interest::READABLE) }?;

        let task = tokio::task::spawn_local(async move {
            loop {
                let mut guard = match async_fd.readable().await {
                    Ok(guard) => guard,
                    Err(e) => {
                        warn!("Polling fd {fd} failed: {e}");
                        break;
                    }
                };
                // Cleared before draining so events arriving mid-drain wake us again.
                guard.clear_ready();
                callback();
            }
        });

        debug!("Registered fd {fd} for readability");
        if let Some(previous) = self.tasks.borrow_mut().insert(fd, task) {
            previous.abort();
        }

        Ok(())
    }

    fn deregister_readable(&self, fd: RawFd) {
        if let Some(task) = self.tasks.borrow_mut().remove(&fd) {
            task.abort();
            debug!("Deregistered fd {fd}");
        }
    }
}

impl Drop for TokioLoop {
    fn drop(&mut self) {
        for (_, task) in self.tasks.get_mut().drain() {
            task.abort();
        }
    }
}
