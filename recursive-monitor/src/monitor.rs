//! Recursive directory monitor.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::event::{EventKind, MonitorEvent};
use crate::facility::{Facility, InotifyFacility};
use crate::filter::{IntoPattern, PathFilter};
use crate::host::HostLoop;
use crate::translator::{EventTranslator, Translation};
use crate::tree::WatchTree;

type EventHandler = Box<dyn FnMut(&str, &Path)>;
type ErrorHandler = Box<dyn FnMut(&MonitorError)>;

/// Watches a directory tree and notifies subscribers of changes inside it.
///
/// The monitor is single threaded: all work happens in the readability
/// callback registered with the [`HostLoop`], or in [`Monitor::process_pending`].
pub struct Monitor<F: Facility = InotifyFacility> {
    shared: Rc<Shared<F>>,
    host: Rc<dyn HostLoop>,
}

struct Shared<F: Facility> {
    root: PathBuf,
    translator: EventTranslator,
    /// `None` once closed.
    state: RefCell<Option<State<F>>>,
    filter: RefCell<PathFilter>,
    subscribers: RefCell<Subscribers>,
    /// Set while handlers run; subscribers are moved out meanwhile.
    dispatching: Cell<bool>,
}

struct State<F: Facility> {
    facility: F,
    tree: WatchTree<F::Token>,
}

#[derive(Default)]
struct Subscribers {
    handlers: Vec<(EventKind, EventHandler)>,
    channels: Vec<mpsc::UnboundedSender<MonitorEvent>>,
    error_handlers: Vec<ErrorHandler>,
}

impl Subscribers {
    fn emit(&mut self, event: &MonitorEvent) {
        for (kind, handler) in &mut self.handlers {
            if *kind == event.kind {
                handler(&event.path, &event.root);
            }
        }
        self.channels.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn report(&mut self, error: &MonitorError) {
        for handler in &mut self.error_handlers {
            handler(error);
        }
    }

    fn append(&mut self, mut other: Subscribers) {
        self.handlers.append(&mut other.handlers);
        self.channels.append(&mut other.channels);
        self.error_handlers.append(&mut other.error_handlers);
    }
}

impl Monitor<InotifyFacility> {
    /// Start monitoring `root` with the default mask and no rules.
    pub fn open(host: Rc<dyn HostLoop>, root: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(host, MonitorConfig::new(root.as_ref()))
    }

    /// Start monitoring as described by `config`.
    pub fn with_config(host: Rc<dyn HostLoop>, config: MonitorConfig) -> Result<Self> {
        let root = resolve_root(&config.root)?;
        let facility = InotifyFacility::open()?;
        Self::with_facility(host, facility, MonitorConfig { root, ..config })
    }
}

impl<F: Facility + 'static> Monitor<F> {
    /// Start monitoring with a caller-provided facility.
    pub fn with_facility(
        host: Rc<dyn HostLoop>,
        facility: F,
        config: MonitorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let root = resolve_root(&config.root)?;
        let filter = config.build_filter()?;

        let shared = Rc::new(Shared {
            translator: EventTranslator::new(&root),
            state: RefCell::new(Some(State {
                tree: WatchTree::new(&root, config.mask),
                facility,
            })),
            filter: RefCell::new(filter),
            subscribers: RefCell::new(Subscribers::default()),
            dispatching: Cell::new(false),
            root,
        });
        let monitor = Self { shared, host };

        let fd = monitor
            .fd()
            .ok_or_else(|| MonitorError::Config("facility closed".into()))?;
        let weak: Weak<Shared<F>> = Rc::downgrade(&monitor.shared);
        monitor.host.register_readable(
            fd,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.process_pending();
                }
            }),
        )?;

        // Dropping `monitor` on failure deregisters and releases everything.
        let outcome = {
            let mut state = monitor.shared.state.borrow_mut();
            let Some(State { facility, tree }) = state.as_mut() else {
                return Err(MonitorError::Config("facility closed".into()));
            };
            tree.add(facility, &monitor.shared.root)?
        };
        for skipped in &outcome.skipped {
            warn!("Partially watched: {skipped}");
        }
        if !monitor.is_watching(&monitor.shared.root) {
            return Err(MonitorError::NotFound(monitor.shared.root.clone()));
        }

        info!(
            "Monitoring {} ({} directories)",
            monitor.shared.root.display(),
            outcome.registered
        );
        Ok(monitor)
    }
}

impl<F: Facility> Monitor<F> {
    /// Run one drain cycle now. Returns the number of events delivered.
    ///
    /// From inside a handler this does nothing and returns 0; pending events
    /// stay queued for the next wake-up.
    pub fn process_pending(&self) -> usize {
        self.shared.process_pending()
    }

    /// Ignore events whose root-relative path (with a leading `/`) matches.
    pub fn ignore(&self, pattern: impl IntoPattern) -> Result<()> {
        self.shared.filter.borrow_mut().ignore(pattern)
    }

    /// Notice events whose root-relative path matches. The opposite of `ignore`.
    pub fn notice(&self, pattern: impl IntoPattern) -> Result<()> {
        self.shared.filter.borrow_mut().notice(pattern)
    }

    /// Whether events for `path` (relative, with a leading `/`) are suppressed.
    pub fn is_path_ignored(&self, path: &str) -> bool {
        self.shared.filter.borrow().test(path)
    }

    /// Call `handler` with `(relative_path, root)` for every event of `kind`.
    pub fn on(&self, kind: EventKind, handler: impl FnMut(&str, &Path) + 'static) {
        self.shared
            .subscribers
            .borrow_mut()
            .handlers
            .push((kind, Box::new(handler)));
    }

    /// Receive every event through a channel.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers.borrow_mut().channels.push(tx);
        rx
    }

    /// Call `handler` for failures discovered while draining events.
    pub fn on_error(&self, handler: impl FnMut(&MonitorError) + 'static) {
        self.shared
            .subscribers
            .borrow_mut()
            .error_handlers
            .push(Box::new(handler));
    }

    /// Stop monitoring. Safe to call any number of times.
    pub fn close(&self) {
        let Some(mut state) = self.shared.state.borrow_mut().take() else {
            return;
        };

        self.host.deregister_readable(state.facility.as_raw_fd());
        state.tree.clear();
        if let Err(e) = state.facility.close() {
            warn!("Failed to release facility: {e}");
        }
        info!("Stopped monitoring {}", self.shared.root.display());
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.borrow().is_none()
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Currently watched directories, in path order.
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.shared
            .state
            .borrow()
            .as_ref()
            .map(|state| state.tree.paths().map(Path::to_path_buf).collect())
            .unwrap_or_default()
    }

    /// Whether `path` currently has a watch.
    pub fn is_watching(&self, path: &Path) -> bool {
        self.shared
            .state
            .borrow()
            .as_ref()
            .is_some_and(|state| state.tree.contains(path))
    }

    fn fd(&self) -> Option<std::os::fd::RawFd> {
        self.shared
            .state
            .borrow()
            .as_ref()
            .map(|state| state.facility.as_raw_fd())
    }
}

impl<F: Facility> Shared<F> {
    fn process_pending(&self) -> usize {
        if self.dispatching.get() {
            debug!("Drain requested during dispatch, deferring");
            return 0;
        }

        let translation = {
            let mut state = self.state.borrow_mut();
            let Some(State { facility, tree }) = state.as_mut() else {
                return 0;
            };
            let filter = self.filter.borrow();
            self.translator.drain(facility, tree, &filter)
        };

        if translation.is_empty() {
            return 0;
        }
        debug!(
            "Translated {} events ({} errors)",
            translation.events.len(),
            translation.errors.len()
        );
        self.dispatch(translation)
    }

    /// Deliver outside of any internal borrow so handlers may call back in.
    fn dispatch(&self, translation: Translation) -> usize {
        let mut subscribers = std::mem::take(&mut *self.subscribers.borrow_mut());
        self.dispatching.set(true);

        for error in &translation.errors {
            subscribers.report(error);
        }
        for event in &translation.events {
            subscribers.emit(event);
        }

        self.dispatching.set(false);
        let mut slot = self.subscribers.borrow_mut();
        let added = std::mem::replace(&mut *slot, subscribers);
        slot.append(added);

        translation.events.len()
    }
}

impl<F: Facility> Drop for Monitor<F> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<F: Facility> fmt::Debug for Monitor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("root", &self.shared.root)
            .field("closed", &self.shared.state.borrow().is_none())
            .finish()
    }
}

/// Canonical absolute form of `path`, which must be an existing directory.
fn resolve_root(path: &Path) -> Result<PathBuf> {
    let root = path
        .canonicalize()
        .map_err(|_| MonitorError::NotFound(path.to_path_buf()))?;

    if !root.is_dir() {
        return Err(MonitorError::NotDirectory(path.to_path_buf()));
    }

    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChangeMask, RawEvent};
    use crate::facility::fake::FakeFacility;
    use crate::host::ReadableCallback;
    use pretty_assertions::assert_eq;
    use std::os::fd::RawFd;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingLoop {
        registered: Cell<usize>,
        deregistered: Cell<usize>,
    }

    impl HostLoop for CountingLoop {
        fn register_readable(
            &self,
            _fd: RawFd,
            _callback: ReadableCallback,
        ) -> std::io::Result<()> {
            self.registered.set(self.registered.get() + 1);
            Ok(())
        }

        fn deregister_readable(&self, _fd: RawFd) {
            self.deregistered.set(self.deregistered.get() + 1);
        }
    }

    #[test]
    fn test_missing_root() {
        let host = Rc::new(CountingLoop::default());
        let result = Monitor::open(host.clone(), "/nonexistent/path/12345");

        assert!(matches!(result, Err(MonitorError::NotFound(_))));
        assert_eq!(host.registered.get(), 0);
    }

    #[test]
    fn test_root_is_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();

        let result = Monitor::open(Rc::new(CountingLoop::default()), &file);
        assert!(matches!(result, Err(MonitorError::NotDirectory(_))));
    }

    #[test]
    fn test_failed_seed_releases_registration() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("locked")).unwrap();

        let mut facility = FakeFacility::new();
        facility.refuse.insert(root.join("locked"));
        let host = Rc::new(CountingLoop::default());

        let result =
            Monitor::with_facility(host.clone(), facility, MonitorConfig::new(&root));
        assert!(matches!(result, Err(MonitorError::WatchFailed { .. })));
        assert_eq!(host.registered.get(), 1);
        assert_eq!(host.deregistered.get(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let host = Rc::new(CountingLoop::default());
        let config = MonitorConfig::new(temp_dir.path());
        let monitor = Monitor::with_facility(host.clone(), FakeFacility::new(), config).unwrap();

        monitor.close();
        monitor.close();
        drop(monitor);

        assert_eq!(host.deregistered.get(), 1);
    }

    #[test]
    fn test_unlistable_directory_reaches_error_handlers() {
        let temp_dir = TempDir::new().unwrap();
        let config = MonitorConfig::new(temp_dir.path());
        let monitor =
            Monitor::with_facility(Rc::new(CountingLoop::default()), FakeFacility::new(), config)
                .unwrap();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        monitor.on_error(move |e| sink.borrow_mut().push(e.to_string()));

        let locked = monitor.root().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::read_dir(&locked).is_ok() {
            // Permission bits do not apply to this user.
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }
        {
            let mut state = monitor.shared.state.borrow_mut();
            let facility = &mut state.as_mut().unwrap().facility;
            let root = facility.token_for(monitor.root()).unwrap();
            facility.queue(vec![RawEvent::new(
                root,
                ChangeMask::CREATE | ChangeMask::ISDIR,
                "locked",
            )]);
        }

        let delivered = monitor.process_pending();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(delivered, 2);
        assert!(monitor.is_watching(&locked));
        let errors = errors.borrow();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("locked"), "{}", errors[0]);
    }

    #[test]
    fn test_rules_from_config_applied() {
        let temp_dir = TempDir::new().unwrap();
        let config = MonitorConfig::new(temp_dir.path()).ignore("^/target(/|$)");
        let monitor =
            Monitor::with_facility(Rc::new(CountingLoop::default()), FakeFacility::new(), config)
                .unwrap();

        assert!(monitor.is_path_ignored("/target/debug"));
        assert!(!monitor.is_path_ignored("/src/lib.rs"));
    }
}
