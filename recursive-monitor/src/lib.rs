//! # Recursive Monitor
//!
//! Live change notification for a whole directory tree, built on a facility
//! (Linux inotify) that only watches one directory per registration.
//!
//! ## Features
//!
//! - **Recursive Watching**: New subdirectories are watched as they appear,
//!   vanished ones are released together with everything below them
//! - **Semantic Events**: `create`, `delete`, `modify`, `write` and `notice`
//!   with paths relative to the root
//! - **Ignore/Notice Rules**: Ordered, case-insensitive patterns where the
//!   last matching rule decides
//! - **Pluggable Loop**: Runs inside any cooperative host loop; a tokio
//!   `LocalSet` driver is included
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Monitor                                  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  HostLoop ──► EventTranslator ──► MonitorEvent ──► subscribers  │
//! │                  │        │                                     │
//! │                  ▼        ▼                                     │
//! │   Facility ◄── WatchTree  PathFilter                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use recursive_monitor::{EventKind, Monitor, TokioLoop};
//!
//! # async fn run() -> recursive_monitor::Result<()> {
//! let host = Rc::new(TokioLoop::new());
//! let monitor = Monitor::open(host, "/srv/data")?;
//! monitor.ignore(r"\.swp$")?;
//! monitor.on(EventKind::Write, |path, _root| println!("wrote {path}"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod facility;
pub mod filter;
pub mod host;
pub mod monitor;
pub mod relative;
pub mod translator;
pub mod tree;

pub use config::{MonitorConfig, RuleAction, RuleConfig};
pub use error::{MonitorError, Result};
pub use event::{ChangeMask, EventKind, MonitorEvent, RawEvent};
pub use facility::{Facility, InotifyFacility};
pub use filter::{IntoPattern, PathFilter, PathMatcher, Pattern, Rule};
pub use host::{HostLoop, ReadableCallback, TokioLoop};
pub use monitor::Monitor;
pub use relative::relative_path;
pub use translator::{EventTranslator, Translation};
pub use tree::{AddOutcome, WatchEntry, WatchTree};
