//! Print changes under a directory as JSON lines.
//!
//! ```text
//! cargo run --example watch -- <root> [ignore-pattern...]
//! ```

use std::rc::Rc;

use anyhow::{Context, Result};
use recursive_monitor::{Monitor, TokioLoop};
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let root = args.next().context("usage: watch <root> [ignore-pattern...]")?;

    LocalSet::new()
        .run_until(async move {
            let host = Rc::new(TokioLoop::new());
            let monitor = Monitor::open(host, &root)?;
            for pattern in args {
                monitor.ignore(pattern.as_str())?;
            }
            monitor.on_error(|e| tracing::warn!("{e}"));

            let mut events = monitor.subscribe();
            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        println!("{}", serde_json::to_string(&event)?);
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            monitor.close();
            Ok::<_, anyhow::Error>(())
        })
        .await
}
