//! Run work inside every network namespace on one pinned thread.
//!
//! `setns(2)` changes the namespace of the calling thread only, so the walk
//! must never hop threads. [`run_pinned`] gives it a dedicated OS thread and
//! hands the result back to async code.
//!
//! # Example
//!
//! ```ignore
//! use nsdiag::netlink::namespace;
//! use nsdiag::netlink::namespace_walk::{NetnsWalker, run_pinned};
//!
//! let report = run_pinned("netns-walk", || {
//!     let namespaces = namespace::discover()?;
//!     NetnsWalker::new().dump(&namespaces, |ns, records| {
//!         println!("{}: {} sockets", ns, records.len());
//!         Ok(())
//!     })
//! })
//! .await?;
//! ```

use netlink_sys::Socket;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::error::{Error, Result};
use super::namespace::{NamespaceGuard, NamespaceSwitch, NetNs, Setns};
use super::socket::Datagram;
use crate::sockdiag::{SocketRecord, TcpDiag};

/// Outcome counters of a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Namespaces entered and handed to the visitor.
    pub visited: usize,
    /// Namespaces that could not be opened or entered.
    pub skipped: usize,
    /// Namespaces entered whose diagnostic session failed.
    pub failed: usize,
}

/// Iterates namespaces on the calling thread, restoring it afterwards.
#[derive(Debug, Clone, Default)]
pub struct NetnsWalker<W = Setns> {
    switch: W,
}

impl NetnsWalker<Setns> {
    pub fn new() -> Self {
        Self { switch: Setns }
    }
}

impl<W: NamespaceSwitch> NetnsWalker<W> {
    /// Walk with a custom namespace switch.
    pub fn with_switch(switch: W) -> Self {
        Self { switch }
    }

    /// Enter each namespace in order and call `visitor` inside it.
    ///
    /// Namespaces that cannot be opened or entered are logged and skipped.
    /// A visitor error stops the walk and is returned. Either way the thread
    /// is moved back to the namespace it started in; if that fails the
    /// result is [`Error::RestoreFailed`] and the thread must not be reused.
    pub fn walk<F>(&self, namespaces: &[NetNs], mut visitor: F) -> Result<WalkReport>
    where
        F: FnMut(&NetNs) -> Result<()>,
    {
        let guard = NamespaceGuard::capture(&self.switch)?;
        let mut report = WalkReport::default();
        let mut outcome = Ok(());

        for ns in namespaces {
            let handle = match self.switch.open(ns) {
                Ok(h) => h,
                Err(e) => {
                    warn!(namespace = %ns, error = %e, "cannot open namespace, skipping");
                    report.skipped += 1;
                    continue;
                }
            };

            if let Err(source) = self.switch.enter(&handle) {
                let e = Error::ContextEntry {
                    path: ns.path.clone(),
                    source,
                };
                warn!(namespace = %ns, error = %e, "cannot enter namespace, skipping");
                report.skipped += 1;
                continue;
            }

            debug!(namespace = %ns, "entered namespace");
            report.visited += 1;
            let result = visitor(ns);
            drop(handle);

            if let Err(e) = result {
                outcome = Err(e);
                break;
            }
        }

        guard.restore()?;
        outcome.map(|()| report)
    }

    /// Dump TCP sockets in every namespace and hand them to `visitor`.
    ///
    /// A failed session is logged and counted in [`WalkReport::failed`]; the
    /// walk continues with the next namespace.
    pub fn dump<F>(&self, namespaces: &[NetNs], visitor: F) -> Result<WalkReport>
    where
        F: FnMut(&NetNs, Vec<SocketRecord>) -> Result<()>,
    {
        self.dump_with(namespaces, TcpDiag::<Socket>::open, visitor)
    }

    /// Like [`dump`](Self::dump), opening sessions with `open`.
    ///
    /// `open` runs after the thread has entered the namespace, so the socket
    /// it creates belongs to that namespace.
    pub fn dump_with<S, O, F>(&self, namespaces: &[NetNs], mut open: O, mut visitor: F) -> Result<WalkReport>
    where
        S: Datagram,
        O: FnMut() -> Result<TcpDiag<S>>,
        F: FnMut(&NetNs, Vec<SocketRecord>) -> Result<()>,
    {
        let mut failed = 0;

        let mut report = self.walk(namespaces, |ns| {
            let records = open().and_then(|mut diag| {
                let records = diag.query();
                diag.close();
                records
            });

            match records {
                Ok(records) => {
                    debug!(namespace = %ns, sockets = records.len(), "namespace dumped");
                    visitor(ns, records)
                }
                Err(e) => {
                    warn!(namespace = %ns, error = %e, "socket dump failed");
                    failed += 1;
                    Ok(())
                }
            }
        })?;

        report.visited -= failed;
        report.failed = failed;
        Ok(report)
    }
}

/// Run `f` on a dedicated, named OS thread and await its result.
///
/// The closure owns the thread for its whole run, so it may change
/// per-thread kernel state such as the network namespace. A panic on that
/// thread surfaces as [`Error::WorkerLost`].
pub async fn run_pinned<T, F>(name: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            // The receiver only goes away if the caller stopped waiting.
            let _ = tx.send(f());
        })?;

    rx.await.map_err(|_| Error::WorkerLost)?
}
