//! Network namespace discovery and switching.
//!
//! # Example
//!
//! ```ignore
//! use nsdiag::netlink::namespace::{self, NamespaceGuard, Setns};
//!
//! for ns in namespace::discover()? {
//!     println!("{}", ns);
//! }
//!
//! let switch = Setns;
//! let guard = NamespaceGuard::capture(&switch)?;
//! // ... enter other namespaces ...
//! guard.restore()?;
//! ```

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use super::error::{Error, Result};

/// The runtime directory where named network namespaces are stored.
pub const NETNS_RUN_DIR: &str = "/var/run/netns";

/// Mount point of procfs.
pub const PROC_ROOT: &str = "/proc";

/// Network namespace of the calling thread (not the thread group leader).
pub const THREAD_SELF_NETNS: &str = "/proc/thread-self/ns/net";

/// Where a namespace was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceSource {
    /// `/proc/<pid>/ns/net`.
    Process(u32),
    /// A bind mount under `/var/run/netns`, as created by `ip netns add`.
    Named(String),
}

/// A network namespace, identified by the inode of its nsfs file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetNs {
    pub ino: u64,
    /// Path to re-open the namespace from.
    pub path: PathBuf,
    pub source: NamespaceSource,
}

impl fmt::Display for NetNs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            NamespaceSource::Process(pid) => write!(f, "pid {} ino {}", pid, self.ino),
            NamespaceSource::Named(name) => write!(f, "netns {} ino {}", name, self.ino),
        }
    }
}

/// Namespace discovery.
///
/// Scans `<proc_root>/<pid>/ns/net` in pid order, then (unless disabled)
/// every entry of the named namespace directory in name order, and keeps
/// the first occurrence of each inode.
#[derive(Debug, Clone)]
pub struct Discovery {
    proc_root: PathBuf,
    named_dir: Option<PathBuf>,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from(PROC_ROOT),
            named_dir: Some(PathBuf::from(NETNS_RUN_DIR)),
        }
    }
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a different procfs mount.
    pub fn proc_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_root = path.into();
        self
    }

    /// Read named namespaces from a different directory.
    pub fn named_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.named_dir = Some(path.into());
        self
    }

    /// Skip named namespaces entirely.
    pub fn without_named(mut self) -> Self {
        self.named_dir = None;
        self
    }

    /// Enumerate namespaces, deduplicated by inode.
    pub fn discover(&self) -> Result<Vec<NetNs>> {
        let mut found = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for pid in self.pids()? {
            let path = self.proc_root.join(pid.to_string()).join("ns").join("net");
            if let Some(ino) = inode_of(&path)
                && seen.insert(ino)
            {
                found.push(NetNs {
                    ino,
                    path,
                    source: NamespaceSource::Process(pid),
                });
            }
        }

        for (name, path) in self.named()? {
            if let Some(ino) = inode_of(&path)
                && seen.insert(ino)
            {
                found.push(NetNs {
                    ino,
                    path,
                    source: NamespaceSource::Named(name),
                });
            }
        }

        debug!(count = found.len(), "namespaces discovered");
        Ok(found)
    }

    fn pids(&self) -> Result<Vec<u32>> {
        let mut pids: Vec<u32> = fs::read_dir(&self.proc_root)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn named(&self) -> Result<Vec<(String, PathBuf)>> {
        let Some(dir) = &self.named_dir else {
            return Ok(Vec::new());
        };
        let entries = match fs::read_dir(dir) {
            Ok(d) => d,
            // No namespaces directory means no namespaces
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            names.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
        names.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(names)
    }
}

/// Enumerate namespaces from `/proc` and `/var/run/netns`.
pub fn discover() -> Result<Vec<NetNs>> {
    Discovery::new().discover()
}

/// Inode of a namespace file, or `None` if it vanished or is unreadable.
fn inode_of(path: &Path) -> Option<u64> {
    match fs::metadata(path) {
        Ok(meta) => Some(meta.ino()),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "namespace file skipped");
            None
        }
    }
}

/// Open a namespace file by path.
pub fn open_path<P: AsRef<Path>>(path: P) -> Result<NamespaceFd> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::ContextEntry {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(NamespaceFd { file })
}

/// A handle to an open namespace file.
#[derive(Debug)]
pub struct NamespaceFd {
    file: File,
}

impl AsRawFd for NamespaceFd {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// The operations needed to move the calling thread between namespaces.
pub trait NamespaceSwitch {
    /// Capability to enter one namespace.
    type Handle;

    /// Handle on the calling thread's current namespace.
    fn capture_current(&self) -> Result<Self::Handle>;

    /// Open the entry capability for `ns`.
    fn open(&self, ns: &NetNs) -> Result<Self::Handle>;

    /// Move the calling thread into the namespace behind `handle`.
    fn enter(&self, handle: &Self::Handle) -> io::Result<()>;
}

/// Namespace switching with `setns(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Setns;

impl NamespaceSwitch for Setns {
    type Handle = NamespaceFd;

    fn capture_current(&self) -> Result<NamespaceFd> {
        let file = File::open(THREAD_SELF_NETNS)?;
        Ok(NamespaceFd { file })
    }

    fn open(&self, ns: &NetNs) -> Result<NamespaceFd> {
        open_path(&ns.path)
    }

    fn enter(&self, handle: &NamespaceFd) -> io::Result<()> {
        // SAFETY: setns only reads the fd, which stays open for the duration
        // of the call because `handle` is borrowed. CLONE_NEWNET restricts
        // the switch to the network namespace of the calling thread.
        let ret = unsafe { libc::setns(handle.as_raw_fd(), libc::CLONE_NEWNET) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// A guard that moves the thread back to the namespace it was captured in.
///
/// If the guard is dropped without [`restore`](Self::restore), the drop
/// restores; a thread that cannot get back must not keep running, so a
/// failed restore on drop aborts the process.
pub struct NamespaceGuard<'a, W: NamespaceSwitch> {
    switch: &'a W,
    original: Option<W::Handle>,
}

impl<'a, W: NamespaceSwitch> NamespaceGuard<'a, W> {
    /// Capture the calling thread's namespace.
    pub fn capture(switch: &'a W) -> Result<Self> {
        let original = switch.capture_current()?;
        Ok(Self {
            switch,
            original: Some(original),
        })
    }

    /// Restore the original namespace explicitly.
    ///
    /// Failure is reported as [`Error::RestoreFailed`]; the thread is then in
    /// an unknown namespace.
    pub fn restore(mut self) -> Result<()> {
        match self.original.take() {
            Some(original) => self.switch.enter(&original).map_err(Error::RestoreFailed),
            None => Ok(()),
        }
    }
}

impl<W: NamespaceSwitch> Drop for NamespaceGuard<'_, W> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take()
            && let Err(e) = self.switch.enter(&original)
        {
            error!(error = %e, "failed to restore original network namespace, aborting");
            std::process::abort();
        }
    }
}
