//! Error types for socket diagnostics and namespace iteration.

use std::io;
use std::path::PathBuf;

use crate::sockdiag::SessionState;

/// Result type for nsdiag operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while querying sockets or walking namespaces.
///
/// Everything except [`Error::RestoreFailed`] is scoped to a single
/// session or a single namespace.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket creation, send or receive failed.
    #[error("transport error during {operation}: {source}")]
    Transport {
        /// The socket operation that failed.
        operation: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Malformed frame, attribute or length mismatch.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A fixed-size structure did not fit in the bytes available.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Could not open or switch into a namespace.
    #[error("cannot enter namespace '{}': {source}", path.display())]
    ContextEntry {
        /// Namespace file that was being entered.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The kernel answered the dump with an error message.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel (positive).
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// The thread could not be moved back to its original namespace.
    #[error("failed to restore original namespace: {0}")]
    RestoreFailed(#[source] io::Error),

    /// I/O error outside the netlink socket (discovery, capture).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `query()` was called on a session that already ran.
    #[error("diagnostic session already used (state {0:?})")]
    SessionReused(SessionState),

    /// The pinned namespace thread died before reporting a result.
    #[error("namespace worker thread terminated unexpectedly")]
    WorkerLost,
}

impl Error {
    /// Create a kernel error from the (negative) errno carried in `NLMSG_ERROR`.
    ///
    /// A value with no positive counterpart (`i32::MIN`) is a protocol error.
    pub fn from_errno(errno: i32) -> Self {
        let Some(errno) = errno.checked_neg() else {
            return Self::Protocol(format!("invalid errno {} in error frame", errno));
        };
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::Kernel { errno, message }
    }

    pub(crate) fn transport(operation: &'static str, source: io::Error) -> Self {
        Self::Transport { operation, source }
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES), whether the
    /// kernel reported it or a namespace could not be entered.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => matches!(*errno, libc::EPERM | libc::EACCES),
            Self::ContextEntry { source, .. } => {
                source.kind() == io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }

    /// Check if the response stream was malformed.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Truncated { .. })
    }

    /// Check if the netlink socket itself failed.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Check if the thread may be left in the wrong namespace.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RestoreFailed(_))
    }
}
