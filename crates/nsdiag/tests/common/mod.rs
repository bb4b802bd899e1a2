//! Common test utilities for integration tests.
//!
//! Provides `TestNamespace` for isolated network namespace testing
//! and helper macros for conditional test execution.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

use nsdiag::Result;
use nsdiag::netlink::namespace::{NETNS_RUN_DIR, THREAD_SELF_NETNS};

/// Global counter for unique namespace names.
static NAMESPACE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a unique namespace name for this test.
fn unique_ns_name(prefix: &str) -> String {
    let id = NAMESPACE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    format!("nsdiag-test-{}-{}-{}", prefix, pid, id)
}

/// A named network namespace, deleted on drop.
pub struct TestNamespace {
    name: String,
}

impl TestNamespace {
    /// Create a new test namespace with a unique name.
    pub fn new(prefix: &str) -> Result<Self> {
        let name = unique_ns_name(prefix);

        let status = Command::new("ip").args(["netns", "add", &name]).status()?;
        if !status.success() {
            return Err(nsdiag::Error::Io(io::Error::other(format!(
                "failed to create namespace: {}",
                name
            ))));
        }

        Ok(Self { name })
    }

    /// Get the namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the bind mount backing this namespace.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(NETNS_RUN_DIR).join(&self.name)
    }

    /// Inode identifying this namespace.
    pub fn ino(&self) -> u64 {
        std::fs::metadata(self.path())
            .map(|m| m.ino())
            .unwrap_or_default()
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let _ = Command::new("ip")
            .args(["netns", "del", &self.name])
            .status();
    }
}

/// Inode of the calling thread's network namespace.
pub fn thread_netns_ino() -> u64 {
    std::fs::metadata(THREAD_SELF_NETNS)
        .map(|m| m.ino())
        .unwrap_or_default()
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
///
/// Use this at the beginning of integration tests that require root privileges.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ns_name() {
        let a = unique_ns_name("x");
        let b = unique_ns_name("x");
        assert_ne!(a, b);
        assert!(a.starts_with("nsdiag-test-x-"));
    }
}
