//! TCP socket diagnostics across Linux network namespaces.
//!
//! This crate queries the kernel's `NETLINK_SOCK_DIAG` interface for every
//! TCP socket, decodes the `inet_diag` replies (including `tcp_info` and the
//! congestion control name), and can repeat the query inside each network
//! namespace on the host.
//!
//! # Example
//!
//! ```ignore
//! use nsdiag::netlink::{NetnsWalker, namespace, run_pinned};
//!
//! #[tokio::main]
//! async fn main() -> nsdiag::Result<()> {
//!     let report = run_pinned("netns-walk", || {
//!         let namespaces = namespace::discover()?;
//!         NetnsWalker::new().dump(&namespaces, |ns, records| {
//!             for record in records {
//!                 println!("[{}] {} {}", ns, record.effective_state().kernel_name(), record.id.local);
//!             }
//!             Ok(())
//!         })
//!     })
//!     .await?;
//!
//!     println!("{} namespaces, {} skipped", report.visited, report.skipped);
//!     Ok(())
//! }
//! ```

pub mod netlink;
pub mod sockdiag;

pub use netlink::{Error, Result};
