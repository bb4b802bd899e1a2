//! Minimal netlink plumbing for socket diagnostics.
//!
//! This module carries the pieces of netlink the `sock_diag` dump needs:
//! the message header and frame splitting, attribute walking, a
//! non-blocking `NETLINK_SOCK_DIAG` socket, and the namespace machinery
//! used to run a dump inside every network namespace.
//!
//! # Example
//!
//! ```ignore
//! use nsdiag::netlink::namespace;
//! use nsdiag::netlink::namespace_walk::NetnsWalker;
//!
//! let namespaces = namespace::discover()?;
//! let report = NetnsWalker::new().dump(&namespaces, |ns, records| {
//!     for record in &records {
//!         println!("{}: {} -> {}", ns, record.id.local, record.id.remote);
//!     }
//!     Ok(())
//! })?;
//! ```

pub mod attr;
pub mod builder;
mod error;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod message;
pub mod namespace;
pub mod namespace_walk;
pub mod socket;

pub use attr::{AttrCursor, NlAttr};
pub use builder::MessageBuilder;
pub use error::{Error, Result};
pub use message::{NLMSG_HDRLEN, NlMsgHdr, NlMsgType, RawMessage};
pub use namespace::{Discovery, NamespaceGuard, NamespaceSwitch, NetNs, Setns};
pub use namespace_walk::{NetnsWalker, WalkReport, run_pinned};
pub use socket::{Datagram, DiagSocket};
