//! TCP socket diagnostics via `NETLINK_SOCK_DIAG`.
//!
//! A [`TcpDiag`] session sends one `inet_diag_req_v2` dump request for every
//! IPv4 TCP socket and turns the reply into [`SocketRecord`]s.
//!
//! # Example
//!
//! ```ignore
//! use nsdiag::sockdiag::TcpDiag;
//!
//! let mut diag = TcpDiag::open()?;
//! for record in diag.query()? {
//!     println!("{} {} -> {}", record.state.name(), record.id.local, record.id.remote);
//! }
//! ```

pub mod attr;
pub mod session;
pub mod types;
pub mod wire;

pub use attr::{Attribute, ExtendedTcpInfo};
pub use session::{SessionState, TcpDiag};
pub use types::{SocketIdentity, SocketRecord, TcpInfo, TcpState, Timer};
