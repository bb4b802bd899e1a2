//! Output formatting for tcpdiag.

use std::fmt::Write;

use nsdiag::netlink::NetNs;
use nsdiag::sockdiag::SocketRecord;

/// One line per socket: `STATE:src:sport-> dst:dport`.
///
/// The state comes from `tcp_info` when the kernel attached it. Lines from
/// a namespace walk carry the namespace in front, and the congestion
/// control algorithm is appended when known.
pub fn format_record(ns: Option<&NetNs>, record: &SocketRecord) -> String {
    let mut line = String::new();

    if let Some(ns) = ns {
        let _ = write!(line, "[{}] ", ns);
    }

    let _ = write!(
        line,
        "{}:{}:{}-> {}:{}",
        record.effective_state().kernel_name(),
        record.local_ip(),
        record.id.local.port(),
        record.remote_ip(),
        record.id.remote.port()
    );

    if let Some(cong) = record.congestion() {
        let _ = write!(line, " {}", cong);
    }

    line
}
