//! TCP dump in the current namespace.

use std::net::TcpListener;

use nsdiag::Result;
use nsdiag::sockdiag::{SessionState, TcpDiag, TcpState};

#[test]
fn test_dump_current_namespace() -> Result<()> {
    let mut diag = TcpDiag::open()?;
    diag.query()?;
    assert_eq!(diag.state(), SessionState::Done);
    Ok(())
}

#[test]
fn test_listener_is_reported() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();

    let records = TcpDiag::open()?.query()?;
    let record = records
        .iter()
        .find(|r| r.id.local.port() == port)
        .expect("listener missing from dump");

    assert_eq!(record.state, TcpState::Listen);
    assert_eq!(record.effective_state(), TcpState::Listen);
    assert!(record.inode != 0);
    Ok(())
}

#[test]
fn test_session_is_single_use() -> Result<()> {
    let mut diag = TcpDiag::open()?;
    diag.query()?;
    assert!(matches!(diag.query(), Err(nsdiag::Error::SessionReused(_))));
    Ok(())
}
