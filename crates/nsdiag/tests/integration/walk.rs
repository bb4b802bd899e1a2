//! Namespace discovery and walking with real `setns`.

use std::net::TcpListener;

use nsdiag::Result;
use nsdiag::netlink::namespace::{Discovery, NamespaceSource};
use nsdiag::netlink::{NetnsWalker, run_pinned};
use nsdiag::sockdiag::{TcpDiag, TcpState};

use crate::common::{TestNamespace, thread_netns_ino};

#[tokio::test]
async fn test_discovery_finds_named_namespace() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("disc")?;
    let found = Discovery::new().discover()?;

    let entry = found
        .iter()
        .find(|n| n.ino == ns.ino())
        .expect("test namespace not discovered");
    // Unless some process lives in it, the namespace is only reachable by name.
    assert_eq!(entry.source, NamespaceSource::Named(ns.name().to_string()));
    Ok(())
}

#[tokio::test]
async fn test_walk_restores_thread_namespace() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("walk")?;
    let target = ns.ino();

    let (before, after, visited_target) = run_pinned("walk-test", move || {
        let before = thread_netns_ino();
        let namespaces = Discovery::new().discover()?;

        let mut visited_target = false;
        NetnsWalker::new().walk(&namespaces, |n| {
            if n.ino == target {
                visited_target = thread_netns_ino() == target;
            }
            Ok(())
        })?;

        Ok((before, thread_netns_ino(), visited_target))
    })
    .await?;

    assert_eq!(before, after);
    assert!(visited_target);
    Ok(())
}

#[tokio::test]
async fn test_dump_inside_namespace() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("dump")?;
    let target = ns.ino();

    let found = run_pinned("dump-test", move || {
        let namespaces: Vec<_> = Discovery::new()
            .discover()?
            .into_iter()
            .filter(|n| n.ino == target)
            .collect();

        let mut found = None;
        NetnsWalker::new().walk(&namespaces, |_| {
            // Bound inside the namespace, so only its own dump can see it.
            // Loopback is down in a fresh namespace, hence the wildcard.
            let listener = TcpListener::bind("0.0.0.0:0")?;
            let port = listener.local_addr()?.port();

            let records = TcpDiag::open()?.query()?;
            found = records
                .iter()
                .find(|r| r.id.local.port() == port)
                .map(|r| r.state);
            Ok(())
        })?;
        Ok(found)
    })
    .await?;

    assert_eq!(found, Some(TcpState::Listen));
    Ok(())
}

#[tokio::test]
async fn test_dump_reports_every_namespace() -> Result<()> {
    require_root!();

    let _ns = TestNamespace::new("report")?;
    let report = run_pinned("report-test", || {
        let namespaces = Discovery::new().discover()?;
        let total = namespaces.len();
        let report = NetnsWalker::new().dump(&namespaces, |_, _| Ok(()))?;
        assert_eq!(report.visited + report.skipped + report.failed, total);
        Ok(report)
    })
    .await?;

    assert!(report.visited >= 2);
    Ok(())
}
