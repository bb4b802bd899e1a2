//! tcpdiag command - TCP socket dump across network namespaces.
//!
//! Prints one line per TCP socket as reported by `NETLINK_SOCK_DIAG`, either
//! for the current network namespace or, with `--all`, for every namespace
//! found in `/proc` and `/var/run/netns`.

mod output;

use anyhow::Context;
use clap::Parser;
use nsdiag::netlink::{NetnsWalker, namespace, run_pinned};
use nsdiag::sockdiag::TcpDiag;
use tracing::info;

#[derive(Parser)]
#[command(name = "tcpdiag", version, about = "TCP socket diagnostics")]
struct Cli {
    /// Show sockets from every network namespace.
    #[arg(short = 'a', long)]
    all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if cli.all {
        run_all().await
    } else {
        run_current()
    }
}

fn run_current() -> anyhow::Result<()> {
    let records = TcpDiag::open()
        .and_then(|mut diag| diag.query())
        .context("socket dump failed")?;

    for record in &records {
        info!("{}", output::format_record(None, record));
    }
    Ok(())
}

async fn run_all() -> anyhow::Result<()> {
    let report = run_pinned("tcpdiag-netns", || {
        let namespaces = namespace::discover()?;
        NetnsWalker::new().dump(&namespaces, |ns, records| {
            for record in &records {
                info!("{}", output::format_record(Some(ns), record));
            }
            Ok(())
        })
    })
    .await
    .context("namespace walk failed")?;

    info!(
        visited = report.visited,
        skipped = report.skipped,
        failed = report.failed,
        "namespace walk complete"
    );
    Ok(())
}
