//! Rsync fetcher actor
//!
//! Mirrors rsync URIs into the local cache by driving the system
//! rsync binary as a subprocess, one request at a time, each bounded
//! by the configured wall-clock timeout. Only success or failure
//! travels back; the mirrored files are picked up through the
//! manifest walk.

use crate::error::Result;
use crate::msg::{read_frame, write_frame, FetchDone, FetchRequest, MSG_FETCH_DONE, MSG_FETCH_REQ};
use std::path::Path;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::process::Command;
use tracing::{debug, warn};

/// Run the rsync actor until its pipe closes
pub async fn proc_rsync(io: DuplexStream, command: String, timeout: Duration) {
    if let Err(e) = run(io, command, timeout).await {
        warn!("rsync actor terminated: {e}");
    }
}

async fn run(io: DuplexStream, command: String, timeout: Duration) -> Result<()> {
    let (mut rd, mut wr) = tokio::io::split(io);
    while let Some(frame) = read_frame(&mut rd).await? {
        if frame.kind != MSG_FETCH_REQ {
            warn!("rsync: unexpected message kind {}", frame.kind);
            continue;
        }
        let FetchRequest::Rsync { id, uri, dst } = frame.decode()? else {
            warn!("rsync: request for a foreign transport");
            continue;
        };
        debug!("rsync {uri}");
        let ok = mirror(&command, &uri, &dst, timeout).await;
        if !ok {
            warn!("rsync {uri} failed");
        }
        write_frame(&mut wr, MSG_FETCH_DONE, &FetchDone::Rsync { id, ok }).await?;
    }
    Ok(())
}

/// Invoke rsync once; false on spawn failure, non-zero exit or timeout
async fn mirror(command: &str, uri: &str, dst: &Path, timeout: Duration) -> bool {
    let target_dir = if uri.ends_with('/') {
        dst
    } else {
        match dst.parent() {
            Some(parent) => parent,
            None => return false,
        }
    };
    if std::fs::create_dir_all(target_dir).is_err() {
        return false;
    }

    let child = Command::new(command)
        .arg("-rt")
        .arg("--no-motd")
        .arg(format!("--timeout={}", timeout.as_secs().max(1)))
        .arg(uri)
        .arg(dst)
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(_)) | Err(_) => false,
    }
}
