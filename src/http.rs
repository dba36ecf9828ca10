// Copyright (c) 2025 - Cowboy AI, LLC.

//! HTTP/RRDP fetcher actor
//!
//! Owns the HTTPS client. Plain fetches download a single resource
//! (trust anchor certificates from https TAL URIs) into the cache;
//! RRDP requests run the full RFC 8182 synchronisation: conditional
//! notification fetch, delta or snapshot branch, hash-checked
//! application to the cache. Written file paths stream back as
//! individual frames so the main actor can account for them.

use crate::config::FetchConfig;
use crate::error::{Result, RpkiError};
use crate::msg::{
    read_frame, write_frame, FetchDone, FetchRequest, HttpResult, RrdpFile, MSG_FETCH_DONE,
    MSG_FETCH_REQ, MSG_RRDP_FILE,
};
use crate::repo::write_atomic;
use crate::rrdp::{
    apply_delta, apply_snapshot, hash_matches, parse_delta, parse_notification, parse_snapshot,
    plan_sync, DocRef, Notification, RrdpSession, SyncPlan,
};
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{DuplexStream, WriteHalf};
use tracing::{debug, info, warn};

/// Run the HTTP/RRDP actor until its pipe closes
pub async fn proc_http(io: DuplexStream, cache: PathBuf, config: FetchConfig) {
    if let Err(e) = run(io, cache, config).await {
        warn!("http actor terminated: {e}");
    }
}

async fn run(io: DuplexStream, cache: PathBuf, config: FetchConfig) -> Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let (mut rd, mut wr) = tokio::io::split(io);
    while let Some(frame) = read_frame(&mut rd).await? {
        if frame.kind != MSG_FETCH_REQ {
            warn!("http: unexpected message kind {}", frame.kind);
            continue;
        }
        match frame.decode()? {
            FetchRequest::Http {
                id,
                uri,
                dst,
                last_mod,
            } => {
                let (result, last_mod) = fetch_one(&client, &uri, &dst, last_mod).await;
                write_frame(
                    &mut wr,
                    MSG_FETCH_DONE,
                    &FetchDone::Http {
                        id,
                        result,
                        last_mod,
                    },
                )
                .await?;
            }
            FetchRequest::Rrdp { id, notify, state } => {
                let outcome = tokio::time::timeout(
                    Duration::from_secs(config.timeout_secs),
                    rrdp_sync(&client, &cache, id, &notify, state, &mut wr),
                )
                .await;
                let done = match outcome {
                    Ok(Ok(state)) => FetchDone::Rrdp {
                        id,
                        ok: true,
                        state,
                    },
                    Ok(Err(e)) => {
                        warn!("rrdp {notify}: {e}");
                        FetchDone::Rrdp {
                            id,
                            ok: false,
                            state: None,
                        }
                    }
                    Err(_) => {
                        warn!("rrdp {notify}: timed out");
                        FetchDone::Rrdp {
                            id,
                            ok: false,
                            state: None,
                        }
                    }
                };
                write_frame(&mut wr, MSG_FETCH_DONE, &done).await?;
            }
            FetchRequest::Rsync { .. } => {
                warn!("http: request for a foreign transport");
            }
        }
    }
    Ok(())
}

/// Fetch a single resource, honouring `If-Modified-Since`
async fn fetch_one(
    client: &reqwest::Client,
    uri: &str,
    dst: &Path,
    last_mod: Option<String>,
) -> (HttpResult, Option<String>) {
    let mut request = client.get(uri);
    if let Some(value) = &last_mod {
        request = request.header(IF_MODIFIED_SINCE, value);
    }
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("GET {uri}: {e}");
            return (HttpResult::Failed, None);
        }
    };
    if response.status() == StatusCode::NOT_MODIFIED {
        return (HttpResult::NotModified, last_mod);
    }
    if !response.status().is_success() {
        warn!("GET {uri}: {}", response.status());
        return (HttpResult::Failed, None);
    }
    let new_last_mod = header_string(&response);
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            warn!("GET {uri}: {e}");
            return (HttpResult::Failed, None);
        }
    };
    match write_atomic(dst, &body) {
        Ok(()) => {
            debug!("GET {uri}: {} bytes", body.len());
            (HttpResult::Ok, new_last_mod)
        }
        Err(e) => {
            warn!("write {}: {e}", dst.display());
            (HttpResult::Failed, None)
        }
    }
}

fn header_string(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Fetch a document and verify it against its advertised hash
async fn fetch_checked(client: &reqwest::Client, doc: &DocRef) -> Result<Vec<u8>> {
    let response = client.get(&doc.uri).send().await?;
    if !response.status().is_success() {
        return Err(RpkiError::Rrdp(format!(
            "GET {}: {}",
            doc.uri,
            response.status()
        )));
    }
    let body = response.bytes().await?.to_vec();
    if !hash_matches(&doc.hash, &body) {
        return Err(RpkiError::Rrdp(format!("hash mismatch for {}", doc.uri)));
    }
    Ok(body)
}

/// Run one repository synchronisation; returns the state to persist
async fn rrdp_sync(
    client: &reqwest::Client,
    cache: &Path,
    id: u64,
    notify: &str,
    state: Option<RrdpSession>,
    wr: &mut WriteHalf<DuplexStream>,
) -> Result<Option<RrdpSession>> {
    let mut request = client.get(notify);
    if let Some(value) = state.as_ref().and_then(|s| s.last_mod.as_deref()) {
        request = request.header(IF_MODIFIED_SINCE, value);
    }
    let response = request.send().await?;
    if response.status() == StatusCode::NOT_MODIFIED {
        debug!("rrdp {notify}: not modified");
        return Ok(state);
    }
    if !response.status().is_success() {
        return Err(RpkiError::Rrdp(format!(
            "GET {notify}: {}",
            response.status()
        )));
    }
    let last_mod = header_string(&response);
    let body = response.bytes().await?;
    let notification = parse_notification(body.as_ref())?;

    let plan = plan_sync(state.as_ref(), &notification);
    let applied = match &plan {
        SyncPlan::UpToDate => {
            debug!("rrdp {notify}: serial {} current", notification.serial);
            true
        }
        SyncPlan::Deltas(deltas) => {
            match sync_deltas(client, cache, id, &notification, deltas, wr).await {
                Ok(()) => true,
                Err(e) => {
                    info!("rrdp {notify}: delta sync failed ({e}), falling back to snapshot");
                    false
                }
            }
        }
        SyncPlan::Snapshot => false,
    };
    if !applied {
        sync_snapshot(client, cache, id, &notification, wr).await?;
    }

    Ok(Some(RrdpSession {
        session_id: notification.session_id,
        serial: notification.serial,
        last_mod,
    }))
}

async fn sync_deltas(
    client: &reqwest::Client,
    cache: &Path,
    id: u64,
    notification: &Notification,
    deltas: &[DocRef],
    wr: &mut WriteHalf<DuplexStream>,
) -> Result<()> {
    for doc in deltas {
        let body = fetch_checked(client, doc).await?;
        let delta = parse_delta(body.as_slice())?;
        if delta.session_id != notification.session_id || delta.serial != doc.serial {
            return Err(RpkiError::Rrdp(format!(
                "delta {} does not match notification",
                doc.uri
            )));
        }
        let written = apply_delta(cache, &delta)?;
        report_files(wr, id, written).await?;
    }
    Ok(())
}

async fn sync_snapshot(
    client: &reqwest::Client,
    cache: &Path,
    id: u64,
    notification: &Notification,
    wr: &mut WriteHalf<DuplexStream>,
) -> Result<()> {
    let body = fetch_checked(client, &notification.snapshot).await?;
    let snapshot = parse_snapshot(body.as_slice())?;
    if snapshot.session_id != notification.session_id || snapshot.serial != notification.serial {
        return Err(RpkiError::Rrdp(
            "snapshot does not match notification".to_string(),
        ));
    }
    let written = apply_snapshot(cache, &snapshot)?;
    info!(
        "rrdp: snapshot of {} objects at serial {}",
        written.len(),
        snapshot.serial
    );
    report_files(wr, id, written).await?;
    Ok(())
}

async fn report_files(
    wr: &mut WriteHalf<DuplexStream>,
    id: u64,
    written: Vec<PathBuf>,
) -> Result<()> {
    for path in written {
        write_frame(wr, MSG_RRDP_FILE, &RrdpFile { id, path }).await?;
    }
    Ok(())
}
