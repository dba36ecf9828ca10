// Copyright (c) 2025 - Cowboy AI, LLC.

//! RRDP synchronisation
//!
//! A minimal RFC 8182 client: notification, snapshot and delta
//! documents, the per-repository session state that decides between
//! the delta and snapshot branches, and the application of publish and
//! withdraw elements to the local cache. Transport is supplied by the
//! HTTP fetcher; everything here is pure over bytes and the
//! filesystem.

use crate::error::{Result, RpkiError};
use crate::repo::{uri_to_path, write_atomic};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use xml::reader::{EventReader, XmlEvent};

/// Persisted per-repository session state
///
/// `last_mod` is opaque: stored verbatim from `Last-Modified` and
/// echoed verbatim into `If-Modified-Since`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RrdpSession {
    /// RRDP session id
    pub session_id: String,
    /// Last serial applied
    pub serial: i64,
    /// `Last-Modified` of the last notification, verbatim
    pub last_mod: Option<String>,
}

/// Snapshot or delta reference in a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRef {
    /// Document URI
    pub uri: String,
    /// SHA-256 of the document body
    pub hash: [u8; 32],
    /// Serial, for delta references; the notification serial otherwise
    pub serial: i64,
}

/// A parsed notification document
#[derive(Debug, Clone)]
pub struct Notification {
    /// Session id
    pub session_id: String,
    /// Current serial
    pub serial: i64,
    /// Snapshot reference
    pub snapshot: DocRef,
    /// Delta references, any order as published
    pub deltas: Vec<DocRef>,
}

/// One publish element
#[derive(Debug, Clone)]
pub struct Publish {
    /// Object URI (rsync)
    pub uri: String,
    /// SHA-256 of the replaced content; present on updates
    pub hash: Option<[u8; 32]>,
    /// Decoded object body
    pub body: Vec<u8>,
}

/// One withdraw element
#[derive(Debug, Clone)]
pub struct Withdraw {
    /// Object URI (rsync)
    pub uri: String,
    /// SHA-256 of the content being removed
    pub hash: [u8; 32],
}

/// A parsed snapshot document
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Session id
    pub session_id: String,
    /// Serial the snapshot represents
    pub serial: i64,
    /// Published objects
    pub publishes: Vec<Publish>,
}

/// An element of a delta document, in document order
#[derive(Debug, Clone)]
pub enum DeltaElement {
    /// Add or update an object
    Publish(Publish),
    /// Remove an object
    Withdraw(Withdraw),
}

/// A parsed delta document
#[derive(Debug, Clone)]
pub struct Delta {
    /// Session id
    pub session_id: String,
    /// Serial this delta advances to
    pub serial: i64,
    /// Ordered elements
    pub elements: Vec<DeltaElement>,
}

/// How to bring a repository current
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    /// Persisted serial equals the notification serial
    UpToDate,
    /// Apply these deltas in increasing serial order
    Deltas(Vec<DocRef>),
    /// Replace the repository from the snapshot
    Snapshot,
}

/// Decide the sync strategy from persisted state and a notification
///
/// The snapshot branch is taken on a fresh repository, a session
/// change, a serial that went backwards, or a delta window that no
/// longer reaches the persisted serial.
pub fn plan_sync(persisted: Option<&RrdpSession>, notification: &Notification) -> SyncPlan {
    let Some(state) = persisted else {
        return SyncPlan::Snapshot;
    };
    if state.session_id != notification.session_id {
        return SyncPlan::Snapshot;
    }
    if state.serial == notification.serial {
        return SyncPlan::UpToDate;
    }
    if state.serial > notification.serial {
        return SyncPlan::Snapshot;
    }
    let oldest_needed = state.serial + 1;
    let mut needed: Vec<DocRef> = notification
        .deltas
        .iter()
        .filter(|d| d.serial >= oldest_needed && d.serial <= notification.serial)
        .cloned()
        .collect();
    needed.sort_by_key(|d| d.serial);
    let covers = needed.first().map(|d| d.serial) == Some(oldest_needed)
        && needed.last().map(|d| d.serial) == Some(notification.serial)
        && needed
            .windows(2)
            .all(|w| w[1].serial == w[0].serial + 1);
    if covers {
        SyncPlan::Deltas(needed)
    } else {
        SyncPlan::Snapshot
    }
}

/// Whether a document body matches its advertised hash
pub fn hash_matches(expected: &[u8; 32], body: &[u8]) -> bool {
    Sha256::digest(body).as_slice() == expected
}

fn parse_hash(value: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value).map_err(|e| RpkiError::Rrdp(format!("bad hash: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| RpkiError::Rrdp("hash is not SHA-256 sized".to_string()))
}

fn attr<'a>(attributes: &'a [xml::attribute::OwnedAttribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name.local_name == name)
        .map(|a| a.value.as_str())
}

fn require<'a>(
    attributes: &'a [xml::attribute::OwnedAttribute],
    name: &str,
    element: &str,
) -> Result<&'a str> {
    attr(attributes, name)
        .ok_or_else(|| RpkiError::Rrdp(format!("{element} missing {name} attribute")))
}

fn decode_body(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| RpkiError::Rrdp(format!("bad publish body: {e}")))
}

/// Parse a notification document
pub fn parse_notification<R: Read>(reader: R) -> Result<Notification> {
    let mut session_id = None;
    let mut serial = None;
    let mut snapshot = None;
    let mut deltas = Vec::new();

    for event in EventReader::new(reader) {
        let event = event.map_err(|e| RpkiError::Rrdp(format!("notification XML: {e}")))?;
        if let XmlEvent::StartElement {
            name, attributes, ..
        } = event
        {
            match name.local_name.as_str() {
                "notification" => {
                    session_id =
                        Some(require(&attributes, "session_id", "notification")?.to_string());
                    serial = Some(parse_serial(require(&attributes, "serial", "notification")?)?);
                }
                "snapshot" => {
                    snapshot = Some(DocRef {
                        uri: require(&attributes, "uri", "snapshot")?.to_string(),
                        hash: parse_hash(require(&attributes, "hash", "snapshot")?)?,
                        serial: 0,
                    });
                }
                "delta" => {
                    deltas.push(DocRef {
                        uri: require(&attributes, "uri", "delta")?.to_string(),
                        hash: parse_hash(require(&attributes, "hash", "delta")?)?,
                        serial: parse_serial(require(&attributes, "serial", "delta")?)?,
                    });
                }
                _ => {}
            }
        }
    }

    let session_id =
        session_id.ok_or_else(|| RpkiError::Rrdp("missing notification element".to_string()))?;
    let serial = serial.unwrap_or_default();
    let mut snapshot =
        snapshot.ok_or_else(|| RpkiError::Rrdp("notification lacks snapshot".to_string()))?;
    snapshot.serial = serial;
    Ok(Notification {
        session_id,
        serial,
        snapshot,
        deltas,
    })
}

fn parse_serial(value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|e| RpkiError::Rrdp(format!("bad serial {value:?}: {e}")))
}

/// Parse a snapshot document
pub fn parse_snapshot<R: Read>(reader: R) -> Result<Snapshot> {
    let mut session_id = None;
    let mut serial = None;
    let mut publishes = Vec::new();
    let mut current: Option<(String, Option<[u8; 32]>, String)> = None;

    for event in EventReader::new(reader) {
        let event = event.map_err(|e| RpkiError::Rrdp(format!("snapshot XML: {e}")))?;
        match event {
            XmlEvent::StartElement {
                name, attributes, ..
            } => match name.local_name.as_str() {
                "snapshot" => {
                    session_id = Some(require(&attributes, "session_id", "snapshot")?.to_string());
                    serial = Some(parse_serial(require(&attributes, "serial", "snapshot")?)?);
                }
                "publish" => {
                    let uri = require(&attributes, "uri", "publish")?.to_string();
                    current = Some((uri, None, String::new()));
                }
                _ => {}
            },
            XmlEvent::Characters(text) => {
                if let Some((_, _, body)) = current.as_mut() {
                    body.push_str(&text);
                }
            }
            XmlEvent::EndElement { name } => {
                if name.local_name == "publish" {
                    let (uri, hash, body) = current
                        .take()
                        .ok_or_else(|| RpkiError::Rrdp("stray publish end".to_string()))?;
                    publishes.push(Publish {
                        uri,
                        hash,
                        body: decode_body(&body)?,
                    });
                }
            }
            _ => {}
        }
    }

    Ok(Snapshot {
        session_id: session_id
            .ok_or_else(|| RpkiError::Rrdp("missing snapshot element".to_string()))?,
        serial: serial.unwrap_or_default(),
        publishes,
    })
}

/// Parse a delta document
pub fn parse_delta<R: Read>(reader: R) -> Result<Delta> {
    let mut session_id = None;
    let mut serial = None;
    let mut elements = Vec::new();
    let mut current: Option<(String, Option<[u8; 32]>, String)> = None;

    for event in EventReader::new(reader) {
        let event = event.map_err(|e| RpkiError::Rrdp(format!("delta XML: {e}")))?;
        match event {
            XmlEvent::StartElement {
                name, attributes, ..
            } => match name.local_name.as_str() {
                "delta" => {
                    session_id = Some(require(&attributes, "session_id", "delta")?.to_string());
                    serial = Some(parse_serial(require(&attributes, "serial", "delta")?)?);
                }
                "publish" => {
                    let uri = require(&attributes, "uri", "publish")?.to_string();
                    let hash = match attr(&attributes, "hash") {
                        Some(h) => Some(parse_hash(h)?),
                        None => None,
                    };
                    current = Some((uri, hash, String::new()));
                }
                "withdraw" => {
                    elements.push(DeltaElement::Withdraw(Withdraw {
                        uri: require(&attributes, "uri", "withdraw")?.to_string(),
                        hash: parse_hash(require(&attributes, "hash", "withdraw")?)?,
                    }));
                }
                _ => {}
            },
            XmlEvent::Characters(text) => {
                if let Some((_, _, body)) = current.as_mut() {
                    body.push_str(&text);
                }
            }
            XmlEvent::EndElement { name } => {
                if name.local_name == "publish" {
                    let (uri, hash, body) = current
                        .take()
                        .ok_or_else(|| RpkiError::Rrdp("stray publish end".to_string()))?;
                    elements.push(DeltaElement::Publish(Publish {
                        uri,
                        hash,
                        body: decode_body(&body)?,
                    }));
                }
            }
            _ => {}
        }
    }

    Ok(Delta {
        session_id: session_id
            .ok_or_else(|| RpkiError::Rrdp("missing delta element".to_string()))?,
        serial: serial.unwrap_or_default(),
        elements,
    })
}

/// Apply a snapshot to the cache; returns the written paths
pub fn apply_snapshot(cache: &Path, snapshot: &Snapshot) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(snapshot.publishes.len());
    for publish in &snapshot.publishes {
        let path = uri_to_path(cache, &publish.uri)?;
        write_atomic(&path, &publish.body)?;
        written.push(path);
    }
    Ok(written)
}

/// Apply one delta to the cache; returns the written paths
///
/// Updates and withdraws verify the hash of the current cache content
/// first; any mismatch aborts the delta so the caller can fall back to
/// the snapshot.
pub fn apply_delta(cache: &Path, delta: &Delta) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for element in &delta.elements {
        match element {
            DeltaElement::Publish(publish) => {
                let path = uri_to_path(cache, &publish.uri)?;
                if let Some(expected) = &publish.hash {
                    let current = std::fs::read(&path).map_err(|_| {
                        RpkiError::Rrdp(format!("update of unknown object {}", publish.uri))
                    })?;
                    if !hash_matches(expected, &current) {
                        return Err(RpkiError::Rrdp(format!(
                            "hash mismatch updating {}",
                            publish.uri
                        )));
                    }
                }
                write_atomic(&path, &publish.body)?;
                written.push(path);
            }
            DeltaElement::Withdraw(withdraw) => {
                let path = uri_to_path(cache, &withdraw.uri)?;
                let current = std::fs::read(&path).map_err(|_| {
                    RpkiError::Rrdp(format!("withdraw of unknown object {}", withdraw.uri))
                })?;
                if !hash_matches(&withdraw.hash, &current) {
                    return Err(RpkiError::Rrdp(format!(
                        "hash mismatch withdrawing {}",
                        withdraw.uri
                    )));
                }
                std::fs::remove_file(&path)?;
            }
        }
    }
    Ok(written)
}

/// Name of the session state file inside a repository directory
pub const STATE_FILE: &str = ".state";

/// Load persisted session state from a repository directory
pub fn load_session(repo_dir: &Path) -> Option<RrdpSession> {
    let data = std::fs::read(repo_dir.join(STATE_FILE)).ok()?;
    read_session(&data)
}

/// Persist session state into a repository directory
pub fn save_session(repo_dir: &Path, session: &RrdpSession) -> Result<PathBuf> {
    let path = repo_dir.join(STATE_FILE);
    write_atomic(&path, &write_session(session))?;
    Ok(path)
}

fn write_field(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

fn write_session(session: &RrdpSession) -> Vec<u8> {
    let mut out = Vec::new();
    write_field(&mut out, session.session_id.as_bytes());
    write_field(&mut out, &session.serial.to_be_bytes());
    match &session.last_mod {
        Some(value) => write_field(&mut out, value.as_bytes()),
        None => write_field(&mut out, &[]),
    }
    out
}

fn read_field<'a>(data: &mut &'a [u8]) -> Option<&'a [u8]> {
    if data.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes(data[..4].try_into().ok()?) as usize;
    if data.len() < 4 + len {
        return None;
    }
    let field = &data[4..4 + len];
    *data = &data[4 + len..];
    Some(field)
}

fn read_session(mut data: &[u8]) -> Option<RrdpSession> {
    let session_id = std::str::from_utf8(read_field(&mut data)?).ok()?.to_string();
    let serial_bytes: [u8; 8] = read_field(&mut data)?.try_into().ok()?;
    let serial = i64::from_be_bytes(serial_bytes);
    let last_mod_field = read_field(&mut data)?;
    let last_mod = if last_mod_field.is_empty() {
        None
    } else {
        Some(std::str::from_utf8(last_mod_field).ok()?.to_string())
    };
    Some(RrdpSession {
        session_id,
        serial,
        last_mod,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(session: &str, serial: i64, delta_serials: &[i64]) -> Notification {
        Notification {
            session_id: session.to_string(),
            serial,
            snapshot: DocRef {
                uri: "https://host/rrdp/snapshot.xml".to_string(),
                hash: [0; 32],
                serial,
            },
            deltas: delta_serials
                .iter()
                .map(|&s| DocRef {
                    uri: format!("https://host/rrdp/{s}/delta.xml"),
                    hash: [0; 32],
                    serial: s,
                })
                .collect(),
        }
    }

    fn state(session: &str, serial: i64) -> RrdpSession {
        RrdpSession {
            session_id: session.to_string(),
            serial,
            last_mod: None,
        }
    }

    #[test]
    fn test_plan_snapshot_on_first_contact() {
        let notif = notification("s1", 10, &[9, 10]);
        assert_eq!(plan_sync(None, &notif), SyncPlan::Snapshot);
    }

    #[test]
    fn test_plan_snapshot_on_session_change() {
        let notif = notification("s2", 10, &[9, 10]);
        let persisted = state("s1", 9);
        assert_eq!(plan_sync(Some(&persisted), &notif), SyncPlan::Snapshot);
    }

    #[test]
    fn test_plan_up_to_date() {
        let notif = notification("s1", 10, &[9, 10]);
        let persisted = state("s1", 10);
        assert_eq!(plan_sync(Some(&persisted), &notif), SyncPlan::UpToDate);
    }

    #[test]
    fn test_plan_deltas_in_order() {
        let notif = notification("s1", 10, &[10, 8, 9]);
        let persisted = state("s1", 7);
        match plan_sync(Some(&persisted), &notif) {
            SyncPlan::Deltas(deltas) => {
                let serials: Vec<_> = deltas.iter().map(|d| d.serial).collect();
                assert_eq!(serials, vec![8, 9, 10]);
            }
            other => panic!("expected deltas, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_snapshot_when_window_too_short() {
        let notif = notification("s1", 10, &[9, 10]);
        let persisted = state("s1", 5);
        assert_eq!(plan_sync(Some(&persisted), &notif), SyncPlan::Snapshot);
    }

    #[test]
    fn test_parse_notification() {
        let xml = format!(
            "<notification xmlns=\"http://www.ripe.net/rpki/rrdp\" version=\"1\" \
             session_id=\"s1\" serial=\"42\">\
             <snapshot uri=\"https://host/rrdp/snap.xml\" hash=\"{h}\"/>\
             <delta serial=\"42\" uri=\"https://host/rrdp/42.xml\" hash=\"{h}\"/>\
             <delta serial=\"41\" uri=\"https://host/rrdp/41.xml\" hash=\"{h}\"/>\
             </notification>",
            h = "00".repeat(32)
        );
        let notif = parse_notification(xml.as_bytes()).unwrap();
        assert_eq!(notif.session_id, "s1");
        assert_eq!(notif.serial, 42);
        assert_eq!(notif.deltas.len(), 2);
    }

    #[test]
    fn test_parse_snapshot_and_apply() {
        let body = b"fake object";
        let b64 = BASE64.encode(body);
        let xml = format!(
            "<snapshot xmlns=\"http://www.ripe.net/rpki/rrdp\" version=\"1\" \
             session_id=\"s1\" serial=\"42\">\
             <publish uri=\"rsync://host/repo/a.roa\">{b64}</publish>\
             </snapshot>"
        );
        let snapshot = parse_snapshot(xml.as_bytes()).unwrap();
        assert_eq!(snapshot.serial, 42);
        assert_eq!(snapshot.publishes.len(), 1);
        assert_eq!(snapshot.publishes[0].body, body);

        let cache = tempfile::tempdir().unwrap();
        let written = apply_snapshot(cache.path(), &snapshot).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(std::fs::read(&written[0]).unwrap(), body);
    }

    #[test]
    fn test_delta_update_checks_hash() {
        let cache = tempfile::tempdir().unwrap();
        let path = cache.path().join("host/repo/a.roa");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"old").unwrap();

        let old_hash: [u8; 32] = Sha256::digest(b"old").into();
        let delta = Delta {
            session_id: "s1".to_string(),
            serial: 43,
            elements: vec![DeltaElement::Publish(Publish {
                uri: "rsync://host/repo/a.roa".to_string(),
                hash: Some(old_hash),
                body: b"new".to_vec(),
            })],
        };
        apply_delta(cache.path(), &delta).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");

        // second application sees "new" on disk, hash no longer matches
        assert!(apply_delta(cache.path(), &delta).is_err());
    }

    #[test]
    fn test_delta_withdraw() {
        let cache = tempfile::tempdir().unwrap();
        let path = cache.path().join("host/repo/a.roa");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"gone").unwrap();

        let delta = Delta {
            session_id: "s1".to_string(),
            serial: 44,
            elements: vec![DeltaElement::Withdraw(Withdraw {
                uri: "rsync://host/repo/a.roa".to_string(),
                hash: Sha256::digest(b"gone").into(),
            })],
        };
        apply_delta(cache.path(), &delta).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_session_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let session = RrdpSession {
            session_id: "9df4b597-af9e-4dca-bdda-719cce2c4e28".to_string(),
            serial: 42,
            last_mod: Some("Wed, 01 Jul 2026 00:00:00 GMT".to_string()),
        };
        save_session(dir.path(), &session).unwrap();
        assert_eq!(load_session(dir.path()), Some(session));

        let bare = RrdpSession {
            session_id: "s".to_string(),
            serial: -1,
            last_mod: None,
        };
        save_session(dir.path(), &bare).unwrap();
        assert_eq!(load_session(dir.path()), Some(bare));
    }
}
