// Copyright (c) 2025 - Cowboy AI, LLC.

//! Inter-actor wire protocol
//!
//! Actors exchange framed messages over unidirectional byte pipes.
//! A frame is `{u32 big-endian length, u8 kind, payload}`; the payload
//! is the JSON serialisation of the typed message body. Per-pipe
//! delivery order is the only ordering guarantee the pipeline relies
//! on.

use crate::cert::Cert;
use crate::crl::Crl;
use crate::entity::{Entity, EntityKind};
use crate::error::{Result, RpkiError};
use crate::gbr::Gbr;
use crate::mft::Mft;
use crate::roa::Roa;
use crate::rrdp::RrdpSession;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Parse request, main -> parser
pub const MSG_PARSE_REQ: u8 = 1;
/// Parse response, parser -> main
pub const MSG_PARSE_RESP: u8 = 2;
/// Fetch request, main -> fetcher
pub const MSG_FETCH_REQ: u8 = 3;
/// Fetch completion, fetcher -> main
pub const MSG_FETCH_DONE: u8 = 4;
/// Single file written by the RRDP synchroniser, fetcher -> main
pub const MSG_RRDP_FILE: u8 = 5;

/// Frames larger than this indicate a corrupt channel
const MAX_FRAME: u32 = 64 * 1024 * 1024;

/// A raw frame as read off a pipe
#[derive(Debug, Clone)]
pub struct Frame {
    /// Message kind byte
    pub kind: u8,
    /// Serialized message body
    pub payload: Vec<u8>,
}

impl Frame {
    /// Decode the payload into a typed message
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Write one frame
pub async fn write_frame<W, T>(w: &mut W, kind: u8, body: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(body)?;
    let len = payload.len() as u32 + 1;
    w.write_all(&len.to_be_bytes()).await?;
    w.write_all(&[kind]).await?;
    w.write_all(&payload).await?;
    w.flush().await?;
    Ok(())
}

/// Read one frame; `Ok(None)` on clean end-of-stream
pub async fn read_frame<R>(r: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len == 0 || len > MAX_FRAME {
        return Err(RpkiError::Wire(format!("bad frame length {len}")));
    }
    let mut kind = [0u8; 1];
    r.read_exact(&mut kind).await?;
    let mut payload = vec![0u8; len as usize - 1];
    r.read_exact(&mut payload).await?;
    Ok(Some(Frame {
        kind: kind[0],
        payload,
    }))
}

/// A parse request for one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    /// Correlates the response to the in-flight entity
    pub id: u64,
    /// The entity to read and parse
    pub entity: Entity,
}

/// A decoded object returned by the parser
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::large_enum_variant)]
pub enum ParsedObject {
    /// A trust anchor certificate, already pinned and self-verified
    Ta(Cert),
    /// A CA or EE certificate, syntax-checked only
    Cert(Cert),
    /// A manifest with a verified CMS envelope
    Mft(Mft),
    /// A ROA with a verified CMS envelope
    Roa(Roa),
    /// A revocation list
    Crl(Crl),
    /// A ghostbuster record
    Gbr(Gbr),
}

/// Parse response for one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResponse {
    /// Echo of the request id
    pub id: u64,
    /// Kind of the requested entity
    pub kind: EntityKind,
    /// The decoded object, or the failure message
    pub result: std::result::Result<ParsedObject, String>,
}

/// Fetch request, dispatched to the transport actors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FetchRequest {
    /// Mirror an rsync URI into the cache
    Rsync {
        /// Repository id
        id: u64,
        /// The rsync URI to mirror
        uri: String,
        /// Destination directory or file path
        dst: PathBuf,
    },
    /// Fetch a single HTTPS resource into the cache
    Http {
        /// Repository id
        id: u64,
        /// The https URI
        uri: String,
        /// Destination file path
        dst: PathBuf,
        /// Value for `If-Modified-Since`, verbatim
        last_mod: Option<String>,
    },
    /// Synchronise a repository over RRDP
    Rrdp {
        /// Repository id
        id: u64,
        /// Notification URI
        notify: String,
        /// Persisted session state, if any
        state: Option<RrdpSession>,
    },
}

/// HTTP fetch outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpResult {
    /// 200, body written
    Ok,
    /// 304, cache copy current
    NotModified,
    /// Anything else
    Failed,
}

/// Fetch completion, multiplexed back to the main actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FetchDone {
    /// rsync mirror finished
    Rsync {
        /// Repository id
        id: u64,
        /// Whether the mirror succeeded
        ok: bool,
    },
    /// Plain HTTPS fetch finished
    Http {
        /// Repository id
        id: u64,
        /// Outcome class
        result: HttpResult,
        /// `Last-Modified` response header, verbatim
        last_mod: Option<String>,
    },
    /// RRDP synchronisation finished
    Rrdp {
        /// Repository id
        id: u64,
        /// Whether the repository is now current
        ok: bool,
        /// Session state to persist for the next run
        state: Option<RrdpSession>,
    },
}

/// A cache file written during RRDP synchronisation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RrdpFile {
    /// Repository id
    pub id: u64,
    /// Path of the written file
    pub path: PathBuf,
}
