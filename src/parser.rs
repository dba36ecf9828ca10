//! Parser actor
//!
//! Reads framed parse requests off its pipe, loads the object from the
//! cache, runs the kind-specific parse and envelope checks, and writes
//! a framed response back. The actor holds no tree state; every check
//! that needs issuer context happens in the main actor.

use crate::cert::{cert_parse, ta_parse};
use crate::crl::crl_parse;
use crate::entity::{Entity, EntityKind};
use crate::error::{Result, RpkiError};
use crate::gbr::gbr_parse;
use crate::mft::mft_parse;
use crate::msg::{read_frame, write_frame, ParseRequest, ParseResponse, ParsedObject, MSG_PARSE_REQ, MSG_PARSE_RESP};
use crate::roa::roa_parse;
use chrono::Utc;
use tokio::io::DuplexStream;
use tracing::{debug, warn};

/// Run the parser actor until its pipe closes
pub async fn proc_parser(io: DuplexStream) {
    if let Err(e) = run(io).await {
        warn!("parser actor terminated: {e}");
    }
}

async fn run(io: DuplexStream) -> Result<()> {
    let (mut rd, mut wr) = tokio::io::split(io);
    while let Some(frame) = read_frame(&mut rd).await? {
        if frame.kind != MSG_PARSE_REQ {
            warn!("parser: unexpected message kind {}", frame.kind);
            continue;
        }
        let req: ParseRequest = frame.decode()?;
        debug!("parsing {}", req.entity.path.display());
        let result = parse_entity(&req.entity).map_err(|e| e.to_string());
        let resp = ParseResponse {
            id: req.id,
            kind: req.entity.kind,
            result,
        };
        write_frame(&mut wr, MSG_PARSE_RESP, &resp).await?;
    }
    Ok(())
}

/// Parse one entity from the cache
pub fn parse_entity(entity: &Entity) -> Result<ParsedObject> {
    let der = std::fs::read(&entity.path)?;
    match entity.kind {
        EntityKind::TaCert => {
            let key = entity
                .pubkey
                .as_deref()
                .ok_or_else(|| RpkiError::X509("TA request without TAL key".to_string()))?;
            ta_parse(&der, key).map(ParsedObject::Ta)
        }
        EntityKind::Cert => cert_parse(&der).map(ParsedObject::Cert),
        EntityKind::Mft => mft_parse(&der, Utc::now()).map(ParsedObject::Mft),
        EntityKind::Roa => roa_parse(&der, &entity.tal).map(ParsedObject::Roa),
        EntityKind::Crl => crl_parse(&der).map(ParsedObject::Crl),
        EntityKind::Gbr => gbr_parse(&der).map(ParsedObject::Gbr),
    }
}
