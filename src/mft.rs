//! Manifests
//!
//! RFC 6486 manifest bodies: the monotonically increasing
//! manifestNumber, the update window that decides staleness, and the
//! list of (file, SHA-256) entries that drives the walk of a
//! publication point.

use crate::cert::cert_parse;
use crate::error::{Result, RpkiError};
use crate::sigobj::{open_signed_object, OID_CT_MFT};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use asn1_rs::{oid, Oid};
use x509_parser::der_parser::ber::{BerObject, BerObjectContent, Class};
use x509_parser::der_parser::parse_der;

const OID_SHA256: Oid<'static> = oid!(2.16.840.1.101.3.4.2.1);

/// One manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MftFile {
    /// Bare file name, no path
    pub file: String,
    /// SHA-256 of the file body
    pub hash: [u8; 32],
}

/// A parsed manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mft {
    /// manifestNumber, hex
    pub seqnum: String,
    /// thisUpdate
    pub this_update: DateTime<Utc>,
    /// nextUpdate
    pub next_update: DateTime<Utc>,
    /// Listed files with their hashes
    pub files: Vec<MftFile>,
    /// Whether nextUpdate had passed at parse time
    pub stale: bool,
    /// AIA of the embedding EE certificate
    pub aia: Option<String>,
    /// AKI of the embedding EE certificate
    pub aki: Option<String>,
    /// SKI of the embedding EE certificate
    pub ski: String,
    /// Serial of the EE certificate, for revocation checks
    pub ee_serial: Vec<u8>,
    /// DER of the EE certificate, for the chain check
    pub ee_der: Vec<u8>,
}

/// Result of checking manifest entries against the cache
#[derive(Debug, Default)]
pub struct MftCheck {
    /// Entries whose cached content matches the listed hash
    pub ok: Vec<PathBuf>,
    /// Entries missing from the cache or failing the hash
    pub bad: usize,
}

/// Parse and envelope-verify a manifest
pub fn mft_parse(der: &[u8], now: DateTime<Utc>) -> Result<Mft> {
    let envelope = open_signed_object(der, OID_CT_MFT)?;
    let ee = cert_parse(&envelope.ee_der)?;

    let (_, body) = parse_der(&envelope.econtent)
        .map_err(|e| RpkiError::Mft(format!("body parse: {e}")))?;
    let fields = body
        .as_sequence()
        .map_err(|e| RpkiError::Mft(format!("body: {e}")))?;

    let mut iter = fields.iter().peekable();
    // version [0] INTEGER DEFAULT 0
    if let Some(first) = iter.peek() {
        if first.header.class() == Class::ContextSpecific {
            iter.next();
        }
    }

    let seqnum_obj = iter
        .next()
        .ok_or_else(|| RpkiError::Mft("missing manifestNumber".to_string()))?;
    let seqnum = hex::encode(
        seqnum_obj
            .as_slice()
            .map_err(|e| RpkiError::Mft(format!("manifestNumber: {e}")))?,
    );

    let this_update = generalized_time(
        iter.next()
            .ok_or_else(|| RpkiError::Mft("missing thisUpdate".to_string()))?,
    )?;
    let next_update = generalized_time(
        iter.next()
            .ok_or_else(|| RpkiError::Mft("missing nextUpdate".to_string()))?,
    )?;

    let alg = iter
        .next()
        .ok_or_else(|| RpkiError::Mft("missing fileHashAlg".to_string()))?
        .as_oid()
        .map_err(|e| RpkiError::Mft(format!("fileHashAlg: {e}")))?;
    if *alg != OID_SHA256 {
        return Err(RpkiError::Mft(format!("unsupported hash algorithm {alg}")));
    }

    let list = iter
        .next()
        .ok_or_else(|| RpkiError::Mft("missing fileList".to_string()))?
        .as_sequence()
        .map_err(|e| RpkiError::Mft(format!("fileList: {e}")))?;

    let mut files = Vec::with_capacity(list.len());
    for entry in list {
        let pair = entry
            .as_sequence()
            .map_err(|e| RpkiError::Mft(format!("FileAndHash: {e}")))?;
        if pair.len() != 2 {
            return Err(RpkiError::Mft("FileAndHash arity".to_string()));
        }
        let name = pair[0]
            .as_str()
            .map_err(|e| RpkiError::Mft(format!("file name: {e}")))?;
        if !filename_valid(name) {
            return Err(RpkiError::Mft(format!("bad file name {name:?}")));
        }
        let hash_bytes = match &pair[1].content {
            BerObjectContent::BitString(0, data) if data.data.len() == 32 => data.data,
            _ => return Err(RpkiError::Mft("bad file hash".to_string())),
        };
        let mut hash = [0u8; 32];
        hash.copy_from_slice(hash_bytes);
        files.push(MftFile {
            file: name.to_string(),
            hash,
        });
    }

    Ok(Mft {
        seqnum,
        this_update,
        next_update,
        stale: now > next_update,
        files,
        aia: ee.aia.clone(),
        aki: ee.aki.clone(),
        ski: ee.ski.clone(),
        ee_serial: ee.serial.clone(),
        ee_der: envelope.ee_der,
    })
}

/// Verify the listed files against the cache directory
pub fn mft_check(dir: &Path, mft: &Mft) -> MftCheck {
    let mut result = MftCheck::default();
    for entry in &mft.files {
        let path = dir.join(&entry.file);
        match std::fs::read(&path) {
            Ok(body) => {
                let digest = Sha256::digest(&body);
                if digest.as_slice() == entry.hash {
                    result.ok.push(path);
                } else {
                    result.bad += 1;
                }
            }
            Err(_) => result.bad += 1,
        }
    }
    result
}

/// Manifest file names are bare names with a known character set
fn filename_valid(name: &str) -> bool {
    !name.is_empty()
        && name.len() < 256
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

/// Convert a DER GeneralizedTime to UTC
pub(crate) fn generalized_time(obj: &BerObject) -> Result<DateTime<Utc>> {
    match &obj.content {
        BerObjectContent::GeneralizedTime(t) => {
            let dt = Utc
                .with_ymd_and_hms(
                    t.year as i32,
                    t.month as u32,
                    t.day as u32,
                    t.hour as u32,
                    t.minute as u32,
                    t.second as u32,
                )
                .single()
                .ok_or_else(|| RpkiError::Der("bad GeneralizedTime".to_string()))?;
            Ok(dt)
        }
        _ => Err(RpkiError::Der("expected GeneralizedTime".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_valid() {
        assert!(filename_valid("AS64496.roa"));
        assert!(filename_valid("ca-cert_1.cer"));
        assert!(!filename_valid(""));
        assert!(!filename_valid("../evil.cer"));
        assert!(!filename_valid("a/b.cer"));
        assert!(!filename_valid(".hidden"));
    }

    #[test]
    fn test_generalized_time() {
        // GeneralizedTime "20300101000000Z"
        let der = [
            0x18, 0x0f, 0x32, 0x30, 0x33, 0x30, 0x30, 0x31, 0x30, 0x31, 0x30, 0x30, 0x30, 0x30,
            0x30, 0x30, 0x5a,
        ];
        let (_, obj) = parse_der(&der).unwrap();
        let dt = generalized_time(&obj).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_mft_check_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.roa"), b"payload").unwrap();
        std::fs::write(dir.path().join("tampered.roa"), b"other").unwrap();

        let good_hash: [u8; 32] = Sha256::digest(b"payload").into();
        let mft = Mft {
            seqnum: "01".to_string(),
            this_update: Utc::now(),
            next_update: Utc::now(),
            stale: false,
            files: vec![
                MftFile {
                    file: "good.roa".to_string(),
                    hash: good_hash,
                },
                MftFile {
                    file: "tampered.roa".to_string(),
                    hash: good_hash,
                },
                MftFile {
                    file: "missing.cer".to_string(),
                    hash: good_hash,
                },
            ],
            aia: None,
            aki: None,
            ski: "ab".to_string(),
            ee_serial: vec![1],
            ee_der: Vec::new(),
        };

        let check = mft_check(dir.path(), &mft);
        assert_eq!(check.ok, vec![dir.path().join("good.roa")]);
        assert_eq!(check.bad, 2);
    }
}
