//! Certificate revocation lists
//!
//! CRLs are parsed into an owned revoked-serial set keyed by the
//! issuer's AKI; children are checked against the issuer's current CRL
//! before admission to the authority tree.

use crate::error::{Result, RpkiError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use x509_parser::prelude::*;

/// A parsed CRL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crl {
    /// AKI of the issuing certificate, hex
    pub aki: String,
    /// Revoked serial numbers, big-endian bytes without leading zeros
    pub revoked: BTreeSet<Vec<u8>>,
    /// Raw DER, kept for signature verification against the issuer
    pub der: Vec<u8>,
}

impl Crl {
    /// Whether a serial is revoked by this CRL
    pub fn is_revoked(&self, serial: &[u8]) -> bool {
        self.revoked.contains(&normalize_serial(serial))
    }
}

/// Parse a CRL and collect its revoked serials
pub fn crl_parse(der: &[u8]) -> Result<Crl> {
    let (_, crl) =
        parse_x509_crl(der).map_err(|e| RpkiError::Crl(format!("CRL parse: {e}")))?;

    let mut aki = None;
    for ext in crl.extensions() {
        if let ParsedExtension::AuthorityKeyIdentifier(id) = ext.parsed_extension() {
            if let Some(key_id) = &id.key_identifier {
                aki = Some(hex::encode(key_id.0));
            }
        }
    }
    let aki = aki.ok_or_else(|| RpkiError::Crl("missing AKI".to_string()))?;

    let revoked = crl
        .iter_revoked_certificates()
        .map(|rc| normalize_serial(rc.raw_serial()))
        .collect();

    Ok(Crl {
        aki,
        revoked,
        der: der.to_vec(),
    })
}

/// Verify a CRL's signature against its issuer's certificate
pub fn crl_verify(crl: &Crl, issuer_der: &[u8]) -> Result<()> {
    let (_, parsed) =
        parse_x509_crl(&crl.der).map_err(|e| RpkiError::Crl(format!("CRL parse: {e}")))?;
    let (_, issuer) = parse_x509_certificate(issuer_der)
        .map_err(|e| RpkiError::X509(format!("issuer parse: {e}")))?;
    parsed
        .verify_signature(issuer.public_key())
        .map_err(|_| RpkiError::SignatureVerificationFailed)
}

fn normalize_serial(serial: &[u8]) -> Vec<u8> {
    let mut start = 0;
    while start + 1 < serial.len() && serial[start] == 0 {
        start += 1;
    }
    serial[start..].to_vec()
}
