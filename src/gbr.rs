//! Ghostbuster records
//!
//! RFC 6493 contact records. The vCard body is carried verbatim; it
//! plays no role in validation beyond its envelope and EE checks.

use crate::cert::cert_parse;
use crate::error::Result;
use crate::sigobj::{open_signed_object, OID_CT_GBR};
use serde::{Deserialize, Serialize};

/// A parsed ghostbuster record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gbr {
    /// The vCard payload, verbatim
    pub vcard: String,
    /// AIA of the EE certificate
    pub aia: Option<String>,
    /// AKI of the EE certificate
    pub aki: Option<String>,
    /// SKI of the EE certificate
    pub ski: String,
}

/// Parse and envelope-verify a ghostbuster record
pub fn gbr_parse(der: &[u8]) -> Result<Gbr> {
    let envelope = open_signed_object(der, OID_CT_GBR)?;
    let ee = cert_parse(&envelope.ee_der)?;
    Ok(Gbr {
        vcard: String::from_utf8_lossy(&envelope.econtent).into_owned(),
        aia: ee.aia,
        aki: ee.aki,
        ski: ee.ski,
    })
}
