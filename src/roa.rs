//! Route Origin Authorizations
//!
//! RFC 6482 ROA bodies: the origin AS and its per-family prefix list.
//! The canonical range of every prefix is derived here; maxLength is
//! bounded by the prefix length below and the family width above.

use crate::cert::cert_parse;
use crate::error::{Result, RpkiError};
use crate::resources::{Afi, IpPrefix};
use crate::sigobj::{open_signed_object, OID_CT_ROA};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::der_parser::ber::{BerObjectContent, Class};
use x509_parser::der_parser::parse_der;

/// A single authorized prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoaIp {
    /// Address family
    pub afi: Afi,
    /// The authorized prefix
    pub prefix: IpPrefix,
    /// Longest announcement length authorized
    pub maxlength: u8,
}

/// A parsed ROA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roa {
    /// Origin AS
    pub asid: u32,
    /// Authorized prefixes
    pub ips: Vec<RoaIp>,
    /// AIA of the EE certificate
    pub aia: Option<String>,
    /// AKI of the EE certificate
    pub aki: Option<String>,
    /// SKI of the EE certificate
    pub ski: String,
    /// Serial of the EE certificate, for revocation checks
    pub ee_serial: Vec<u8>,
    /// DER of the EE certificate, for the chain check
    pub ee_der: Vec<u8>,
    /// Basename of the owning TAL
    pub tal: String,
    /// notAfter of the EE certificate; VRPs expire with it
    pub expires: DateTime<Utc>,
}

/// Parse and envelope-verify a ROA
pub fn roa_parse(der: &[u8], tal: &str) -> Result<Roa> {
    let envelope = open_signed_object(der, OID_CT_ROA)?;
    let ee = cert_parse(&envelope.ee_der)?;

    let (_, body) = parse_der(&envelope.econtent)
        .map_err(|e| RpkiError::Roa(format!("body parse: {e}")))?;
    let fields = body
        .as_sequence()
        .map_err(|e| RpkiError::Roa(format!("body: {e}")))?;

    let mut iter = fields.iter().peekable();
    // version [0] INTEGER DEFAULT 0
    if let Some(first) = iter.peek() {
        if first.header.class() == Class::ContextSpecific {
            iter.next();
        }
    }

    let asid = iter
        .next()
        .ok_or_else(|| RpkiError::Roa("missing asID".to_string()))?
        .as_u32()
        .map_err(|_| RpkiError::Roa("asID overflow".to_string()))?;

    let families = iter
        .next()
        .ok_or_else(|| RpkiError::Roa("missing ipAddrBlocks".to_string()))?
        .as_sequence()
        .map_err(|e| RpkiError::Roa(format!("ipAddrBlocks: {e}")))?;

    let mut ips = Vec::new();
    for family in families {
        let parts = family
            .as_sequence()
            .map_err(|e| RpkiError::Roa(format!("ROAIPAddressFamily: {e}")))?;
        if parts.len() != 2 {
            return Err(RpkiError::Roa("ROAIPAddressFamily arity".to_string()));
        }
        let af = parts[0]
            .as_slice()
            .map_err(|e| RpkiError::Roa(format!("addressFamily: {e}")))?;
        if af.len() < 2 {
            return Err(RpkiError::Roa("short addressFamily".to_string()));
        }
        let afi = Afi::from_iana(u16::from_be_bytes([af[0], af[1]]))
            .ok_or_else(|| RpkiError::Roa(format!("unknown AFI {:?}", &af[..2])))?;

        let addresses = parts[1]
            .as_sequence()
            .map_err(|e| RpkiError::Roa(format!("addresses: {e}")))?;
        for address in addresses {
            let entry = address
                .as_sequence()
                .map_err(|e| RpkiError::Roa(format!("ROAIPAddress: {e}")))?;
            if entry.is_empty() || entry.len() > 2 {
                return Err(RpkiError::Roa("ROAIPAddress arity".to_string()));
            }
            let prefix = match &entry[0].content {
                BerObjectContent::BitString(unused, data) => {
                    let bits = data.data.len() * 8;
                    let unused = *unused as usize;
                    if unused > 7 || unused > bits || data.data.len() > 16 {
                        return Err(RpkiError::Roa("bad address BIT STRING".to_string()));
                    }
                    IpPrefix::new(data.data, (bits - unused) as u8)
                }
                _ => return Err(RpkiError::Roa("expected BIT STRING address".to_string())),
            };
            if prefix.len > afi.bits() {
                return Err(RpkiError::Roa("prefix too long for family".to_string()));
            }
            let maxlength = match entry.get(1) {
                Some(obj) => obj
                    .as_u32()
                    .map_err(|_| RpkiError::Roa("maxLength overflow".to_string()))?
                    .try_into()
                    .map_err(|_| RpkiError::Roa("maxLength overflow".to_string()))?,
                None => prefix.len,
            };
            if maxlength < prefix.len || maxlength > afi.bits() {
                return Err(RpkiError::Roa(format!(
                    "maxLength {maxlength} out of bounds for /{} {afi}",
                    prefix.len
                )));
            }
            ips.push(RoaIp {
                afi,
                prefix,
                maxlength,
            });
        }
    }

    if ips.is_empty() {
        return Err(RpkiError::Roa("empty prefix list".to_string()));
    }

    Ok(Roa {
        asid,
        ips,
        aia: ee.aia.clone(),
        aki: ee.aki.clone(),
        ski: ee.ski.clone(),
        ee_serial: ee.serial.clone(),
        ee_der: envelope.ee_der,
        tal: tal.to_string(),
        expires: ee.expires,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with_maxlength(maxlen_der: &[u8]) -> Vec<u8> {
        // ROAIPAddress: BIT STRING 10.0/16 + given maxLength INTEGER
        let mut address = vec![0x03, 0x03, 0x00, 0x0a, 0x00];
        address.extend_from_slice(maxlen_der);
        let mut roa_ip = vec![0x30, address.len() as u8];
        roa_ip.extend_from_slice(&address);
        let mut addresses = vec![0x30, roa_ip.len() as u8];
        addresses.extend_from_slice(&roa_ip);
        let mut family = vec![0x04, 0x02, 0x00, 0x01];
        family.extend_from_slice(&addresses);
        let mut family_seq = vec![0x30, family.len() as u8];
        family_seq.extend_from_slice(&family);
        let mut blocks = vec![0x30, family_seq.len() as u8];
        blocks.extend_from_slice(&family_seq);
        // asID 64496
        let mut body = vec![0x02, 0x03, 0x00, 0xfb, 0xf0];
        body.extend_from_slice(&blocks);
        let mut out = vec![0x30, body.len() as u8];
        out.extend_from_slice(&body);
        out
    }

    fn parse_body(body: &[u8]) -> std::result::Result<(u32, Vec<RoaIp>), String> {
        // exercise just the body walk, without an envelope
        let (_, obj) = parse_der(body).map_err(|e| e.to_string())?;
        let fields = obj.as_sequence().map_err(|e| e.to_string())?;
        let asid = fields[0].as_u32().map_err(|e| e.to_string())?;
        let mut ips = Vec::new();
        for family in fields[1].as_sequence().map_err(|e| e.to_string())? {
            let parts = family.as_sequence().map_err(|e| e.to_string())?;
            let af = parts[0].as_slice().map_err(|e| e.to_string())?;
            let afi = Afi::from_iana(u16::from_be_bytes([af[0], af[1]])).ok_or("afi")?;
            for address in parts[1].as_sequence().map_err(|e| e.to_string())? {
                let entry = address.as_sequence().map_err(|e| e.to_string())?;
                let prefix = match &entry[0].content {
                    BerObjectContent::BitString(unused, data) => {
                        IpPrefix::new(data.data, (data.data.len() * 8 - *unused as usize) as u8)
                    }
                    _ => return Err("no bitstring".to_string()),
                };
                let maxlength = match entry.get(1) {
                    Some(obj) => obj.as_u32().map_err(|e| e.to_string())? as u8,
                    None => prefix.len,
                };
                ips.push(RoaIp {
                    afi,
                    prefix,
                    maxlength,
                });
            }
        }
        Ok((asid, ips))
    }

    #[test]
    fn test_roa_body_walk() {
        let body = body_with_maxlength(&[0x02, 0x01, 0x18]); // maxLength 24
        let (asid, ips) = parse_body(&body).unwrap();
        assert_eq!(asid, 64496);
        assert_eq!(ips.len(), 1);
        assert_eq!(ips[0].afi, Afi::V4);
        assert_eq!(ips[0].prefix.len, 16);
        assert_eq!(&ips[0].prefix.addr[..2], &[10, 0]);
        assert_eq!(ips[0].maxlength, 24);
    }

    #[test]
    fn test_roa_body_default_maxlength() {
        let body = body_with_maxlength(&[]);
        let (_, ips) = parse_body(&body).unwrap();
        assert_eq!(ips[0].maxlength, ips[0].prefix.len);
    }
}
