// Copyright (c) 2025 - Cowboy AI, LLC.

//! Certificate parsing and extraction
//!
//! Turns DER certificates into fully-owned [`Cert`] values: key
//! identifiers, the AIA/SIA pointers that drive repository discovery,
//! the CRL distribution point, and the RFC 3779 resource extensions.
//! Trust anchor certificates additionally get their SubjectPublicKeyInfo
//! pinned against the TAL key and their self-signature verified.
//!
//! Issuer-dependent checks (chain signature, revocation, resource
//! coverage) are not done here; they belong to the authority tree.

use crate::error::{Result, RpkiError};
use crate::resources::{as_check_overlap, ip_check_overlap, Afi, CertAs, CertIp, IpPrefix, IpRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use asn1_rs::{oid, Oid};
use x509_parser::der_parser::ber::{BerObject, BerObjectContent, Class};
use x509_parser::der_parser::parse_der;
use x509_parser::prelude::*;

const OID_SIA: Oid<'static> = oid!(1.3.6.1.5.5.7.1.11);
const OID_IP_BLOCKS: Oid<'static> = oid!(1.3.6.1.5.5.7.1.7);
const OID_AS_IDS: Oid<'static> = oid!(1.3.6.1.5.5.7.1.8);
const OID_AD_CA_ISSUERS: Oid<'static> = oid!(1.3.6.1.5.5.7.48.2);
const OID_AD_CA_REPOSITORY: Oid<'static> = oid!(1.3.6.1.5.5.7.48.5);
const OID_AD_RPKI_MANIFEST: Oid<'static> = oid!(1.3.6.1.5.5.7.48.10);
const OID_AD_RPKI_NOTIFY: Oid<'static> = oid!(1.3.6.1.5.5.7.48.13);

/// Parsed components of an RPKI certificate, fully owned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cert {
    /// Raw DER, kept for verifying signatures of issued children
    pub der: Vec<u8>,
    /// Subject key identifier, hex
    pub ski: String,
    /// Authority key identifier, hex; absent only for a trust anchor
    pub aki: Option<String>,
    /// AIA caIssuers URI; absent for a trust anchor
    pub aia: Option<String>,
    /// SIA caRepository URI (rsync)
    pub repo: Option<String>,
    /// SIA rpkiManifest URI (rsync)
    pub mft: Option<String>,
    /// SIA rpkiNotify URI (https), enabling RRDP
    pub notify: Option<String>,
    /// CRL distribution point URI
    pub crl: Option<String>,
    /// IP resource entries
    pub ips: Vec<CertIp>,
    /// AS resource entries
    pub ases: Vec<CertAs>,
    /// notAfter of the certificate
    pub expires: DateTime<Utc>,
    /// Serial number, raw big-endian bytes without leading zeros
    pub serial: Vec<u8>,
}

impl Cert {
    /// Whether the certificate carries the SIA pointers of a CA
    pub fn is_ca(&self) -> bool {
        self.repo.is_some() && self.mft.is_some()
    }
}

/// Parse a certificate and extract its RPKI components
pub fn cert_parse(der: &[u8]) -> Result<Cert> {
    let (_, x509) = parse_x509_certificate(der)
        .map_err(|e| RpkiError::X509(format!("certificate parse: {e}")))?;

    let mut ski = None;
    let mut aki = None;
    let mut aia = None;
    let mut repo = None;
    let mut mft = None;
    let mut notify = None;
    let mut crl = None;
    let mut ips = Vec::new();
    let mut ases = Vec::new();

    for ext in x509.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectKeyIdentifier(id) => {
                ski = Some(hex::encode(id.0));
            }
            ParsedExtension::AuthorityKeyIdentifier(id) => {
                if let Some(key_id) = &id.key_identifier {
                    aki = Some(hex::encode(key_id.0));
                }
            }
            ParsedExtension::AuthorityInfoAccess(access) => {
                for desc in &access.accessdescs {
                    if desc.access_method == OID_AD_CA_ISSUERS {
                        if let GeneralName::URI(uri) = &desc.access_location {
                            aia = Some(uri.to_string());
                        }
                    }
                }
            }
            ParsedExtension::CRLDistributionPoints(points) => {
                for point in &points.points {
                    if let Some(DistributionPointName::FullName(names)) =
                        &point.distribution_point
                    {
                        for name in names {
                            if let GeneralName::URI(uri) = name {
                                if uri.starts_with("rsync://") {
                                    crl = Some(uri.to_string());
                                }
                            }
                        }
                    }
                }
            }
            _ => {
                if ext.oid == OID_SIA {
                    parse_sia(ext.value, &mut repo, &mut mft, &mut notify)?;
                } else if ext.oid == OID_IP_BLOCKS {
                    ips = parse_ip_blocks(ext.value)?;
                } else if ext.oid == OID_AS_IDS {
                    ases = parse_as_ids(ext.value)?;
                }
            }
        }
    }

    let ski = ski.ok_or_else(|| RpkiError::X509("missing SKI".to_string()))?;
    if ips.is_empty() && ases.is_empty() {
        return Err(RpkiError::Resources(
            "no RFC 3779 resource extension".to_string(),
        ));
    }
    if !ip_check_overlap(&ips) {
        return Err(RpkiError::Resources(
            "overlapping or malformed IP resources".to_string(),
        ));
    }
    if !as_check_overlap(&ases) {
        return Err(RpkiError::Resources(
            "overlapping or malformed AS resources".to_string(),
        ));
    }

    let expires = DateTime::<Utc>::from_timestamp(x509.validity().not_after.timestamp(), 0)
        .ok_or_else(|| RpkiError::X509("bad notAfter".to_string()))?;

    let serial = x509.tbs_certificate.raw_serial().to_vec();
    let serial = strip_leading_zeros(serial);

    Ok(Cert {
        der: der.to_vec(),
        ski,
        aki,
        aia,
        repo,
        mft,
        notify,
        crl,
        ips,
        ases,
        expires,
        serial,
    })
}

/// Parse a trust anchor certificate and pin it against the TAL key
///
/// The TA must be self-issued with a verifiable self-signature, its
/// SubjectPublicKeyInfo must byte-match the TAL key, its resources may
/// not inherit, and it must point at its own repository and manifest.
pub fn ta_parse(der: &[u8], tal_key: &[u8]) -> Result<Cert> {
    let (_, x509) = parse_x509_certificate(der)
        .map_err(|e| RpkiError::X509(format!("TA certificate parse: {e}")))?;

    let (_, tal_spki) = SubjectPublicKeyInfo::from_der(tal_key)
        .map_err(|e| RpkiError::X509(format!("TAL key parse: {e}")))?;
    let cert_spki = x509.public_key();
    if cert_spki.algorithm.algorithm != tal_spki.algorithm.algorithm
        || cert_spki.subject_public_key.data != tal_spki.subject_public_key.data
    {
        return Err(RpkiError::X509(
            "TA public key does not match TAL".to_string(),
        ));
    }
    if x509.subject() != x509.issuer() {
        return Err(RpkiError::X509("TA certificate not self-issued".to_string()));
    }
    x509.verify_signature(None)
        .map_err(|_| RpkiError::SignatureVerificationFailed)?;

    let cert = cert_parse(der)?;

    if let Some(aki) = &cert.aki {
        if *aki != cert.ski {
            return Err(RpkiError::X509("TA has foreign AKI".to_string()));
        }
    }
    if cert.aia.is_some() {
        return Err(RpkiError::X509("TA carries an AIA".to_string()));
    }
    if cert.ips.iter().any(|ip| ip.is_inherit()) || cert.ases.iter().any(|a| a.is_inherit()) {
        return Err(RpkiError::Resources("TA resources may not inherit".to_string()));
    }
    if !cert.is_ca() {
        return Err(RpkiError::X509(
            "TA missing SIA caRepository or rpkiManifest".to_string(),
        ));
    }

    Ok(cert)
}

/// Verify that `child` was signed by the key in `parent`
pub fn verify_issued(child_der: &[u8], parent_der: &[u8]) -> Result<()> {
    let (_, child) = parse_x509_certificate(child_der)
        .map_err(|e| RpkiError::X509(format!("certificate parse: {e}")))?;
    let (_, parent) = parse_x509_certificate(parent_der)
        .map_err(|e| RpkiError::X509(format!("issuer parse: {e}")))?;
    child
        .verify_signature(Some(parent.public_key()))
        .map_err(|_| RpkiError::SignatureVerificationFailed)
}

fn strip_leading_zeros(mut serial: Vec<u8>) -> Vec<u8> {
    while serial.len() > 1 && serial[0] == 0 {
        serial.remove(0);
    }
    serial
}

/// Decode a GeneralName URI, `[6] IA5String`
fn general_name_uri(obj: &BerObject) -> Option<String> {
    if obj.header.class() == Class::ContextSpecific && obj.header.tag().0 == 6 {
        let bytes = obj.as_slice().ok()?;
        std::str::from_utf8(bytes).ok().map(|s| s.to_string())
    } else {
        None
    }
}

/// Walk the SubjectInfoAccess extension
fn parse_sia(
    value: &[u8],
    repo: &mut Option<String>,
    mft: &mut Option<String>,
    notify: &mut Option<String>,
) -> Result<()> {
    let (_, obj) =
        parse_der(value).map_err(|e| RpkiError::Der(format!("SIA: {e}")))?;
    let descs = obj
        .as_sequence()
        .map_err(|e| RpkiError::Der(format!("SIA: {e}")))?;
    for desc in descs {
        let fields = desc
            .as_sequence()
            .map_err(|e| RpkiError::Der(format!("SIA AccessDescription: {e}")))?;
        if fields.len() != 2 {
            return Err(RpkiError::Der("SIA AccessDescription arity".to_string()));
        }
        let method = fields[0]
            .as_oid()
            .map_err(|e| RpkiError::Der(format!("SIA accessMethod: {e}")))?;
        let Some(uri) = general_name_uri(&fields[1]) else {
            continue;
        };
        if *method == OID_AD_CA_REPOSITORY && uri.starts_with("rsync://") {
            *repo = Some(uri);
        } else if *method == OID_AD_RPKI_MANIFEST && uri.starts_with("rsync://") {
            *mft = Some(uri);
        } else if *method == OID_AD_RPKI_NOTIFY && uri.starts_with("https://") {
            *notify = Some(uri);
        }
    }
    Ok(())
}

/// Decode one RFC 3779 address prefix from a BIT STRING
fn bit_string_prefix(obj: &BerObject) -> Result<IpPrefix> {
    match &obj.content {
        BerObjectContent::BitString(unused, data) => {
            let bits = data.data.len() * 8;
            let unused = *unused as usize;
            if unused > 7 || unused > bits || data.data.len() > 16 {
                return Err(RpkiError::Der("bad address BIT STRING".to_string()));
            }
            Ok(IpPrefix::new(data.data, (bits - unused) as u8))
        }
        _ => Err(RpkiError::Der("expected BIT STRING address".to_string())),
    }
}

/// Walk the IPAddrBlocks extension, RFC 3779 2.2.3
fn parse_ip_blocks(value: &[u8]) -> Result<Vec<CertIp>> {
    let (_, obj) =
        parse_der(value).map_err(|e| RpkiError::Der(format!("IPAddrBlocks: {e}")))?;
    let families = obj
        .as_sequence()
        .map_err(|e| RpkiError::Der(format!("IPAddrBlocks: {e}")))?;

    let mut out = Vec::new();
    for family in families {
        let fields = family
            .as_sequence()
            .map_err(|e| RpkiError::Der(format!("IPAddressFamily: {e}")))?;
        if fields.len() != 2 {
            return Err(RpkiError::Der("IPAddressFamily arity".to_string()));
        }
        let af = fields[0]
            .as_slice()
            .map_err(|e| RpkiError::Der(format!("addressFamily: {e}")))?;
        if af.len() < 2 {
            return Err(RpkiError::Der("short addressFamily".to_string()));
        }
        let afi = Afi::from_iana(u16::from_be_bytes([af[0], af[1]]))
            .ok_or_else(|| RpkiError::Resources(format!("unknown AFI {:?}", &af[..2])))?;

        let choice = &fields[1];
        if matches!(choice.content, BerObjectContent::Null) {
            out.push(CertIp::Inherit { afi });
            continue;
        }
        let entries = choice
            .as_sequence()
            .map_err(|e| RpkiError::Der(format!("addressesOrRanges: {e}")))?;
        for entry in entries {
            match &entry.content {
                BerObjectContent::BitString(..) => {
                    let prefix = bit_string_prefix(entry)?;
                    if prefix.len > afi.bits() {
                        return Err(RpkiError::Resources("prefix too long for family".to_string()));
                    }
                    out.push(CertIp::Prefix { afi, prefix });
                }
                BerObjectContent::Sequence(bounds) => {
                    if bounds.len() != 2 {
                        return Err(RpkiError::Der("IPAddressRange arity".to_string()));
                    }
                    let min = bit_string_prefix(&bounds[0])?;
                    let max = bit_string_prefix(&bounds[1])?;
                    if min.len > afi.bits() || max.len > afi.bits() {
                        return Err(RpkiError::Resources("range bound too long".to_string()));
                    }
                    out.push(CertIp::Range {
                        afi,
                        range: IpRange { min, max },
                    });
                }
                _ => return Err(RpkiError::Der("bad IPAddressOrRange".to_string())),
            }
        }
    }
    Ok(out)
}

/// Walk the ASIdentifiers extension, RFC 3779 3.2.3
fn parse_as_ids(value: &[u8]) -> Result<Vec<CertAs>> {
    let (_, obj) =
        parse_der(value).map_err(|e| RpkiError::Der(format!("ASIdentifiers: {e}")))?;
    let parts = obj
        .as_sequence()
        .map_err(|e| RpkiError::Der(format!("ASIdentifiers: {e}")))?;

    let mut out = Vec::new();
    for part in parts {
        // asnum is [0]; rdi [1] is not used in RPKI
        if part.header.class() != Class::ContextSpecific {
            return Err(RpkiError::Der("bad ASIdentifiers member".to_string()));
        }
        if part.header.tag().0 != 0 {
            continue;
        }
        let inner = part
            .as_slice()
            .map_err(|e| RpkiError::Der(format!("asnum: {e}")))?;
        let (_, choice) =
            parse_der(inner).map_err(|e| RpkiError::Der(format!("asnum choice: {e}")))?;
        if matches!(choice.content, BerObjectContent::Null) {
            out.push(CertAs::Inherit);
            continue;
        }
        let entries = choice
            .as_sequence()
            .map_err(|e| RpkiError::Der(format!("asIdsOrRanges: {e}")))?;
        for entry in entries {
            match &entry.content {
                BerObjectContent::Integer(_) => {
                    let id = entry
                        .as_u32()
                        .map_err(|_| RpkiError::Resources("AS id overflow".to_string()))?;
                    out.push(CertAs::Id(id));
                }
                BerObjectContent::Sequence(bounds) => {
                    if bounds.len() != 2 {
                        return Err(RpkiError::Der("ASRange arity".to_string()));
                    }
                    let min = bounds[0]
                        .as_u32()
                        .map_err(|_| RpkiError::Resources("AS range overflow".to_string()))?;
                    let max = bounds[1]
                        .as_u32()
                        .map_err(|_| RpkiError::Resources("AS range overflow".to_string()))?;
                    out.push(CertAs::Range { min, max });
                }
                _ => return Err(RpkiError::Der("bad ASIdOrRange".to_string())),
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_leading_zeros() {
        assert_eq!(strip_leading_zeros(vec![0, 0, 1, 2]), vec![1, 2]);
        assert_eq!(strip_leading_zeros(vec![0]), vec![0]);
        assert_eq!(strip_leading_zeros(vec![9]), vec![9]);
    }

    // 10.0.0.0/8 as an RFC 3779 prefix BIT STRING: one octet, no
    // unused bits
    #[test]
    fn test_parse_ip_blocks_prefix() {
        // SEQUENCE { SEQUENCE { OCTET STRING 0001, SEQUENCE { BIT STRING 00 0a } } }
        let der = [
            0x30, 0x0d, 0x30, 0x0b, 0x04, 0x02, 0x00, 0x01, 0x30, 0x05, 0x03, 0x03, 0x00, 0x0a,
            0x00,
        ];
        // BIT STRING above: 2 content octets after unused-bits 0x00 -> 16 bits: 10.0/16
        let ips = parse_ip_blocks(&der).unwrap();
        assert_eq!(ips.len(), 1);
        match &ips[0] {
            CertIp::Prefix { afi, prefix } => {
                assert_eq!(*afi, Afi::V4);
                assert_eq!(prefix.len, 16);
                assert_eq!(&prefix.addr[..2], &[10, 0]);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_parse_ip_blocks_inherit() {
        // SEQUENCE { SEQUENCE { OCTET STRING 0002, NULL } }
        let der = [
            0x30, 0x08, 0x30, 0x06, 0x04, 0x02, 0x00, 0x02, 0x05, 0x00,
        ];
        let ips = parse_ip_blocks(&der).unwrap();
        assert_eq!(ips, vec![CertIp::Inherit { afi: Afi::V6 }]);
    }

    #[test]
    fn test_parse_ip_blocks_rejects_unknown_afi() {
        let der = [
            0x30, 0x08, 0x30, 0x06, 0x04, 0x02, 0x00, 0x09, 0x05, 0x00,
        ];
        assert!(parse_ip_blocks(&der).is_err());
    }

    #[test]
    fn test_parse_as_ids() {
        // SEQUENCE { [0] { SEQUENCE { INTEGER 64496,
        //                             SEQUENCE { INTEGER 100, INTEGER 200 } } } }
        let der = [
            0x30, 0x13, 0xa0, 0x11, 0x30, 0x0f, 0x02, 0x03, 0x00, 0xfb, 0xf0, 0x30, 0x08, 0x02,
            0x02, 0x00, 0x64, 0x02, 0x02, 0x00, 0xc8,
        ];
        let ases = parse_as_ids(&der).unwrap();
        assert_eq!(
            ases,
            vec![CertAs::Id(64496), CertAs::Range { min: 100, max: 200 }]
        );
    }

    #[test]
    fn test_parse_as_inherit() {
        // SEQUENCE { [0] { NULL } }
        let der = [0x30, 0x04, 0xa0, 0x02, 0x05, 0x00];
        let ases = parse_as_ids(&der).unwrap();
        assert_eq!(ases, vec![CertAs::Inherit]);
    }

    #[test]
    fn test_bit_string_unused_bits() {
        // BIT STRING, 4 unused bits: 0xa0 with len 4 -> prefix 1010
        let der = [0x03, 0x02, 0x04, 0xa0];
        let (_, obj) = parse_der(&der).unwrap();
        let prefix = bit_string_prefix(&obj).unwrap();
        assert_eq!(prefix.len, 4);
        assert_eq!(prefix.addr[0], 0xa0);
    }
}
