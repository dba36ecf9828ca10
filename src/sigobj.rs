//! CMS SignedData envelopes
//!
//! Manifests, ROAs and ghostbuster records travel inside CMS
//! SignedData (RFC 6488 signed object profile). This module opens the
//! envelope once for all of them: it checks the eContentType, recovers
//! the one embedded EE certificate, matches the SHA-256 of the
//! eContent against the message-digest signed attribute, and verifies
//! the signer's signature with the EE key. Issuer-dependent checks on
//! the EE certificate happen later under the authority tree.

use crate::error::{Result, RpkiError};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use der::asn1::{ObjectIdentifier, OctetString};
use der::{Decode, Encode};
use sha2::{Digest, Sha256};

/// id-signedData
pub const OID_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// id-ct-rpkiManifest
pub const OID_CT_MFT: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.26");

/// id-ct-routeOriginAuthz
pub const OID_CT_ROA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.24");

/// id-ct-rpkiGhostbusters
pub const OID_CT_GBR: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.35");

/// id-messageDigest
const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// id-contentType
const OID_CONTENT_TYPE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");

/// An opened and signer-verified envelope
#[derive(Debug, Clone)]
pub struct CmsEnvelope {
    /// The raw eContent bytes, ready for the per-kind body parser
    pub econtent: Vec<u8>,
    /// DER of the embedded EE certificate
    pub ee_der: Vec<u8>,
}

/// Open a signed object and verify its envelope
///
/// `expected_type` is the eContentType OID the caller requires; a
/// mismatch is reported as [`RpkiError::ContentType`].
pub fn open_signed_object(der_bytes: &[u8], expected_type: ObjectIdentifier) -> Result<CmsEnvelope> {
    let ci = ContentInfo::from_der(der_bytes)
        .map_err(|e| RpkiError::Cms(format!("not a ContentInfo: {e}")))?;
    if ci.content_type != OID_SIGNED_DATA {
        return Err(RpkiError::Cms(format!(
            "not SignedData: {}",
            ci.content_type
        )));
    }
    let sd: SignedData = ci
        .content
        .decode_as()
        .map_err(|e| RpkiError::Cms(format!("bad SignedData: {e}")))?;

    if sd.encap_content_info.econtent_type != expected_type {
        return Err(RpkiError::ContentType {
            expected: expected_type.to_string(),
            actual: sd.encap_content_info.econtent_type.to_string(),
        });
    }
    let econtent = sd
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| RpkiError::Cms("missing eContent".to_string()))?
        .decode_as::<OctetString>()
        .map_err(|e| RpkiError::Cms(format!("bad eContent: {e}")))?
        .as_bytes()
        .to_vec();

    let ee_der = extract_ee_cert(&sd)?;

    // RFC 6488: exactly one SignerInfo
    let mut signers = sd.signer_infos.0.iter();
    let signer = signers
        .next()
        .ok_or_else(|| RpkiError::Cms("no SignerInfo".to_string()))?;
    if signers.next().is_some() {
        return Err(RpkiError::Cms("more than one SignerInfo".to_string()));
    }

    let signed_attrs = signer
        .signed_attrs
        .as_ref()
        .ok_or_else(|| RpkiError::Cms("missing signed attributes".to_string()))?;

    let mut digest_attr: Option<Vec<u8>> = None;
    let mut type_attr: Option<ObjectIdentifier> = None;
    for attr in signed_attrs.iter() {
        if attr.oid == OID_MESSAGE_DIGEST {
            let value = attr
                .values
                .iter()
                .next()
                .ok_or_else(|| RpkiError::Cms("empty message-digest attribute".to_string()))?;
            let os = value
                .decode_as::<OctetString>()
                .map_err(|e| RpkiError::Cms(format!("bad message-digest attribute: {e}")))?;
            digest_attr = Some(os.as_bytes().to_vec());
        } else if attr.oid == OID_CONTENT_TYPE {
            let value = attr
                .values
                .iter()
                .next()
                .ok_or_else(|| RpkiError::Cms("empty content-type attribute".to_string()))?;
            let oid = value
                .decode_as::<ObjectIdentifier>()
                .map_err(|e| RpkiError::Cms(format!("bad content-type attribute: {e}")))?;
            type_attr = Some(oid);
        }
    }

    let digest_attr =
        digest_attr.ok_or_else(|| RpkiError::Cms("missing message-digest attribute".to_string()))?;
    let computed = Sha256::digest(&econtent);
    if digest_attr != computed.as_slice() {
        return Err(RpkiError::Cms("eContent digest mismatch".to_string()));
    }
    if let Some(oid) = type_attr {
        if oid != expected_type {
            return Err(RpkiError::Cms(
                "content-type attribute does not match eContentType".to_string(),
            ));
        }
    }

    // The signature covers the DER of the signed attributes as SET OF.
    let message = signed_attrs
        .to_der()
        .map_err(|e| RpkiError::Cms(format!("cannot re-encode signed attributes: {e}")))?;
    verify_ee_signature(&ee_der, &message, signer.signature.as_bytes())?;

    Ok(CmsEnvelope { econtent, ee_der })
}

/// Pull the single EE certificate out of the SignedData
fn extract_ee_cert(sd: &SignedData) -> Result<Vec<u8>> {
    let certs = sd
        .certificates
        .as_ref()
        .ok_or_else(|| RpkiError::Cms("no embedded certificate".to_string()))?;
    let mut found: Option<Vec<u8>> = None;
    for choice in certs.0.iter() {
        match choice {
            CertificateChoices::Certificate(cert) => {
                if found.is_some() {
                    return Err(RpkiError::Cms(
                        "more than one embedded certificate".to_string(),
                    ));
                }
                let der = cert
                    .to_der()
                    .map_err(|e| RpkiError::Cms(format!("cannot re-encode EE cert: {e}")))?;
                found = Some(der);
            }
            _ => {
                return Err(RpkiError::Cms("unsupported certificate choice".to_string()));
            }
        }
    }
    found.ok_or_else(|| RpkiError::Cms("no embedded certificate".to_string()))
}

/// Verify an RSA-SHA256 signature against the EE certificate's key
fn verify_ee_signature(ee_der: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    let (_, ee) = x509_parser::parse_x509_certificate(ee_der)
        .map_err(|e| RpkiError::X509(format!("bad EE certificate: {e}")))?;
    let spki = &ee.tbs_certificate.subject_pki;
    let key = ring::signature::UnparsedPublicKey::new(
        &ring::signature::RSA_PKCS1_2048_8192_SHA256,
        spki.subject_public_key.data.as_ref(),
    );
    key.verify(message, signature)
        .map_err(|_| RpkiError::SignatureVerificationFailed)
}
