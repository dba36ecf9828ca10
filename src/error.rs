//! Error types for RPKI validation operations

use thiserror::Error;

/// Result type alias for validation operations
pub type Result<T> = std::result::Result<T, RpkiError>;

/// Main error type for the relying-party engine
#[derive(Error, Debug)]
pub enum RpkiError {
    /// TAL file errors
    #[error("TAL error in {file}: {reason}")]
    Tal {
        /// Offending TAL file
        file: String,
        /// What was wrong with it
        reason: String,
    },

    /// X.509 certificate errors
    #[error("X.509 error: {0}")]
    X509(String),

    /// ASN.1/DER structure errors
    #[error("DER error: {0}")]
    Der(String),

    /// CMS envelope errors
    #[error("CMS error: {0}")]
    Cms(String),

    /// CMS encoding errors from the underlying DER library
    #[error("CMS encoding error: {0}")]
    CmsEncoding(#[from] der::Error),

    /// Wrong eContentType for the requested object kind
    #[error("unexpected eContentType: expected {expected}, got {actual}")]
    ContentType {
        /// The OID the object kind requires
        expected: String,
        /// The OID found in the envelope
        actual: String,
    },

    /// Manifest body errors
    #[error("manifest error: {0}")]
    Mft(String),

    /// ROA body errors
    #[error("ROA error: {0}")]
    Roa(String),

    /// CRL parse errors
    #[error("CRL error: {0}")]
    Crl(String),

    /// RFC 3779 resource extension errors
    #[error("resource extension error: {0}")]
    Resources(String),

    /// Signature verification failed
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Object is not properly delegated from its issuer
    #[error("resource not covered by issuer: {0}")]
    NotCovered(String),

    /// Certificate revoked by its issuer's CRL
    #[error("certificate revoked")]
    Revoked,

    /// No authority found for an AKI
    #[error("no authority for AKI {0}")]
    UnknownAuthority(String),

    /// Duplicate SKI in the authority tree
    #[error("duplicate SKI {0}")]
    DuplicateSki(String),

    /// RRDP protocol errors
    #[error("RRDP error: {0}")]
    Rrdp(String),

    /// Malformed or unsupported URI
    #[error("bad URI: {0}")]
    Uri(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// rsync subprocess errors
    #[error("rsync error: {0}")]
    Rsync(String),

    /// Inter-actor wire protocol errors
    #[error("wire protocol error: {0}")]
    Wire(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Base64 decoding errors
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}
