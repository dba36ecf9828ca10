//! Work-queue entities
//!
//! An entity is a single object awaiting parse: its kind, the local
//! cache path it will be read from, and (for trust anchor
//! certificates) the pinned TAL key.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Object kinds handled by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Trust anchor certificate, validated against a TAL key
    TaCert,
    /// CA or EE certificate
    Cert,
    /// Manifest
    Mft,
    /// Route Origin Authorization
    Roa,
    /// Certificate revocation list
    Crl,
    /// Ghostbuster record
    Gbr,
}

impl EntityKind {
    /// Infer the kind from a file suffix, as manifests list files
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("cer") => Some(EntityKind::Cert),
            Some("roa") => Some(EntityKind::Roa),
            Some("crl") => Some(EntityKind::Crl),
            Some("gbr") => Some(EntityKind::Gbr),
            Some("mft") => Some(EntityKind::Mft),
            _ => None,
        }
    }
}

/// A single queued object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Object kind
    pub kind: EntityKind,
    /// Local cache path
    pub path: PathBuf,
    /// Pinned TA public key (trust anchor certificates only)
    pub pubkey: Option<Vec<u8>>,
    /// Basename of the owning TAL
    pub tal: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_suffix() {
        assert_eq!(
            EntityKind::from_path(Path::new("x/AS64496.roa")),
            Some(EntityKind::Roa)
        );
        assert_eq!(
            EntityKind::from_path(Path::new("ca.cer")),
            Some(EntityKind::Cert)
        );
        assert_eq!(
            EntityKind::from_path(Path::new("ca.crl")),
            Some(EntityKind::Crl)
        );
        assert_eq!(EntityKind::from_path(Path::new("README")), None);
    }
}
