//! Trust Anchor Locators
//!
//! Parsing of RFC 7730 / RFC 8630 TAL files: comment lines, one or
//! more certificate URIs, a blank separator, and the base64-encoded
//! SubjectPublicKeyInfo the trust anchor certificate must match.

use crate::error::{Result, RpkiError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A parsed trust anchor locator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tal {
    /// Basename of the TAL file, without the `.tal` suffix
    pub name: String,
    /// Certificate URIs, in file order (`rsync://` or `https://`)
    pub uris: Vec<String>,
    /// DER-encoded SubjectPublicKeyInfo of the trust anchor
    pub pubkey: Vec<u8>,
}

impl Tal {
    /// Read and parse a TAL file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("tal")
            .to_string();
        Self::parse(&name, &content).map_err(|reason| RpkiError::Tal {
            file: path.display().to_string(),
            reason,
        })
    }

    /// Parse TAL text
    pub fn parse(name: &str, content: &str) -> std::result::Result<Self, String> {
        let mut uris = Vec::new();
        let mut key_b64 = String::new();
        let mut in_key = false;
        let mut seen_any = false;

        for raw in content.lines() {
            let line = raw.trim_end_matches('\r').trim();
            if !seen_any && (line.is_empty() || line.starts_with('#')) {
                // leading comment block
                continue;
            }
            if !in_key {
                if line.is_empty() {
                    in_key = true;
                    continue;
                }
                seen_any = true;
                if !uri_valid(line) {
                    return Err(format!("unsupported certificate URI: {line}"));
                }
                uris.push(line.to_string());
            } else {
                key_b64.push_str(line);
            }
        }

        if uris.is_empty() {
            return Err("no certificate URI".to_string());
        }
        if key_b64.is_empty() {
            return Err("missing public key".to_string());
        }
        let pubkey = BASE64
            .decode(key_b64.as_bytes())
            .map_err(|e| format!("bad public key: {e}"))?;

        Ok(Self {
            name: name.to_string(),
            uris,
            pubkey,
        })
    }

    /// The preferred fetch URI: the first rsync URI if any, else the
    /// first URI overall
    pub fn preferred_uri(&self) -> &str {
        self.uris
            .iter()
            .find(|u| u.starts_with("rsync://"))
            .unwrap_or(&self.uris[0])
    }
}

/// Check a TAL certificate URI: supported scheme, printable ASCII, a
/// `.cer` target, and no path traversal
pub fn uri_valid(uri: &str) -> bool {
    if !uri.starts_with("rsync://") && !uri.starts_with("https://") {
        return false;
    }
    if !uri.bytes().all(|b| b.is_ascii_graphic()) {
        return false;
    }
    if uri.split('/').any(|seg| seg == "..") {
        return false;
    }
    uri.ends_with(".cer")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Test TAL
# comment lines are skipped

rsync://rpki.example.org/ta/root.cer
https://rpki.example.org/ta/root.cer

MFwwDQYJKoZIhvcNAQEBBQADSwAwSAJBAKj0Wb2RFsXYyrUQD4y/13+5cmDoMQTz
C1JMOrqeIdCa8low7O4wvSQNbC2HPMdzNvqdJw0wO9ZE9gsGUjHDqMcCAwEAAQ==";

    #[test]
    fn test_parse_tal() {
        let tal = Tal::parse("example", SAMPLE).unwrap();
        assert_eq!(tal.name, "example");
        assert_eq!(tal.uris.len(), 2);
        assert_eq!(tal.preferred_uri(), "rsync://rpki.example.org/ta/root.cer");
        assert!(!tal.pubkey.is_empty());
        // DER SEQUENCE
        assert_eq!(tal.pubkey[0], 0x30);
    }

    #[test]
    fn test_key_base64_round_trip() {
        use base64::engine::general_purpose::STANDARD as B64;
        let tal = Tal::parse("example", SAMPLE).unwrap();
        let encoded = B64.encode(&tal.pubkey);
        assert_eq!(B64.decode(encoded.as_bytes()).unwrap(), tal.pubkey);
    }

    #[test]
    fn test_reject_no_uris() {
        let text = "\n\nMFww\n";
        assert!(Tal::parse("bad", text).is_err());
    }

    #[test]
    fn test_reject_bad_key() {
        let text = "rsync://example.org/ta.cer\n\n!!!not-base64!!!\n";
        assert!(Tal::parse("bad", text).is_err());
    }

    #[test]
    fn test_reject_bad_scheme() {
        let text = "ftp://example.org/ta.cer\n\nMFww\n";
        assert!(Tal::parse("bad", text).is_err());
    }

    #[test]
    fn test_uri_valid() {
        assert!(uri_valid("rsync://host/module/ta.cer"));
        assert!(!uri_valid("rsync://host/module/../ta.cer"));
        assert!(!uri_valid("rsync://host/module/ta.mft"));
        assert!(!uri_valid("rsync://host/mo dule/ta.cer"));
    }
}
