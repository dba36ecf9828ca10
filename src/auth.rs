// Copyright (c) 2025 - Cowboy AI, LLC.

//! Authority tree
//!
//! The resource delegation graph of validated certificates, keyed by
//! SKI. Nodes live in an arena; the parent link is an index resolved
//! through the SKI map, and parent chains always reach a trust anchor,
//! never a cycle. Effective resources are resolved lazily: containment
//! checks walk toward the root only when they meet an inherit marker.
//!
//! Certificates whose issuer has not arrived yet are parked in a
//! pending-by-AKI multimap and retried when a new authority is
//! inserted; whatever is still parked when the queues drain is
//! rejected.

use crate::cert::Cert;
use crate::crl::Crl;
use crate::error::{Result, RpkiError};
use crate::resources::{as_covered, ip_covered, Afi, Coverage};
use crate::roa::Roa;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

/// CRLs keyed by the issuer's AKI
pub type CrlTree = HashMap<String, Crl>;

/// A validated authority
#[derive(Debug, Clone)]
pub struct Auth {
    /// The validated certificate; the node owns it
    pub cert: Cert,
    /// Arena index of the issuer; `None` for a trust anchor
    pub parent: Option<usize>,
    /// Basename of the owning TAL
    pub tal: String,
    /// Cache path the certificate was loaded from, for log messages
    pub path: PathBuf,
}

/// The delegation graph
#[derive(Debug, Default)]
pub struct AuthTree {
    nodes: Vec<Auth>,
    by_ski: HashMap<String, usize>,
}

impl AuthTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of authorities
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up an authority index by SKI
    pub fn find(&self, ski: &str) -> Option<usize> {
        self.by_ski.get(ski).copied()
    }

    /// Access a node
    pub fn get(&self, idx: usize) -> &Auth {
        &self.nodes[idx]
    }

    /// Insert a trust anchor
    ///
    /// The caller has already pinned and self-verified the
    /// certificate; only structural admission happens here.
    pub fn insert_ta(&mut self, cert: Cert, tal: &str, path: PathBuf) -> Result<usize> {
        if self.by_ski.contains_key(&cert.ski) {
            return Err(RpkiError::DuplicateSki(cert.ski.clone()));
        }
        let idx = self.nodes.len();
        self.by_ski.insert(cert.ski.clone(), idx);
        self.nodes.push(Auth {
            cert,
            parent: None,
            tal: tal.to_string(),
            path,
        });
        Ok(idx)
    }

    /// Insert a CA certificate under its issuer
    ///
    /// Admission requires a present issuer (by AKI), a unique SKI, an
    /// unexpired certificate, and every concrete resource entry
    /// delegated by the issuer chain.
    pub fn insert_cert(
        &mut self,
        cert: Cert,
        tal: &str,
        path: PathBuf,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let aki = cert
            .aki
            .as_deref()
            .ok_or_else(|| RpkiError::X509("missing AKI".to_string()))?;
        let parent = self
            .find(aki)
            .ok_or_else(|| RpkiError::UnknownAuthority(aki.to_string()))?;
        if self.by_ski.contains_key(&cert.ski) {
            return Err(RpkiError::DuplicateSki(cert.ski.clone()));
        }
        if cert.expires <= now {
            return Err(RpkiError::X509("certificate expired".to_string()));
        }
        self.check_delegation(parent, &cert)?;

        let idx = self.nodes.len();
        self.by_ski.insert(cert.ski.clone(), idx);
        self.nodes.push(Auth {
            cert,
            parent: Some(parent),
            tal: tal.to_string(),
            path,
        });
        Ok(idx)
    }

    /// Check that every concrete resource of `cert` is delegated by
    /// the chain starting at `parent`
    fn check_delegation(&self, parent: usize, cert: &Cert) -> Result<()> {
        for entry in &cert.ips {
            let Some((min, max)) = entry.bounds() else {
                continue; // inherit resolves against the issuer later
            };
            let afi = entry.afi();
            if !self.ip_delegated(parent, afi, &min, &max) {
                return Err(RpkiError::NotCovered(format!(
                    "{afi} resources of {} exceed issuer", cert.ski
                )));
            }
        }
        for entry in &cert.ases {
            let Some((min, max)) = entry.bounds() else {
                continue;
            };
            if !self.as_delegated(parent, min, max) {
                return Err(RpkiError::NotCovered(format!(
                    "AS resources of {} exceed issuer",
                    cert.ski
                )));
            }
        }
        Ok(())
    }

    /// Walk the chain from `idx` checking one IP range
    pub fn ip_delegated(&self, mut idx: usize, afi: Afi, min: &[u8; 16], max: &[u8; 16]) -> bool {
        loop {
            let node = &self.nodes[idx];
            match ip_covered(afi, min, max, &node.cert.ips) {
                Coverage::Covered => return true,
                Coverage::NotCovered => return false,
                Coverage::CheckParent => match node.parent {
                    Some(parent) => idx = parent,
                    None => return false,
                },
            }
        }
    }

    /// Walk the chain from `idx` checking one AS range
    pub fn as_delegated(&self, mut idx: usize, min: u32, max: u32) -> bool {
        loop {
            let node = &self.nodes[idx];
            match as_covered(min, max, &node.cert.ases) {
                Coverage::Covered => return true,
                Coverage::NotCovered => return false,
                Coverage::CheckParent => match node.parent {
                    Some(parent) => idx = parent,
                    None => return false,
                },
            }
        }
    }

    /// Find the authority an embedded EE certificate chains to
    ///
    /// Used for manifests and ghostbusters, whose EE certificates name
    /// their issuer by AKI.
    pub fn lookup_issuer(&self, aki: Option<&str>) -> Result<usize> {
        let aki = aki.ok_or_else(|| RpkiError::X509("missing AKI".to_string()))?;
        self.find(aki)
            .ok_or_else(|| RpkiError::UnknownAuthority(aki.to_string()))
    }

    /// Validate a ROA's resources against the tree
    ///
    /// Checks issuer presence, EE revocation, expiry, maxLength
    /// bounds, and per-prefix delegation. The EE chain signature is
    /// checked by the caller, which owns the DER of both ends.
    pub fn valid_roa(&self, roa: &Roa, crls: &CrlTree, now: DateTime<Utc>) -> Result<usize> {
        let aki = roa
            .aki
            .as_deref()
            .ok_or_else(|| RpkiError::Roa("missing AKI".to_string()))?;
        let idx = self
            .find(aki)
            .ok_or_else(|| RpkiError::UnknownAuthority(aki.to_string()))?;

        if roa.expires <= now {
            return Err(RpkiError::Roa("EE certificate expired".to_string()));
        }
        if let Some(crl) = crls.get(aki) {
            if crl.is_revoked(&roa.ee_serial) {
                return Err(RpkiError::Revoked);
            }
        }

        for ip in &roa.ips {
            if ip.maxlength < ip.prefix.len || ip.maxlength > ip.afi.bits() {
                return Err(RpkiError::Roa(format!(
                    "maxLength {} out of bounds for {}",
                    ip.maxlength,
                    ip.prefix.display(ip.afi)
                )));
            }
            let (min, max) = ip.prefix.range(ip.afi);
            if !self.ip_delegated(idx, ip.afi, &min, &max) {
                return Err(RpkiError::NotCovered(format!(
                    "{} not delegated to this publication point",
                    ip.prefix.display(ip.afi)
                )));
            }
        }
        Ok(idx)
    }
}

/// A certificate parked until its issuer arrives
#[derive(Debug, Clone)]
pub struct PendingCert {
    /// The parsed certificate
    pub cert: Cert,
    /// Basename of the owning TAL
    pub tal: String,
    /// Cache path, for log messages
    pub path: PathBuf,
}

/// Certificates waiting on an authority, keyed by AKI
#[derive(Debug, Default)]
pub struct PendingCerts {
    map: HashMap<String, Vec<PendingCert>>,
}

impl PendingCerts {
    /// Park a certificate until its issuer shows up
    pub fn park(&mut self, pending: PendingCert) {
        let aki = pending
            .cert
            .aki
            .clone()
            .unwrap_or_default();
        self.map.entry(aki).or_default().push(pending);
    }

    /// Take everything waiting on a newly inserted SKI
    pub fn take(&mut self, ski: &str) -> Vec<PendingCert> {
        self.map.remove(ski).unwrap_or_default()
    }

    /// Drain the whole map; used at queue drain to reject leftovers
    pub fn drain_all(&mut self) -> Vec<PendingCert> {
        self.map.drain().flat_map(|(_, v)| v).collect()
    }

    /// Number of parked certificates
    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    /// Whether nothing is parked
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
