//! Validated ROA Payloads
//!
//! The final product of a run: deduplicated `(prefix, maxlen, asid)`
//! triples in canonical order. The ordering key is
//! `(afi, prefix bytes, prefix length, maxlength, asid)`; the TAL name
//! and expiry ride along but do not participate in identity, so the
//! same payload validated under two trust anchors collapses to one
//! entry.

use crate::resources::{Afi, IpPrefix};
use crate::roa::Roa;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A single validated ROA payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vrp {
    /// Address family
    pub afi: Afi,
    /// The authorized prefix
    pub prefix: IpPrefix,
    /// Longest announcement length authorized
    pub maxlength: u8,
    /// Origin AS
    pub asid: u32,
    /// Basename of the TAL this payload validated under
    pub tal: String,
    /// Expiry instant, from the EE certificate
    pub expires: DateTime<Utc>,
}

impl Vrp {
    fn key(&self) -> (Afi, [u8; 16], u8, u8, u32) {
        (
            self.afi,
            self.prefix.addr,
            self.prefix.len,
            self.maxlength,
            self.asid,
        )
    }
}

impl PartialEq for Vrp {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Vrp {}

impl PartialOrd for Vrp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Vrp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// The deduplicating VRP set
#[derive(Debug, Default)]
pub struct VrpTree {
    set: BTreeSet<Vrp>,
    inserted: usize,
}

impl VrpTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one payload; duplicates keep the earlier entry
    pub fn insert(&mut self, vrp: Vrp) {
        self.inserted += 1;
        self.set.insert(vrp);
    }

    /// Expand an accepted ROA into the tree, one payload per prefix
    pub fn insert_roa(&mut self, roa: &Roa) {
        for ip in &roa.ips {
            self.insert(Vrp {
                afi: ip.afi,
                prefix: ip.prefix,
                maxlength: ip.maxlength,
                asid: roa.asid,
                tal: roa.tal.clone(),
                expires: roa.expires,
            });
        }
    }

    /// Payloads inserted, before dedup
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Distinct payloads
    pub fn uniqs(&self) -> usize {
        self.set.len()
    }

    /// Iterate in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &Vrp> {
        self.set.iter()
    }
}
