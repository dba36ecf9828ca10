// Copyright (c) 2025 - Cowboy AI, LLC.

//! RFC 3779 resource primitives
//!
//! IP prefixes, ranges and AS numbers as they appear in RPKI
//! certificate resource extensions, together with the overlap and
//! containment checks the delegation rules are built on.
//!
//! Addresses are kept as left-aligned 16-byte buffers with a bit
//! length, matching the wire form of RFC 3779 section 2.2.3.8; the
//! canonical `(min, max)` range of an entry is always derived from the
//! prefix, never read from a serialised form.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Address family of a resource entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Afi {
    /// IPv4
    V4,
    /// IPv6
    V6,
}

impl Afi {
    /// Width of an address in this family, in bits
    pub fn bits(self) -> u8 {
        match self {
            Afi::V4 => 32,
            Afi::V6 => 128,
        }
    }

    /// IANA AFI value as used in the addressFamily octets
    pub fn from_iana(value: u16) -> Option<Self> {
        match value {
            1 => Some(Afi::V4),
            2 => Some(Afi::V6),
            _ => None,
        }
    }
}

impl fmt::Display for Afi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Afi::V4 => write!(f, "IPv4"),
            Afi::V6 => write!(f, "IPv6"),
        }
    }
}

/// A binary address prefix: up to 128 valid bits, left-aligned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpPrefix {
    /// Address bytes, left-aligned; bits past `len` are zero
    pub addr: [u8; 16],
    /// Number of valid bits
    pub len: u8,
}

impl IpPrefix {
    /// Build a prefix from raw bytes and a bit length, masking any
    /// stray host bits
    pub fn new(bytes: &[u8], len: u8) -> Self {
        let mut addr = [0u8; 16];
        let n = bytes.len().min(16);
        addr[..n].copy_from_slice(&bytes[..n]);
        let mut prefix = Self { addr, len };
        prefix.mask();
        prefix
    }

    fn mask(&mut self) {
        let len = self.len as usize;
        for (i, byte) in self.addr.iter_mut().enumerate() {
            let bit = i * 8;
            if bit >= len {
                *byte = 0;
            } else if bit + 8 > len {
                let keep = (len - bit) as u32;
                *byte &= 0xffu8 << (8 - keep);
            }
        }
    }

    /// Canonical minimum address of the prefix
    pub fn min_addr(&self) -> [u8; 16] {
        self.addr
    }

    /// Canonical maximum address of the prefix within its family
    pub fn max_addr(&self, afi: Afi) -> [u8; 16] {
        let mut max = self.addr;
        let len = self.len as usize;
        let family_bits = afi.bits() as usize;
        for (i, byte) in max.iter_mut().enumerate() {
            let bit = i * 8;
            if bit >= family_bits {
                break;
            }
            if bit >= len {
                *byte = 0xff;
            } else if bit + 8 > len {
                let keep = (len - bit) as u32;
                *byte |= 0xffu8 >> keep;
            }
        }
        max
    }

    /// Canonical `(min, max)` range of the prefix
    pub fn range(&self, afi: Afi) -> ([u8; 16], [u8; 16]) {
        (self.min_addr(), self.max_addr(afi))
    }

    /// Render the prefix in the family's conventional notation
    pub fn display(&self, afi: Afi) -> String {
        match afi {
            Afi::V4 => {
                let octets: [u8; 4] = self.addr[..4].try_into().unwrap();
                format!("{}/{}", Ipv4Addr::from(octets), self.len)
            }
            Afi::V6 => format!("{}/{}", Ipv6Addr::from(self.addr), self.len),
        }
    }
}

/// Compare two 16-byte addresses lexicographically
pub fn addr_cmp(a: &[u8; 16], b: &[u8; 16]) -> Ordering {
    a.cmp(b)
}

/// An inclusive address range of a single family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    /// Lower bound prefix
    pub min: IpPrefix,
    /// Upper bound prefix; host bits count toward the maximum
    pub max: IpPrefix,
}

impl IpRange {
    /// Canonical `(min, max)` of the range
    pub fn bounds(&self, afi: Afi) -> ([u8; 16], [u8; 16]) {
        (self.min.min_addr(), self.max.max_addr(afi))
    }
}

/// A single certificate IP resource entry, RFC 3779 2.2.3.2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertIp {
    /// An address prefix
    Prefix {
        /// Address family
        afi: Afi,
        /// The prefix
        prefix: IpPrefix,
    },
    /// An explicit min/max range
    Range {
        /// Address family
        afi: Afi,
        /// The range
        range: IpRange,
    },
    /// Resources inherited from the issuer for this family
    Inherit {
        /// Address family
        afi: Afi,
    },
}

impl CertIp {
    /// Address family of the entry
    pub fn afi(&self) -> Afi {
        match self {
            CertIp::Prefix { afi, .. } | CertIp::Range { afi, .. } | CertIp::Inherit { afi } => {
                *afi
            }
        }
    }

    /// Whether the entry is an inherit marker
    pub fn is_inherit(&self) -> bool {
        matches!(self, CertIp::Inherit { .. })
    }

    /// Canonical `(min, max)` of the entry; `None` for inherit
    pub fn bounds(&self) -> Option<([u8; 16], [u8; 16])> {
        match self {
            CertIp::Prefix { afi, prefix } => Some(prefix.range(*afi)),
            CertIp::Range { afi, range } => Some(range.bounds(*afi)),
            CertIp::Inherit { .. } => None,
        }
    }
}

/// A single certificate AS resource entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertAs {
    /// A single AS number
    Id(u32),
    /// An inclusive range of AS numbers
    Range {
        /// Lower bound
        min: u32,
        /// Upper bound
        max: u32,
    },
    /// AS resources inherited from the issuer
    Inherit,
}

impl CertAs {
    /// Whether the entry is an inherit marker
    pub fn is_inherit(&self) -> bool {
        matches!(self, CertAs::Inherit)
    }

    /// Bounds of the entry, singletons widened to `(id, id)`
    pub fn bounds(&self) -> Option<(u32, u32)> {
        match self {
            CertAs::Id(id) => Some((*id, *id)),
            CertAs::Range { min, max } => Some((*min, *max)),
            CertAs::Inherit => None,
        }
    }
}

/// Result of a containment probe against one resource set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// A concrete entry of the set encloses the probe
    Covered,
    /// Not enclosed, but the set inherits this family from its issuer
    CheckParent,
    /// Not enclosed and nothing to inherit
    NotCovered,
}

/// Check whether an IP range is enclosed by a resource set
///
/// Returns [`Coverage::CheckParent`] when the set carries an inherit
/// marker for the family and no concrete entry encloses the range, so
/// the caller can continue at the issuer.
pub fn ip_covered(afi: Afi, min: &[u8; 16], max: &[u8; 16], set: &[CertIp]) -> Coverage {
    let mut inherit = false;
    for entry in set {
        if entry.afi() != afi {
            continue;
        }
        match entry.bounds() {
            Some((emin, emax)) => {
                if addr_cmp(&emin, min) != Ordering::Greater
                    && addr_cmp(&emax, max) != Ordering::Less
                {
                    return Coverage::Covered;
                }
            }
            None => inherit = true,
        }
    }
    if inherit {
        Coverage::CheckParent
    } else {
        Coverage::NotCovered
    }
}

/// Check whether an AS range is enclosed by a resource set
pub fn as_covered(min: u32, max: u32, set: &[CertAs]) -> Coverage {
    let mut inherit = false;
    for entry in set {
        match entry.bounds() {
            Some((emin, emax)) => {
                if emin <= min && emax >= max {
                    return Coverage::Covered;
                }
            }
            None => inherit = true,
        }
    }
    if inherit {
        Coverage::CheckParent
    } else {
        Coverage::NotCovered
    }
}

/// Check a certificate's own IP entries for well-formedness
///
/// Within one certificate, entries of a family must not overlap, every
/// range must satisfy min <= max, and an inherit marker excludes
/// concrete entries of the same family.
pub fn ip_check_overlap(set: &[CertIp]) -> bool {
    for (i, a) in set.iter().enumerate() {
        if let CertIp::Range { afi, range } = a {
            let (min, max) = range.bounds(*afi);
            if addr_cmp(&min, &max) == Ordering::Greater {
                return false;
            }
        }
        for b in &set[i + 1..] {
            if a.afi() != b.afi() {
                continue;
            }
            match (a.bounds(), b.bounds()) {
                (Some((amin, amax)), Some((bmin, bmax))) => {
                    if addr_cmp(&amin, &bmax) != Ordering::Greater
                        && addr_cmp(&bmin, &amax) != Ordering::Greater
                    {
                        return false;
                    }
                }
                // inherit plus a concrete entry of the same family
                _ => return false,
            }
        }
    }
    true
}

/// Check a certificate's own AS entries for well-formedness
pub fn as_check_overlap(set: &[CertAs]) -> bool {
    for (i, a) in set.iter().enumerate() {
        if let CertAs::Range { min, max } = a {
            if min > max {
                return false;
            }
        }
        for b in &set[i + 1..] {
            match (a.bounds(), b.bounds()) {
                (Some((amin, amax)), Some((bmin, bmax))) => {
                    if amin <= bmax && bmin <= amax {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
    true
}
