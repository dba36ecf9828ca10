//! # rpki-rp - RPKI Relying Party
//!
//! This crate implements the core validation engine of an RPKI relying
//! party: it loads Trust Anchor Locators, synchronises the signed
//! objects of the global RPKI into a local cache over rsync, HTTPS and
//! RRDP, cryptographically validates every object against its issuer,
//! checks RFC 3779 resource delegation, and emits Validated ROA
//! Payloads for a BGP router's origin-validation database.
//!
//! ## Architecture
//!
//! The pipeline is four long-lived actors connected by byte pipes with
//! framed messages:
//! - the main actor (`runner`) owns the work queue, the repository
//!   registry and the authority/CRL/VRP trees
//! - the parser actor (`parser`) decodes and envelope-verifies objects
//! - the rsync fetcher (`rsync`) mirrors repositories via subprocess
//! - the HTTP/RRDP fetcher (`http`) downloads over HTTPS and applies
//!   RRDP deltas to the cache
//!
//! ## Modules
//!
//! - `resources`: RFC 3779 primitives and containment checks
//! - `tal`, `cert`, `mft`, `roa`, `crl`, `gbr`: object parsing
//! - `sigobj`: the shared CMS SignedData envelope
//! - `auth`: the authority tree and validation discipline
//! - `vrp`, `output`: payload aggregation and the output formats
//! - `repo`, `rrdp`: repository state, cache layout, delta sync

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod auth;
pub mod cert;
pub mod config;
pub mod crl;
pub mod entity;
pub mod error;
pub mod gbr;
pub mod http;
pub mod mft;
pub mod msg;
pub mod output;
pub mod parser;
pub mod repo;
pub mod resources;
pub mod roa;
pub mod rrdp;
pub mod rsync;
pub mod runner;
pub mod sigobj;
pub mod stats;
pub mod tal;
pub mod vrp;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, RpkiError};
pub use stats::Stats;

/// Crate version, for the CLI and the HTTP user agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::AuthTree;
    pub use crate::config::Config;
    pub use crate::error::{Result, RpkiError};
    pub use crate::resources::{Afi, CertAs, CertIp, IpPrefix};
    pub use crate::stats::Stats;
    pub use crate::tal::Tal;
    pub use crate::vrp::{Vrp, VrpTree};
}
