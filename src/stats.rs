//! Run-time statistics
//!
//! Counters collected over a single validation run and reported in the
//! final summary and in output file headers.

use serde::{Deserialize, Serialize};

/// Statistics collected during a validation run
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Stats {
    /// Trust anchor locators loaded
    pub tals: usize,
    /// Manifests processed
    pub mfts: usize,
    /// Manifests failing syntactic parse
    pub mfts_fail: usize,
    /// Stale manifests (nextUpdate in the past)
    pub mfts_stale: usize,
    /// Certificates processed
    pub certs: usize,
    /// Certificates failing syntactic parse
    pub certs_fail: usize,
    /// Certificates with invalid resources or chain
    pub certs_invalid: usize,
    /// Route origin authorizations processed
    pub roas: usize,
    /// ROAs failing syntactic parse
    pub roas_fail: usize,
    /// ROAs with invalid resources
    pub roas_invalid: usize,
    /// Distinct remote repositories seen
    pub repos: usize,
    /// Repositories synced over rsync
    pub rsync_repos: usize,
    /// Failed rsync repositories
    pub rsync_fails: usize,
    /// Plain HTTPS fetches that succeeded
    pub http_repos: usize,
    /// Failed plain HTTPS fetches
    pub http_fails: usize,
    /// Repositories synced over RRDP
    pub rrdp_repos: usize,
    /// Failed RRDP repositories
    pub rrdp_fails: usize,
    /// Certificate revocation lists processed
    pub crls: usize,
    /// Ghostbuster records processed
    pub gbrs: usize,
    /// Total VRPs produced (before dedup)
    pub vrps: usize,
    /// Unique VRPs after dedup
    pub uniqs: usize,
    /// Files removed during cache cleanup
    pub del_files: usize,
    /// Directories removed during cache cleanup
    pub del_dirs: usize,
    /// Space-separated basenames of the TALs in this run
    pub talnames: String,
    /// Wall-clock duration of the run in seconds
    pub elapsed_secs: u64,
}
