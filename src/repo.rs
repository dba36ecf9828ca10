// Copyright (c) 2025 - Cowboy AI, LLC.

//! Repository registry
//!
//! Per-remote-repository fetch state, the mapping from publication
//! URIs to cache paths, and the filepath tree driving end-of-run cache
//! cleanup. A repository is fetched at most once per run; entities
//! that target it while the fetch is in flight are parked on its queue
//! and flushed when the fetch completes.

use crate::entity::Entity;
use crate::error::{Result, RpkiError};
use crate::stats::Stats;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use url::Url;

/// Fetch state of a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    /// Known but not yet scheduled
    New,
    /// A fetch is in flight
    Fetching,
    /// Fetched successfully; parked entities were flushed
    Ready,
    /// Fetch failed; parked entities were rejected
    Failed,
}

/// Transport a repository is currently being fetched over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// RRDP delta synchronisation over HTTPS
    Rrdp,
    /// Plain rsync mirror
    Rsync,
    /// Single-file HTTPS fetch (TA certificates)
    Http,
}

/// One remote repository
#[derive(Debug)]
pub struct Repo {
    /// Registry id, used to correlate fetch completions
    pub id: u64,
    /// rsync base URI (`rsync://host/module/`)
    pub base: String,
    /// RRDP notification URI, when the CA advertises one
    pub notify: Option<String>,
    /// Fetch state
    pub state: RepoState,
    /// Transport of the fetch in flight
    pub transport: Transport,
    /// Entities parked until the fetch completes
    pub queued: Vec<Entity>,
}

/// The registry of all repositories seen this run
#[derive(Debug, Default)]
pub struct RepoRegistry {
    repos: Vec<Repo>,
    by_base: HashMap<String, usize>,
}

impl RepoRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of repositories
    pub fn len(&self) -> usize {
        self.repos.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Find or create the repository for a publication point
    ///
    /// Returns the repository id and whether it was just created (a
    /// new repository still needs its fetch scheduled).
    pub fn lookup(&mut self, base: &str, notify: Option<&str>) -> (u64, bool) {
        if let Some(&idx) = self.by_base.get(base) {
            return (self.repos[idx].id, false);
        }
        let id = self.repos.len() as u64;
        self.by_base.insert(base.to_string(), self.repos.len());
        self.repos.push(Repo {
            id,
            base: base.to_string(),
            notify: notify.map(|s| s.to_string()),
            state: RepoState::New,
            transport: if notify.is_some() {
                Transport::Rrdp
            } else {
                Transport::Rsync
            },
            queued: Vec::new(),
        });
        (id, true)
    }

    /// Access a repository by id
    pub fn get(&self, id: u64) -> &Repo {
        &self.repos[id as usize]
    }

    /// Access a repository mutably by id
    pub fn get_mut(&mut self, id: u64) -> &mut Repo {
        &mut self.repos[id as usize]
    }

    /// Whether any repository still has a fetch in flight
    pub fn any_fetching(&self) -> bool {
        self.repos
            .iter()
            .any(|r| matches!(r.state, RepoState::New | RepoState::Fetching))
    }

    /// Iterate all repositories
    pub fn iter(&self) -> impl Iterator<Item = &Repo> {
        self.repos.iter()
    }
}

/// Derive the rsync module base (`rsync://host/module/`) of a URI
pub fn rsync_base_uri(uri: &str) -> Result<String> {
    let rest = uri
        .strip_prefix("rsync://")
        .ok_or_else(|| RpkiError::Uri(format!("not an rsync URI: {uri}")))?;
    let mut parts = rest.splitn(3, '/');
    let host = parts
        .next()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| RpkiError::Uri(format!("missing host: {uri}")))?;
    let module = parts
        .next()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| RpkiError::Uri(format!("missing module: {uri}")))?;
    Ok(format!("rsync://{host}/{module}/"))
}

/// Map a publication URI onto its cache path
///
/// Both transports land in the same layout: `<cache>/<host>/<path>`,
/// so an RRDP-delivered object ends up exactly where rsync would have
/// put it.
pub fn uri_to_path(cache: &Path, uri: &str) -> Result<PathBuf> {
    let (host, path) = if let Some(rest) = uri.strip_prefix("rsync://") {
        let (host, path) = rest
            .split_once('/')
            .ok_or_else(|| RpkiError::Uri(format!("no path: {uri}")))?;
        (host.to_string(), path.to_string())
    } else if uri.starts_with("https://") {
        let parsed = Url::parse(uri).map_err(|e| RpkiError::Uri(format!("{uri}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| RpkiError::Uri(format!("missing host: {uri}")))?
            .to_string();
        (host, parsed.path().trim_start_matches('/').to_string())
    } else {
        return Err(RpkiError::Uri(format!("unsupported scheme: {uri}")));
    };

    if host.is_empty() || path.is_empty() {
        return Err(RpkiError::Uri(format!("degenerate URI: {uri}")));
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(RpkiError::Uri(format!("unsafe path in URI: {uri}")));
        }
    }

    Ok(cache.join(host).join(path))
}

/// Write a cache file atomically, creating parent directories
///
/// Writes into a temporary file next to the target and renames it into
/// place, so a crashed run never leaves a torn object behind.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| RpkiError::Uri(format!("no parent for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut tmp, data)?;
    tmp.persist(path)
        .map_err(|e| RpkiError::Io(e.error))?;
    Ok(())
}

/// Cache paths touched during the current run
#[derive(Debug, Default)]
pub struct FilepathTree {
    paths: BTreeSet<PathBuf>,
}

impl FilepathTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path as touched
    pub fn add(&mut self, path: PathBuf) {
        self.paths.insert(path);
    }

    /// Whether a path was touched
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Number of recorded paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Remove cache files not touched this run and prune empty directories
pub fn repo_cleanup(root: &Path, keep: &FilepathTree, stats: &mut Stats) {
    let _ = cleanup_dir(root, keep, stats, true);
}

fn cleanup_dir(dir: &Path, keep: &FilepathTree, stats: &mut Stats, is_root: bool) -> bool {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    let mut empty = true;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            if cleanup_dir(&path, keep, stats, false) {
                if std::fs::remove_dir(&path).is_ok() {
                    stats.del_dirs += 1;
                } else {
                    empty = false;
                }
            } else {
                empty = false;
            }
        } else if keep.contains(&path) {
            empty = false;
        } else if std::fs::remove_file(&path).is_ok() {
            stats.del_files += 1;
        } else {
            empty = false;
        }
    }
    empty && !is_root
}
