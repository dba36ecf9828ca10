// Copyright (c) 2025 - Cowboy AI, LLC.

//! Main actor: repository manager and validation pipeline
//!
//! Owns the work queue, the repository registry, the authority, CRL,
//! VRP and filepath trees. Spawns the parser and the two fetchers as
//! tasks behind byte pipes, multiplexes their inbound frames through a
//! single channel, and drives the run: TAL load, fetch scheduling,
//! manifest walk, object admission, output, cleanup.
//!
//! The run terminates when the entity queue is empty, no parse request
//! is in flight, and no repository fetch is pending.

use crate::auth::{AuthTree, CrlTree, PendingCert, PendingCerts};
use crate::cert::{verify_issued, Cert};
use crate::config::Config;
use crate::crl::{crl_verify, Crl};
use crate::entity::{Entity, EntityKind};
use crate::error::{Result, RpkiError};
use crate::gbr::Gbr;
use crate::http::proc_http;
use crate::mft::{mft_check, Mft};
use crate::msg::{
    read_frame, write_frame, FetchDone, FetchRequest, Frame, HttpResult, ParseRequest,
    ParseResponse, ParsedObject, RrdpFile, MSG_FETCH_DONE, MSG_FETCH_REQ, MSG_PARSE_REQ,
    MSG_PARSE_RESP, MSG_RRDP_FILE,
};
use crate::output::output_files;
use crate::parser::proc_parser;
use crate::repo::{
    repo_cleanup, rsync_base_uri, uri_to_path, FilepathTree, RepoRegistry, RepoState, Transport,
};
use crate::roa::Roa;
use crate::rrdp::{load_session, save_session};
use crate::rsync::proc_rsync;
use crate::stats::Stats;
use crate::tal::Tal;
use crate::vrp::VrpTree;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const PIPE_CAPACITY: usize = 256 * 1024;

/// Parse requests allowed in flight at once. Bounding the window keeps
/// the request pipe shallow, so the main actor never blocks writing
/// while responses wait to be drained.
const MAX_INFLIGHT: usize = 64;

/// Which pipe a frame arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Parser,
    Rsync,
    Http,
}

struct Runner {
    config: Config,
    stats: Stats,
    auths: AuthTree,
    crls: CrlTree,
    vrps: VrpTree,
    filepaths: FilepathTree,
    repos: RepoRegistry,
    pending: PendingCerts,
    entityq: VecDeque<Entity>,
    inflight: HashMap<u64, Entity>,
    next_req: u64,
    parser_wr: WriteHalf<DuplexStream>,
    rsync_wr: WriteHalf<DuplexStream>,
    http_wr: WriteHalf<DuplexStream>,
}

/// Run a complete validation pass and return the statistics
pub async fn run(config: Config) -> Result<Stats> {
    config.validate()?;
    let started = Instant::now();

    let (parser_main, parser_side) = tokio::io::duplex(PIPE_CAPACITY);
    let (rsync_main, rsync_side) = tokio::io::duplex(PIPE_CAPACITY);
    let (http_main, http_side) = tokio::io::duplex(PIPE_CAPACITY);

    tokio::spawn(proc_parser(parser_side));
    tokio::spawn(proc_rsync(
        rsync_side,
        config.fetch.rsync_command.clone(),
        Duration::from_secs(config.fetch.timeout_secs),
    ));
    tokio::spawn(proc_http(
        http_side,
        config.cache_dir.clone(),
        config.fetch.clone(),
    ));

    let (parser_rd, parser_wr) = tokio::io::split(parser_main);
    let (rsync_rd, rsync_wr) = tokio::io::split(rsync_main);
    let (http_rd, http_wr) = tokio::io::split(http_main);

    let (tx, mut rx) = mpsc::channel::<(Source, Frame)>(64);
    tokio::spawn(forward(parser_rd, Source::Parser, tx.clone()));
    tokio::spawn(forward(rsync_rd, Source::Rsync, tx.clone()));
    tokio::spawn(forward(http_rd, Source::Http, tx));

    let mut runner = Runner {
        config,
        stats: Stats::default(),
        auths: AuthTree::new(),
        crls: CrlTree::new(),
        vrps: VrpTree::new(),
        filepaths: FilepathTree::new(),
        repos: RepoRegistry::new(),
        pending: PendingCerts::default(),
        entityq: VecDeque::new(),
        inflight: HashMap::new(),
        next_req: 0,
        parser_wr,
        rsync_wr,
        http_wr,
    };

    runner.load_tals().await?;
    runner.pump().await?;

    while !runner.done() {
        let (source, frame) = rx
            .recv()
            .await
            .ok_or_else(|| RpkiError::Wire("control channel closed".to_string()))?;
        runner.dispatch(source, frame).await?;
        runner.pump().await?;
    }

    runner.finish(started)
}

/// Forward frames from one pipe into the multiplexed channel
async fn forward(
    mut rd: ReadHalf<DuplexStream>,
    source: Source,
    tx: mpsc::Sender<(Source, Frame)>,
) {
    loop {
        match read_frame(&mut rd).await {
            Ok(Some(frame)) => {
                if tx.send((source, frame)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("channel {source:?}: {e}");
                break;
            }
        }
    }
}

impl Runner {
    /// Load every configured TAL and schedule its TA certificate fetch
    async fn load_tals(&mut self) -> Result<()> {
        let tal_files = self.config.tals.clone();
        let mut names = Vec::new();
        for file in &tal_files {
            let tal = Tal::from_file(file)?;
            info!("loaded TAL {} ({} URIs)", tal.name, tal.uris.len());
            names.push(tal.name.clone());
            self.stats.tals += 1;
            self.schedule_ta(&tal).await?;
        }
        self.stats.talnames = names.join(" ");
        Ok(())
    }

    /// Queue the trust anchor certificate of one TAL
    async fn schedule_ta(&mut self, tal: &Tal) -> Result<()> {
        let uri = tal.preferred_uri().to_string();
        let path = uri_to_path(&self.config.cache_dir, &uri)?;
        let entity = Entity {
            kind: EntityKind::TaCert,
            path: path.clone(),
            pubkey: Some(tal.pubkey.clone()),
            tal: tal.name.clone(),
        };

        // each TA certificate gets its own single-object repository
        let (id, created) = self.repos.lookup(&uri, None);
        if created {
            self.stats.repos += 1;
            let request = if uri.starts_with("https://") {
                self.repos.get_mut(id).transport = Transport::Http;
                FetchRequest::Http {
                    id,
                    uri,
                    dst: path,
                    last_mod: None,
                }
            } else {
                self.repos.get_mut(id).transport = Transport::Rsync;
                FetchRequest::Rsync { id, uri, dst: path }
            };
            self.repos.get_mut(id).state = RepoState::Fetching;
            self.send_fetch(request).await?;
        }
        self.repos.get_mut(id).queued.push(entity);
        Ok(())
    }

    /// Route a fetch request to the transport that owns it
    async fn send_fetch(&mut self, request: FetchRequest) -> Result<()> {
        match &request {
            FetchRequest::Rsync { .. } => {
                write_frame(&mut self.rsync_wr, MSG_FETCH_REQ, &request).await
            }
            FetchRequest::Http { .. } | FetchRequest::Rrdp { .. } => {
                write_frame(&mut self.http_wr, MSG_FETCH_REQ, &request).await
            }
        }
    }

    /// Send parse requests from the entity queue, up to the window
    async fn pump(&mut self) -> Result<()> {
        while self.inflight.len() < MAX_INFLIGHT {
            let Some(entity) = self.entityq.pop_front() else {
                break;
            };
            let id = self.next_req;
            self.next_req += 1;
            let request = ParseRequest {
                id,
                entity: entity.clone(),
            };
            self.inflight.insert(id, entity);
            write_frame(&mut self.parser_wr, MSG_PARSE_REQ, &request).await?;
        }
        Ok(())
    }

    /// Termination condition: queues drained, nothing in flight
    fn done(&self) -> bool {
        self.entityq.is_empty() && self.inflight.is_empty() && !self.repos.any_fetching()
    }

    /// Handle one inbound frame
    async fn dispatch(&mut self, source: Source, frame: Frame) -> Result<()> {
        match (source, frame.kind) {
            (Source::Parser, MSG_PARSE_RESP) => {
                let resp: ParseResponse = frame.decode()?;
                self.handle_parse_response(resp).await?;
            }
            (Source::Rsync | Source::Http, MSG_FETCH_DONE) => {
                let done: FetchDone = frame.decode()?;
                self.handle_fetch_done(done).await?;
            }
            (Source::Http, MSG_RRDP_FILE) => {
                let file: RrdpFile = frame.decode()?;
                self.filepaths.add(file.path);
            }
            (source, kind) => {
                warn!("unexpected message kind {kind} on {source:?} channel");
            }
        }
        Ok(())
    }

    /// Drive the repository state machine from a completion
    async fn handle_fetch_done(&mut self, done: FetchDone) -> Result<()> {
        match done {
            FetchDone::Rsync { id, ok } => {
                if ok {
                    self.stats.rsync_repos += 1;
                } else {
                    self.stats.rsync_fails += 1;
                }
                self.finish_repo(id, ok);
            }
            FetchDone::Http {
                id,
                result,
                last_mod: _,
            } => {
                let ok = matches!(result, HttpResult::Ok | HttpResult::NotModified);
                if ok {
                    self.stats.http_repos += 1;
                } else {
                    self.stats.http_fails += 1;
                }
                self.finish_repo(id, ok);
            }
            FetchDone::Rrdp { id, ok, state } => {
                if ok {
                    self.stats.rrdp_repos += 1;
                    if let Some(session) = state {
                        let base = self.repos.get(id).base.clone();
                        let repo_dir =
                            uri_to_path(&self.config.cache_dir, base.trim_end_matches('/'))?;
                        match save_session(&repo_dir, &session) {
                            Ok(path) => self.filepaths.add(path),
                            Err(e) => warn!("cannot persist RRDP state for {base}: {e}"),
                        }
                    }
                    self.finish_repo(id, true);
                } else {
                    // RRDP failure falls back to rsync on the base URI
                    self.stats.rrdp_fails += 1;
                    let repo = self.repos.get_mut(id);
                    repo.transport = Transport::Rsync;
                    let uri = repo.base.clone();
                    info!("falling back to rsync for {uri}");
                    let dst =
                        uri_to_path(&self.config.cache_dir, uri.trim_end_matches('/'))?;
                    self.send_fetch(FetchRequest::Rsync { id, uri, dst }).await?;
                }
            }
        }
        Ok(())
    }

    /// Transition a repository out of FETCHING and flush its queue
    fn finish_repo(&mut self, id: u64, ok: bool) {
        let repo = self.repos.get_mut(id);
        repo.state = if ok { RepoState::Ready } else { RepoState::Failed };
        let queued = std::mem::take(&mut repo.queued);
        let base = repo.base.clone();
        if ok {
            for entity in queued {
                self.enqueue(entity);
            }
        } else if !queued.is_empty() {
            warn!(
                "dropping {} entities of failed repository {base}",
                queued.len()
            );
        }
    }

    /// Put an entity on the work queue and account for its cache path
    fn enqueue(&mut self, entity: Entity) {
        self.filepaths.add(entity.path.clone());
        self.entityq.push_back(entity);
    }

    /// Handle a parser verdict
    async fn handle_parse_response(&mut self, resp: ParseResponse) -> Result<()> {
        let entity = self
            .inflight
            .remove(&resp.id)
            .ok_or_else(|| RpkiError::Wire(format!("unknown parse response id {}", resp.id)))?;

        let object = match resp.result {
            Ok(object) => object,
            Err(reason) => {
                warn!("{}: {reason}", entity.path.display());
                match entity.kind {
                    EntityKind::TaCert | EntityKind::Cert => self.stats.certs_fail += 1,
                    EntityKind::Mft => self.stats.mfts_fail += 1,
                    EntityKind::Roa => self.stats.roas_fail += 1,
                    EntityKind::Crl | EntityKind::Gbr => {}
                }
                return Ok(());
            }
        };

        match object {
            ParsedObject::Ta(cert) => {
                self.stats.certs += 1;
                self.admit_ta(cert, &entity.tal, entity.path).await?;
            }
            ParsedObject::Cert(cert) => {
                self.stats.certs += 1;
                self.admit_cert(cert, entity.tal.clone(), entity.path).await?;
            }
            ParsedObject::Mft(mft) => {
                self.stats.mfts += 1;
                self.process_mft(mft, entity).await?;
            }
            ParsedObject::Roa(roa) => {
                self.stats.roas += 1;
                self.process_roa(roa, &entity);
            }
            ParsedObject::Crl(crl) => {
                self.stats.crls += 1;
                self.process_crl(crl, &entity);
            }
            ParsedObject::Gbr(gbr) => {
                self.stats.gbrs += 1;
                self.process_gbr(gbr, &entity);
            }
        }
        Ok(())
    }

    /// Admit a trust anchor and descend into its publication point
    async fn admit_ta(&mut self, cert: Cert, tal: &str, path: PathBuf) -> Result<()> {
        match self.auths.insert_ta(cert, tal, path.clone()) {
            Ok(idx) => {
                debug!("trust anchor {} admitted", self.auths.get(idx).cert.ski);
                self.descend(idx).await?;
                self.flush_pending(idx).await?;
            }
            Err(e) => {
                warn!("{}: {e}", path.display());
                self.stats.certs_invalid += 1;
            }
        }
        Ok(())
    }

    /// Admit a CA certificate, or park it until its issuer shows up
    async fn admit_cert(&mut self, cert: Cert, tal: String, path: PathBuf) -> Result<()> {
        if let Some(idx) = self.try_admit(cert, tal, path).await? {
            self.flush_pending(idx).await?;
        }
        Ok(())
    }

    /// One admission attempt; `None` when rejected or parked
    async fn try_admit(&mut self, cert: Cert, tal: String, path: PathBuf) -> Result<Option<usize>> {
        let Some(aki) = cert.aki.clone() else {
            warn!("{}: missing AKI", path.display());
            self.stats.certs_invalid += 1;
            return Ok(None);
        };
        let Some(parent) = self.auths.find(&aki) else {
            // the issuer may still be in flight; retried on insertion
            debug!("{}: deferring until issuer {aki} arrives", path.display());
            self.pending.park(PendingCert { cert, tal, path });
            return Ok(None);
        };

        let parent_cert = &self.auths.get(parent).cert;
        if let Err(e) = verify_issued(&cert.der, &parent_cert.der) {
            warn!("{}: {e}", path.display());
            self.stats.certs_invalid += 1;
            return Ok(None);
        }
        if let Some(crl) = self.crls.get(&aki) {
            if crl.is_revoked(&cert.serial) {
                warn!("{}: revoked by issuer CRL", path.display());
                self.stats.certs_invalid += 1;
                return Ok(None);
            }
        }

        match self.auths.insert_cert(cert, &tal, path.clone(), Utc::now()) {
            Ok(idx) => {
                if self.auths.get(idx).cert.is_ca() {
                    self.descend(idx).await?;
                }
                Ok(Some(idx))
            }
            Err(e) => {
                warn!("{}: {e}", path.display());
                self.stats.certs_invalid += 1;
                Ok(None)
            }
        }
    }

    /// Retry certificates that were waiting on newly admitted
    /// authorities, transitively
    async fn flush_pending(&mut self, idx: usize) -> Result<()> {
        let mut newly = vec![idx];
        while let Some(idx) = newly.pop() {
            let ski = self.auths.get(idx).cert.ski.clone();
            for parked in self.pending.take(&ski) {
                if let Some(admitted) =
                    self.try_admit(parked.cert, parked.tal, parked.path).await?
                {
                    newly.push(admitted);
                }
            }
        }
        Ok(())
    }

    /// Schedule the repository fetch and manifest parse of a CA
    async fn descend(&mut self, idx: usize) -> Result<()> {
        let auth = self.auths.get(idx);
        let tal = auth.tal.clone();
        let (Some(repo_uri), Some(mft_uri)) = (auth.cert.repo.clone(), auth.cert.mft.clone())
        else {
            return Ok(());
        };
        let notify = auth.cert.notify.clone();

        let base = match rsync_base_uri(&repo_uri) {
            Ok(base) => base,
            Err(e) => {
                warn!("{repo_uri}: {e}");
                return Ok(());
            }
        };
        let mft_path = match uri_to_path(&self.config.cache_dir, &mft_uri) {
            Ok(path) => path,
            Err(e) => {
                warn!("{mft_uri}: {e}");
                return Ok(());
            }
        };
        let entity = Entity {
            kind: EntityKind::Mft,
            path: mft_path,
            pubkey: None,
            tal,
        };

        let (id, created) = self.repos.lookup(&base, notify.as_deref());
        if created {
            self.stats.repos += 1;
            let repo_dir = uri_to_path(&self.config.cache_dir, base.trim_end_matches('/'))?;
            let use_rrdp = self.config.fetch.rrdp && notify.is_some();
            let request = if use_rrdp {
                FetchRequest::Rrdp {
                    id,
                    notify: notify.unwrap_or_default(),
                    state: load_session(&repo_dir),
                }
            } else {
                self.repos.get_mut(id).transport = Transport::Rsync;
                FetchRequest::Rsync {
                    id,
                    uri: base.clone(),
                    dst: repo_dir,
                }
            };
            self.repos.get_mut(id).state = RepoState::Fetching;
            self.send_fetch(request).await?;
        }

        match self.repos.get(id).state {
            RepoState::Ready => self.enqueue(entity),
            RepoState::Failed => {
                warn!("manifest of {base} dropped: repository failed");
            }
            RepoState::New | RepoState::Fetching => {
                self.repos.get_mut(id).queued.push(entity);
            }
        }
        Ok(())
    }

    /// Walk an accepted manifest and enqueue its children
    async fn process_mft(&mut self, mft: Mft, entity: Entity) -> Result<()> {
        let issuer = match self.auths.lookup_issuer(mft.aki.as_deref()) {
            Ok(idx) => idx,
            Err(e) => {
                warn!("{}: {e}", entity.path.display());
                self.stats.mfts_fail += 1;
                return Ok(());
            }
        };
        if let Err(e) = verify_issued(&mft.ee_der, &self.auths.get(issuer).cert.der) {
            warn!("{}: {e}", entity.path.display());
            self.stats.mfts_fail += 1;
            return Ok(());
        }
        if mft.stale {
            warn!("{}: stale manifest", entity.path.display());
            self.stats.mfts_stale += 1;
            return Ok(());
        }

        let Some(dir) = entity.path.parent().map(PathBuf::from) else {
            return Ok(());
        };
        let check = mft_check(&dir, &mft);
        if check.bad > 0 {
            warn!(
                "{}: {} listed files missing or corrupt",
                entity.path.display(),
                check.bad
            );
        }

        // CRLs go first so revocation state is in place before the
        // issuer's children are validated
        let (crls, others): (Vec<_>, Vec<_>) = check
            .ok
            .into_iter()
            .partition(|p| EntityKind::from_path(p) == Some(EntityKind::Crl));
        for path in crls.into_iter().chain(others) {
            let Some(kind) = EntityKind::from_path(&path) else {
                debug!("{}: unhandled file type", path.display());
                continue;
            };
            if kind == EntityKind::Mft {
                continue; // a manifest does not list manifests
            }
            self.enqueue(Entity {
                kind,
                path,
                pubkey: None,
                tal: entity.tal.clone(),
            });
        }
        Ok(())
    }

    /// Validate a ROA and expand it into VRPs
    fn process_roa(&mut self, roa: Roa, entity: &Entity) {
        let issuer = match self.auths.lookup_issuer(roa.aki.as_deref()) {
            Ok(idx) => idx,
            Err(e) => {
                warn!("{}: {e}", entity.path.display());
                self.stats.roas_invalid += 1;
                return;
            }
        };
        if let Err(e) = verify_issued(&roa.ee_der, &self.auths.get(issuer).cert.der) {
            warn!("{}: {e}", entity.path.display());
            self.stats.roas_invalid += 1;
            return;
        }
        match self.auths.valid_roa(&roa, &self.crls, Utc::now()) {
            Ok(_) => {
                self.vrps.insert_roa(&roa);
            }
            Err(e) => {
                warn!("{}: {e}", entity.path.display());
                self.stats.roas_invalid += 1;
            }
        }
    }

    /// Verify and store a CRL
    fn process_crl(&mut self, crl: Crl, entity: &Entity) {
        if let Some(idx) = self.auths.find(&crl.aki) {
            if let Err(e) = crl_verify(&crl, &self.auths.get(idx).cert.der) {
                warn!("{}: {e}", entity.path.display());
                return;
            }
        }
        self.crls.insert(crl.aki.clone(), crl);
    }

    /// Account for a ghostbuster record
    fn process_gbr(&mut self, gbr: Gbr, entity: &Entity) {
        if self.auths.lookup_issuer(gbr.aki.as_deref()).is_err() {
            debug!("{}: ghostbuster without issuer", entity.path.display());
        }
    }

    /// Reject leftovers, emit output, clean the cache, log the summary
    fn finish(mut self, started: Instant) -> Result<Stats> {
        for parked in self.pending.drain_all() {
            warn!(
                "{}: issuer {} never arrived",
                parked.path.display(),
                parked.cert.aki.as_deref().unwrap_or("-")
            );
            self.stats.certs_invalid += 1;
        }

        self.stats.vrps = self.vrps.inserted();
        self.stats.uniqs = self.vrps.uniqs();
        self.stats.elapsed_secs = started.elapsed().as_secs();

        if self.stats.uniqs > 0 {
            output_files(
                &self.vrps,
                &self.stats,
                &self.config.output_dir,
                &self.config.formats,
            )?;
        } else {
            warn!("no VRPs validated; output not written");
        }

        repo_cleanup(&self.config.cache_dir, &self.filepaths, &mut self.stats);

        info!(
            "validated {} VRPs ({} unique) from {} ROAs under {} TALs in {}s",
            self.stats.vrps,
            self.stats.uniqs,
            self.stats.roas,
            self.stats.tals,
            self.stats.elapsed_secs
        );
        info!(
            "certificates: {} ok, {} parse failures, {} invalid",
            self.stats.certs, self.stats.certs_fail, self.stats.certs_invalid
        );
        info!(
            "manifests: {} ok, {} parse failures, {} stale",
            self.stats.mfts, self.stats.mfts_fail, self.stats.mfts_stale
        );
        info!(
            "repositories: {} rsync ({} failed), {} https ({} failed), {} rrdp ({} failed)",
            self.stats.rsync_repos,
            self.stats.rsync_fails,
            self.stats.http_repos,
            self.stats.http_fails,
            self.stats.rrdp_repos,
            self.stats.rrdp_fails
        );
        info!(
            "cleanup: removed {} files, {} directories",
            self.stats.del_files, self.stats.del_dirs
        );

        Ok(self.stats)
    }
}
