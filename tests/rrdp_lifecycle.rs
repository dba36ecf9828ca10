//! RRDP lifecycle tests
//!
//! Walks a repository through snapshot bootstrap, delta advance and
//! session replacement against a temporary cache, exercising the same
//! plan/parse/apply/persist path the HTTP fetcher drives.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rpki_rp::rrdp::{
    apply_delta, apply_snapshot, load_session, parse_delta, parse_notification, parse_snapshot,
    plan_sync, save_session, RrdpSession, SyncPlan,
};
use sha2::{Digest, Sha256};

fn notification_xml(session: &str, serial: i64, deltas: &[i64]) -> String {
    let h = "00".repeat(32);
    let mut xml = format!(
        "<notification xmlns=\"http://www.ripe.net/rpki/rrdp\" version=\"1\" \
         session_id=\"{session}\" serial=\"{serial}\">\
         <snapshot uri=\"https://host/rrdp/{session}/{serial}/snapshot.xml\" hash=\"{h}\"/>"
    );
    for d in deltas {
        xml.push_str(&format!(
            "<delta serial=\"{d}\" uri=\"https://host/rrdp/{session}/{d}/delta.xml\" hash=\"{h}\"/>"
        ));
    }
    xml.push_str("</notification>");
    xml
}

#[test]
fn test_bootstrap_then_delta_then_session_replacement() {
    let cache = tempfile::tempdir().unwrap();
    let repo_dir = cache.path().join("host/repo");

    // --- first contact: no state, snapshot branch ------------------------
    let notif = parse_notification(notification_xml("s1", 5, &[5]).as_bytes()).unwrap();
    assert_eq!(plan_sync(None, &notif), SyncPlan::Snapshot);

    let body = BASE64.encode(b"object v1");
    let snapshot_xml = format!(
        "<snapshot xmlns=\"http://www.ripe.net/rpki/rrdp\" version=\"1\" \
         session_id=\"s1\" serial=\"5\">\
         <publish uri=\"rsync://host/repo/a.roa\">{body}</publish>\
         </snapshot>"
    );
    let snapshot = parse_snapshot(snapshot_xml.as_bytes()).unwrap();
    let written = apply_snapshot(cache.path(), &snapshot).unwrap();
    assert_eq!(written, vec![cache.path().join("host/repo/a.roa")]);

    let state = RrdpSession {
        session_id: "s1".to_string(),
        serial: 5,
        last_mod: Some("Mon, 01 Jun 2026 00:00:00 GMT".to_string()),
    };
    save_session(&repo_dir, &state).unwrap();

    // --- next run: one delta ahead, delta branch -------------------------
    let persisted = load_session(&repo_dir).unwrap();
    assert_eq!(persisted, state);

    let notif = parse_notification(notification_xml("s1", 6, &[5, 6]).as_bytes()).unwrap();
    let plan = plan_sync(Some(&persisted), &notif);
    let SyncPlan::Deltas(deltas) = plan else {
        panic!("expected delta branch, got {plan:?}");
    };
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].serial, 6);

    let old_hash = hex::encode(Sha256::digest(b"object v1"));
    let new_body = BASE64.encode(b"object v2");
    let delta_xml = format!(
        "<delta xmlns=\"http://www.ripe.net/rpki/rrdp\" version=\"1\" \
         session_id=\"s1\" serial=\"6\">\
         <publish uri=\"rsync://host/repo/a.roa\" hash=\"{old_hash}\">{new_body}</publish>\
         </delta>"
    );
    let delta = parse_delta(delta_xml.as_bytes()).unwrap();
    apply_delta(cache.path(), &delta).unwrap();
    assert_eq!(
        std::fs::read(cache.path().join("host/repo/a.roa")).unwrap(),
        b"object v2"
    );

    save_session(
        &repo_dir,
        &RrdpSession {
            session_id: "s1".to_string(),
            serial: 6,
            last_mod: None,
        },
    )
    .unwrap();

    // --- the repository starts a new session: snapshot branch ------------
    let persisted = load_session(&repo_dir).unwrap();
    let notif = parse_notification(notification_xml("s2", 2, &[1, 2]).as_bytes()).unwrap();
    assert_eq!(plan_sync(Some(&persisted), &notif), SyncPlan::Snapshot);
}

#[test]
fn test_withdrawn_object_must_match_hash() {
    let cache = tempfile::tempdir().unwrap();
    let path = cache.path().join("host/repo/b.roa");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"current").unwrap();

    let wrong_hash = "11".repeat(32);
    let delta_xml = format!(
        "<delta xmlns=\"http://www.ripe.net/rpki/rrdp\" version=\"1\" \
         session_id=\"s1\" serial=\"7\">\
         <withdraw uri=\"rsync://host/repo/b.roa\" hash=\"{wrong_hash}\"/>\
         </delta>"
    );
    let delta = parse_delta(delta_xml.as_bytes()).unwrap();
    assert!(apply_delta(cache.path(), &delta).is_err());
    // the mismatching withdraw left the object alone
    assert!(path.exists());
}
