//! Actor wire-protocol tests
//!
//! Drives the parser actor over a real byte pipe: requests go in as
//! frames, verdicts come back as frames, and per-channel ordering is
//! preserved. Objects are garbage on purpose; the interesting part is
//! that failures travel as response values, never as actor death.

use rpki_rp::entity::{Entity, EntityKind};
use rpki_rp::msg::{
    read_frame, write_frame, ParseRequest, ParseResponse, MSG_PARSE_REQ, MSG_PARSE_RESP,
};
use rpki_rp::parser::proc_parser;

#[tokio::test]
async fn test_parser_reports_failures_and_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = dir.path().join("garbage.roa");
    std::fs::write(&garbage, b"this is not DER").unwrap();

    let (main_io, parser_io) = tokio::io::duplex(64 * 1024);
    let actor = tokio::spawn(proc_parser(parser_io));
    let (mut rd, mut wr) = tokio::io::split(main_io);

    for id in 0..3u64 {
        let request = ParseRequest {
            id,
            entity: Entity {
                kind: EntityKind::Roa,
                path: garbage.clone(),
                pubkey: None,
                tal: "example".to_string(),
            },
        };
        write_frame(&mut wr, MSG_PARSE_REQ, &request).await.unwrap();
    }

    for want in 0..3u64 {
        let frame = read_frame(&mut rd).await.unwrap().unwrap();
        assert_eq!(frame.kind, MSG_PARSE_RESP);
        let resp: ParseResponse = frame.decode().unwrap();
        assert_eq!(resp.id, want);
        assert_eq!(resp.kind, EntityKind::Roa);
        assert!(resp.result.is_err());
    }

    // closing our end shuts the actor down cleanly
    drop(wr);
    drop(rd);
    actor.await.unwrap();
}

#[tokio::test]
async fn test_parser_rejects_missing_file_per_object() {
    let (main_io, parser_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(proc_parser(parser_io));
    let (mut rd, mut wr) = tokio::io::split(main_io);

    let request = ParseRequest {
        id: 9,
        entity: Entity {
            kind: EntityKind::Cert,
            path: "/nonexistent/path/object.cer".into(),
            pubkey: None,
            tal: "example".to_string(),
        },
    };
    write_frame(&mut wr, MSG_PARSE_REQ, &request).await.unwrap();

    let frame = read_frame(&mut rd).await.unwrap().unwrap();
    let resp: ParseResponse = frame.decode().unwrap();
    assert_eq!(resp.id, 9);
    assert!(resp.result.is_err());
}
