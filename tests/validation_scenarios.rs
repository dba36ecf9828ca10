//! Validation pipeline scenarios
//!
//! End-to-end checks of the authority tree, VRP aggregation and output
//! formatting over synthetic certificates, without network or real
//! signatures.

use chrono::{TimeZone, Utc};
use rpki_rp::auth::{AuthTree, CrlTree};
use rpki_rp::cert::Cert;
use rpki_rp::crl::Crl;
use rpki_rp::output::{output_csv, output_openbgpd};
use rpki_rp::prelude::*;
use rpki_rp::resources::IpPrefix;
use rpki_rp::roa::{Roa, RoaIp};
use rpki_rp::vrp::VrpTree;
use std::collections::BTreeSet;
use std::path::PathBuf;

// ============================================================================
// Fixtures
// ============================================================================

fn far_future() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2040, 1, 1, 0, 0, 0).unwrap()
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap()
}

fn ta_cert(ski: &str) -> Cert {
    Cert {
        der: Vec::new(),
        ski: ski.to_string(),
        aki: None,
        aia: None,
        repo: Some("rsync://rpki.example.org/repo/".to_string()),
        mft: Some("rsync://rpki.example.org/repo/ta.mft".to_string()),
        notify: None,
        crl: None,
        ips: vec![CertIp::Prefix {
            afi: Afi::V4,
            prefix: IpPrefix::new(&[10, 0, 0, 0], 8),
        }],
        ases: vec![CertAs::Id(64496)],
        expires: far_future(),
        serial: vec![1],
    }
}

fn roa_for(tal: &str, aki: &str, addr: [u8; 4], len: u8, maxlen: u8) -> Roa {
    Roa {
        asid: 64496,
        ips: vec![RoaIp {
            afi: Afi::V4,
            prefix: IpPrefix::new(&addr, len),
            maxlength: maxlen,
        }],
        aia: None,
        aki: Some(aki.to_string()),
        ski: "ee".to_string(),
        ee_serial: vec![0x11],
        ee_der: Vec::new(),
        tal: tal.to_string(),
        expires: far_future(),
    }
}

// ============================================================================
// Scenario: single TA, single ROA
// ============================================================================

#[test]
fn test_single_ta_single_roa() {
    let mut auths = AuthTree::new();
    auths
        .insert_ta(ta_cert("ta"), "example", PathBuf::from("ta.cer"))
        .unwrap();
    let crls = CrlTree::new();

    let roa = roa_for("example", "ta", [10, 0, 0, 0], 16, 24);
    auths.valid_roa(&roa, &crls, now()).unwrap();

    let mut vrps = VrpTree::new();
    vrps.insert_roa(&roa);
    assert_eq!(vrps.inserted(), 1);
    assert_eq!(vrps.uniqs(), 1);

    let vrp = vrps.iter().next().unwrap();
    assert_eq!(vrp.prefix.display(vrp.afi), "10.0.0.0/16");
    assert_eq!(vrp.maxlength, 24);
    assert_eq!(vrp.asid, 64496);
    assert_eq!(vrp.tal, "example");
}

// ============================================================================
// Scenario: out-of-bound prefix
// ============================================================================

#[test]
fn test_out_of_bound_prefix_rejected() {
    let mut auths = AuthTree::new();
    auths
        .insert_ta(ta_cert("ta"), "example", PathBuf::from("ta.cer"))
        .unwrap();
    let crls = CrlTree::new();

    // 11.0.0.0/16 is outside the TA's 10.0.0.0/8
    let roa = roa_for("example", "ta", [11, 0, 0, 0], 16, 24);
    assert!(matches!(
        auths.valid_roa(&roa, &crls, now()),
        Err(RpkiError::NotCovered(_))
    ));
}

// ============================================================================
// Scenario: revoked EE certificate
// ============================================================================

#[test]
fn test_revoked_ee_yields_no_vrps() {
    let mut auths = AuthTree::new();
    auths
        .insert_ta(ta_cert("ta"), "example", PathBuf::from("ta.cer"))
        .unwrap();

    let mut revoked = BTreeSet::new();
    revoked.insert(vec![0x11]);
    let mut crls = CrlTree::new();
    crls.insert(
        "ta".to_string(),
        Crl {
            aki: "ta".to_string(),
            revoked,
            der: Vec::new(),
        },
    );

    let roa = roa_for("example", "ta", [10, 0, 0, 0], 16, 24);
    assert!(matches!(
        auths.valid_roa(&roa, &crls, now()),
        Err(RpkiError::Revoked)
    ));
}

// ============================================================================
// Scenario: duplicate VRP across TALs
// ============================================================================

#[test]
fn test_duplicate_vrp_across_tals() {
    let mut auths = AuthTree::new();
    auths
        .insert_ta(ta_cert("ta-one"), "tal-one", PathBuf::from("one.cer"))
        .unwrap();
    auths
        .insert_ta(ta_cert("ta-two"), "tal-two", PathBuf::from("two.cer"))
        .unwrap();
    let crls = CrlTree::new();

    let first = roa_for("tal-one", "ta-one", [10, 0, 0, 0], 16, 24);
    let second = roa_for("tal-two", "ta-two", [10, 0, 0, 0], 16, 24);
    auths.valid_roa(&first, &crls, now()).unwrap();
    auths.valid_roa(&second, &crls, now()).unwrap();

    let mut vrps = VrpTree::new();
    vrps.insert_roa(&first);
    vrps.insert_roa(&second);
    assert_eq!(vrps.inserted(), 2);
    assert_eq!(vrps.uniqs(), 1);

    // a single entry reaches every output format
    let mut stats = Stats::default();
    stats.vrps = vrps.inserted();
    stats.uniqs = vrps.uniqs();
    let bgpd = output_openbgpd(&vrps, &stats);
    assert_eq!(
        bgpd.matches("10.0.0.0/16 maxlen 24 source-as 64496").count(),
        1
    );
    let csv = output_csv(&vrps, &stats);
    assert_eq!(csv.lines().count(), 2); // header plus one row
}

// ============================================================================
// Scenario: delegation chain with inherit
// ============================================================================

#[test]
fn test_vrp_only_through_admitted_chain() {
    let mut auths = AuthTree::new();
    auths
        .insert_ta(ta_cert("ta"), "example", PathBuf::from("ta.cer"))
        .unwrap();

    let child = Cert {
        der: Vec::new(),
        ski: "child".to_string(),
        aki: Some("ta".to_string()),
        aia: Some("rsync://rpki.example.org/repo/ta.cer".to_string()),
        repo: Some("rsync://rpki.example.org/sub/".to_string()),
        mft: Some("rsync://rpki.example.org/sub/sub.mft".to_string()),
        notify: None,
        crl: None,
        ips: vec![CertIp::Inherit { afi: Afi::V4 }],
        ases: vec![CertAs::Inherit],
        expires: far_future(),
        serial: vec![2],
    };
    auths
        .insert_cert(child, "example", PathBuf::from("child.cer"), now())
        .unwrap();

    let crls = CrlTree::new();
    // ROA under the child; the prefix resolves through the inherit to
    // the TA's 10.0.0.0/8
    let roa = roa_for("example", "child", [10, 3, 0, 0], 16, 20);
    assert!(auths.valid_roa(&roa, &crls, now()).is_ok());

    let outside = roa_for("example", "child", [192, 168, 0, 0], 24, 24);
    assert!(auths.valid_roa(&outside, &crls, now()).is_err());
}
