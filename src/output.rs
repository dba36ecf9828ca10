//! Output formatters
//!
//! Pure functions from the final VRP set to the enabled output
//! formats. Every format is a lexicographic traversal of the VRP tree;
//! deduplication already happened on insert.

use crate::config::OutputFormats;
use crate::error::Result;
use crate::repo::write_atomic;
use crate::resources::Afi;
use crate::stats::Stats;
use crate::vrp::VrpTree;
use serde_json::json;
use std::fmt::Write as _;
use std::path::Path;

/// File name per format, fixed
pub const FILE_OPENBGPD: &str = "openbgpd";
/// BIRD output file name
pub const FILE_BIRD: &str = "bird";
/// CSV output file name
pub const FILE_CSV: &str = "csv";
/// JSON output file name
pub const FILE_JSON: &str = "json";

fn header(stats: &Stats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Generated by rpki-rp from TALs: {}", stats.talnames);
    let _ = writeln!(
        out,
        "# VRPs: {} unique of {} total; certs: {}; roas: {}",
        stats.uniqs, stats.vrps, stats.certs, stats.roas
    );
    out
}

/// OpenBGPD roa-set
pub fn output_openbgpd(tree: &VrpTree, stats: &Stats) -> String {
    let mut out = header(stats);
    out.push_str("roa-set {\n");
    for vrp in tree.iter() {
        let _ = writeln!(
            out,
            "\t{} maxlen {} source-as {}",
            vrp.prefix.display(vrp.afi),
            vrp.maxlength,
            vrp.asid
        );
    }
    out.push_str("}\n");
    out
}

/// BIRD v2 static roa tables
pub fn output_bird(tree: &VrpTree, stats: &Stats) -> String {
    let mut out = header(stats);
    out.push_str("roa4 table roa4;\nroa6 table roa6;\n");
    for (afi, table) in [(Afi::V4, "roa4"), (Afi::V6, "roa6")] {
        let _ = writeln!(out, "protocol static {{\n\t{table} {{ table {table}; }};");
        for vrp in tree.iter().filter(|v| v.afi == afi) {
            let _ = writeln!(
                out,
                "\troute {} max {} as {};",
                vrp.prefix.display(vrp.afi),
                vrp.maxlength,
                vrp.asid
            );
        }
        out.push_str("}\n");
    }
    out
}

/// Comma-separated values
pub fn output_csv(tree: &VrpTree, _stats: &Stats) -> String {
    let mut out = String::from("ASN,IP Prefix,Max Length,Trust Anchor,Expires\n");
    for vrp in tree.iter() {
        let _ = writeln!(
            out,
            "AS{},{},{},{},{}",
            vrp.asid,
            vrp.prefix.display(vrp.afi),
            vrp.maxlength,
            vrp.tal,
            vrp.expires.timestamp()
        );
    }
    out
}

/// JSON document with metadata and the payload list
pub fn output_json(tree: &VrpTree, stats: &Stats) -> String {
    let roas: Vec<_> = tree
        .iter()
        .map(|vrp| {
            json!({
                "asn": format!("AS{}", vrp.asid),
                "prefix": vrp.prefix.display(vrp.afi),
                "maxLength": vrp.maxlength,
                "ta": vrp.tal,
                "expires": vrp.expires.timestamp(),
            })
        })
        .collect();
    let doc = json!({
        "metadata": {
            "counts": {
                "tals": stats.tals,
                "certs": stats.certs,
                "roas": stats.roas,
                "vrps": stats.vrps,
                "uniqueVrps": stats.uniqs,
            },
            "elapsedSeconds": stats.elapsed_secs,
        },
        "roas": roas,
    });
    let mut text = serde_json::to_string_pretty(&doc).unwrap_or_default();
    text.push('\n');
    text
}

/// Write every enabled format into the output directory
pub fn output_files(
    tree: &VrpTree,
    stats: &Stats,
    dir: &Path,
    formats: &OutputFormats,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    if formats.openbgpd {
        write_atomic(&dir.join(FILE_OPENBGPD), output_openbgpd(tree, stats).as_bytes())?;
    }
    if formats.bird {
        write_atomic(&dir.join(FILE_BIRD), output_bird(tree, stats).as_bytes())?;
    }
    if formats.csv {
        write_atomic(&dir.join(FILE_CSV), output_csv(tree, stats).as_bytes())?;
    }
    if formats.json {
        write_atomic(&dir.join(FILE_JSON), output_json(tree, stats).as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::IpPrefix;
    use crate::vrp::Vrp;
    use chrono::{TimeZone, Utc};

    fn sample_tree() -> (VrpTree, Stats) {
        let mut tree = VrpTree::new();
        tree.insert(Vrp {
            afi: Afi::V4,
            prefix: IpPrefix::new(&[10, 0, 0, 0], 16),
            maxlength: 24,
            asid: 64496,
            tal: "example".to_string(),
            expires: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        });
        let mut stats = Stats::default();
        stats.vrps = tree.inserted();
        stats.uniqs = tree.uniqs();
        stats.talnames = "example".to_string();
        (tree, stats)
    }

    #[test]
    fn test_openbgpd_format() {
        let (tree, stats) = sample_tree();
        let text = output_openbgpd(&tree, &stats);
        assert!(text.contains("roa-set {"));
        assert!(text.contains("\t10.0.0.0/16 maxlen 24 source-as 64496\n"));
    }

    #[test]
    fn test_csv_format() {
        let (tree, stats) = sample_tree();
        let text = output_csv(&tree, &stats);
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "ASN,IP Prefix,Max Length,Trust Anchor,Expires"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("AS64496,10.0.0.0/16,24,example,"));
    }

    #[test]
    fn test_json_format_parses_back() {
        let (tree, stats) = sample_tree();
        let text = output_json(&tree, &stats);
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["metadata"]["counts"]["uniqueVrps"], 1);
        assert_eq!(doc["roas"][0]["prefix"], "10.0.0.0/16");
        assert_eq!(doc["roas"][0]["maxLength"], 24);
    }

    #[test]
    fn test_bird_format_splits_families() {
        let (mut tree, stats) = sample_tree();
        tree.insert(Vrp {
            afi: Afi::V6,
            prefix: IpPrefix::new(&[0x20, 0x01, 0x0d, 0xb8], 32),
            maxlength: 48,
            asid: 64497,
            tal: "example".to_string(),
            expires: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        });
        let text = output_bird(&tree, &stats);
        assert!(text.contains("route 10.0.0.0/16 max 24 as 64496;"));
        assert!(text.contains("route 2001:db8::/32 max 48 as 64497;"));
    }

    #[test]
    fn test_output_files_respects_formats() {
        let (tree, stats) = sample_tree();
        let dir = tempfile::tempdir().unwrap();
        let formats = OutputFormats {
            openbgpd: true,
            bird: false,
            csv: true,
            json: false,
        };
        output_files(&tree, &stats, dir.path(), &formats).unwrap();
        assert!(dir.path().join(FILE_OPENBGPD).exists());
        assert!(dir.path().join(FILE_CSV).exists());
        assert!(!dir.path().join(FILE_BIRD).exists());
        assert!(!dir.path().join(FILE_JSON).exists());
    }
}
