//! Feed documents and descriptor generators

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// CVE item in the NVD 1.x layout
pub fn cve_item(id: &str, summary: &str) -> Value {
    json!({
        "cve": {
            "data_type": "CVE",
            "data_format": "MITRE",
            "data_version": "4.0",
            "CVE_data_meta": { "ID": id, "ASSIGNER": "cve@mitre.org" },
            "problemtype": { "problemtype_data": [] },
            "references": { "reference_data": [] },
            "description": {
                "description_data": [ { "lang": "en", "value": summary } ]
            }
        },
        "configurations": { "CVE_data_version": "4.0", "nodes": [] },
        "impact": {},
        "publishedDate": "2003-12-31T05:00Z",
        "lastModifiedDate": "2024-01-02T03:00Z"
    })
}

/// Feed document holding `items`
pub fn feed_document(items: &[Value]) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "CVE_data_type": "CVE",
        "CVE_data_format": "MITRE",
        "CVE_data_version": "4.0",
        "CVE_data_numberOfCVEs": items.len().to_string(),
        "CVE_data_timestamp": "2024-01-02T08:00Z",
        "CVE_Items": items,
    }))
    .expect("feed document serializes")
}

/// Gzip `data`
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// Uppercase hex SHA-256, as the feed publishes it
pub fn published_sha256(data: &[u8]) -> String {
    format!("{:X}", Sha256::digest(data))
}

/// `.meta` descriptor body with CRLF line endings
pub fn descriptor(last_modified: &str, json_len: usize, gz_len: usize, sha256: &str) -> String {
    format!(
        "lastModifiedDate:{last_modified}\r\n\
         size:{json_len}\r\n\
         zipSize:{zip}\r\n\
         gzSize:{gz_len}\r\n\
         sha256:{sha256}\r\n",
        zip = gz_len + 120,
    )
}
