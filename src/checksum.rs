//! SHA-256 content digests for artifact verification.
//!
//! Hashing consumes the stream exactly once, to completion. A read error
//! part-way through is a storage error; the partial digest is discarded and
//! the artifact is neither valid nor invalid. Content that fails to gunzip
//! is an integrity error.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::config::DigestScope;
use crate::error::{Error, IntegrityError, Result, StorageError};
use crate::types::ArtifactId;

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Length of a hex-encoded SHA-256 digest.
const HEX_LEN: usize = 64;

/// Hex-encoded SHA-256 digest, normalized to lowercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Parse a hex digest in either case. Returns `None` unless the input is
    /// exactly 64 hexadecimal characters.
    pub fn parse(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.len() == HEX_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Lowercase hex form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a published hex digest, ignoring case.
    pub fn matches(&self, published: &str) -> bool {
        self.0.eq_ignore_ascii_case(published.trim())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid sha256 digest {value:?}"))
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

/// Hash a byte stream to completion.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentDigest(format!("{:x}", hasher.finalize())))
}

/// Hash a file on disk byte for byte.
pub fn digest_file(path: &Path) -> Result<ContentDigest> {
    let file = File::open(path).map_err(|e| StorageError::read(path, e))?;
    digest_reader(file).map_err(|e| StorageError::read(path, e).into())
}

/// Hash a downloaded artifact the way its descriptor publishes it.
///
/// With [`DigestScope::Uncompressed`] the file is gunzipped on the fly and
/// the digest covers the decompressed bytes. Content that does not decode is
/// [`IntegrityError::CorruptArtifact`]; only failures reading the file itself
/// are storage errors.
pub fn digest_artifact(artifact: ArtifactId, path: &Path, scope: DigestScope) -> Result<ContentDigest> {
    match scope {
        DigestScope::Compressed => digest_file(path),
        DigestScope::Uncompressed => {
            let file = File::open(path).map_err(|e| StorageError::read(path, e))?;
            let mut decoder = GzDecoder::new(SourceFile { file, failed: false });

            digest_reader(&mut decoder).map_err(|e| {
                if decoder.get_ref().failed {
                    StorageError::read(path, e).into()
                } else {
                    IntegrityError::CorruptArtifact {
                        artifact,
                        reason: e.to_string(),
                    }
                    .into()
                }
            })
        }
    }
}

/// Hash a file on the blocking thread pool.
pub async fn digest_file_blocking(path: PathBuf) -> Result<ContentDigest> {
    tokio::task::spawn_blocking(move || digest_file(&path))
        .await
        .map_err(|e| Error::Other(format!("checksum task failed: {}", e)))?
}

/// Hash a downloaded artifact on the blocking thread pool.
pub async fn digest_artifact_blocking(
    artifact: ArtifactId,
    path: PathBuf,
    scope: DigestScope,
) -> Result<ContentDigest> {
    tokio::task::spawn_blocking(move || digest_artifact(artifact, &path, scope))
        .await
        .map_err(|e| Error::Other(format!("checksum task failed: {}", e)))?
}

/// File reader that remembers whether the file itself failed, so decoder
/// errors can be told apart from I/O errors.
struct SourceFile {
    file: File,
    failed: bool,
}

impl Read for SourceFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf).inspect_err(|e| {
            if e.kind() != io::ErrorKind::Interrupted {
                self.failed = true;
            }
        })
    }
}
