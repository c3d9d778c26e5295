//! Core types for nvd-search

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::checksum::ContentDigest;
use crate::error::ParseError;

/// Identifier of one feed unit: an annual snapshot or the rolling delta.
///
/// The derived ordering matches the lexicographic order of the textual id:
/// years ascend, and `modified` sorts after every year. Batches processed in
/// this order therefore apply the delta last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArtifactId {
    /// Annual snapshot for a calendar year (always four digits)
    Year(u16),
    /// Rolling delta of recently modified entries
    Modified,
}

impl ArtifactId {
    /// Sentinel text of the delta artifact
    pub const MODIFIED: &'static str = "modified";

    /// Annual snapshot for `year`, which must have four digits
    pub fn year(year: i32) -> Result<Self, ParseError> {
        match u16::try_from(year) {
            Ok(y) if (1000..=9999).contains(&y) => Ok(ArtifactId::Year(y)),
            _ => Err(ParseError::InvalidArtifactId(year.to_string())),
        }
    }

    /// Whether this is the delta artifact
    pub fn is_modified(&self) -> bool {
        matches!(self, ArtifactId::Modified)
    }

    /// File name of the compressed data artifact in the local store
    pub fn archive_file_name(&self) -> String {
        format!("{}.json.gz", self)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactId::Year(year) => write!(f, "{:04}", year),
            ArtifactId::Modified => f.write_str(Self::MODIFIED),
        }
    }
}

impl FromStr for ArtifactId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::MODIFIED {
            return Ok(ArtifactId::Modified);
        }
        if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
            // Four ASCII digits always fit
            return s
                .parse::<i32>()
                .map_err(|_| ParseError::InvalidArtifactId(s.to_string()))
                .and_then(ArtifactId::year);
        }
        Err(ParseError::InvalidArtifactId(s.to_string()))
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.to_string()
    }
}

/// How much of the feed a run fetches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Every annual snapshot plus the delta; the dataset is rebuilt
    Full,
    /// Only the delta, merged on top of the existing dataset
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => f.write_str("full"),
            SyncMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// State of one synchronization run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Nothing has happened yet
    Uninitialized,
    /// Store ensured and full/incremental decided
    ModeDecided,
    /// Every metadata descriptor of the catalog fetched and parsed
    MetadataFetched,
    /// Every artifact of the catalog downloaded and hashed
    ArtifactsFetched,
    /// Verified and merged into the store (terminal success)
    Reconciled,
    /// Aborted (terminal failure)
    Failed,
}

impl SyncState {
    /// Whether the run can move from `self` to `next`
    pub fn can_transition_to(&self, next: SyncState) -> bool {
        use SyncState::*;
        match (self, next) {
            (Reconciled | Failed, _) => false,
            (_, Failed) => true,
            (Uninitialized, ModeDecided)
            | (ModeDecided, MetadataFetched)
            | (MetadataFetched, ArtifactsFetched)
            | (ArtifactsFetched, Reconciled) => true,
            _ => false,
        }
    }

    /// Whether the run has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Reconciled | SyncState::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::ModeDecided => "mode_decided",
            SyncState::MetadataFetched => "metadata_fetched",
            SyncState::ArtifactsFetched => "artifacts_fetched",
            SyncState::Reconciled => "reconciled",
            SyncState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Unit of work that moves a run from one state to the next
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Ensure the store and decide the mode
    ModeDecision,
    /// Fetch metadata descriptors
    Metadata,
    /// Download artifacts
    Artifacts,
    /// Verify digests and merge
    Reconcile,
}

impl SyncPhase {
    /// State reached when this phase completes
    pub fn target_state(&self) -> SyncState {
        match self {
            SyncPhase::ModeDecision => SyncState::ModeDecided,
            SyncPhase::Metadata => SyncState::MetadataFetched,
            SyncPhase::Artifacts => SyncState::ArtifactsFetched,
            SyncPhase::Reconcile => SyncState::Reconciled,
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::ModeDecision => "mode decision",
            SyncPhase::Metadata => "metadata",
            SyncPhase::Artifacts => "artifact",
            SyncPhase::Reconcile => "reconcile",
        };
        f.write_str(name)
    }
}

/// Event emitted during a synchronization run
///
/// Subscribe with [`Synchronizer::subscribe`](crate::Synchronizer::subscribe).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Store opened and mode chosen
    ModeDecided {
        /// Chosen mode
        mode: SyncMode,
        /// Whether the store had no dataset before this run
        store_initialized: bool,
        /// Digest of the existing dataset, if there was one
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_digest: Option<ContentDigest>,
    },

    /// A fan-out phase started
    PhaseStarted {
        /// Phase that started
        phase: SyncPhase,
        /// Number of artifacts in the phase
        artifacts: usize,
    },

    /// One metadata descriptor fetched and parsed
    MetadataFetched {
        /// Artifact the descriptor belongs to
        artifact: ArtifactId,
    },

    /// One artifact downloaded and hashed
    ArtifactDownloaded {
        /// Downloaded artifact
        artifact: ArtifactId,
        /// Bytes written to disk
        bytes: u64,
    },

    /// One artifact matched its published digest
    ArtifactVerified {
        /// Verified artifact
        artifact: ArtifactId,
    },

    /// The run committed its changes to the store
    Reconciled {
        /// Mode the run used
        mode: SyncMode,
        /// Number of CVE entries in the merged dataset
        cve_count: usize,
    },

    /// The run aborted
    Failed {
        /// Phase that was running, if the failure happened inside one
        #[serde(skip_serializing_if = "Option::is_none")]
        phase: Option<SyncPhase>,
        /// Error message
        error: String,
    },
}

/// Per-artifact outcome of a successful run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    /// Artifact id
    pub artifact: ArtifactId,
    /// Size of the downloaded compressed file
    pub bytes: u64,
    /// Verified content digest
    pub digest: ContentDigest,
    /// `lastModifiedDate` published in the descriptor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// CVE entries contributed to the merge
    pub cve_count: usize,
}

/// Result of a successful synchronization run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Mode the run used
    pub mode: SyncMode,
    /// Whether the store had no dataset before this run
    pub store_initialized: bool,
    /// Digest of the dataset the run started from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_digest: Option<ContentDigest>,
    /// Verified artifacts, in catalog order
    pub artifacts: Vec<ArtifactSummary>,
    /// Number of CVE entries in the merged dataset
    pub cve_count: usize,
    /// Final state (always [`SyncState::Reconciled`])
    pub state: SyncState,
}
