//! # Chain Snapshot Format
//!
//! Binary encoding of a finished (or stopped) chain so metrics can be
//! re-extracted later without solving again.
//!
//! Format: Header (5 bytes) + postcard payload.
//! - 4 bytes: Magic ("ACHN")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded. Decoded
//! solutions are re-validated and the store is rebuilt through
//! [`SolutionStore::push`], so lineage rules hold for loaded data too.

use crate::ChainError;
use crate::chain::{ChainOutcome, ChainStatus, CycleChain};
use crate::primitives;
use crate::report::{ChainReport, RoleSummary};
use crate::store::{SolutionStore, StoredSolution};
use serde::{Deserialize, Serialize};

/// Largest snapshot accepted for decoding.
pub const MAX_SNAPSHOT_SIZE: usize = 1024 * 1024 * 1024; // 1 GB

const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// Header preceding the snapshot payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SnapshotHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Reject foreign files and unknown versions.
    pub fn validate(&self) -> Result<(), ChainError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(ChainError::DeserializationError(
                "not a chain snapshot (bad magic bytes)".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(ChainError::DeserializationError(format!(
                "unsupported snapshot version {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Encode the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let [a, b, c, d] = self.magic;
        [a, b, c, d, self.version]
    }

    /// Decode a header from the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        match bytes {
            [a, b, c, d, version, ..] => Ok(Self {
                magic: [*a, *b, *c, *d],
                version: *version,
            }),
            _ => Err(ChainError::DeserializationError(
                "snapshot header too short".to_string(),
            )),
        }
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// Everything needed to rebuild a chain's store and report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Chain name.
    pub name: String,
    /// Engine that produced the solutions.
    pub engine: String,
    /// Repetitions requested.
    pub repetitions: usize,
    /// Roles with their expected cycle counts.
    pub roles: Vec<RoleSummary>,
    /// Stored solutions, in solve order.
    pub entries: Vec<StoredSolution>,
    /// Completion or stop marker.
    pub status: ChainStatus,
}

impl ChainSnapshot {
    /// Capture a run.
    #[must_use]
    pub fn capture(
        name: impl Into<String>,
        engine: impl Into<String>,
        chain: &CycleChain,
        outcome: &ChainOutcome,
    ) -> Self {
        Self {
            name: name.into(),
            engine: engine.into(),
            repetitions: chain.repetitions(),
            roles: RoleSummary::of_chain(chain),
            entries: outcome.store.iter().cloned().collect(),
            status: outcome.status.clone(),
        }
    }

    /// Rebuild the store, re-checking every entry.
    pub fn to_store(&self) -> Result<SolutionStore, ChainError> {
        let mut store = SolutionStore::new();
        for entry in &self.entries {
            if !self.roles.iter().any(|r| r.label == entry.key.role) {
                return Err(ChainError::RoleNotFound(entry.key.role.clone()));
            }
            if entry.key.repetition >= self.repetitions {
                return Err(ChainError::InvalidChain(format!(
                    "{} lies beyond {} repetitions",
                    entry.key, self.repetitions
                )));
            }
            entry.solution.validate().map_err(|e| e.at(&entry.key))?;
            store.push(entry.clone())?;
        }
        Ok(store)
    }

    /// Report for the captured run, without metrics.
    pub fn report(&self) -> Result<ChainReport, ChainError> {
        let store = self.to_store()?;
        Ok(ChainReport::new(
            self.name.clone(),
            self.engine.clone(),
            self.repetitions,
            self.roles.clone(),
            &store,
            self.status.clone(),
        ))
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Encode a snapshot (header + payload).
pub fn snapshot_to_bytes(snapshot: &ChainSnapshot) -> Result<Vec<u8>, ChainError> {
    let payload = postcard::to_stdvec(snapshot)
        .map_err(|e| ChainError::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&SnapshotHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a snapshot.
///
/// Size and header are checked before any payload decoding.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<ChainSnapshot, ChainError> {
    if bytes.len() > MAX_SNAPSHOT_SIZE {
        return Err(ChainError::DeserializationError(format!(
            "snapshot of {} bytes exceeds the maximum of {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_SIZE
        )));
    }

    let header = SnapshotHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = bytes.get(HEADER_SIZE..).unwrap_or_default();
    postcard::from_bytes(payload).map_err(|e| {
        ChainError::DeserializationError(format!("failed to decode snapshot payload: {}", e))
    })
}

// =============================================================================
// TESTS
// =============================================================================
