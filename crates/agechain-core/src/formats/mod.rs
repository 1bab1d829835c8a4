//! # Formats
//!
//! Byte-level encodings of chain results. File I/O stays in the app layer.

mod snapshot;

pub use snapshot::{
    ChainSnapshot, MAX_SNAPSHOT_SIZE, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes,
};
