//! Bulk submission: size estimation, chunk packing, dispatch and result merging.
//!
//! 1. **Validation** - every appended record is canonicalized by its
//!    [`BulkRecord`] implementation into a [`PendingRecord`] or an
//!    [`InvalidRecord`].
//! 2. **Packing** (`chunk`) - pending records are packed greedily, in order,
//!    into chunks bounded by record count and apparent byte size.
//! 3. **Dispatch** (`coordinator`) - chunks are sent one at a time; a failed
//!    chunk never stops later ones.
//! 4. **Aggregation** (`response`) - chunk outcomes fold into one
//!    [`BulkResponse`].

pub mod chunk;
pub mod coordinator;
pub mod response;
pub mod size;

pub use chunk::Chunk;
pub use coordinator::{BulkCoordinator, BulkRecord, chunkify};
pub use response::{BulkResponse, BulkStatus, ChunkResult, ChunkStatus, FailedRecord};
pub use size::{estimate_size, json_size};

use crate::config::BulkLimits;
use serde_json::{Map, Value};

/// Status code recorded for failures that never reached the provider.
pub const LOCAL_FAILURE_CODE: u16 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Workflow,
    Event,
    IdentityEdit,
}

impl RecordKind {
    /// Top level key whose object may carry `$attachments`.
    pub fn attachment_section(self) -> Option<&'static str> {
        match self {
            RecordKind::Workflow => Some("data"),
            RecordKind::Event => Some("properties"),
            RecordKind::IdentityEdit => None,
        }
    }

    pub fn max_records_per_chunk(self, limits: &BulkLimits) -> usize {
        match self {
            RecordKind::Workflow | RecordKind::Event => limits.max_records_per_chunk,
            RecordKind::IdentityEdit => limits.max_identity_records_per_chunk,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RecordKind::Workflow => "workflow",
            RecordKind::Event => "event",
            RecordKind::IdentityEdit => "user_edit",
        }
    }
}

/// A validated record waiting to be packed into a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub body: Map<String, Value>,
    pub apparent_size: usize,
}

/// A record rejected before any network call.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRecord {
    pub record: Value,
    pub error: String,
    pub code: u16,
}

impl InvalidRecord {
    pub fn new(record: Value, error: impl Into<String>) -> Self {
        Self {
            record,
            error: error.into(),
            code: LOCAL_FAILURE_CODE,
        }
    }
}

impl From<InvalidRecord> for FailedRecord {
    fn from(invalid: InvalidRecord) -> Self {
        FailedRecord {
            record: invalid.record,
            error: invalid.error,
            code: invalid.code,
        }
    }
}
