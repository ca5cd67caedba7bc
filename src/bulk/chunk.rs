//! A single provider request: admission under both ceilings, then dispatch.

use serde_json::{Map, Value};

use super::response::ChunkResult;
use super::{LOCAL_FAILURE_CODE, PendingRecord, RecordKind};
use crate::attachment::strip_attachments;
use crate::client::Client;
use crate::config::BulkLimits;

/// One batch of records sent in a single request.
///
/// After every admission `count <= max_count` and `size <= max_size_bytes`.
#[derive(Debug, Clone)]
pub struct Chunk {
    kind: RecordKind,
    max_count: usize,
    max_size_bytes: usize,
    strip_attachments: bool,
    records: Vec<Map<String, Value>>,
    size: usize,
    count: usize,
}

impl Chunk {
    pub fn new(kind: RecordKind, limits: &BulkLimits) -> Self {
        Self {
            kind,
            max_count: kind.max_records_per_chunk(limits),
            max_size_bytes: limits.max_chunk_size_bytes,
            strip_attachments: !limits.allow_attachments_in_bulk,
            records: Vec::new(),
            size: 0,
            count: 0,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn apparent_size(&self) -> usize {
        self.size
    }

    pub fn records(&self) -> &[Map<String, Value>] {
        &self.records
    }

    fn is_full(&self) -> bool {
        self.count >= self.max_count || self.size >= self.max_size_bytes
    }

    /// Admit `record` if both ceilings still hold afterwards.
    ///
    /// A record with an empty body is accepted without touching the chunk. A
    /// rejected record is handed back unchanged.
    pub fn try_add(&mut self, record: PendingRecord) -> Result<(), PendingRecord> {
        if record.body.is_empty() {
            return Ok(());
        }
        if self.is_full() || self.size + record.apparent_size > self.max_size_bytes {
            return Err(record);
        }

        let PendingRecord {
            mut body,
            apparent_size,
        } = record;
        if self.strip_attachments {
            if let Some(section) = self.kind.attachment_section() {
                strip_attachments(&mut body, section);
            }
        }

        self.size += apparent_size;
        self.records.push(body);
        self.count += 1;
        Ok(())
    }

    /// Send every admitted record in one request and convert the outcome.
    pub async fn trigger(self, client: &Client) -> ChunkResult {
        let url = client.endpoint(self.kind);
        log::debug!(
            "dispatching {} chunk: {} records, {} apparent bytes",
            self.kind.label(),
            self.count,
            self.size
        );

        match client.send_json("POST", &url, &self.records).await {
            Ok(response) if response.status >= 400 => {
                log::warn!(
                    "{} chunk of {} records rejected with status {}",
                    self.kind.label(),
                    self.count,
                    response.status
                );
                ChunkResult::failure(self.records, response.status, &response.body)
            }
            Ok(response) => {
                log::debug!(
                    "{} chunk of {} records accepted with status {}",
                    self.kind.label(),
                    self.count,
                    response.status
                );
                ChunkResult::success(self.count, response.status)
            }
            Err(err) => {
                log::error!(
                    "{} chunk of {} records failed: {}",
                    self.kind.label(),
                    self.count,
                    err
                );
                ChunkResult::failure(self.records, LOCAL_FAILURE_CODE, &err.to_string())
            }
        }
    }
}
