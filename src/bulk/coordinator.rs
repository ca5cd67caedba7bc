//! Validation, greedy packing and sequential dispatch of one bulk call.

use serde_json::Value;

use super::chunk::Chunk;
use super::response::{BulkResponse, ChunkResult};
use super::{InvalidRecord, PendingRecord, RecordKind};
use crate::client::Client;
use crate::config::{BulkLimits, human_size};
use crate::error::RecordError;
use crate::records::ValidationContext;

/// A domain object that can be submitted in bulk.
pub trait BulkRecord: Clone + Send + Sync {
    const KIND: RecordKind;

    /// Canonicalize into a body plus its apparent size.
    ///
    /// Non-fatal issues go into `warnings` whether or not validation succeeds.
    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        is_part_of_bulk: bool,
        warnings: &mut Vec<String>,
    ) -> Result<PendingRecord, RecordError>;

    /// Best-effort JSON rendering used when reporting a failed record.
    fn raw_json(&self) -> Value;
}

/// Greedily pack `pending` into chunks, preserving order.
///
/// A record that does not fit even an empty chunk is returned as invalid
/// instead of being dropped.
pub fn chunkify(
    kind: RecordKind,
    limits: &BulkLimits,
    pending: Vec<PendingRecord>,
) -> (Vec<Chunk>, Vec<InvalidRecord>) {
    let mut chunks = Vec::new();
    let mut rejected = Vec::new();
    let mut current = Chunk::new(kind, limits);

    for record in pending {
        let Err(record) = current.try_add(record) else {
            continue;
        };

        let full = std::mem::replace(&mut current, Chunk::new(kind, limits));
        if !full.is_empty() {
            chunks.push(full);
        }

        if let Err(record) = current.try_add(record) {
            let error = format!(
                "{} record of {} Bytes does not fit in a chunk of {}",
                kind.label(),
                record.apparent_size,
                human_size(limits.max_chunk_size_bytes)
            );
            rejected.push(InvalidRecord::new(Value::Object(record.body), error));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    (chunks, rejected)
}

/// Collects records of one kind and submits them in provider sized chunks.
pub struct BulkCoordinator<'c, R> {
    client: &'c Client,
    records: Vec<R>,
}

impl<'c, R: BulkRecord> BulkCoordinator<'c, R> {
    pub(crate) fn new(client: &'c Client) -> Self {
        Self {
            client,
            records: Vec::new(),
        }
    }

    /// Take ownership of `records`; `None` entries are skipped.
    pub fn append<I>(&mut self, records: I)
    where
        I: IntoIterator,
        I::Item: Into<Option<R>>,
    {
        self.records
            .extend(records.into_iter().filter_map(|record| record.into()));
    }

    /// Copy `records` so the caller can keep mutating its own values.
    pub fn append_cloned(&mut self, records: &[R]) {
        self.records.extend_from_slice(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn validate_all(
        &self,
        warnings: &mut Vec<String>,
    ) -> (Vec<PendingRecord>, Vec<InvalidRecord>) {
        let ctx = self.client.validation_context();
        let mut pending = Vec::with_capacity(self.records.len());
        let mut invalid = Vec::new();

        for record in &self.records {
            match record.validate(&ctx, true, warnings) {
                Ok(valid) => pending.push(valid),
                Err(err) => {
                    log::debug!("{} record failed validation: {}", R::KIND.label(), err);
                    invalid.push(InvalidRecord::new(record.raw_json(), err.message()));
                }
            }
        }
        (pending, invalid)
    }

    /// Validate, pack and send every appended record, one chunk at a time.
    ///
    /// Invalid records are reported together as one failed result. Empty input
    /// yields `status = success, total = 0`.
    pub async fn trigger(self) -> BulkResponse {
        let mut response = BulkResponse::default();
        let (pending, mut invalid) = self.validate_all(&mut response.warnings);
        let (chunks, oversized) = chunkify(R::KIND, self.client.limits(), pending);
        invalid.extend(oversized);

        if chunks.is_empty() && invalid.is_empty() {
            response.merge_chunk(ChunkResult::empty_success());
        }
        if !invalid.is_empty() {
            response.merge_chunk(ChunkResult::from_invalid(invalid));
        }

        let chunk_count = chunks.len();
        for (idx, chunk) in chunks.into_iter().enumerate() {
            log::debug!(
                "triggering {} chunk {}/{}",
                R::KIND.label(),
                idx + 1,
                chunk_count
            );
            let result = chunk.trigger(self.client).await;
            response.merge_chunk(result);
        }

        log::info!(
            "bulk {} finished in {} chunks: {}",
            R::KIND.label(),
            chunk_count,
            response
        );
        response
    }
}

impl<'c> BulkCoordinator<'c, crate::records::UserEdit> {
    /// Alias of [`trigger`](Self::trigger) matching the provider's naming for identity edits.
    pub async fn save(self) -> BulkResponse {
        self.trigger().await
    }
}
