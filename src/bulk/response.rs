//! Per-chunk outcomes and their fold into the aggregate bulk response.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use super::{InvalidRecord, LOCAL_FAILURE_CODE};

/// Outcome of one dispatched chunk. Chunks never report mixed outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Success,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkStatus {
    Success,
    Partial,
    Fail,
}

impl BulkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BulkStatus::Success => "success",
            BulkStatus::Partial => "partial",
            BulkStatus::Fail => "fail",
        }
    }

    /// Fold a chunk outcome into the current aggregate status.
    pub fn merge(current: Option<BulkStatus>, chunk: ChunkStatus) -> BulkStatus {
        match (current, chunk) {
            (None, ChunkStatus::Success) => BulkStatus::Success,
            (None, ChunkStatus::Fail) => BulkStatus::Fail,
            (Some(BulkStatus::Partial), _) => BulkStatus::Partial,
            (Some(BulkStatus::Success), ChunkStatus::Success) => BulkStatus::Success,
            (Some(BulkStatus::Fail), ChunkStatus::Fail) => BulkStatus::Fail,
            (Some(BulkStatus::Success), ChunkStatus::Fail)
            | (Some(BulkStatus::Fail), ChunkStatus::Success) => BulkStatus::Partial,
        }
    }
}

impl fmt::Display for BulkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRecord {
    pub record: Value,
    pub error: String,
    pub code: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkResult {
    pub status: ChunkStatus,
    pub status_code: u16,
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub failed_records: Vec<FailedRecord>,
}

impl ChunkResult {
    pub fn success(total: usize, status_code: u16) -> Self {
        Self {
            status: ChunkStatus::Success,
            status_code,
            total,
            success_count: total,
            failure_count: 0,
            failed_records: Vec::new(),
        }
    }

    /// Result used when nothing at all was submitted.
    pub fn empty_success() -> Self {
        Self::success(0, 200)
    }

    /// Every record in the chunk failed with the same code and message.
    pub fn failure(records: Vec<Map<String, Value>>, status_code: u16, error: &str) -> Self {
        let failed_records: Vec<FailedRecord> = records
            .into_iter()
            .map(|record| FailedRecord {
                record: Value::Object(record),
                error: error.to_string(),
                code: status_code,
            })
            .collect();
        let total = failed_records.len();
        Self {
            status: ChunkStatus::Fail,
            status_code,
            total,
            success_count: 0,
            failure_count: total,
            failed_records,
        }
    }

    /// Synthetic result for records rejected before dispatch.
    pub fn from_invalid(invalid: Vec<InvalidRecord>) -> Self {
        let failed_records: Vec<FailedRecord> = invalid.into_iter().map(Into::into).collect();
        let total = failed_records.len();
        Self {
            status: ChunkStatus::Fail,
            status_code: LOCAL_FAILURE_CODE,
            total,
            success_count: 0,
            failure_count: total,
            failed_records,
        }
    }
}

fn serialize_status<S: Serializer>(
    status: &Option<BulkStatus>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(status.map(BulkStatus::as_str).unwrap_or(""))
}

/// Aggregate outcome of a bulk call.
///
/// `total == success_count + failure_count` holds after every merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkResponse {
    #[serde(serialize_with = "serialize_status")]
    pub status: Option<BulkStatus>,
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub failed_records: Vec<FailedRecord>,
    pub warnings: Vec<String>,
}

impl BulkResponse {
    pub fn merge_chunk(&mut self, chunk: ChunkResult) {
        self.status = Some(BulkStatus::merge(self.status, chunk.status));
        self.total += chunk.total;
        self.success_count += chunk.success_count;
        self.failure_count += chunk.failure_count;
        self.failed_records.extend(chunk.failed_records);
    }

    /// Status as the provider names it; empty until the first merge.
    pub fn status_str(&self) -> &'static str {
        self.status.map(BulkStatus::as_str).unwrap_or("")
    }
}

impl fmt::Display for BulkResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BulkResponse<status: {} | total: {} | success: {} | failure: {} | warnings: {}>",
            self.status_str(),
            self.total,
            self.success_count,
            self.failure_count,
            self.warnings.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> Map<String, Value> {
        json!({ "distinct_id": id }).as_object().cloned().unwrap()
    }

    #[test]
    fn status_lattice() {
        use BulkStatus::*;
        use ChunkStatus as C;

        assert_eq!(BulkStatus::merge(None, C::Success), Success);
        assert_eq!(BulkStatus::merge(None, C::Fail), Fail);
        assert_eq!(BulkStatus::merge(Some(Success), C::Success), Success);
        assert_eq!(BulkStatus::merge(Some(Fail), C::Fail), Fail);
        assert_eq!(BulkStatus::merge(Some(Fail), C::Success), Partial);
        assert_eq!(BulkStatus::merge(Some(Success), C::Fail), Partial);
        assert_eq!(BulkStatus::merge(Some(Partial), C::Fail), Partial);
        assert_eq!(BulkStatus::merge(Some(Partial), C::Success), Partial);
    }

    #[test]
    fn merge_keeps_totals_consistent() {
        let mut response = BulkResponse::default();
        assert_eq!(response.status_str(), "");

        response.merge_chunk(ChunkResult::success(3, 202));
        response.merge_chunk(ChunkResult::failure(
            vec![record("a"), record("b")],
            503,
            "unavailable",
        ));

        assert_eq!(response.status, Some(BulkStatus::Partial));
        assert_eq!(response.total, 5);
        assert_eq!(response.success_count, 3);
        assert_eq!(response.failure_count, 2);
        assert_eq!(response.total, response.success_count + response.failure_count);
        assert!(response.failed_records.iter().all(|f| f.code == 503));
    }

    #[test]
    fn invalid_records_become_local_failures() {
        let result = ChunkResult::from_invalid(vec![InvalidRecord::new(json!({}), "bad")]);
        assert_eq!(result.status, ChunkStatus::Fail);
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.failed_records[0].code, 500);
        assert_eq!(result.failed_records[0].error, "bad");
    }

    #[test]
    fn serializes_unset_status_as_empty_string() {
        let value = serde_json::to_value(BulkResponse::default()).unwrap();
        assert_eq!(value["status"], "");

        let mut response = BulkResponse::default();
        response.merge_chunk(ChunkResult::empty_success());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["total"], 0);
    }
}
