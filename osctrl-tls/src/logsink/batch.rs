//! Single-record "uniq" extraction for log batches (spec.md §9's "ad-hoc
//! uniq on log batches" design note, resolved per SPEC_FULL.md §9: mixed
//! batches are malformed).
//!
//! The source scans every record in a batch, deduplicates each metadata
//! field's values, and uses the first element. This reimplements that as a
//! single forward scan that keeps the first non-empty value per field and
//! rejects a batch whose records disagree.

use serde_json::Value;

/// Metadata picked out of a log batch by scanning its records in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchIdentity {
    pub host_uuid: Option<String>,
}

/// A batch carried more than one distinct, non-empty host UUID across its
/// records. Per the open question in spec.md §9, this is treated as
/// malformed rather than legal multi-host submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixedBatchIdentity;

/// Extracts the batch's identity metadata. `data` is expected to be a JSON
/// array of osquery log records; a non-array payload (or one with no
/// identity-bearing fields) yields an empty [`BatchIdentity`] rather than an
/// error — only a genuine disagreement between records is malformed.
pub fn extract_identity(data: &Value) -> Result<BatchIdentity, MixedBatchIdentity> {
    let Some(records) = data.as_array() else {
        return Ok(BatchIdentity::default());
    };

    let mut host_uuid: Option<String> = None;
    for record in records {
        let Some(uuid) = record_host_uuid(record) else {
            continue;
        };
        match &host_uuid {
            None => host_uuid = Some(uuid),
            Some(existing) if *existing == uuid => {}
            Some(_) => return Err(MixedBatchIdentity),
        }
    }
    Ok(BatchIdentity { host_uuid })
}

fn record_host_uuid(record: &Value) -> Option<String> {
    record
        .get("hostIdentifier")
        .or_else(|| record.get("host_uuid"))
        .or_else(|| record.pointer("/decorations/host_uuid"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_first_non_empty_value_when_records_agree() {
        let data = json!([
            {"hostIdentifier": "HOST-1", "columns": {}},
            {"hostIdentifier": "HOST-1", "columns": {}},
        ]);
        assert_eq!(
            extract_identity(&data).unwrap(),
            BatchIdentity {
                host_uuid: Some("HOST-1".into())
            }
        );
    }

    #[test]
    fn ignores_records_with_no_identity_field() {
        let data = json!([{"columns": {}}, {"hostIdentifier": "HOST-1"}]);
        assert_eq!(
            extract_identity(&data).unwrap().host_uuid,
            Some("HOST-1".into())
        );
    }

    #[test]
    fn rejects_a_batch_with_disagreeing_host_uuids() {
        let data = json!([
            {"hostIdentifier": "HOST-1"},
            {"hostIdentifier": "HOST-2"},
        ]);
        assert_eq!(extract_identity(&data), Err(MixedBatchIdentity));
    }

    #[test]
    fn non_array_payload_yields_empty_identity() {
        assert_eq!(extract_identity(&json!({"a": 1})).unwrap(), BatchIdentity::default());
    }
}
