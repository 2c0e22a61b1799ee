//! Durable retry envelopes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hash::sha256_hex;
use crate::record::Record;

/// A failed write waiting for replay.
///
/// `payload_hash` is the SHA-256 of `payload_json` and deduplicates
/// enqueues of the same payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryQueueItem {
    pub id: i64,
    pub payload_type: String,
    pub payload_json: String,
    pub payload_hash: String,
    pub attempt_count: i64,
    pub created_on_utc: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl RetryQueueItem {
    /// Wrap a record in a fresh envelope (not yet stored, `id == 0`)
    pub fn wrap<R: Record>(record: &R) -> Result<Self> {
        let payload_json = serde_json::to_string(record)?;
        Ok(Self {
            id: 0,
            payload_type: R::TYPE_TAG.to_string(),
            payload_hash: sha256_hex(&payload_json),
            payload_json,
            attempt_count: 0,
            created_on_utc: Utc::now(),
            last_error: None,
        })
    }

    /// Rebuild the payload; the caller picks `R` from `payload_type`
    pub fn unwrap_payload<R: Record>(&self) -> Result<R> {
        Ok(serde_json::from_str(&self.payload_json)?)
    }

    pub fn is_type<R: Record>(&self) -> bool {
        self.payload_type == R::TYPE_TAG
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::{InputVector, MachineEvent, PatternMapping};

    #[test]
    fn test_wrap_tags_and_hashes_payload() {
        let event = MachineEvent::from_inputs(1, &InputVector::new(vec![true; 9]), Some(2));
        let item = RetryQueueItem::wrap(&event).unwrap();

        assert_eq!(item.payload_type, "MachineEvent");
        assert_eq!(item.attempt_count, 0);
        assert_eq!(item.payload_hash, sha256_hex(&item.payload_json));
        assert!(item.is_type::<MachineEvent>());
        assert!(!item.is_type::<PatternMapping>());

        let back: MachineEvent = item.unwrap_payload().unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_identical_payloads_share_hash() {
        let mapping = PatternMapping::default();
        let a = RetryQueueItem::wrap(&mapping).unwrap();
        let b = RetryQueueItem::wrap(&mapping.clone()).unwrap();
        assert_eq!(a.payload_hash, b.payload_hash);
    }
}
