//! # Remote Store Interface
//!
//! The trait seam between the engine and the authoritative remote store,
//! plus the amount codec collaborator.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Remote Store Contract                              │
//! │                                                                         │
//! │  subscribe_collection(spec) ─► stream of FULL-collection snapshots     │
//! │                                (complete result sets, never deltas)     │
//! │  write_record(collection, raw) ─► ack | error                          │
//! │  delete_record(collection, id) ─► ack | error                          │
//! │  read_record(collection, id)   ─► record | absent                      │
//! │                                                                         │
//! │  The reconciler's merge rule assumes snapshot COMPLETENESS. A remote   │
//! │  store that only offers deltas needs an adapter materializing a full   │
//! │  view before events reach the engine.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

use tally_core::{CollectionSpec, Money, RawRecord, Record};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Remote Events
// =============================================================================

/// Events delivered on a collection subscription.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// The entire current collection, re-sent on every remote change.
    Snapshot(Vec<RawRecord>),

    /// Transport failure. The subscription stream is considered dead after
    /// this; the listener degrades to the cache and resubscribes with
    /// backoff.
    TransportError(String),
}

// =============================================================================
// Remote Store Trait
// =============================================================================

/// The authoritative remote store, consumed only through this interface.
///
/// Implemented by the application's store adapter; the engine never knows
/// the concrete wire transport. Methods return boxed futures so the engine
/// can hold the store as a trait object behind `Arc`.
pub trait RemoteStore: Send + Sync {
    /// Subscribes to a collection. The receiver yields a full-collection
    /// snapshot on every remote change; a closed channel means the
    /// transport dropped the subscription.
    fn subscribe_collection<'a>(
        &'a self,
        spec: &'a CollectionSpec,
    ) -> BoxFuture<'a, EngineResult<mpsc::Receiver<RemoteEvent>>>;

    /// Writes a record in wire form.
    fn write_record<'a>(
        &'a self,
        collection: &'a str,
        record: &'a RawRecord,
    ) -> BoxFuture<'a, EngineResult<()>>;

    /// Deletes a record by id.
    fn delete_record<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, EngineResult<()>>;

    /// Reads a single record by id.
    fn read_record<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, EngineResult<Option<RawRecord>>>;
}

// =============================================================================
// Amount Codec
// =============================================================================

/// Encodes and decodes the remotely-stored amount field.
///
/// The remote store holds amounts in an encoded string form (the encoding
/// scheme is an external collaborator's concern). Decode must be treated as
/// fallible but tolerable: the listener substitutes `Money::zero()` for a
/// record whose amount fails to decode and never surfaces the error upward.
pub trait AmountCodec: Send + Sync {
    /// Encodes an amount in cents into the remote wire form.
    fn encode_amount(&self, cents: i64) -> String;

    /// Decodes a remote wire amount into cents.
    fn decode_amount(&self, encoded: &str) -> EngineResult<i64>;
}

/// Codec for remote stores that keep amounts as plain decimal strings.
///
/// An empty field decodes to zero, matching collections without a monetary
/// dimension.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCodec;

impl AmountCodec for PlainCodec {
    fn encode_amount(&self, cents: i64) -> String {
        cents.to_string()
    }

    fn decode_amount(&self, encoded: &str) -> EngineResult<i64> {
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }

        trimmed.parse::<i64>().map_err(|e| EngineError::DecodeFailed {
            record_id: String::new(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Record Encode/Decode
// =============================================================================

/// Encodes a decoded record into wire form for a remote write.
pub fn encode_record(record: &Record, codec: &dyn AmountCodec) -> RawRecord {
    RawRecord {
        id: record.id.clone(),
        owner_id: record.owner_id.clone(),
        name: record.name.clone(),
        amount: codec.encode_amount(record.amount.cents()),
        occurred_at: record.occurred_at.to_rfc3339(),
        payload: record.payload.clone(),
    }
}

/// Decodes a wire record into domain form.
///
/// Tolerant by contract: a malformed amount becomes zero and a malformed
/// timestamp becomes the Unix epoch. Neither failure aborts the snapshot
/// the record arrived in, and neither is surfaced upward.
pub fn decode_record(raw: &RawRecord, codec: &dyn AmountCodec) -> Record {
    let amount = match codec.decode_amount(&raw.amount) {
        Ok(cents) => Money::from_cents(cents),
        Err(e) => {
            debug!(record_id = %raw.id, error = %e, "Amount decode failed, substituting zero");
            Money::zero()
        }
    };

    let occurred_at = chrono::DateTime::parse_from_rfc3339(&raw.occurred_at)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_default();

    Record {
        id: raw.id.clone(),
        owner_id: raw.owner_id.clone(),
        name: raw.name.clone(),
        amount,
        occurred_at,
        payload: raw.payload.clone(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_codec_round_trip() {
        let codec = PlainCodec;
        assert_eq!(codec.decode_amount(&codec.encode_amount(-4500)).unwrap(), -4500);
        assert_eq!(codec.decode_amount("").unwrap(), 0);
        assert_eq!(codec.decode_amount(" 12 ").unwrap(), 12);
        assert!(codec.decode_amount("garbage").is_err());
    }

    #[test]
    fn test_encode_record() {
        let record = Record::new("Rent", Money::from_cents(-120_000)).with_owner("alice");
        let raw = encode_record(&record, &PlainCodec);

        assert_eq!(raw.id, record.id);
        assert_eq!(raw.owner_id.as_deref(), Some("alice"));
        assert_eq!(raw.amount, "-120000");
    }

    #[test]
    fn test_decode_record_round_trip() {
        let record = Record::new("Rent", Money::from_cents(-120_000));
        let raw = encode_record(&record, &PlainCodec);
        let back = decode_record(&raw, &PlainCodec);

        assert_eq!(back.id, record.id);
        assert_eq!(back.amount, record.amount);
        assert_eq!(
            back.occurred_at.timestamp_millis(),
            record.occurred_at.timestamp_millis()
        );
    }

    #[test]
    fn test_decode_tolerates_malformed_amount() {
        let raw = RawRecord {
            id: "r1".into(),
            owner_id: None,
            name: "Mangled".into(),
            amount: "not-a-number".into(),
            occurred_at: chrono::Utc::now().to_rfc3339(),
            payload: serde_json::Value::Null,
        };

        let decoded = decode_record(&raw, &PlainCodec);
        assert_eq!(decoded.amount, Money::zero());
        assert_eq!(decoded.name, "Mangled");
    }

    #[test]
    fn test_decode_tolerates_malformed_timestamp() {
        let raw = RawRecord {
            id: "r1".into(),
            owner_id: None,
            name: "Odd".into(),
            amount: "100".into(),
            occurred_at: "yesterday-ish".into(),
            payload: serde_json::Value::Null,
        };

        let decoded = decode_record(&raw, &PlainCodec);
        assert_eq!(decoded.occurred_at, chrono::DateTime::<chrono::Utc>::default());
        assert_eq!(decoded.amount.cents(), 100);
    }
}
