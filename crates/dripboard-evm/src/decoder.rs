//! Decoder for the streaming contract's leaderboard events.
//!
//! Classification is three-way and never aborts a batch:
//! - `Matched`: topic0 is a known event and the payload decoded cleanly.
//! - `Skipped`: topic0 belongs to some other event (or the log is anonymous).
//! - `DecodeError`: topic0 matched but topics or data are malformed.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::U256;
use tiny_keccak::{Hasher, Keccak};

use dripboard_core::types::{DecodedEvent, StreamEvent};

use crate::fetcher::RawLog;

pub const STREAM_CREATED_SIGNATURE: &str =
    "StreamCreated(uint256,address,address[],address,uint256,uint256,uint256,string,string)";
pub const STREAM_WITHDRAWN_SIGNATURE: &str = "StreamWithdrawn(uint256,address,uint256)";

/// Compute the keccak256 of a canonical event signature.
pub fn keccak256_signature(signature: &str) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut out = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut out);
    out
}

/// The `0x`-prefixed topic0 of an event signature.
pub fn topic0(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256_signature(signature)))
}

/// Result of classifying one raw log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Matched(DecodedEvent),
    Skipped,
    DecodeError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Created,
    Withdrawn,
}

/// Matches raw logs against the event catalogue.
pub struct EventDecoder {
    created_topic: String,
    withdrawn_topic: String,
    // Non-indexed parameters, in declaration order.
    created_data: DynSolType,
    withdrawn_data: DynSolType,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self {
            created_topic: topic0(STREAM_CREATED_SIGNATURE),
            withdrawn_topic: topic0(STREAM_WITHDRAWN_SIGNATURE),
            // recipients, token, deposit, startTime, endTime, title, description
            created_data: DynSolType::Tuple(vec![
                DynSolType::Array(Box::new(DynSolType::Address)),
                DynSolType::Address,
                DynSolType::Uint(256),
                DynSolType::Uint(256),
                DynSolType::Uint(256),
                DynSolType::String,
                DynSolType::String,
            ]),
            // amount
            withdrawn_data: DynSolType::Tuple(vec![DynSolType::Uint(256)]),
        }
    }

    pub fn created_topic(&self) -> &str {
        &self.created_topic
    }

    pub fn withdrawn_topic(&self) -> &str {
        &self.withdrawn_topic
    }

    /// Classify a log fetched from `source`.
    pub fn decode(&self, source: &str, log: &RawLog) -> DecodeOutcome {
        let Some(t0) = log.topics.first() else {
            return DecodeOutcome::Skipped;
        };
        let kind = if t0.eq_ignore_ascii_case(&self.created_topic) {
            Kind::Created
        } else if t0.eq_ignore_ascii_case(&self.withdrawn_topic) {
            Kind::Withdrawn
        } else {
            return DecodeOutcome::Skipped;
        };

        match self.decode_matched(kind, source, log) {
            Ok(event) => DecodeOutcome::Matched(event),
            Err(reason) => DecodeOutcome::DecodeError(reason),
        }
    }

    fn decode_matched(&self, kind: Kind, source: &str, log: &RawLog) -> Result<DecodedEvent, String> {
        let block_number = log
            .block_number_u64()
            .ok_or_else(|| "missing or invalid blockNumber".to_string())?;
        let log_index = log
            .log_index_u64()
            .ok_or_else(|| "missing or invalid logIndex".to_string())?;

        // topics: [sig, streamId, subject]
        let subject_topic = log
            .topics
            .get(2)
            .ok_or_else(|| format!("expected 3 topics, got {}", log.topics.len()))?;
        let subject = address_from_topic(subject_topic)?;

        let data = decode_hex(&log.data)?;
        let event = match kind {
            Kind::Created => {
                let deposit = uint_param(&self.created_data, &data, 2)?;
                StreamEvent::StreamCreated {
                    sender: subject,
                    deposit,
                }
            }
            Kind::Withdrawn => {
                let amount = uint_param(&self.withdrawn_data, &data, 0)?;
                StreamEvent::StreamWithdrawn {
                    recipient: subject,
                    amount,
                }
            }
        };

        Ok(DecodedEvent {
            event,
            source: source.to_string(),
            block_number,
            log_index,
            tx_hash: log.transaction_hash.clone().unwrap_or_default(),
        })
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| format!("invalid hex: {e}"))
}

/// An indexed address occupies the low 20 bytes of a 32-byte topic.
fn address_from_topic(topic: &str) -> Result<String, String> {
    let bytes = decode_hex(topic)?;
    if bytes.len() != 32 {
        return Err(format!("topic is {} bytes, expected 32", bytes.len()));
    }
    if bytes[..12].iter().any(|b| *b != 0) {
        return Err(format!("topic {topic} is not a padded address"));
    }
    Ok(format!("0x{}", hex::encode(&bytes[12..])))
}

fn uint_param(ty: &DynSolType, data: &[u8], index: usize) -> Result<U256, String> {
    let decoded = ty
        .abi_decode_params(data)
        .map_err(|e| format!("ABI decode failed: {e}"))?;
    let values = match decoded {
        DynSolValue::Tuple(vals) => vals,
        other => vec![other],
    };
    values
        .get(index)
        .and_then(DynSolValue::as_uint)
        .map(|(v, _)| v)
        .ok_or_else(|| format!("parameter {index} is not a uint"))
}
