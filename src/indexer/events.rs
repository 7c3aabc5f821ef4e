//! Event Decoder
//!
//! ABI-level parse of the three shielded pool event kinds out of raw
//! logs, matched by topic signature. Unknown events are reported as
//! decode errors; callers log and skip them.

use alloy_primitives::B256;
use alloy_sol_types::SolEvent;
use thiserror::Error;

use crate::abi::ShieldedPool;
use crate::chain::Log;

/// Decode errors. Never fatal: a malformed or unknown log is skipped
/// with a warning.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log has no topics")]
    MissingTopics,

    #[error("unknown event topic {0}")]
    UnknownEvent(B256),

    #[error("malformed {event} event: {source}")]
    Malformed {
        event: &'static str,
        source: alloy_sol_types::Error,
    },
}

/// A decoded shielded pool event.
#[derive(Debug)]
pub enum PoolEvent {
    Shield(ShieldedPool::Shield),
    Transact(ShieldedPool::Transact),
    Nullified(ShieldedPool::Nullified),
}

/// Decode one raw log into a tagged event.
pub fn decode_log(log: &Log) -> Result<PoolEvent, DecodeError> {
    let topic0 = log.topics.first().ok_or(DecodeError::MissingTopics)?;

    if *topic0 == ShieldedPool::Shield::SIGNATURE_HASH {
        ShieldedPool::Shield::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map(PoolEvent::Shield)
            .map_err(|source| DecodeError::Malformed {
                event: "Shield",
                source,
            })
    } else if *topic0 == ShieldedPool::Transact::SIGNATURE_HASH {
        ShieldedPool::Transact::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map(PoolEvent::Transact)
            .map_err(|source| DecodeError::Malformed {
                event: "Transact",
                source,
            })
    } else if *topic0 == ShieldedPool::Nullified::SIGNATURE_HASH {
        ShieldedPool::Nullified::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map(PoolEvent::Nullified)
            .map_err(|source| DecodeError::Malformed {
                event: "Nullified",
                source,
            })
    } else {
        Err(DecodeError::UnknownEvent(*topic0))
    }
}
