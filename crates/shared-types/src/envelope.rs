//! # `BusEvent` Envelope
//!
//! The versioned wire representation of an [`Event`](crate::Event), used
//! both for the on-disk replay log and for the socket transport.
//!
//! ## Properties
//!
//! - **Versioning**: every envelope carries a `version` checked on decode.
//! - **Reversible id**: `id` is `"<blockNr>-<sequence>"` and splits back into
//!   both numbers on the last `-`, so negative block numbers survive.
//! - **Opaque payload**: the per-type body is carried as bytes; the bus never
//!   inspects it.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

use crate::errors::{BusError, BusResult};
use crate::event::EventType;

/// Current envelope version.
pub const BUS_EVENT_VERSION: u32 = 1;

/// Serialized, versioned form of an event.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Envelope version, MUST equal [`BUS_EVENT_VERSION`].
    pub version: u32,
    /// `"<blockNr>-<sequence>"`.
    pub id: String,
    /// Event type tag.
    pub kind: EventType,
    /// Trace id of the block that produced the event.
    pub block: String,
    pub chain_id: String,
    pub tx_hash: String,
    /// Type-specific body.
    #[serde_as(as = "Bytes")]
    pub payload: Vec<u8>,
}

impl BusEvent {
    /// Serialize to the binary wire format.
    pub fn encode(&self) -> BusResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| BusError::Codec(e.to_string()))
    }

    /// Deserialize from the binary wire format and check the version.
    pub fn decode(bytes: &[u8]) -> BusResult<Self> {
        let bus_event: Self =
            bincode::deserialize(bytes).map_err(|e| BusError::Codec(e.to_string()))?;
        if bus_event.version != BUS_EVENT_VERSION {
            return Err(BusError::UnsupportedVersion {
                received: bus_event.version,
                supported: BUS_EVENT_VERSION,
            });
        }
        Ok(bus_event)
    }

    /// Split `id` back into `(block_nr, sequence)`.
    pub fn parse_id(&self) -> BusResult<(i64, u64)> {
        let invalid = || BusError::InvalidEventId(self.id.clone());
        let (block, sequence) = self.id.rsplit_once('-').ok_or_else(invalid)?;
        let block_nr = block.parse::<i64>().map_err(|_| invalid())?;
        let sequence = sequence.parse::<u64>().map_err(|_| invalid())?;
        Ok((block_nr, sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(id: &str) -> BusEvent {
        BusEvent {
            version: BUS_EVENT_VERSION,
            id: id.to_string(),
            kind: EventType::Order,
            block: "b1".to_string(),
            chain_id: "chain".to_string(),
            tx_hash: String::new(),
            payload: vec![9, 9],
        }
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(envelope("12-4").parse_id().unwrap(), (12, 4));
        assert_eq!(envelope("-5-3").parse_id().unwrap(), (-5, 3));
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(matches!(
            envelope("12").parse_id(),
            Err(BusError::InvalidEventId(_))
        ));
        assert!(matches!(
            envelope("x-4").parse_id(),
            Err(BusError::InvalidEventId(_))
        ));
        assert!(matches!(
            envelope("12-y").parse_id(),
            Err(BusError::InvalidEventId(_))
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut bus_event = envelope("1-1");
        bus_event.version = BUS_EVENT_VERSION + 1;
        let bytes = bincode::serialize(&bus_event).unwrap();

        let err = BusEvent::decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            BusError::UnsupportedVersion {
                received: BUS_EVENT_VERSION + 1,
                supported: BUS_EVENT_VERSION
            }
        );
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            BusEvent::decode(&[0xFF, 0x01]),
            Err(BusError::Codec(_))
        ));
    }
}
