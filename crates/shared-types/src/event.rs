//! # Bus Events
//!
//! The in-process representation of a fact produced by the state machine.
//!
//! ## Lifecycle
//!
//! 1. A producer (execution, settlement, governance) creates an [`Event`].
//! 2. The sequencer assigns its block-scoped sequence number exactly once.
//! 3. The event is wrapped in an `Arc` and handed to any number of readers.
//!
//! Readers never mutate an event. The only interior mutability is the
//! once-settable sequence number.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::envelope::{BusEvent, BUS_EVENT_VERSION};
use crate::errors::{BusError, BusResult};

/// Type tag of an event.
///
/// `TimeUpdate` is the block-boundary marker: it is emitted once at the
/// start of every block and is routed to every persistence component
/// regardless of the types it declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    TimeUpdate,
    BeginBlock,
    EndBlock,
    LedgerMovements,
    PositionResolution,
    Order,
    Account,
    Party,
    Trade,
    MarginLevels,
    Proposal,
    Vote,
    MarketData,
    NodeSignature,
    LossSocialization,
    SettlePosition,
    SettleDistressed,
    MarketCreated,
    MarketUpdated,
    MarketTick,
    Asset,
    Auction,
    Deposit,
    Withdrawal,
    Transfer,
    RiskFactor,
    NetworkParameter,
    LiquidityProvision,
    OracleData,
    EpochUpdate,
    Delegation,
    ValidatorUpdate,
    StakeLinking,
    RewardPayout,
    Checkpoint,
    StreamStart,
    TxError,
}

impl EventType {
    /// Every known event type, in declaration order.
    pub const ALL: [EventType; 37] = [
        EventType::TimeUpdate,
        EventType::BeginBlock,
        EventType::EndBlock,
        EventType::LedgerMovements,
        EventType::PositionResolution,
        EventType::Order,
        EventType::Account,
        EventType::Party,
        EventType::Trade,
        EventType::MarginLevels,
        EventType::Proposal,
        EventType::Vote,
        EventType::MarketData,
        EventType::NodeSignature,
        EventType::LossSocialization,
        EventType::SettlePosition,
        EventType::SettleDistressed,
        EventType::MarketCreated,
        EventType::MarketUpdated,
        EventType::MarketTick,
        EventType::Asset,
        EventType::Auction,
        EventType::Deposit,
        EventType::Withdrawal,
        EventType::Transfer,
        EventType::RiskFactor,
        EventType::NetworkParameter,
        EventType::LiquidityProvision,
        EventType::OracleData,
        EventType::EpochUpdate,
        EventType::Delegation,
        EventType::ValidatorUpdate,
        EventType::StakeLinking,
        EventType::RewardPayout,
        EventType::Checkpoint,
        EventType::StreamStart,
        EventType::TxError,
    ];

    /// Stable, human-readable name used in logs, metrics labels and config.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeUpdate => "TimeUpdate",
            Self::BeginBlock => "BeginBlock",
            Self::EndBlock => "EndBlock",
            Self::LedgerMovements => "LedgerMovements",
            Self::PositionResolution => "PositionResolution",
            Self::Order => "Order",
            Self::Account => "Account",
            Self::Party => "Party",
            Self::Trade => "Trade",
            Self::MarginLevels => "MarginLevels",
            Self::Proposal => "Proposal",
            Self::Vote => "Vote",
            Self::MarketData => "MarketData",
            Self::NodeSignature => "NodeSignature",
            Self::LossSocialization => "LossSocialization",
            Self::SettlePosition => "SettlePosition",
            Self::SettleDistressed => "SettleDistressed",
            Self::MarketCreated => "MarketCreated",
            Self::MarketUpdated => "MarketUpdated",
            Self::MarketTick => "MarketTick",
            Self::Asset => "Asset",
            Self::Auction => "Auction",
            Self::Deposit => "Deposit",
            Self::Withdrawal => "Withdrawal",
            Self::Transfer => "Transfer",
            Self::RiskFactor => "RiskFactor",
            Self::NetworkParameter => "NetworkParameter",
            Self::LiquidityProvision => "LiquidityProvision",
            Self::OracleData => "OracleData",
            Self::EpochUpdate => "EpochUpdate",
            Self::Delegation => "Delegation",
            Self::ValidatorUpdate => "ValidatorUpdate",
            Self::StakeLinking => "StakeLinking",
            Self::RewardPayout => "RewardPayout",
            Self::Checkpoint => "Checkpoint",
            Self::StreamStart => "StreamStart",
            Self::TxError => "TxError",
        }
    }

    /// Returns true for the block-boundary marker.
    #[must_use]
    pub fn is_time_update(&self) -> bool {
        matches!(self, Self::TimeUpdate)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BusError::Codec(format!("unknown event type: {s}")))
    }
}

/// A single event flowing through the bus.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventType,
    trace_id: String,
    chain_id: String,
    tx_hash: String,
    block_nr: i64,
    sequence: OnceLock<u64>,
    payload: Vec<u8>,
}

impl Event {
    /// Create an unsequenced event for the block identified by `trace_id`.
    #[must_use]
    pub fn new(kind: EventType, trace_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind,
            trace_id: trace_id.into(),
            chain_id: String::new(),
            tx_hash: String::new(),
            block_nr: 0,
            sequence: OnceLock::new(),
            payload,
        }
    }

    #[must_use]
    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    #[must_use]
    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = tx_hash.into();
        self
    }

    #[must_use]
    pub fn with_block_nr(mut self, block_nr: i64) -> Self {
        self.block_nr = block_nr;
        self
    }

    pub fn kind(&self) -> EventType {
        self.kind
    }

    /// Whether this is a block-boundary marker.
    pub fn is_time_update(&self) -> bool {
        self.kind.is_time_update()
    }

    /// Identifier of the block that produced this event.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    pub fn block_nr(&self) -> i64 {
        self.block_nr
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Sequence number within the block, `0` while unsequenced.
    pub fn sequence(&self) -> u64 {
        self.sequence.get().copied().unwrap_or(0)
    }

    pub fn is_sequenced(&self) -> bool {
        self.sequence.get().is_some()
    }

    /// Set the sequence number. Only the first call has an effect.
    pub fn set_sequence(&self, sequence: u64) {
        let _ = self.sequence.set(sequence);
    }

    /// Wire identifier, `"<blockNr>-<sequence>"`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}-{}", self.block_nr, self.sequence())
    }

    /// Convert into the versioned wire envelope.
    #[must_use]
    pub fn to_bus_event(&self) -> BusEvent {
        BusEvent {
            version: BUS_EVENT_VERSION,
            id: self.id(),
            kind: self.kind,
            block: self.trace_id.clone(),
            chain_id: self.chain_id.clone(),
            tx_hash: self.tx_hash.clone(),
            payload: self.payload.clone(),
        }
    }

    /// Rebuild a sequenced event from its wire envelope.
    pub fn from_bus_event(bus_event: BusEvent) -> BusResult<Self> {
        let (block_nr, sequence) = bus_event.parse_id()?;
        let event = Self {
            kind: bus_event.kind,
            trace_id: bus_event.block,
            chain_id: bus_event.chain_id,
            tx_hash: bus_event.tx_hash,
            block_nr,
            sequence: OnceLock::new(),
            payload: bus_event.payload,
        };
        event.set_sequence(sequence);
        Ok(event)
    }

    /// Serialize straight to wire bytes.
    pub fn encode(&self) -> BusResult<Vec<u8>> {
        self.to_bus_event().encode()
    }

    /// Parse wire bytes into a sequenced event.
    pub fn decode(bytes: &[u8]) -> BusResult<Self> {
        Self::from_bus_event(BusEvent::decode(bytes)?)
    }
}
