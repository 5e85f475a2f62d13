//! # Block-Scoped Sequencer
//!
//! Numbers events within a block before they are published. Counters start
//! at 1 per block and only the most recently first-seen blocks are tracked;
//! a block pushed out of that window starts again from 1 if it ever shows up
//! again.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::Event;
use tracing::trace;

/// Number of blocks whose counters are retained.
pub const TRACKED_BLOCKS: usize = 4;

#[derive(Debug, Default)]
struct SequencerState {
    /// block trace id -> next sequence number
    block_seq: HashMap<String, u64>,
    /// First-seen order, oldest at the front.
    blocks: VecDeque<String>,
}

#[derive(Debug, Default)]
pub struct Sequencer {
    state: Mutex<SequencerState>,
}

impl Sequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign consecutive sequence numbers to a batch from one block.
    ///
    /// The block is taken from the first event. Events that already carry
    /// a sequence keep it. The returned events are read-only from here on.
    pub fn set_sequence(&self, events: Vec<Event>) -> Vec<Arc<Event>> {
        let Some(first) = events.first() else {
            return Vec::new();
        };
        let block = first.trace_id().to_string();
        let start = self.reserve(block, events.len() as u64);

        events
            .into_iter()
            .zip(start..)
            .map(|(event, sequence)| {
                event.set_sequence(sequence);
                Arc::new(event)
            })
            .collect()
    }

    /// Reserve `count` numbers for `block`, returning the first one.
    fn reserve(&self, block: String, count: u64) -> u64 {
        let mut state = self.state.lock();
        if let Some(next) = state.block_seq.get_mut(&block) {
            let start = *next;
            *next += count;
            return start;
        }

        if state.blocks.len() == TRACKED_BLOCKS {
            if let Some(oldest) = state.blocks.pop_front() {
                state.block_seq.remove(&oldest);
                trace!(block = %oldest, "Sequencer evicted block");
            }
        }
        state.blocks.push_back(block.clone());
        state.block_seq.insert(block, 1 + count);
        1
    }
}
