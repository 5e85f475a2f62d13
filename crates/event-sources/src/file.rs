//! # File Event Source
//!
//! Replays a log written by [`EventLogWriter`](crate::EventLogWriter) from
//! the start, block by block.
//!
//! ## Replay
//!
//! - Consecutive records with the same `block` form one batch.
//! - At a block transition the pending batch is sent, then replay pauses for
//!   `time_between_blocks` before the new block starts. One pause per
//!   transition, no pause before the first block.
//! - At end of file the last batch is sent and both channels stay open, as
//!   a live socket feed would with no more data yet.
//! - A read or decode error is put on the error channel and the event
//!   channel is closed.
//! - Shutdown closes both channels immediately.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::framing::read_frame;
use shared_types::{BusResult, Event, ShutdownSignal};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::FileSourceConfig;
use crate::source::{EventSource, SourceStreams};

#[derive(Debug, Clone)]
pub struct FileEventSource {
    config: FileSourceConfig,
}

/// How a replay ended without error.
enum ReplayEnd {
    EndOfFile { events: u64 },
    ConsumerGone,
}

impl FileEventSource {
    #[must_use]
    pub fn new(config: FileSourceConfig) -> Self {
        Self { config }
    }

    async fn replay(&self, events: &mpsc::Sender<Arc<Event>>) -> BusResult<ReplayEnd> {
        let file = tokio::fs::File::open(&self.config.file_path).await?;
        let mut reader = BufReader::new(file);

        let mut batch: Vec<Arc<Event>> = Vec::new();
        let mut current_block: Option<String> = None;
        let mut replayed = 0u64;

        while let Some(frame) = read_frame(&mut reader).await? {
            let event = Event::decode(&frame)?;

            if current_block.as_deref() != Some(event.trace_id()) {
                if current_block.is_some() {
                    if !send_batch(events, &mut batch).await {
                        return Ok(ReplayEnd::ConsumerGone);
                    }
                    if !self.config.time_between_blocks.is_zero() {
                        tokio::time::sleep(self.config.time_between_blocks).await;
                    }
                }
                current_block = Some(event.trace_id().to_string());
            }

            batch.push(Arc::new(event));
            replayed += 1;
        }

        if !send_batch(events, &mut batch).await {
            return Ok(ReplayEnd::ConsumerGone);
        }
        Ok(ReplayEnd::EndOfFile { events: replayed })
    }
}

/// Returns false once the consumer has dropped its receiver.
async fn send_batch(events: &mpsc::Sender<Arc<Event>>, batch: &mut Vec<Arc<Event>>) -> bool {
    for event in batch.drain(..) {
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}

#[async_trait]
impl EventSource for FileEventSource {
    async fn listen(&self) -> BusResult<()> {
        Ok(())
    }

    async fn receive(&self, mut shutdown: ShutdownSignal) -> BusResult<SourceStreams> {
        let (streams, events_tx, errors_tx) = SourceStreams::channel(self.config.buffer_size);
        let source = self.clone();

        tokio::spawn(async move {
            let path = source.config.file_path.display().to_string();
            info!(path = %path, "Replaying event file");

            let outcome = tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    debug!(path = %path, "Replay interrupted");
                    return;
                }
                outcome = source.replay(&events_tx) => outcome,
            };

            match outcome {
                Ok(ReplayEnd::EndOfFile { events }) => {
                    info!(path = %path, events, "Event file replayed");
                    // Hold both channels open until shutdown.
                    shutdown.triggered().await;
                }
                Ok(ReplayEnd::ConsumerGone) => {
                    debug!(path = %path, "Replay consumer dropped");
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Event file replay failed");
                    let _ = errors_tx.try_send(e);
                    drop(events_tx);
                    shutdown.triggered().await;
                }
            }
            drop(errors_tx);
        });

        Ok(streams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::EventLogWriter;
    use shared_types::{shutdown_channel, BusError, EventType};
    use std::path::Path;
    use std::time::Duration;
    use tokio::time::{timeout, Instant};

    fn write_log(path: &Path, blocks: &[(&str, usize)]) {
        let writer = EventLogWriter::open(path).unwrap();
        for (block_nr, (block, count)) in blocks.iter().enumerate() {
            for seq in 1..=*count {
                let event = Event::new(EventType::Order, *block, vec![seq as u8])
                    .with_chain_id("chain")
                    .with_block_nr(block_nr as i64);
                event.set_sequence(seq as u64);
                writer.append_event(&event).unwrap();
            }
        }
        writer.flush().unwrap();
    }

    async fn collect(streams: &mut SourceStreams, n: usize) -> Vec<Arc<Event>> {
        let mut out = Vec::new();
        for _ in 0..n {
            out.push(streams.events.recv().await.expect("event"));
        }
        out
    }

    #[tokio::test]
    async fn test_replays_in_order_and_stays_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        write_log(&path, &[("b1", 2), ("b2", 1)]);

        let (trigger, signal) = shutdown_channel();
        let source = FileEventSource::new(FileSourceConfig::new(&path));
        source.listen().await.unwrap();
        let mut streams = source.receive(signal).await.unwrap();

        let events = timeout(Duration::from_secs(1), collect(&mut streams, 3))
            .await
            .expect("timeout");
        let ids: Vec<_> = events.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["0-1", "0-2", "1-1"]);
        assert_eq!(events[0].chain_id(), "chain");

        // End of file does not close the stream.
        assert!(timeout(Duration::from_millis(50), streams.events.recv())
            .await
            .is_err());

        trigger.trigger();
        let closed = timeout(Duration::from_secs(1), streams.events.recv())
            .await
            .expect("timeout");
        assert!(closed.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_pause_per_block_transition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        write_log(&path, &[("b1", 3), ("b2", 2)]);

        let pause = Duration::from_secs(5);
        let source =
            FileEventSource::new(FileSourceConfig::new(&path).with_time_between_blocks(pause));
        let mut streams = source.receive(ShutdownSignal::never()).await.unwrap();

        let start = Instant::now();
        let first_block = collect(&mut streams, 3).await;
        assert!(first_block.iter().all(|e| e.trace_id() == "b1"));
        assert!(start.elapsed() < pause);

        let second_block = collect(&mut streams, 2).await;
        assert!(second_block.iter().all(|e| e.trace_id() == "b2"));
        let elapsed = start.elapsed();
        assert!(elapsed >= pause && elapsed < pause * 2);
    }

    #[tokio::test]
    async fn test_missing_file_reports_error_and_closes_events() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileEventSource::new(FileSourceConfig::new(dir.path().join("missing.log")));
        let mut streams = source.receive(ShutdownSignal::never()).await.unwrap();

        let next = timeout(Duration::from_secs(1), streams.events.recv())
            .await
            .expect("timeout");
        assert!(next.is_none());
        assert!(matches!(streams.take_error(), Some(BusError::Io(_))));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        write_log(&path, &[("b1", 1)]);
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0, 0, 0, 2, 0xFF, 0xFF]).unwrap();
        }

        let source = FileEventSource::new(FileSourceConfig::new(&path));
        let mut streams = source.receive(ShutdownSignal::never()).await.unwrap();

        let events = timeout(Duration::from_secs(1), async {
            let mut out = Vec::new();
            while let Some(event) = streams.events.recv().await {
                out.push(event);
            }
            out
        })
        .await
        .expect("timeout");

        // The good block was never flushed: the error hit before its end.
        assert!(events.is_empty());
        assert!(matches!(streams.take_error(), Some(BusError::Codec(_))));
    }
}
