//! # Capture and Replay
//!
//! The core node captures published events into a log; the data node later
//! replays that log through the file source instead of a live socket.

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::timeout;

    use bus_runtime::{BusConfig, CorePipeline, DataNodePipeline, Supervisor};
    use event_sources::EventLogWriter;
    use shared_types::{BusError, Event, EventType};
    use sql_store_broker::InMemoryChainInfo;

    use crate::integration::{block, ids_for, RecordingWriter};

    type Log = Arc<Mutex<Vec<(&'static str, String)>>>;

    async fn capture(path: &Path) {
        let mut config = BusConfig::default();
        config.core.event_log_path = Some(path.to_path_buf());

        let core = CorePipeline::start(&config, Arc::new(Supervisor::new()))
            .await
            .unwrap();
        core.publish(block(1, &[EventType::Trade, EventType::Order]))
            .await
            .unwrap();
        core.publish(block(2, &[EventType::TimeUpdate, EventType::Trade]))
            .await
            .unwrap();
        core.shutdown().await.unwrap();
    }

    fn replay_config(path: &Path) -> BusConfig {
        let mut config = BusConfig::default();
        config.source.use_event_file = true;
        config.source.file.file_path = path.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_capture_then_replay_concurrent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        capture(&path).await;

        let log = Log::default();
        let data_node = Arc::new(DataNodePipeline::new(
            &replay_config(&path),
            Arc::new(InMemoryChainInfo::new()),
        ));
        data_node
            .subscribe(RecordingWriter::new("trades", vec![EventType::Trade], &log))
            .unwrap();
        data_node
            .subscribe(RecordingWriter::new("orders", vec![EventType::Order], &log))
            .unwrap();

        let supervisor = Arc::new(Supervisor::new());
        let running = {
            let (data_node, supervisor) = (Arc::clone(&data_node), Arc::clone(&supervisor));
            tokio::spawn(async move { data_node.run(&supervisor).await })
        };

        timeout(Duration::from_secs(2), async {
            while log.lock().len() < 5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timeout");

        // Per-type order only; the TimeUpdate reaches both writers.
        assert_eq!(ids_for(&log, "trades"), vec!["1-1", "2-1", "2-2"]);
        assert_eq!(ids_for(&log, "orders"), vec!["1-2", "2-1"]);

        supervisor.shutdown();
        let result = timeout(Duration::from_secs(2), running)
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_replay_of_foreign_chain_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        capture(&path).await;

        let data_node = DataNodePipeline::new(
            &replay_config(&path),
            Arc::new(InMemoryChainInfo::with_chain_id("mainnet")),
        );
        let supervisor = Supervisor::new();

        let result = timeout(Duration::from_secs(2), data_node.run(&supervisor))
            .await
            .expect("timeout");

        assert_eq!(
            result,
            Err(BusError::ChainIdMismatch {
                received: "testnet".to_string(),
                expected: "mainnet".to_string(),
            })
        );
        // Not fatal: the rest of the process keeps running.
        assert!(!supervisor.is_shutting_down());
    }

    #[tokio::test]
    async fn test_corrupt_log_surfaces_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        {
            let writer = EventLogWriter::open(&path).unwrap();
            for block_nr in 1..=2 {
                let event = Event::new(EventType::Trade, format!("block-{block_nr}"), vec![])
                    .with_block_nr(block_nr);
                event.set_sequence(1);
                writer.append_event(&event).unwrap();
            }
            writer.flush().unwrap();
        }
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0, 0, 0, 3, 0xde, 0xad, 0xbe]).unwrap();
        drop(file);

        let log = Log::default();
        let data_node =
            DataNodePipeline::new(&replay_config(&path), Arc::new(InMemoryChainInfo::new()));
        data_node
            .subscribe(RecordingWriter::new("trades", vec![EventType::Trade], &log))
            .unwrap();
        let supervisor = Supervisor::new();

        let result = timeout(Duration::from_secs(2), data_node.run(&supervisor))
            .await
            .expect("timeout");

        assert!(matches!(result, Err(BusError::Codec(_))));
        // Only completed blocks are emitted; the one cut short is not.
        assert_eq!(ids_for(&log, "trades"), vec!["1-1"]);
        assert!(!supervisor.is_shutting_down());
    }
}
