//! # Replication Flows
//!
//! A core node publishes through its `CorePipeline`; a data node receives
//! over the socket and dispatches to storage writers.
//!
//! ## Flows Tested
//!
//! 1. **In-process transport**: socket server shared through the fan-out by
//!    the SQL dispatcher and a second consumer.
//! 2. **TCP transport**: sequential dispatch keeps one global order across
//!    writers of different types.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::timeout;

    use bus_runtime::{BusConfig, CorePipeline, DataNodePipeline, Supervisor};
    use event_sources::EventSource;
    use shared_types::EventType;
    use socket_transport::{SocketConfig, SocketServer};
    use sql_store_broker::InMemoryChainInfo;

    use crate::integration::{block, ids_for, RecordingWriter};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    type Log = Arc<Mutex<Vec<(&'static str, String)>>>;

    fn fast_dial(socket: SocketConfig) -> SocketConfig {
        SocketConfig {
            dial_retry_interval: Duration::from_millis(10),
            ..socket
        }
    }

    /// Poll until the log holds `n` entries.
    async fn wait_for_entries(log: &Log, n: usize) {
        timeout(Duration::from_secs(2), async {
            while log.lock().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timeout waiting for storage writers");
    }

    // =============================================================================
    // IN-PROCESS TRANSPORT
    // =============================================================================

    #[tokio::test]
    async fn test_inproc_replication_feeds_store_and_mirror() {
        let endpoint = "replication-inproc";

        let mut data_config = BusConfig::default();
        data_config.socket = SocketConfig::inproc(endpoint);
        data_config.source.expected_fan_out_subscribers = 2;

        let log = Log::default();
        let data_node = Arc::new(DataNodePipeline::new(
            &data_config,
            Arc::new(InMemoryChainInfo::new()),
        ));
        data_node
            .subscribe(RecordingWriter::new("store", vec![], &log))
            .unwrap();
        data_node.listen().await.unwrap();

        let data_supervisor = Arc::new(Supervisor::new());
        let running = {
            let (data_node, supervisor) = (Arc::clone(&data_node), Arc::clone(&data_supervisor));
            tokio::spawn(async move { data_node.run(&supervisor).await })
        };
        let mut mirror = data_node
            .source()
            .receive(data_supervisor.signal())
            .await
            .unwrap();

        let mut core_config = BusConfig::default();
        core_config.socket = fast_dial(SocketConfig::inproc(endpoint));
        let core = CorePipeline::start(&core_config, Arc::new(Supervisor::new()))
            .await
            .unwrap();

        core.publish(block(1, &[EventType::Trade, EventType::Order, EventType::TimeUpdate]))
            .await
            .unwrap();
        core.publish(block(2, &[EventType::Trade])).await.unwrap();

        let expected = ["1-1", "1-2", "1-3", "2-1"];
        for id in expected {
            let event = timeout(Duration::from_secs(2), mirror.events.recv())
                .await
                .expect("timeout")
                .expect("mirror stream closed");
            assert_eq!(event.id(), id);
            assert_eq!(event.chain_id(), "testnet");
        }

        wait_for_entries(&log, expected.len()).await;
        assert_eq!(ids_for(&log, "store"), expected);

        data_supervisor.shutdown();
        let result = timeout(Duration::from_secs(2), running)
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(result, Ok(()));
        core.shutdown().await.unwrap();
    }

    // =============================================================================
    // TCP TRANSPORT
    // =============================================================================

    #[tokio::test]
    async fn test_tcp_replication_sequential_dispatch() {
        let server = Arc::new(SocketServer::new(SocketConfig {
            address: "127.0.0.1".to_string(),
            port: 0,
            ..SocketConfig::default()
        }));
        server.listen().await.unwrap();
        let addr = server.local_addr().expect("bound address");
        let port: u16 = addr.rsplit(':').next().unwrap().parse().unwrap();

        let mut data_config = BusConfig::default();
        data_config.store.use_sequential_dispatch = true;

        let log = Log::default();
        let data_node = Arc::new(DataNodePipeline::with_upstream(
            &data_config,
            server,
            Arc::new(InMemoryChainInfo::new()),
        ));
        data_node
            .subscribe(RecordingWriter::new("trades", vec![EventType::Trade], &log))
            .unwrap();
        data_node
            .subscribe(RecordingWriter::new("orders", vec![EventType::Order], &log))
            .unwrap();

        let data_supervisor = Arc::new(Supervisor::new());
        let running = {
            let (data_node, supervisor) = (Arc::clone(&data_node), Arc::clone(&data_supervisor));
            tokio::spawn(async move { data_node.run(&supervisor).await })
        };

        let mut core_config = BusConfig::default();
        core_config.socket = fast_dial(SocketConfig {
            address: "127.0.0.1".to_string(),
            port,
            enabled: true,
            ..SocketConfig::default()
        });
        let core = CorePipeline::start(&core_config, Arc::new(Supervisor::new()))
            .await
            .unwrap();

        core.publish(block(1, &[EventType::Trade, EventType::Order]))
            .await
            .unwrap();
        core.publish(block(2, &[EventType::TimeUpdate])).await.unwrap();
        core.publish(block(3, &[EventType::Order])).await.unwrap();

        wait_for_entries(&log, 5).await;
        let expected: Vec<(&str, String)> = [
            ("trades", "1-1"),
            ("orders", "1-2"),
            ("trades", "2-1"),
            ("orders", "2-1"),
            ("orders", "3-1"),
        ]
        .into_iter()
        .map(|(who, id)| (who, id.to_string()))
        .collect();
        assert_eq!(*log.lock(), expected);

        data_supervisor.shutdown();
        let result = timeout(Duration::from_secs(2), running)
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(result, Ok(()));
        core.shutdown().await.unwrap();
    }
}
