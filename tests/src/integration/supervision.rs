//! # Supervision
//!
//! Fatal conditions anywhere end in one controlled shutdown: the first fatal
//! error is recorded and every component sharing the signal stops.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    use bus_runtime::{BusConfig, CorePipeline, DataNodePipeline, Supervisor};
    use event_sources::EventSource;
    use shared_types::{BusError, EventType, FatalError};
    use socket_transport::{PullSocket, SocketConfig, SocketServer, TransportKind};
    use sql_store_broker::InMemoryChainInfo;

    use crate::integration::block;

    #[tokio::test]
    async fn test_bad_protocol_stops_the_process() {
        let supervisor = Arc::new(Supervisor::new());
        let core = CorePipeline::start(&BusConfig::default(), Arc::clone(&supervisor))
            .await
            .unwrap();

        let server = Arc::new(SocketServer::new(SocketConfig {
            address: "127.0.0.1".to_string(),
            port: 0,
            ..SocketConfig::default()
        }));
        server.listen().await.unwrap();
        let addr = server.local_addr().expect("bound address");

        let data_node = Arc::new(DataNodePipeline::with_upstream(
            &BusConfig::default(),
            server,
            Arc::new(InMemoryChainInfo::new()),
        ));
        let running = {
            let (data_node, supervisor) = (Arc::clone(&data_node), Arc::clone(&supervisor));
            tokio::spawn(async move { data_node.run(&supervisor).await })
        };

        // A length prefix far beyond the frame limit.
        let mut peer = TcpStream::connect(&addr).await.unwrap();
        peer.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        let result = timeout(Duration::from_secs(2), running)
            .await
            .expect("timeout")
            .unwrap();
        assert!(matches!(
            result,
            Err(BusError::Fatal(FatalError::BadProtocol(_)))
        ));
        assert!(matches!(
            supervisor.fatal_error(),
            Some(FatalError::BadProtocol(_))
        ));

        // The core broker shares the signal and stops too.
        timeout(Duration::from_secs(2), async {
            while core.broker().subscriber_count().await.is_ok() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("broker still running");
    }

    #[tokio::test]
    async fn test_stuck_replication_is_fatal() {
        // Bound, never read.
        let _pull = PullSocket::bind(TransportKind::InProc, "supervision-stuck", 1)
            .await
            .unwrap();

        let mut config = BusConfig::default();
        config.socket = SocketConfig {
            event_channel_buffer_size: 1,
            socket_queue_timeout: Duration::from_millis(10),
            max_send_timeouts: 2,
            ..SocketConfig::inproc("supervision-stuck")
        };
        let supervisor = Arc::new(Supervisor::new());
        let core = CorePipeline::start(&config, Arc::clone(&supervisor))
            .await
            .unwrap();

        let mut outcome = None;
        for block_nr in 1..=10 {
            if let Err(e) = core.publish(block(block_nr, &[EventType::Trade])).await {
                outcome = Some(e);
                break;
            }
        }

        assert_eq!(
            outcome,
            Some(BusError::Fatal(FatalError::SenderStuck { timeouts: 2 }))
        );
        assert!(supervisor.is_shutting_down());
        assert_eq!(
            supervisor.fatal_error(),
            Some(FatalError::SenderStuck { timeouts: 2 })
        );
    }

    #[tokio::test]
    async fn test_operator_shutdown_stops_idle_data_node() {
        let supervisor = Arc::new(Supervisor::new());
        let mut config = BusConfig::default();
        config.socket = SocketConfig::inproc("supervision-idle");

        let data_node = Arc::new(DataNodePipeline::new(
            &config,
            Arc::new(InMemoryChainInfo::new()),
        ));
        let running = {
            let (data_node, supervisor) = (Arc::clone(&data_node), Arc::clone(&supervisor));
            tokio::spawn(async move { data_node.run(&supervisor).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!running.is_finished());

        supervisor.shutdown();
        let result = timeout(Duration::from_secs(2), running)
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(supervisor.fatal_error(), None);
    }
}
