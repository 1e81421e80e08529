// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the broker session using mockforge-mqtt.

use std::time::Duration;

use ecoflow_mqtt::command::delta_pro3;
use ecoflow_mqtt::{DeviceKind, ProtocolError, Session, SessionConfig, SessionPhase};
use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use serde_json::json;
use tokio::time::sleep;

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18950);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to start, bind to port, and be ready to accept connections
    sleep(Duration::from_millis(500)).await;
}

fn plain_session(port: u16) -> Session {
    let config = SessionConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .tls(false)
        .credentials("user", "pass")
        .user_id("1234567890")
        .connection_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    Session::new(config)
}

// ============================================================================
// Connection Tests
// ============================================================================

mod connection {
    use super::*;

    #[tokio::test]
    async fn connect_to_broker() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let session = plain_session(port);
        session
            .register_device("P351TEST0001", DeviceKind::DeltaPro3, "Garage")
            .unwrap();

        let result = session.connect().await;
        assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
        assert_eq!(session.phase(), SessionPhase::Connected);
        assert!(session.connection_state().authorized());

        session.stop().await;
        assert_eq!(session.phase(), SessionPhase::Disconnected);
    }

    #[tokio::test]
    async fn connect_twice_is_noop() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let session = plain_session(port);
        session.connect().await.unwrap();
        session.connect().await.unwrap();
        assert!(session.is_connected());

        session.stop().await;
    }

    #[tokio::test]
    async fn unreachable_broker_times_out() {
        let port = get_test_port();
        let config = SessionConfig::builder()
            .host("127.0.0.1")
            .port(port)
            .tls(false)
            .credentials("user", "pass")
            .user_id("1234567890")
            .connection_timeout(Duration::from_millis(300))
            .disconnect_backoff(Duration::from_millis(100))
            .build()
            .unwrap();
        let session = Session::new(config);

        let result = session.connect().await;
        assert!(matches!(result, Err(ProtocolError::Timeout(_))));
        assert!(!session.is_connected());

        session.stop().await;
        assert_eq!(session.phase(), SessionPhase::Disconnected);
    }

    #[tokio::test]
    async fn reconnect_after_stop() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let session = plain_session(port);
        session.connect().await.unwrap();
        session.stop().await;

        assert!(session.reconnect().await);
        let mut phase = session.watch_phase();
        let connected = tokio::time::timeout(
            Duration::from_secs(5),
            phase.wait_for(|p| *p == SessionPhase::Connected),
        )
        .await;
        assert!(connected.is_ok());

        session.stop().await;
    }
}

// ============================================================================
// Publish Tests
// ============================================================================

mod publish {
    use super::*;

    #[tokio::test]
    async fn set_command_updates_store_optimistically() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let session = plain_session(port);
        let device = session
            .register_device("P351TEST0002", DeviceKind::DeltaPro3, "Garage")
            .unwrap();
        session.connect().await.unwrap();

        let mut updates = device.store().subscribe();
        session.send(device.serial_number(), &delta_pro3::max_charge_soc(85).unwrap());

        let snapshot = tokio::time::timeout(Duration::from_secs(1), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.get("cms_max_chg_soc"), Some(&json!(85)));

        session.request_latest_quotas(device.serial_number());
        session.stop().await;
    }

    #[tokio::test]
    async fn device_registered_after_connect() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let session = plain_session(port);
        session.connect().await.unwrap();

        let device = session
            .register_device("R601TEST0003", DeviceKind::River2, "Van")
            .unwrap();
        session.send(device.serial_number(), &delta_pro3::beeper(false));
        assert_eq!(device.store().get("en_beep"), Some(json!(false)));

        session.stop().await;
    }
}

// ============================================================================
// Message Routing
// ============================================================================
//
// NOTE: The mockforge-mqtt broker used for testing doesn't fully support
// pub/sub message forwarding between clients. Inbound routing is tested by
// calling `Session::on_message` directly in src/session/mod.rs and by the
// frame fixtures in tests/frame_pipeline.rs.
